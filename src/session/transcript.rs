/// Result value that clears the transcript instead of being shown.
pub const CLEAR_SENTINEL: &str = "__CLEAR_TERMINAL__";
pub const PROMPT: &str = ">>> ";

/// Append-only console log.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn echo(&mut self, command: &str) {
        self.lines.push(format!("{PROMPT}{command}"));
    }

    /// Append an asynchronous result, one line per output line. The clear
    /// sentinel wipes the transcript instead.
    pub fn append_result(&mut self, result: &str) {
        let trimmed = result.trim();
        if trimmed == CLEAR_SENTINEL {
            self.lines.clear();
            return;
        }
        if trimmed.is_empty() {
            self.lines.push(String::new());
            return;
        }
        self.lines.extend(trimmed.lines().map(str::to_string));
    }

    pub fn append_lines(&mut self, lines: impl IntoIterator<Item = String>) {
        self.lines.extend(lines);
    }
}
