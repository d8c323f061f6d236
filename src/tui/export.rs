use crate::storage::{self, SavedResult};
use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Save the last successful payload and report the path in the status line.
pub fn save_and_show_path(state: &mut UiState) {
    let Some(saved) = state.session.last_payload() else {
        state.info = "No successful extraction to save yet.".into();
        return;
    };
    let result = SavedResult::new(saved, crate::cli::gen_request_id());
    match storage::save_result(&state.output_dir, &result) {
        Ok(path) => {
            state.info = format!("Saved: {}", path.display());
            state.last_saved_path = Some(path);
        }
        Err(e) => {
            state.info = format!("Save failed: {e:#}");
        }
    }
}

/// Copy the result pane (or the saved path when the pane is empty).
pub fn copy_results(state: &mut UiState) {
    let text = if state.session.results().lines.is_empty() {
        match &state.last_saved_path {
            Some(p) => p.display().to_string(),
            None => {
                state.info = "Nothing to copy".into();
                return;
            }
        }
    } else {
        state.session.results().lines.join("\n")
    };
    state.info = match copy_to_clipboard(&text) {
        Ok(()) => format!("Copied {} lines to clipboard", text.lines().count()),
        Err(e) => format!("Clipboard copy failed: {e:#}"),
    };
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each clipboard instance is kept alive for a while so clipboard managers on
/// Linux have time to read the contents.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard thread; returns without blocking the UI.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
