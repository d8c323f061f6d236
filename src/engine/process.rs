//! Process bridge: run a backend process and multiplex its output streams.
//!
//! Each invocation is an independent task that reports `ProcessEvent`s over its own
//! channel, terminated by exactly one `Exited`. Consumers either collapse the events
//! into one string (`run`) or forward chunks as they arrive (`run_streaming`).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-line marker for stderr output on the console command channel.
pub const COMMAND_ERROR_MARKER: &str = "Error: ";
/// Per-line marker for stderr output on the streaming outline channel.
pub const STREAM_ERROR_MARKER: &str = "[ERROR] ";

const READ_BUF: usize = 4096;

/// What to run and how to mark its error stream.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub error_marker: &'static str,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Always the last event. `None` when the process never started, was killed,
    /// or ended by signal.
    Exited(Option<i32>),
}

/// Consolidated result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub combined: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Prefixes every line of a stream with a marker, remembering whether the previous
/// chunk ended mid-line so continuation chunks are not marked twice.
struct LineMarker {
    marker: &'static str,
    at_line_start: bool,
}

impl LineMarker {
    fn new(marker: &'static str) -> Self {
        Self {
            marker,
            at_line_start: true,
        }
    }

    fn mark(&mut self, chunk: &str) -> String {
        let mut out = String::with_capacity(chunk.len() + self.marker.len());
        for segment in chunk.split_inclusive('\n') {
            if self.at_line_start && !segment.trim().is_empty() {
                out.push_str(self.marker);
            }
            out.push_str(segment);
            self.at_line_start = segment.ends_with('\n');
        }
        out
    }
}

/// Spawn the process on the runtime and return its event stream.
pub fn spawn(spec: ProcessSpec) -> mpsc::UnboundedReceiver<ProcessEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(drive(spec, tx));
    rx
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }

    fn event(self, text: String) -> ProcessEvent {
        match self {
            Stream::Stdout => ProcessEvent::Stdout(text),
            Stream::Stderr => ProcessEvent::Stderr(text),
        }
    }
}

/// Incremental UTF-8 decoding across pipe reads. A character split between two
/// reads is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Whatever is left once the stream is over, decoded lossily.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Length of a truncated multibyte sequence at the end of `buf`, if any.
fn incomplete_tail(buf: &[u8]) -> usize {
    let start = buf.len().saturating_sub(3);
    for i in start..buf.len() {
        if let Err(e) = std::str::from_utf8(&buf[i..]) {
            if e.valid_up_to() == 0 && e.error_len().is_none() {
                return buf.len() - i;
            }
        }
    }
    0
}

/// One output pipe of a child process.
struct Pipe<R> {
    reader: Option<R>,
    stream: Stream,
    buf: [u8; READ_BUF],
    carry: Utf8Carry,
}

impl<R: AsyncRead + Unpin> Pipe<R> {
    fn new(reader: Option<R>, stream: Stream) -> Self {
        Self {
            reader,
            stream,
            buf: [0u8; READ_BUF],
            carry: Utf8Carry::default(),
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next decoded chunk. `None` once the pipe is closed. A read error closes
    /// the pipe and is reported on the error stream.
    async fn next(&mut self) -> Option<ProcessEvent> {
        loop {
            let r = self.reader.as_mut()?;
            match r.read(&mut self.buf).await {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(n) => {
                    let text = self.carry.push(&self.buf[..n]);
                    if !text.is_empty() {
                        return Some(self.stream.event(text));
                    }
                }
                Err(e) => {
                    warn!(stream = self.stream.as_str(), "pipe read failed: {e}");
                    self.reader = None;
                    return Some(ProcessEvent::Stderr(format!(
                        "\nfailed to read {}: {e}\n",
                        self.stream.as_str()
                    )));
                }
            }
        }
    }

    fn flush(&mut self) -> Option<ProcessEvent> {
        self.carry.finish().map(|text| self.stream.event(text))
    }
}

async fn drive(spec: ProcessSpec, tx: mpsc::UnboundedSender<ProcessEvent>) {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            warn!(program = %spec.program, cwd = %spec.cwd.display(), "spawn failed: {e}");
            let _ = tx.send(ProcessEvent::Stderr(format!(
                "failed to start `{}` in {}: {e}\n",
                spec.program,
                spec.cwd.display()
            )));
            let _ = tx.send(ProcessEvent::Exited(None));
            return;
        }
    };
    info!(program = %spec.program, args = ?spec.args, pid = ?child.id(), "process started");

    let mut stdout = Pipe::new(child.stdout.take(), Stream::Stdout);
    let mut stderr = Pipe::new(child.stderr.take(), Stream::Stderr);

    let deadline = async {
        match spec.timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => futures::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut timed_out = false;
    while stdout.is_open() || stderr.is_open() {
        tokio::select! {
            ev = stdout.next(), if stdout.is_open() => {
                if let Some(ev) = ev { let _ = tx.send(ev); }
            }
            ev = stderr.next(), if stderr.is_open() => {
                if let Some(ev) = ev { let _ = tx.send(ev); }
            }
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
        }
    }
    for ev in [stdout.flush(), stderr.flush()].into_iter().flatten() {
        let _ = tx.send(ev);
    }

    let code = if timed_out {
        None
    } else {
        tokio::select! {
            status = child.wait() => match status {
                Ok(s) => s.code(),
                Err(e) => {
                    warn!("wait failed: {e}");
                    None
                }
            },
            _ = &mut deadline => {
                timed_out = true;
                None
            }
        }
    };

    if timed_out {
        let _ = child.kill().await;
        let secs = spec.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
        warn!(program = %spec.program, "process timed out after {secs:.1}s");
        let _ = tx.send(ProcessEvent::Stderr(format!(
            "\nprocess timed out after {secs:.1}s and was killed\n"
        )));
    }
    debug!(program = %spec.program, ?code, "process exited");
    let _ = tx.send(ProcessEvent::Exited(code));
}

/// Drain one invocation's events, marking stderr, forwarding each chunk to `on_chunk`.
async fn collect(
    mut rx: mpsc::UnboundedReceiver<ProcessEvent>,
    marker: &'static str,
    mut on_chunk: impl FnMut(String),
) -> ProcessOutput {
    let mut combined = String::new();
    let mut err_marker = LineMarker::new(marker);
    let mut exit_code = None;

    while let Some(ev) = rx.recv().await {
        let chunk = match ev {
            ProcessEvent::Stdout(s) => s,
            ProcessEvent::Stderr(s) => err_marker.mark(&s),
            ProcessEvent::Exited(code) => {
                exit_code = code;
                continue;
            }
        };
        combined.push_str(&chunk);
        on_chunk(chunk);
    }

    ProcessOutput {
        combined: combined.trim().to_string(),
        exit_code,
    }
}

/// Run to completion and return the merged, trimmed output.
pub async fn run(spec: ProcessSpec) -> ProcessOutput {
    let marker = spec.error_marker;
    collect(spawn(spec), marker, |_| {}).await
}

/// Run to completion, forwarding every chunk as it arrives and finishing with an
/// exit trailer line.
pub async fn run_streaming(spec: ProcessSpec, mut on_chunk: impl FnMut(String)) -> ProcessOutput {
    let marker = spec.error_marker;
    let output = collect(spawn(spec), marker, &mut on_chunk).await;
    on_chunk(exit_trailer(output.exit_code));
    output
}

pub fn exit_trailer(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("\nProcess exited with code {c}"),
        None => "\nProcess exited without an exit code".to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, marker: &'static str) -> ProcessSpec {
        ProcessSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: std::env::temp_dir(),
            error_marker: marker,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn stdout_only_resolves_with_output_and_code() {
        let out = run(sh("printf X", COMMAND_ERROR_MARKER)).await;
        assert_eq!(out.combined, "X");
        assert_eq!(out.exit_code, Some(0));
        assert!(out.success());
    }

    #[tokio::test]
    async fn stderr_lines_are_marked() {
        let out = run(sh("echo oops >&2; echo again >&2; exit 3", COMMAND_ERROR_MARKER)).await;
        assert!(out.combined.contains("Error: oops"), "{}", out.combined);
        assert!(out.combined.contains("Error: again"), "{}", out.combined);
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn output_is_trimmed() {
        let out = run(sh("printf '\\n  hello world  \\n\\n'", COMMAND_ERROR_MARKER)).await;
        assert_eq!(out.combined, "hello world");
    }

    #[tokio::test]
    async fn missing_program_still_resolves() {
        let spec = ProcessSpec {
            program: "definitely-not-an-interpreter-7f3a".into(),
            args: vec![],
            cwd: std::env::temp_dir(),
            error_marker: COMMAND_ERROR_MARKER,
            timeout: None,
        };
        let out = run(spec).await;
        assert!(out.combined.starts_with("Error: failed to start"), "{}", out.combined);
        assert_eq!(out.exit_code, None);
    }

    #[tokio::test]
    async fn bad_working_directory_still_resolves() {
        let mut spec = sh("true", COMMAND_ERROR_MARKER);
        spec.cwd = PathBuf::from("/no/such/dir/for/pdf-agent");
        let out = run(spec).await;
        assert!(out.combined.starts_with("Error: "), "{}", out.combined);
        assert_eq!(out.exit_code, None);
    }

    #[tokio::test]
    async fn streaming_forwards_chunks_and_trailer() {
        let mut chunks = Vec::new();
        let out = run_streaming(sh("echo one; echo two >&2", STREAM_ERROR_MARKER), |c| {
            chunks.push(c)
        })
        .await;
        let all = chunks.concat();
        assert!(all.contains("one"));
        assert!(all.contains("[ERROR] two"));
        assert_eq!(chunks.last().unwrap(), "\nProcess exited with code 0");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let mut spec = sh("sleep 5", COMMAND_ERROR_MARKER);
        spec.timeout = Some(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let out = run(spec).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(out.combined.contains("timed out"), "{}", out.combined);
        assert_eq!(out.exit_code, None);
    }

    #[tokio::test]
    async fn multibyte_text_survives_read_boundaries() {
        // One large write of 3-byte characters, offset by one ASCII byte, so reads
        // split characters.
        let script = "printf x; s='\u{20ac}'; for i in 1 2 3 4 5 6 7 8 9 10 11 12; do s=\"$s$s\"; done; printf '%s' \"$s\"";
        let out = run(sh(script, COMMAND_ERROR_MARKER)).await;
        assert!(!out.combined.contains('\u{fffd}'));
        assert_eq!(out.combined, format!("x{}", "\u{20ac}".repeat(4096)));
        assert_eq!(out.exit_code, Some(0));
    }

    #[test]
    fn utf8_carry_holds_split_characters() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[b'a', 0xE2, 0x82]), "a");
        assert_eq!(carry.push(&[0xAC, b'b']), "\u{20ac}b");
        assert_eq!(carry.push(&[0xFF, b'c']), "\u{fffd}c");
        assert!(carry.finish().is_none());
        assert_eq!(carry.push(&[0xE2]), "");
        assert_eq!(carry.finish().as_deref(), Some("\u{fffd}"));
    }

    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("pipe broke")))
        }
    }

    #[tokio::test]
    async fn read_error_is_reported_on_error_stream() {
        let mut pipe = Pipe::new(Some(BrokenPipe), Stream::Stdout);
        match pipe.next().await {
            Some(ProcessEvent::Stderr(text)) => {
                assert!(text.contains("failed to read stdout: pipe broke"), "{text}")
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!pipe.is_open());
        assert!(pipe.next().await.is_none());
    }

    #[test]
    fn marker_does_not_repeat_on_continuation_chunks() {
        let mut m = LineMarker::new(COMMAND_ERROR_MARKER);
        assert_eq!(m.mark("Trace"), "Error: Trace");
        assert_eq!(m.mark("back\nnext\n"), "back\nError: next\n");
        assert_eq!(m.mark("\n"), "\n");
    }
}
