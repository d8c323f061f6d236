use crate::config::FileConfig;
use crate::engine::api::HttpTransport;
use crate::engine::LocalBackend;
use crate::model::{ControlId, LoadedDocument, Mode, PersonaSpec, ShellConfig, ShellEvent};
use crate::orchestrator::extraction::ExtractionClient;
use crate::orchestrator::{run_controller, UiCommand};
use crate::session::{PaneStatus, Session};
use crate::storage::{self, SavedResult};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pdf-agent",
    version,
    about = "Terminal shell for a PDF analysis backend, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the backend HTTP API [default: http://127.0.0.1:5000]
    #[arg(long)]
    pub base_url: Option<String>,

    /// Interpreter used to launch backend scripts [default: python3]
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Working directory for backend scripts [default: .]
    #[arg(long)]
    pub backend_dir: Option<PathBuf>,

    /// Console command handler script [default: cli_handler.py]
    #[arg(long)]
    pub command_script: Option<String>,

    /// Local outline extraction script [default: outline_wrapper.py]
    #[arg(long)]
    pub outline_script: Option<String>,

    /// HTTP request timeout [default: 120s]
    #[arg(long)]
    pub request_timeout: Option<humantime::Duration>,

    /// Kill backend processes that run longer than this (no limit by default)
    #[arg(long)]
    pub process_timeout: Option<humantime::Duration>,

    /// Persona sent with persona extractions [default: PDF Analyst]
    #[arg(long)]
    pub persona: Option<String>,

    /// Job to be done sent with persona extractions [default: Extract key insights]
    #[arg(long)]
    pub job: Option<String>,

    /// Directory for saved results
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Config file (TOML). Defaults to <config dir>/pdf-agent/config.toml if present
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (RUST_LOG overrides) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// PDF to open at launch
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Initial analysis mode: outline, persona, semantic or multilingual
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Run one console command and exit (no TUI)
    #[arg(long, value_name = "COMMAND")]
    pub run: Option<String>,

    /// Check backend health and exit (no TUI)
    #[arg(long)]
    pub health: bool,

    /// Run the primary extraction of --mode on --pdf and exit (no TUI)
    #[arg(long)]
    pub extract: bool,

    /// Run multilingual entity extraction on --pdf and exit (no TUI)
    #[arg(long)]
    pub entities: bool,

    /// Run the local streaming outline extraction on --pdf and exit (no TUI)
    #[arg(long)]
    pub local_outline: bool,

    /// Print raw JSON payloads instead of rendered text
    #[arg(long)]
    pub json: bool,

    /// Save the extraction result to the output directory
    #[arg(long)]
    pub save: bool,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.run.is_some() || self.health || self.extract || self.entities || self.local_outline
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if (args.json || args.save) && !args.is_headless() {
        return Err(anyhow::anyhow!(
            "--json and --save need a headless action (--run, --health, --extract, --entities or --local-outline)"
        ));
    }
    let file = FileConfig::load(args.config.as_deref())?;
    let level = args
        .log_level
        .clone()
        .or_else(|| file.log_level.clone())
        .unwrap_or_else(|| "info".into());
    let cfg = build_config(&args, &file);

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            crate::logging::init_logging(&level, true)?;
            return crate::tui::run(args, cfg).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            return Err(anyhow::anyhow!(
                "built without TUI support; use --run, --health, --extract, --entities or --local-outline"
            ));
        }
    }

    crate::logging::init_logging(&level, false)?;
    run_headless(args, cfg).await
}

/// Generate a random identifier for a saved result.
pub fn gen_request_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

/// Build a `ShellConfig`: CLI flags over config file over defaults.
pub fn build_config(args: &Cli, file: &FileConfig) -> ShellConfig {
    let d = ShellConfig::default();
    let persona_default = PersonaSpec::default();
    ShellConfig {
        base_url: args
            .base_url
            .clone()
            .or_else(|| file.base_url.clone())
            .unwrap_or(d.base_url),
        interpreter: args
            .interpreter
            .clone()
            .or_else(|| file.interpreter.clone())
            .unwrap_or(d.interpreter),
        backend_dir: args
            .backend_dir
            .clone()
            .or_else(|| file.backend_dir.clone())
            .unwrap_or(d.backend_dir),
        command_script: args
            .command_script
            .clone()
            .or_else(|| file.command_script.clone())
            .unwrap_or(d.command_script),
        outline_script: args
            .outline_script
            .clone()
            .or_else(|| file.outline_script.clone())
            .unwrap_or(d.outline_script),
        request_timeout: args
            .request_timeout
            .map(Duration::from)
            .or(file.request_timeout)
            .or(d.request_timeout),
        process_timeout: args
            .process_timeout
            .map(Duration::from)
            .or(file.process_timeout)
            .or(d.process_timeout),
        persona: PersonaSpec {
            persona: args
                .persona
                .clone()
                .or_else(|| file.persona.clone())
                .unwrap_or(persona_default.persona),
            job_to_be_done: args
                .job
                .clone()
                .or_else(|| file.job_to_be_done.clone())
                .unwrap_or(persona_default.job_to_be_done),
        },
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or(d.output_dir),
        user_agent: d.user_agent,
    }
}

/// Drives the controller from the command line: one action at a time, printing
/// what the session renders.
struct Headless {
    session: Session,
    cmd_tx: mpsc::UnboundedSender<UiCommand>,
    event_rx: mpsc::UnboundedReceiver<ShellEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    json: bool,
    partial_line: String,
    failed: bool,
}

impl Headless {
    fn out(&self, line: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stdout(line.into()));
    }

    fn err(&self, line: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stderr(line.into()));
    }

    fn send(&self, cmd: UiCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("controller stopped"))
    }

    /// Apply events until `done` matches one; return that event.
    async fn pump_until(&mut self, done: impl Fn(&ShellEvent) -> bool) -> Result<ShellEvent> {
        while let Some(ev) = self.event_rx.recv().await {
            if let ShellEvent::OutlineLog(chunk) = &ev {
                self.stream_chunk(chunk);
            }
            let finished = done(&ev).then(|| ev.clone());
            self.session.apply(ev);
            if let Some(ev) = finished {
                return Ok(ev);
            }
        }
        Err(anyhow::anyhow!("controller stopped unexpectedly"))
    }

    fn stream_chunk(&mut self, chunk: &str) {
        self.partial_line.push_str(chunk);
        while let Some(i) = self.partial_line.find('\n') {
            let line: String = self.partial_line.drain(..=i).collect();
            self.out(line.trim_end_matches('\n'));
        }
    }

    fn flush_stream(&mut self) {
        if !self.partial_line.is_empty() {
            let rest = std::mem::take(&mut self.partial_line);
            self.out(rest);
        }
    }

    fn print_transcript_from(&self, from: usize) {
        for line in self.session.transcript().lines().iter().skip(from) {
            self.out(line.clone());
        }
    }

    fn print_results(&mut self) {
        let pane = self.session.results();
        if let PaneStatus::Error(_) = pane.status {
            self.failed = true;
            for line in &pane.lines {
                self.err(line.clone());
            }
            return;
        }
        match (self.json, self.session.last_payload()) {
            (true, Some(saved)) => {
                let pretty = serde_json::to_string_pretty(&saved.payload)
                    .unwrap_or_else(|_| saved.payload.to_string());
                self.out(pretty);
            }
            _ => {
                for line in &pane.lines {
                    self.out(line.clone());
                }
            }
        }
    }

    async fn health(&mut self) -> Result<()> {
        let from = self.session.transcript().lines().len();
        self.send(UiCommand::CheckHealth)?;
        let ev = self
            .pump_until(|ev| matches!(ev, ShellEvent::HealthChecked(_)))
            .await?;
        match ev {
            ShellEvent::HealthChecked(Ok(report)) if self.json => {
                self.out(serde_json::to_string_pretty(&report)?);
            }
            ShellEvent::HealthChecked(Err(_)) => {
                self.failed = true;
                for line in self.session.transcript().lines().iter().skip(from) {
                    self.err(line.clone());
                }
            }
            _ => self.print_transcript_from(from),
        }
        Ok(())
    }

    async fn command(&mut self, raw: &str) -> Result<()> {
        let Some(args) = self.session.submit_command(raw) else {
            return Ok(());
        };
        let from = self.session.transcript().lines().len();
        self.send(UiCommand::RunCommand { args })?;
        let ev = self
            .pump_until(|ev| matches!(ev, ShellEvent::CommandOutput { .. }))
            .await?;
        if let ShellEvent::CommandOutput { output } = ev {
            if !output.success() {
                self.failed = true;
            }
        }
        self.print_transcript_from(from);
        Ok(())
    }

    async fn local_outline(&mut self) -> Result<()> {
        let Some(pdf) = self.session.begin_local_outline() else {
            self.print_results();
            return Ok(());
        };
        let mode = self.session.active_mode();
        self.send(UiCommand::LocalOutline { pdf, mode })?;
        self.pump_until(|ev| {
            matches!(
                ev,
                ShellEvent::ControlReleased {
                    control: ControlId::LocalOutline,
                    ..
                }
            )
        })
        .await?;
        self.flush_stream();
        Ok(())
    }

    async fn extract_once(&mut self, control: ControlId) -> Result<bool> {
        let Some(request) = self.session.begin_extraction(control) else {
            return Ok(false);
        };
        self.send(UiCommand::Extract(request))?;
        self.pump_until(|ev| {
            matches!(ev, ShellEvent::ControlReleased { control: c, .. } if *c == control)
        })
        .await?;
        Ok(true)
    }

    async fn extract(&mut self, control: ControlId) -> Result<()> {
        let mode = self.session.active_mode();
        let needs_text = mode == Mode::Multilingual
            && self.session.captured_text().is_none()
            && self.session.document().is_some();
        if needs_text {
            self.err("Capturing outline text for multilingual analysis...");
            self.session.select_mode(Mode::Outline);
            self.extract_once(ControlId::Extract).await?;
            self.session.select_mode(mode);
            if self.session.captured_text().is_none() {
                // Report why the outline step produced nothing usable.
                if let PaneStatus::Error(_) = self.session.results().status {
                    self.print_results();
                    return Ok(());
                }
            }
        }
        self.extract_once(control).await?;
        self.print_results();
        Ok(())
    }

    fn save(&mut self, output_dir: &std::path::Path) -> Result<()> {
        let Some(saved) = self.session.last_payload() else {
            self.failed = true;
            self.err("Nothing to save: no successful extraction");
            return Ok(());
        };
        let result = SavedResult::new(saved, gen_request_id());
        let path = storage::save_result(output_dir, &result).context("failed to save result")?;
        info!(path = %path.display(), "result saved");
        self.err(format!("Saved: {}", path.display()));
        Ok(())
    }
}

async fn run_headless(args: Cli, cfg: ShellConfig) -> Result<()> {
    let transport = HttpTransport::new(&cfg)?;
    let client = Arc::new(ExtractionClient::new(transport, cfg.persona.clone()));
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ShellEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(run_controller(
        client,
        LocalBackend::new(&cfg),
        event_tx,
        cmd_rx,
    ));

    let (out_tx, out_handle) = spawn_output_writer();
    let mut h = Headless {
        session: Session::new(),
        cmd_tx,
        event_rx,
        out_tx,
        json: args.json,
        partial_line: String::new(),
        failed: false,
    };

    if let Some(pdf) = args.pdf.as_deref() {
        let doc = LoadedDocument::open(pdf).context("failed to open --pdf")?;
        h.session.load_document(doc);
    }
    if let Some(mode) = args.mode {
        h.session.select_mode(mode);
    }

    let res = async {
        if args.health {
            h.health().await?;
        }
        if let Some(raw) = args.run.as_deref() {
            h.command(raw).await?;
        }
        if args.local_outline {
            h.local_outline().await?;
        }
        if args.extract {
            h.extract(ControlId::Extract).await?;
        }
        if args.entities {
            h.session.select_mode(Mode::Multilingual);
            h.extract(ControlId::Entities).await?;
        }
        if args.save {
            h.save(&cfg.output_dir)?;
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    let _ = h.cmd_tx.send(UiCommand::Quit);
    let failed = h.failed;
    drop(h);
    controller.await.context("controller task failed")??;
    let _ = out_handle.await;

    res?;
    if failed {
        return Err(anyhow::anyhow!("one or more actions failed"));
    }
    Ok(())
}
