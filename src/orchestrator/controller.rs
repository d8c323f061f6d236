//! Backend work controller.
//!
//! Receives commands from presentation layers, runs every backend invocation as its
//! own task and emits events back. Nothing here touches session state.

use super::extraction::{ExtractionClient, ExtractionRequest};
use crate::engine::api::Transport;
use crate::engine::health::check_health;
use crate::engine::{process, LocalBackend};
use crate::error::ExtractError;
use crate::model::{ControlId, ExtractionResult, Mode, ShellEvent};
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    RunCommand { args: Vec<String> },
    Extract(ExtractionRequest),
    LocalOutline { pdf: PathBuf, mode: Mode },
    CheckHealth,
    Quit,
}

impl UiCommand {
    fn name(&self) -> &'static str {
        match self {
            UiCommand::RunCommand { .. } => "run-command",
            UiCommand::Extract(_) => "extract",
            UiCommand::LocalOutline { .. } => "local-outline",
            UiCommand::CheckHealth => "check-health",
            UiCommand::Quit => "quit",
        }
    }
}

/// Releases a control when dropped. A request that never reached `complete`
/// (panic, abort) is reported as `Aborted` so the control is never left busy.
struct InFlight {
    control: ControlId,
    mode: Mode,
    document: Option<PathBuf>,
    event_tx: UnboundedSender<ShellEvent>,
    done: bool,
}

impl InFlight {
    fn new(
        control: ControlId,
        mode: Mode,
        document: Option<PathBuf>,
        event_tx: UnboundedSender<ShellEvent>,
    ) -> Self {
        Self {
            control,
            mode,
            document,
            event_tx,
            done: false,
        }
    }

    fn complete(mut self, result: Option<ExtractionResult>) {
        self.done = true;
        self.release(result);
    }

    fn release(&self, result: Option<ExtractionResult>) {
        let _ = self.event_tx.send(ShellEvent::ControlReleased {
            control: self.control,
            mode: self.mode,
            document: self.document.clone(),
            result,
        });
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            warn!(control = self.control.as_str(), mode = %self.mode, "request ended without a result");
            self.release(Some(Err(ExtractError::Aborted)));
        }
    }
}

/// Start the task that services one command.
fn dispatch<T: Transport>(
    cmd: UiCommand,
    client: &Arc<ExtractionClient<T>>,
    backend: &LocalBackend,
    event_tx: &UnboundedSender<ShellEvent>,
) -> Option<JoinHandle<()>> {
    let tx = event_tx.clone();
    let handle = match cmd {
        UiCommand::RunCommand { args } => {
            let spec = backend.console_command(args);
            tokio::spawn(async move {
                let output = process::run(spec).await;
                debug!(exit_code = ?output.exit_code, "console command finished");
                let _ = tx.send(ShellEvent::CommandOutput { output });
            })
        }
        UiCommand::Extract(request) => {
            let client = Arc::clone(client);
            let document = request.document.as_ref().map(|d| d.path.clone());
            let guard = InFlight::new(request.control, request.mode, document, tx);
            tokio::spawn(async move {
                let result = client.extract(&request).await;
                guard.complete(Some(result));
            })
        }
        UiCommand::LocalOutline { pdf, mode } => {
            let spec = backend.local_outline(&pdf);
            let guard =
                InFlight::new(ControlId::LocalOutline, mode, Some(pdf.clone()), tx.clone());
            tokio::spawn(async move {
                let output = process::run_streaming(spec, |chunk| {
                    let _ = tx.send(ShellEvent::OutlineLog(chunk));
                })
                .await;
                info!(pdf = %pdf.display(), exit_code = ?output.exit_code, "local outline finished");
                guard.complete(None);
            })
        }
        UiCommand::CheckHealth => {
            let client = Arc::clone(client);
            tokio::spawn(async move {
                let res = check_health(client.transport()).await;
                let _ = tx.send(ShellEvent::HealthChecked(res));
            })
        }
        UiCommand::Quit => return None,
    };
    Some(handle)
}

/// Service UI commands until Quit (or the command channel closes).
pub(crate) async fn run_controller<T: Transport>(
    client: Arc<ExtractionClient<T>>,
    backend: LocalBackend,
    event_tx: UnboundedSender<ShellEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut tasks: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                debug!(command = cmd.name(), "ui command");
                match dispatch(cmd, &client, &backend, &event_tx) {
                    Some(handle) => tasks.push(handle),
                    None => break,
                }
            }
            Some(joined) = tasks.next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    // The in-flight guard has already released the control.
                    warn!("backend task failed: {e}");
                    let _ = event_tx.send(ShellEvent::Info(format!("Backend task failed: {e}")));
                }
            }
        }
    }

    if !tasks.is_empty() {
        info!(outstanding = tasks.len(), "dropping outstanding backend tasks");
    }
    for task in tasks.iter() {
        task.abort();
    }
    Ok(())
}
