use super::export;
use super::input::Action;
use crate::model::{ControlId, LoadedDocument, ShellEvent};
use crate::orchestrator::UiCommand;
use crate::session::Session;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Input line feeds the console.
    Console,
    /// Input line holds a path to open.
    OpenPath,
}

pub struct UiState {
    pub session: Session,
    pub input: String,
    pub input_mode: InputMode,
    pub show_help: bool,
    pub info: String,
    // Lines scrolled up from the bottom of the transcript
    pub transcript_scroll: usize,
    pub output_dir: PathBuf,
    pub last_saved_path: Option<PathBuf>,
}

impl UiState {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            session: Session::new(),
            input: String::new(),
            input_mode: InputMode::Console,
            show_help: false,
            info: "F1 for help".into(),
            transcript_scroll: 0,
            output_dir,
            last_saved_path: None,
        }
    }

    pub fn apply_event(&mut self, ev: ShellEvent) {
        let transcript_event = matches!(
            ev,
            ShellEvent::CommandOutput { .. } | ShellEvent::HealthChecked(_)
        );
        self.session.apply(ev);
        if transcript_event {
            self.transcript_scroll = 0;
        }
        if let Some(notice) = self.session.take_notice() {
            self.info = notice;
        }
    }

    pub fn open_document(&mut self, path: &Path) {
        match LoadedDocument::open(path) {
            Ok(doc) => {
                self.info = format!("Opened {} ({} bytes)", doc.file_name(), doc.bytes.len());
                self.session.load_document(doc);
            }
            Err(e) => self.info = format!("Open failed: {e}"),
        }
    }

    fn extract(&mut self, control: ControlId, cmd_tx: &UnboundedSender<UiCommand>) {
        if self.session.is_busy(control) {
            self.info = "Request already in progress".into();
            return;
        }
        if let Some(request) = self.session.begin_extraction(control) {
            let _ = cmd_tx.send(UiCommand::Extract(request));
        }
    }

    fn submit(&mut self, cmd_tx: &UnboundedSender<UiCommand>) {
        let line = std::mem::take(&mut self.input);
        match self.input_mode {
            InputMode::Console => {
                if let Some(args) = self.session.submit_command(&line) {
                    self.transcript_scroll = 0;
                    let _ = cmd_tx.send(UiCommand::RunCommand { args });
                }
            }
            InputMode::OpenPath => {
                self.input_mode = InputMode::Console;
                let path = line.trim();
                if !path.is_empty() {
                    self.open_document(Path::new(path));
                }
            }
        }
    }

    /// Apply one user action. Returns `true` when the UI should exit.
    pub fn handle(&mut self, action: Action, cmd_tx: &UnboundedSender<UiCommand>) -> bool {
        match action {
            Action::Quit => {
                let _ = cmd_tx.send(UiCommand::Quit);
                return true;
            }
            Action::Type(c) => self.input.push(c),
            Action::Backspace => {
                self.input.pop();
            }
            Action::Submit => self.submit(cmd_tx),
            Action::Cancel => {
                if self.show_help {
                    self.show_help = false;
                } else {
                    self.input_mode = InputMode::Console;
                    self.input.clear();
                }
            }
            Action::NextMode => self.session.next_mode(),
            Action::PreviousMode => self.session.previous_mode(),
            Action::Primary => self.extract(ControlId::Extract, cmd_tx),
            Action::Secondary => {
                if self.session.modes().is_visible(ControlId::Entities) {
                    self.extract(ControlId::Entities, cmd_tx);
                } else {
                    self.info = "No secondary action in this mode".into();
                }
            }
            Action::LocalOutline => {
                if let Some(pdf) = self.session.begin_local_outline() {
                    let mode = self.session.active_mode();
                    let _ = cmd_tx.send(UiCommand::LocalOutline { pdf, mode });
                }
            }
            Action::Health => {
                self.info = "Checking backend health...".into();
                let _ = cmd_tx.send(UiCommand::CheckHealth);
            }
            Action::OpenPrompt => {
                self.input_mode = InputMode::OpenPath;
                self.input.clear();
            }
            Action::CloseDocument => {
                if self.session.document().is_some() {
                    self.session.close_document();
                    self.info = "Document closed".into();
                }
            }
            Action::Save => export::save_and_show_path(self),
            Action::Copy => export::copy_results(self),
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::ScrollUp => {
                let max = self.session.transcript().lines().len();
                self.transcript_scroll = (self.transcript_scroll + 5).min(max);
            }
            Action::ScrollDown => {
                self.transcript_scroll = self.transcript_scroll.saturating_sub(5);
            }
            Action::None => {}
        }
        false
    }
}
