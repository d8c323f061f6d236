//! Presentation-independent view model.
//!
//! `Session` holds everything a front end shows: active mode, open document, result
//! pane, local outline log, console transcript and per-control busy flags. It is
//! owned by a single thread and mutated only through its methods; backend work is
//! requested by returning a snapshot for the controller and finished by `apply`.

pub mod mode;
pub mod transcript;

use crate::engine::health;
use crate::error::{ErrorKind, ExtractError};
use crate::model::{document_name, ControlId, ExtractionResult, LoadedDocument, Mode, ShellEvent};
use crate::orchestrator::extraction::{route, ExtractionRequest, PayloadKind};
use crate::render;
use crate::tokenizer::tokenize;
use mode::ModeSelector;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use transcript::Transcript;

pub const PROCESSING_LABEL: &str = "Processing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneStatus {
    Idle,
    Processing,
    Success,
    Error(ErrorKind),
}

#[derive(Debug, Clone)]
pub struct ResultPane {
    pub status: PaneStatus,
    pub lines: Vec<String>,
}

impl Default for ResultPane {
    fn default() -> Self {
        Self {
            status: PaneStatus::Idle,
            lines: Vec::new(),
        }
    }
}

impl ResultPane {
    fn set(&mut self, status: PaneStatus, lines: Vec<String>) {
        self.status = status;
        self.lines = lines;
    }
}

/// Most recent successful extraction payload, kept for saving.
#[derive(Debug, Clone)]
pub struct SavedPayload {
    pub mode: Mode,
    pub document: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct Session {
    modes: ModeSelector,
    document: Option<LoadedDocument>,
    transcript: Transcript,
    results: ResultPane,
    outline_log: String,
    captured_text: Option<String>,
    busy: HashSet<ControlId>,
    last_payload: Option<SavedPayload>,
    notice: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modes(&self) -> &ModeSelector {
        &self.modes
    }

    pub fn active_mode(&self) -> Mode {
        self.modes.active()
    }

    pub fn select_mode(&mut self, mode: Mode) {
        self.modes.select(mode);
    }

    pub fn next_mode(&mut self) {
        self.modes.next();
    }

    pub fn previous_mode(&mut self) {
        self.modes.previous();
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn results(&self) -> &ResultPane {
        &self.results
    }

    pub fn outline_log(&self) -> &str {
        &self.outline_log
    }

    pub fn captured_text(&self) -> Option<&str> {
        self.captured_text.as_deref()
    }

    pub fn last_payload(&self) -> Option<&SavedPayload> {
        self.last_payload.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Replace the open document; derived panes are reset.
    pub fn load_document(&mut self, doc: LoadedDocument) {
        debug!(path = %doc.path.display(), bytes = doc.bytes.len(), "document loaded");
        self.reset_derived();
        self.document = Some(doc);
    }

    /// Close the document. The transcript survives; in-flight requests keep running.
    pub fn close_document(&mut self) {
        self.reset_derived();
        self.document = None;
    }

    fn reset_derived(&mut self) {
        self.results = ResultPane::default();
        self.outline_log.clear();
        self.captured_text = None;
        self.last_payload = None;
    }

    fn is_open(&self, path: &Path) -> bool {
        self.document.as_ref().is_some_and(|d| d.path == path)
    }

    pub fn is_busy(&self, control: ControlId) -> bool {
        self.busy.contains(&control)
    }

    pub fn control_label(&self, control: ControlId) -> &'static str {
        if self.is_busy(control) {
            PROCESSING_LABEL
        } else {
            self.modes.label(control)
        }
    }

    /// Echo and tokenize a console command. Blank input is ignored.
    pub fn submit_command(&mut self, raw: &str) -> Option<Vec<String>> {
        let command = raw.trim();
        if command.is_empty() {
            return None;
        }
        self.transcript.echo(command);
        Some(tokenize(command))
    }

    /// Start an extraction on `control` under the active mode.
    ///
    /// Returns `None` when the control is busy or hidden, or when a precondition
    /// fails; in the latter case the error is already rendered.
    pub fn begin_extraction(&mut self, control: ControlId) -> Option<ExtractionRequest> {
        if self.is_busy(control) || !self.modes.is_visible(control) {
            return None;
        }
        let mode = self.modes.active();
        if let Err(e) = self.check_preconditions(mode, control) {
            self.show_error(&e);
            return None;
        }

        self.busy.insert(control);
        self.last_payload = None;
        self.results.set(
            PaneStatus::Processing,
            vec![format!("Processing {mode} request...")],
        );
        Some(ExtractionRequest {
            control,
            mode,
            document: self.document.clone(),
            captured_text: self.captured_text.clone(),
        })
    }

    fn check_preconditions(&self, mode: Mode, control: ControlId) -> Result<(), ExtractError> {
        if self.document.is_none() {
            return Err(ExtractError::NoDocumentLoaded);
        }
        let route = route(mode, control)?;
        if route.payload == PayloadKind::CapturedText && self.captured_text.is_none() {
            return Err(ExtractError::NoCapturedText);
        }
        Ok(())
    }

    /// Start a streaming local outline run; returns the PDF path to hand to the
    /// local interpreter.
    pub fn begin_local_outline(&mut self) -> Option<PathBuf> {
        if self.is_busy(ControlId::LocalOutline) {
            return None;
        }
        let Some(doc) = &self.document else {
            self.show_error(&ExtractError::NoDocumentLoaded);
            return None;
        };
        let path = doc.path.clone();
        self.busy.insert(ControlId::LocalOutline);
        self.outline_log = format!("Running local outline extraction for {}...\n", doc.file_name());
        Some(path)
    }

    fn show_error(&mut self, err: &ExtractError) {
        self.results
            .set(PaneStatus::Error(err.kind()), render::render_error(err));
    }

    pub fn apply(&mut self, ev: ShellEvent) {
        match ev {
            ShellEvent::CommandOutput { output } => {
                self.transcript.append_result(&output.combined);
            }
            ShellEvent::OutlineLog(chunk) => self.outline_log.push_str(&chunk),
            ShellEvent::ControlReleased {
                control,
                mode,
                document,
                result,
            } => self.release(control, mode, document, result),
            ShellEvent::HealthChecked(res) => {
                let lines = match res {
                    Ok(report) => report.lines(),
                    Err(e) => health::error_lines(&e),
                };
                self.transcript.append_lines(lines);
            }
            ShellEvent::Info(msg) => self.notice = Some(msg),
        }
    }

    /// Finish a request. A result for a document that is no longer open still
    /// renders, but is labelled and never feeds the captured text.
    fn release(
        &mut self,
        control: ControlId,
        mode: Mode,
        document: Option<PathBuf>,
        result: Option<ExtractionResult>,
    ) {
        self.busy.remove(&control);
        let Some(result) = result else {
            return;
        };
        let current = document.as_deref().is_some_and(|p| self.is_open(p));

        if control == ControlId::LocalOutline {
            if let (Err(e), true) = (result, current) {
                self.outline_log
                    .push_str(&format!("\n{} {e}\n", render::ERROR_MARKER));
            }
            return;
        }

        let payload = match result.and_then(|p| route(mode, control).map(|r| (r, p))) {
            Ok(ok) => ok,
            Err(e) => {
                self.show_error(&e);
                return;
            }
        };
        let (route, payload) = payload;
        // A successful payload always comes from a request made with a document.
        let Some(path) = document else {
            return;
        };
        let name = document_name(&path);

        let mut lines = render::render_success(route.render, mode, &payload);
        if !current {
            debug!(document = %name, %mode, "result arrived for a document that is no longer open");
            lines.insert(
                0,
                format!("{} result for {name}, which is no longer open", render::WARN_MARKER),
            );
        }
        self.results.set(PaneStatus::Success, lines);
        if route.captures_text && current {
            if let Some(text) = render::capture_text(&payload) {
                self.captured_text = Some(text);
            }
        }
        self.last_payload = Some(SavedPayload {
            mode,
            document: name,
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::api::fake::FakeTransport;
    use crate::engine::process::ProcessOutput;
    use crate::error::HealthError;
    use crate::model::PersonaSpec;
    use crate::orchestrator::extraction::ExtractionClient;
    use bytes::Bytes;
    use serde_json::json;

    fn doc(name: &str) -> LoadedDocument {
        LoadedDocument {
            path: PathBuf::from(format!("/docs/{name}")),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    fn released(req: &ExtractionRequest, result: ExtractionResult) -> ShellEvent {
        ShellEvent::ControlReleased {
            control: req.control,
            mode: req.mode,
            document: req.document.as_ref().map(|d| d.path.clone()),
            result: Some(result),
        }
    }

    #[test]
    fn extraction_without_document_renders_error_and_stays_idle() {
        let mut s = Session::new();
        assert!(s.begin_extraction(ControlId::Extract).is_none());
        assert_eq!(
            s.results().status,
            PaneStatus::Error(ErrorKind::Precondition)
        );
        assert!(!s.is_busy(ControlId::Extract));
        assert_eq!(s.control_label(ControlId::Extract), "Extract Outline");
    }

    #[test]
    fn busy_control_ignores_second_trigger() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        assert!(s.begin_extraction(ControlId::Extract).is_some());
        assert_eq!(s.control_label(ControlId::Extract), PROCESSING_LABEL);
        assert_eq!(s.results().status, PaneStatus::Processing);
        assert!(s.begin_extraction(ControlId::Extract).is_none());
    }

    #[test]
    fn hidden_control_cannot_be_triggered() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        assert!(s.begin_extraction(ControlId::Entities).is_none());
        assert!(!s.is_busy(ControlId::Entities));
    }

    #[test]
    fn multilingual_requires_captured_text() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        s.select_mode(Mode::Multilingual);
        assert!(s.begin_extraction(ControlId::Extract).is_none());
        assert_eq!(
            s.results().lines,
            vec!["[ERROR] no outline text captured yet; run an outline or semantic extraction first"]
        );
    }

    #[test]
    fn outline_success_captures_text_for_multilingual() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        let req = s.begin_extraction(ControlId::Extract).unwrap();
        s.apply(released(
            &req,
            Ok(json!({"title": "Bericht", "outline": [{"level": "H1", "text": "Einleitung", "page": 1}]})),
        ));
        assert_eq!(s.captured_text(), Some("Bericht\nEinleitung"));

        s.select_mode(Mode::Multilingual);
        let req = s.begin_extraction(ControlId::Entities).unwrap();
        assert_eq!(req.captured_text.as_deref(), Some("Bericht\nEinleitung"));
        // The primary control is independent of the secondary one.
        assert!(s.begin_extraction(ControlId::Extract).is_some());
    }

    #[test]
    fn backend_error_is_rendered_and_control_released() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        s.select_mode(Mode::Persona);
        let req = s.begin_extraction(ControlId::Extract).unwrap();
        s.apply(released(&req, Err(ExtractError::Backend("bad pdf".into()))));
        assert_eq!(s.results().status, PaneStatus::Error(ErrorKind::Backend));
        assert_eq!(s.results().lines, vec!["[WARN] Backend error: bad pdf"]);
        assert_eq!(s.control_label(ControlId::Extract), "Extract Persona Insights");
        assert!(s.last_payload().is_none());
    }

    #[test]
    fn mode_switch_does_not_reset_in_flight_request() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        let req = s.begin_extraction(ControlId::Extract).unwrap();
        s.select_mode(Mode::Semantic);
        assert!(s.is_busy(ControlId::Extract));
        s.apply(released(&req, Ok(json!({"outline": []}))));
        assert!(!s.is_busy(ControlId::Extract));
        assert_eq!(s.results().lines[0], "[OK] Outline extraction complete");
        assert_eq!(s.control_label(ControlId::Extract), "Extract Semantic Outline");
    }

    #[test]
    fn result_for_replaced_document_keeps_its_own_name() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        let req = s.begin_extraction(ControlId::Extract).unwrap();
        s.load_document(doc("b.pdf"));
        s.apply(released(
            &req,
            Ok(json!({"title": "Doc A", "outline": [{"level": "H1", "text": "A heading", "page": 1}]})),
        ));

        assert!(!s.is_busy(ControlId::Extract));
        assert_eq!(s.document().unwrap().file_name(), "b.pdf");
        assert!(s.captured_text().is_none());
        assert_eq!(
            s.results().lines[0],
            "[WARN] result for a.pdf, which is no longer open"
        );
        assert_eq!(s.last_payload().unwrap().document, "a.pdf");

        // b.pdf still has no outline text of its own.
        s.select_mode(Mode::Multilingual);
        assert!(s.begin_extraction(ControlId::Extract).is_none());
    }

    #[test]
    fn result_after_close_is_saved_under_request_document() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        let req = s.begin_extraction(ControlId::Extract).unwrap();
        s.close_document();
        s.apply(released(&req, Ok(json!({"title": "Doc A", "outline": []}))));

        assert!(s.captured_text().is_none());
        let saved = s.last_payload().unwrap();
        assert_eq!(saved.document, "a.pdf");
        assert_eq!(saved.mode, Mode::Outline);
    }

    #[test]
    fn close_document_keeps_transcript() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        s.submit_command("status");
        s.apply(ShellEvent::CommandOutput {
            output: ProcessOutput {
                combined: "all good".into(),
                exit_code: Some(0),
            },
        });
        let path = s.begin_local_outline().unwrap();
        assert_eq!(path, PathBuf::from("/docs/a.pdf"));
        s.apply(ShellEvent::OutlineLog("Title: A\n".into()));
        s.close_document();

        assert!(s.document().is_none());
        assert!(s.outline_log().is_empty());
        assert_eq!(s.results().status, PaneStatus::Idle);
        assert_eq!(s.transcript().lines(), [">>> status", "all good"]);
    }

    #[test]
    fn submit_command_echoes_and_tokenizes() {
        let mut s = Session::new();
        assert!(s.submit_command("   ").is_none());
        assert!(s.transcript().is_empty());
        let args = s.submit_command(" list-pdfs \"my docs\" ").unwrap();
        assert_eq!(args, vec!["list-pdfs", "my docs"]);
        assert_eq!(s.transcript().lines(), [">>> list-pdfs \"my docs\""]);
    }

    #[test]
    fn clear_sentinel_empties_transcript() {
        let mut s = Session::new();
        s.submit_command("clear");
        s.apply(ShellEvent::CommandOutput {
            output: ProcessOutput {
                combined: "__CLEAR_TERMINAL__".into(),
                exit_code: Some(0),
            },
        });
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn local_outline_abort_is_logged() {
        let mut s = Session::new();
        s.load_document(doc("a.pdf"));
        s.begin_local_outline().unwrap();
        assert_eq!(s.control_label(ControlId::LocalOutline), PROCESSING_LABEL);
        s.apply(ShellEvent::ControlReleased {
            control: ControlId::LocalOutline,
            mode: Mode::Outline,
            document: Some(PathBuf::from("/docs/a.pdf")),
            result: Some(Err(ExtractError::Aborted)),
        });
        assert!(!s.is_busy(ControlId::LocalOutline));
        assert!(s.outline_log().contains("[ERROR] request ended without a result"));
    }

    #[test]
    fn health_results_go_to_transcript() {
        let mut s = Session::new();
        s.apply(ShellEvent::HealthChecked(Err(HealthError::CannotConnect(
            "connection refused".into(),
        ))));
        assert_eq!(
            s.transcript().lines()[0],
            "[ERROR] cannot connect to API server: connection refused"
        );
    }

    #[tokio::test]
    async fn semantic_extraction_end_to_end() {
        let mut s = Session::new();
        s.load_document(doc("report.pdf"));
        s.select_mode(Mode::Semantic);

        let req = s.begin_extraction(ControlId::Extract).unwrap();
        assert_eq!(s.control_label(ControlId::Extract), PROCESSING_LABEL);
        assert_eq!(s.results().lines, vec!["Processing semantic request..."]);

        let client = ExtractionClient::new(
            FakeTransport::replying(200, json!({"sections": [{"title": "Intro", "page": 1}]})),
            PersonaSpec::default(),
        );
        let result = client.extract(&req).await;
        s.apply(released(&req, result));

        assert_eq!(client.transport().calls(), 1);
        assert_eq!(s.results().status, PaneStatus::Success);
        assert!(s.results().lines[0].starts_with("[OK]"));
        assert!(s.results().lines.iter().any(|l| l.contains("Intro")));
        assert!(!s.is_busy(ControlId::Extract));
        assert_eq!(s.control_label(ControlId::Extract), "Extract Semantic Outline");
        let saved = s.last_payload().unwrap();
        assert_eq!(saved.mode, Mode::Semantic);
        assert_eq!(saved.document, "report.pdf");
    }
}
