use crate::engine::health::HealthReport;
use crate::engine::process::ProcessOutput;
use crate::error::{DocumentError, ExtractError, HealthError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Resolved runtime configuration (CLI over config file over defaults).
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub base_url: String,
    pub interpreter: String,
    pub backend_dir: PathBuf,
    pub command_script: String,
    pub outline_script: String,
    pub request_timeout: Option<Duration>,
    pub process_timeout: Option<Duration>,
    pub persona: PersonaSpec,
    pub output_dir: PathBuf,
    pub user_agent: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            interpreter: "python3".into(),
            backend_dir: PathBuf::from("."),
            command_script: "cli_handler.py".into(),
            outline_script: "outline_wrapper.py".into(),
            request_timeout: Some(Duration::from_secs(120)),
            process_timeout: None,
            persona: PersonaSpec::default(),
            output_dir: default_output_dir(),
            user_agent: format!("pdf-agent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pdf-agent").join("results"))
        .unwrap_or_else(|| PathBuf::from("results"))
}

/// Persona/job description sent with persona extractions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub persona: String,
    pub job_to_be_done: String,
}

impl Default for PersonaSpec {
    fn default() -> Self {
        Self {
            persona: "PDF Analyst".into(),
            job_to_be_done: "Extract key insights".into(),
        }
    }
}

/// Analysis mode; decides which backend operation an extract action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Outline,
    Persona,
    Semantic,
    Multilingual,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Outline, Mode::Persona, Mode::Semantic, Mode::Multilingual];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Outline => "outline",
            Mode::Persona => "persona",
            Mode::Semantic => "semantic",
            Mode::Multilingual => "multilingual",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Mode::Outline => "Outline",
            Mode::Persona => "Persona",
            Mode::Semantic => "Semantic",
            Mode::Multilingual => "Multilingual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ExtractError::UnknownMode {
                mode: s.to_string(),
                control: ControlId::Extract.as_str().to_string(),
            })
    }
}

/// UI controls that trigger a backend call. Each has at most one request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    /// Primary extract action of the active mode.
    Extract,
    /// Secondary action; only multilingual mode exposes it.
    Entities,
    /// Streaming outline extraction through the local interpreter.
    LocalOutline,
}

impl ControlId {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlId::Extract => "extract",
            ControlId::Entities => "entities",
            ControlId::LocalOutline => "local-outline",
        }
    }
}

/// The open PDF: a path for local tooling and the bytes for uploads.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub bytes: Bytes,
}

impl LoadedDocument {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return Err(DocumentError::NotPdf {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|source| DocumentError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes: Bytes::from(bytes),
        })
    }

    pub fn file_name(&self) -> String {
        document_name(&self.path)
    }

    /// Displayable resource reference for the document.
    pub fn file_url(&self) -> String {
        let abs = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        format!("file://{}", abs.display())
    }
}

/// Display name of a document path.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".into())
}

/// Outcome of one extraction: a structured payload or an error, never both.
pub type ExtractionResult = Result<serde_json::Value, ExtractError>;

/// Events flowing from the controller back to the presentation layer.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    /// A console command finished.
    CommandOutput { output: ProcessOutput },
    /// One chunk of local outline extraction output.
    OutlineLog(String),
    /// A control's request is over. `document` is the path the request was made
    /// for; `result` is `None` for controls whose output was already streamed.
    ControlReleased {
        control: ControlId,
        mode: Mode,
        document: Option<PathBuf>,
        result: Option<ExtractionResult>,
    },
    HealthChecked(Result<HealthReport, HealthError>),
    Info(String),
}
