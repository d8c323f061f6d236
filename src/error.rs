use std::path::PathBuf;
use thiserror::Error;

/// Broad classification used by renderers to pick a marker and wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Transport,
    Backend,
    UnknownMode,
    Internal,
}

/// Everything that can go wrong while servicing one extraction action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no document loaded; open a PDF first")]
    NoDocumentLoaded,

    #[error("no outline text captured yet; run an outline or semantic extraction first")]
    NoCapturedText,

    #[error("HTTP error {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Http { status: u16, detail: Option<String> },

    #[error("cannot connect to backend: {0}")]
    Connection(String),

    #[error("{0}")]
    Backend(String),

    #[error("backend returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("unknown mode `{mode}` for action `{control}`")]
    UnknownMode { mode: String, control: String },

    #[error("request ended without a result")]
    Aborted,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::NoDocumentLoaded | ExtractError::NoCapturedText => ErrorKind::Precondition,
            ExtractError::Http { .. } | ExtractError::Connection(_) => ErrorKind::Transport,
            ExtractError::Backend(_) | ExtractError::InvalidResponse(_) => ErrorKind::Backend,
            ExtractError::UnknownMode { .. } => ErrorKind::UnknownMode,
            ExtractError::Aborted => ErrorKind::Internal,
        }
    }
}

/// Transport-level failure: no HTTP response was obtained at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
}

impl From<TransportError> for ExtractError {
    fn from(e: TransportError) -> Self {
        ExtractError::Connection(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("server not responding (HTTP {status})")]
    ServerNotResponding { status: u16 },
    #[error("cannot connect to API server: {0}")]
    CannotConnect(String),
    #[error("health endpoint returned an unreadable response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("not a PDF file: {}", .path.display())]
    NotPdf { path: PathBuf },
    #[error("cannot read {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_includes_detail_when_present() {
        let e = ExtractError::Http {
            status: 503,
            detail: Some("Outline extractor not available".into()),
        };
        assert_eq!(
            e.to_string(),
            "HTTP error 503: Outline extractor not available"
        );
        let bare = ExtractError::Http {
            status: 500,
            detail: None,
        };
        assert_eq!(bare.to_string(), "HTTP error 500");
    }

    #[test]
    fn kinds_separate_transport_from_backend() {
        assert_eq!(
            ExtractError::Http {
                status: 404,
                detail: None
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(ExtractError::Backend("bad pdf".into()).kind(), ErrorKind::Backend);
        assert_eq!(ExtractError::NoDocumentLoaded.kind(), ErrorKind::Precondition);
        assert_eq!(
            ExtractError::from(TransportError::Timeout).kind(),
            ErrorKind::Transport
        );
    }
}
