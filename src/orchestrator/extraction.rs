//! Extraction requests: mode routing, payload building, response interpretation.

use crate::engine::api::{ApiBody, ApiRequest, ApiResponse, Endpoint, FormField, FormValue, Transport};
use crate::error::ExtractError;
use crate::model::{ControlId, ExtractionResult, LoadedDocument, Mode, PersonaSpec};
use crate::render::RenderKind;
use serde_json::json;
use tracing::{info, warn};

/// What a request body is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Multipart with the PDF as `pdf`.
    PdfUpload,
    /// PDF plus the `persona` JSON string.
    PdfWithPersona,
    /// JSON `{text}` built from previously captured outline text.
    CapturedText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub endpoint: Endpoint,
    pub payload: PayloadKind,
    pub render: RenderKind,
    /// Whether a successful payload feeds the captured text.
    pub captures_text: bool,
}

const ROUTES: &[(Mode, ControlId, Route)] = &[
    (
        Mode::Outline,
        ControlId::Extract,
        Route {
            endpoint: Endpoint::Outline,
            payload: PayloadKind::PdfUpload,
            render: RenderKind::RawJson,
            captures_text: true,
        },
    ),
    (
        Mode::Persona,
        ControlId::Extract,
        Route {
            endpoint: Endpoint::Persona,
            payload: PayloadKind::PdfWithPersona,
            render: RenderKind::RawJson,
            captures_text: false,
        },
    ),
    (
        Mode::Semantic,
        ControlId::Extract,
        Route {
            endpoint: Endpoint::SemanticOutline,
            payload: PayloadKind::PdfUpload,
            render: RenderKind::RawJson,
            captures_text: true,
        },
    ),
    (
        Mode::Multilingual,
        ControlId::Extract,
        Route {
            endpoint: Endpoint::SpacyAnalyze,
            payload: PayloadKind::CapturedText,
            render: RenderKind::TextAnalysis,
            captures_text: false,
        },
    ),
    (
        Mode::Multilingual,
        ControlId::Entities,
        Route {
            endpoint: Endpoint::SpacyEntities,
            payload: PayloadKind::CapturedText,
            render: RenderKind::EntityGroups,
            captures_text: false,
        },
    ),
];

/// Look up the backend operation for a control under a mode.
pub fn route(mode: Mode, control: ControlId) -> Result<Route, ExtractError> {
    ROUTES
        .iter()
        .find(|(m, c, _)| *m == mode && *c == control)
        .map(|(_, _, r)| *r)
        .ok_or_else(|| ExtractError::UnknownMode {
            mode: mode.to_string(),
            control: control.as_str().to_string(),
        })
}

/// One outstanding extraction, snapshotted from the session when it was triggered.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub control: ControlId,
    pub mode: Mode,
    pub document: Option<LoadedDocument>,
    pub captured_text: Option<String>,
}

pub struct ExtractionClient<T> {
    transport: T,
    persona: PersonaSpec,
}

impl<T: Transport> ExtractionClient<T> {
    pub fn new(transport: T, persona: PersonaSpec) -> Self {
        Self { transport, persona }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform exactly one backend call for the request, or fail before any call
    /// when a precondition does not hold.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        let document = request
            .document
            .as_ref()
            .ok_or(ExtractError::NoDocumentLoaded)?;
        let route = route(request.mode, request.control)?;
        let body = self.build_body(route.payload, document, request.captured_text.as_deref())?;

        info!(
            mode = %request.mode,
            control = request.control.as_str(),
            endpoint = route.endpoint.path(),
            document = %document.file_name(),
            "extraction started"
        );
        let response = self
            .transport
            .send(ApiRequest {
                endpoint: route.endpoint,
                body,
            })
            .await?;
        let result = interpret(response);
        match &result {
            Ok(_) => info!(mode = %request.mode, "extraction succeeded"),
            Err(e) => warn!(mode = %request.mode, "extraction failed: {e}"),
        }
        result
    }

    fn build_body(
        &self,
        payload: PayloadKind,
        document: &LoadedDocument,
        captured_text: Option<&str>,
    ) -> Result<ApiBody, ExtractError> {
        let pdf = || FormField {
            name: "pdf",
            value: FormValue::File {
                file_name: document.file_name(),
                bytes: document.bytes.clone(),
            },
        };
        Ok(match payload {
            PayloadKind::PdfUpload => ApiBody::Multipart(vec![pdf()]),
            PayloadKind::PdfWithPersona => ApiBody::Multipart(vec![
                pdf(),
                FormField {
                    name: "persona",
                    value: FormValue::Text(
                        json!({
                            "persona": self.persona.persona,
                            "job_to_be_done": self.persona.job_to_be_done,
                        })
                        .to_string(),
                    ),
                },
            ]),
            PayloadKind::CapturedText => {
                let text = captured_text
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(ExtractError::NoCapturedText)?;
                ApiBody::Json(json!({ "text": text }))
            }
        })
    }
}

/// Map a raw response to an outcome: non-2xx is a transport error, a 2xx body
/// with an `error` field is a backend error.
pub fn interpret(response: ApiResponse) -> ExtractionResult {
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(&response.body);
    if !response.is_success() {
        let detail = parsed
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
        return Err(ExtractError::Http {
            status: response.status,
            detail,
        });
    }
    let body = parsed.map_err(|e| ExtractError::InvalidResponse(e.to_string()))?;
    match body.get("error") {
        None | Some(serde_json::Value::Null) => Ok(body),
        Some(serde_json::Value::String(msg)) => Err(ExtractError::Backend(msg.clone())),
        Some(other) => Err(ExtractError::Backend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::api::fake::FakeTransport;
    use crate::error::TransportError;
    use bytes::Bytes;
    use std::path::PathBuf;

    fn doc() -> LoadedDocument {
        LoadedDocument {
            path: PathBuf::from("/docs/report.pdf"),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    fn request(mode: Mode, control: ControlId) -> ExtractionRequest {
        ExtractionRequest {
            control,
            mode,
            document: Some(doc()),
            captured_text: None,
        }
    }

    #[test]
    fn every_visible_control_has_a_route() {
        use crate::session::mode::ModeSelector;
        for mode in Mode::ALL {
            let mut s = ModeSelector::default();
            s.select(mode);
            for control in s.visible_controls() {
                assert!(route(mode, *control).is_ok(), "{mode} / {control:?}");
            }
        }
    }

    #[test]
    fn unmapped_pair_is_unknown_mode() {
        assert!(matches!(
            route(Mode::Outline, ControlId::Entities),
            Err(ExtractError::UnknownMode { .. })
        ));
        assert!(route(Mode::Semantic, ControlId::LocalOutline).is_err());
    }

    #[tokio::test]
    async fn no_document_fails_without_network() {
        let client = ExtractionClient::new(FakeTransport::default(), PersonaSpec::default());
        let mut req = request(Mode::Outline, ControlId::Extract);
        req.document = None;
        assert_eq!(client.extract(&req).await, Err(ExtractError::NoDocumentLoaded));
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn unknown_mode_fails_without_network() {
        let client = ExtractionClient::new(FakeTransport::default(), PersonaSpec::default());
        let r = client.extract(&request(Mode::Persona, ControlId::Entities)).await;
        assert!(matches!(r, Err(ExtractError::UnknownMode { .. })));
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn error_field_on_200_is_backend_error() {
        let client = ExtractionClient::new(
            FakeTransport::replying(200, json!({"error": "bad pdf"})),
            PersonaSpec::default(),
        );
        let r = client.extract(&request(Mode::Outline, ControlId::Extract)).await;
        assert_eq!(r, Err(ExtractError::Backend("bad pdf".into())));
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let client = ExtractionClient::new(
            FakeTransport::replying(503, json!({"error": "Semantic outline extractor not available"})),
            PersonaSpec::default(),
        );
        let r = client.extract(&request(Mode::Semantic, ControlId::Extract)).await;
        assert_eq!(
            r,
            Err(ExtractError::Http {
                status: 503,
                detail: Some("Semantic outline extractor not available".into())
            })
        );
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let client = ExtractionClient::new(
            FakeTransport::failing(TransportError::Connection("connection refused".into())),
            PersonaSpec::default(),
        );
        let r = client.extract(&request(Mode::Outline, ControlId::Extract)).await;
        assert!(matches!(r, Err(ExtractError::Connection(_))));
    }

    #[tokio::test]
    async fn persona_upload_carries_persona_json() {
        let client = ExtractionClient::new(
            FakeTransport::replying(200, json!({"sections": []})),
            PersonaSpec {
                persona: "Travel Planner".into(),
                job_to_be_done: "Plan a trip".into(),
            },
        );
        client
            .extract(&request(Mode::Persona, ControlId::Extract))
            .await
            .unwrap();
        let sent = client.transport().last_request().unwrap();
        assert_eq!(sent.endpoint, Endpoint::Persona);
        let ApiBody::Multipart(fields) = sent.body else {
            panic!("expected multipart");
        };
        assert_eq!(fields[0].name, "pdf");
        assert!(matches!(
            &fields[0].value,
            FormValue::File { file_name, .. } if file_name == "report.pdf"
        ));
        let FormValue::Text(persona) = &fields[1].value else {
            panic!("expected text field");
        };
        let v: serde_json::Value = serde_json::from_str(persona).unwrap();
        assert_eq!(v["persona"], "Travel Planner");
        assert_eq!(v["job_to_be_done"], "Plan a trip");
    }

    #[tokio::test]
    async fn multilingual_sends_captured_text() {
        let client = ExtractionClient::new(
            FakeTransport::replying(200, json!({"entities": []})),
            PersonaSpec::default(),
        );
        let mut req = request(Mode::Multilingual, ControlId::Entities);
        req.captured_text = Some("Overview\nFinances".into());
        client.extract(&req).await.unwrap();
        let sent = client.transport().last_request().unwrap();
        assert_eq!(sent.endpoint, Endpoint::SpacyEntities);
        assert_eq!(sent.body, ApiBody::Json(json!({"text": "Overview\nFinances"})));
    }

    #[tokio::test]
    async fn multilingual_without_text_fails_fast() {
        let client = ExtractionClient::new(FakeTransport::default(), PersonaSpec::default());
        let r = client.extract(&request(Mode::Multilingual, ControlId::Extract)).await;
        assert_eq!(r, Err(ExtractError::NoCapturedText));
        assert_eq!(client.transport().calls(), 0);
    }

    #[test]
    fn non_json_success_body_is_invalid_response() {
        let r = interpret(ApiResponse {
            status: 200,
            body: "<html>".into(),
        });
        assert!(matches!(r, Err(ExtractError::InvalidResponse(_))));
    }

    #[test]
    fn null_error_field_is_success() {
        let r = interpret(ApiResponse {
            status: 200,
            body: r#"{"error": null, "outline": []}"#.into(),
        });
        assert!(r.is_ok());
    }
}
