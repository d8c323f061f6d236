use crate::error::TransportError;
use crate::model::ShellConfig;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::future::Future;
use tracing::debug;

/// Backend HTTP operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Health,
    Outline,
    Persona,
    SemanticOutline,
    SpacyAnalyze,
    SpacyEntities,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Health => "/api/health",
            Endpoint::Outline => "/api/outline",
            Endpoint::Persona => "/api/persona",
            Endpoint::SemanticOutline => "/api/semantic-outline",
            Endpoint::SpacyAnalyze => "/api/spacy/analyze",
            Endpoint::SpacyEntities => "/api/spacy/entities",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    File { file_name: String, bytes: Bytes },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: &'static str,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    /// Plain GET.
    Empty,
    Multipart(Vec<FormField>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub body: ApiBody,
}

/// A response was received; its status may still be an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Seam between request orchestration and the wire.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(cfg: &ShellConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(t) = cfg.request_timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build().context("build http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }
}

fn build_form(fields: Vec<FormField>) -> Result<reqwest::multipart::Form, reqwest::Error> {
    let mut form = reqwest::multipart::Form::new();
    for field in fields {
        form = match field.value {
            FormValue::File { file_name, bytes } => {
                let part = reqwest::multipart::Part::stream(bytes)
                    .file_name(file_name)
                    .mime_str("application/pdf")?;
                form.part(field.name, part)
            }
            FormValue::Text(text) => form.text(field.name, text),
        };
    }
    Ok(form)
}

fn map_reqwest_err(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(e.to_string())
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(request.endpoint);
        debug!(%url, "backend request");
        let builder = match request.body {
            ApiBody::Empty => self.http.get(&url),
            ApiBody::Multipart(fields) => self
                .http
                .post(&url)
                .multipart(build_form(fields).map_err(map_reqwest_err)?),
            ApiBody::Json(v) => self.http.post(&url).json(&v),
        };
        let resp = builder.send().await.map_err(map_reqwest_err)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_err)?;
        debug!(%url, status, bytes = body.len(), "backend response");
        Ok(ApiResponse { status, body })
    }
}
