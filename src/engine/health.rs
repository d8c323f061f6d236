//! Composite backend health check.

use super::api::{ApiBody, ApiRequest, Endpoint, Transport};
use crate::error::{HealthError, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Subsystems listed first, in this order; anything else follows alphabetically.
const KNOWN_SUBSYSTEMS: [&str; 4] = [
    "outline_extractor",
    "persona_extractor",
    "semantic_extractor",
    "spacy_multilingual",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(flatten)]
    pub subsystems: BTreeMap<String, serde_json::Value>,
}

impl HealthReport {
    /// Per-subsystem statuses in display order.
    pub fn subsystem_status(&self) -> Vec<(String, String)> {
        let as_text = |v: &serde_json::Value| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut out: Vec<(String, String)> = KNOWN_SUBSYSTEMS
            .iter()
            .filter_map(|k| self.subsystems.get(*k).map(|v| (k.to_string(), as_text(v))))
            .collect();
        out.extend(
            self.subsystems
                .iter()
                .filter(|(k, _)| !KNOWN_SUBSYSTEMS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), as_text(v))),
        );
        out
    }

    pub fn all_available(&self) -> bool {
        self.status == "running"
            && self
                .subsystem_status()
                .iter()
                .all(|(_, s)| s == "available")
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "[OK] API Server Status:".to_string(),
            format!("   Status: {}", self.status),
        ];
        for (name, status) in self.subsystem_status() {
            lines.push(format!("   {}: {}", display_name(&name), status));
        }
        lines
    }
}

fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_uppercase().chain(c).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn error_lines(err: &HealthError) -> Vec<String> {
    let mut lines = vec![format!("[ERROR] {err}")];
    if matches!(err, HealthError::CannotConnect(_)) {
        lines.push("   Make sure the API server is running with: python api_server.py".into());
    }
    lines
}

/// One GET to the composite status endpoint; no retry, no polling.
pub async fn check_health<T: Transport>(transport: &T) -> Result<HealthReport, HealthError> {
    let resp = transport
        .send(ApiRequest {
            endpoint: Endpoint::Health,
            body: ApiBody::Empty,
        })
        .await
        .map_err(|e| match e {
            TransportError::Connection(msg) => HealthError::CannotConnect(msg),
            TransportError::Timeout => HealthError::CannotConnect("request timed out".into()),
        })?;

    if !resp.is_success() {
        warn!(status = resp.status, "health check: server responded with an error");
        return Err(HealthError::ServerNotResponding {
            status: resp.status,
        });
    }

    let report: HealthReport = serde_json::from_str(&resp.body)
        .map_err(|e| HealthError::InvalidResponse(e.to_string()))?;
    info!(status = %report.status, healthy = report.all_available(), "health check");
    Ok(report)
}
