//! Result renderers.
//!
//! Turns extraction payloads and errors into display lines for the result pane and
//! for text-mode output.

use crate::error::{ErrorKind, ExtractError};
use crate::model::Mode;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const OK_MARKER: &str = "[OK]";
pub const ERROR_MARKER: &str = "[ERROR]";
pub const WARN_MARKER: &str = "[WARN]";

/// How a successful payload is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    /// Pretty-printed JSON.
    RawJson,
    /// Summary of a multilingual text analysis.
    TextAnalysis,
    /// Entities grouped by label.
    EntityGroups,
}

pub fn render_success(kind: RenderKind, mode: Mode, payload: &serde_json::Value) -> Vec<String> {
    let mut lines = vec![format!("{OK_MARKER} {} extraction complete", mode.title())];
    match kind {
        RenderKind::RawJson => {
            let pretty =
                serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            lines.extend(pretty.lines().map(str::to_string));
        }
        RenderKind::TextAnalysis => lines.extend(text_analysis_lines(payload)),
        RenderKind::EntityGroups => lines.extend(entity_group_lines(payload)),
    }
    lines
}

pub fn render_error(err: &ExtractError) -> Vec<String> {
    let line = match err.kind() {
        // The call went through; the operation itself failed.
        ErrorKind::Backend => format!("{WARN_MARKER} Backend error: {err}"),
        ErrorKind::Transport => format!("{ERROR_MARKER} Request failed: {err}"),
        ErrorKind::Precondition => format!("{ERROR_MARKER} {err}"),
        ErrorKind::UnknownMode => format!("{ERROR_MARKER} {err}"),
        ErrorKind::Internal => format!("{ERROR_MARKER} Internal error: {err}"),
    };
    vec![line]
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextAnalysisBody {
    analysis: TextAnalysis,
    key_phrases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextAnalysis {
    language: Option<String>,
    sentences: u64,
    tokens: u64,
    entities: u64,
    noun_phrases: u64,
    entity_types: BTreeMap<String, u64>,
    key_entities: Vec<String>,
}

fn text_analysis_lines(payload: &serde_json::Value) -> Vec<String> {
    let body: TextAnalysisBody = match serde_json::from_value(payload.clone()) {
        Ok(b) => b,
        Err(e) => return vec![format!("{WARN_MARKER} Unexpected analysis shape: {e}")],
    };
    let a = body.analysis;
    let mut lines = vec![
        format!("Language: {}", a.language.as_deref().unwrap_or("unknown")),
        format!(
            "Sentences: {} | Tokens: {} | Entities: {} | Noun phrases: {}",
            a.sentences, a.tokens, a.entities, a.noun_phrases
        ),
    ];
    if !body.key_phrases.is_empty() {
        lines.push(format!("Key phrases: {}", body.key_phrases.join(", ")));
    }
    if !a.entity_types.is_empty() {
        lines.push("Entity types:".into());
        let mut types: Vec<_> = a.entity_types.into_iter().collect();
        types.sort_by(|(an, ac), (bn, bc)| bc.cmp(ac).then_with(|| an.cmp(bn)));
        for (label, count) in types {
            lines.push(format!("  {label}: {count}"));
        }
    }
    if !a.key_entities.is_empty() {
        lines.push(format!("Key entities: {}", a.key_entities.join(", ")));
    }
    lines
}

#[derive(Debug, Deserialize)]
struct Entity {
    text: String,
    label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntitiesBody {
    entities: Vec<Entity>,
}

fn entity_group_lines(payload: &serde_json::Value) -> Vec<String> {
    let body: EntitiesBody = match serde_json::from_value(payload.clone()) {
        Ok(b) => b,
        Err(e) => return vec![format!("{WARN_MARKER} Unexpected entities shape: {e}")],
    };
    if body.entities.is_empty() {
        return vec!["No entities found".into()];
    }
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for e in body.entities {
        let group = groups.entry(e.label).or_default();
        if !group.contains(&e.text) {
            group.push(e.text);
        }
    }
    groups
        .into_iter()
        .map(|(label, texts)| format!("{label} ({}): {}", texts.len(), texts.join(", ")))
        .collect()
}

/// Text captured from an outline-shaped payload: the title followed by every
/// heading's text, one per line.
pub fn capture_text(payload: &serde_json::Value) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(title) = payload.get("title").and_then(|t| t.as_str()) {
        if !title.trim().is_empty() {
            parts.push(title.trim().to_string());
        }
    }
    if let Some(items) = payload.get("outline").and_then(|o| o.as_array()) {
        parts.extend(
            items
                .iter()
                .filter_map(|i| i.get("text").and_then(|t| t.as_str()))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        );
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_carries_success_marker_and_payload() {
        let lines = render_success(
            RenderKind::RawJson,
            Mode::Semantic,
            &json!({"sections": [{"title": "Intro", "page": 1}]}),
        );
        assert!(lines[0].starts_with(OK_MARKER));
        assert!(lines.iter().any(|l| l.contains("\"title\": \"Intro\"")));
    }

    #[test]
    fn text_analysis_summary() {
        let payload = json!({
            "analysis": {
                "language": "french",
                "sentences": 3,
                "tokens": 42,
                "entities": 4,
                "noun_phrases": 7,
                "entity_types": {"LOC": 1, "PER": 3},
                "key_entities": ["Marie", "Paris"]
            },
            "key_phrases": ["rapport annuel", "Paris"]
        });
        let lines = render_success(RenderKind::TextAnalysis, Mode::Multilingual, &payload);
        assert_eq!(lines[1], "Language: french");
        assert_eq!(lines[2], "Sentences: 3 | Tokens: 42 | Entities: 4 | Noun phrases: 7");
        assert_eq!(lines[3], "Key phrases: rapport annuel, Paris");
        // most frequent type first
        assert_eq!(lines[5], "  PER: 3");
        assert_eq!(lines[6], "  LOC: 1");
        assert_eq!(lines[7], "Key entities: Marie, Paris");
    }

    #[test]
    fn entities_grouped_by_label() {
        let payload = json!({"entities": [
            {"text": "Berlin", "label": "LOC"},
            {"text": "Ada", "label": "PER"},
            {"text": "Berlin", "label": "LOC"},
            {"text": "Oslo", "label": "LOC"}
        ]});
        let lines = render_success(RenderKind::EntityGroups, Mode::Multilingual, &payload);
        assert_eq!(&lines[1..], ["LOC (2): Berlin, Oslo", "PER (1): Ada"]);
    }

    #[test]
    fn backend_errors_render_distinctly_from_transport_errors() {
        let backend = render_error(&ExtractError::Backend("bad pdf".into()));
        let transport = render_error(&ExtractError::Http {
            status: 502,
            detail: None,
        });
        assert_eq!(backend, vec!["[WARN] Backend error: bad pdf"]);
        assert_eq!(transport, vec!["[ERROR] Request failed: HTTP error 502"]);
    }

    #[test]
    fn captures_title_and_headings() {
        let payload = json!({
            "title": "Annual Report ",
            "outline": [
                {"level": "H1", "text": "Overview", "page": 1},
                {"level": "H2", "text": "  ", "page": 2},
                {"level": "H2", "text": "Finances", "page": 3}
            ]
        });
        assert_eq!(
            capture_text(&payload).as_deref(),
            Some("Annual Report\nOverview\nFinances")
        );
        assert_eq!(capture_text(&json!({"sections": []})), None);
    }
}
