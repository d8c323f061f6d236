//! Saved extraction results.

use crate::model::Mode;
use crate::session::SavedPayload;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResult {
    pub timestamp_utc: String,
    pub request_id: String,
    pub document: String,
    pub mode: Mode,
    pub payload: serde_json::Value,
}

impl SavedResult {
    pub fn new(saved: &SavedPayload, request_id: String) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "unknown".into()),
            request_id,
            document: saved.document.clone(),
            mode: saved.mode,
            payload: saved.payload.clone(),
        }
    }

    /// `<pdf stem>-<mode>.json`
    pub fn file_name(&self) -> String {
        let stem = Path::new(&self.document)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".into());
        format!("{stem}-{}.json", self.mode)
    }
}

/// Write the result into `dir`, replacing an earlier save of the same document and mode.
pub fn save_result(dir: &Path, result: &SavedResult) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(result.file_name());
    export_json(&path, result)?;
    Ok(path)
}

pub fn export_json(path: &Path, result: &SavedResult) -> Result<()> {
    let data = serde_json::to_vec_pretty(result).context("serialize result")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saved(document: &str, mode: Mode) -> SavedPayload {
        SavedPayload {
            mode,
            document: document.into(),
            payload: json!({"outline": [{"level": "H1", "text": "Intro", "page": 1}]}),
        }
    }

    #[test]
    fn file_name_uses_stem_and_mode() {
        let r = SavedResult::new(&saved("Annual Report.pdf", Mode::Semantic), "1".into());
        assert_eq!(r.file_name(), "Annual Report-semantic.json");
        let r = SavedResult::new(&saved("", Mode::Outline), "1".into());
        assert_eq!(r.file_name(), "document-outline.json");
    }

    #[test]
    fn saves_pretty_json_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let r = SavedResult::new(&saved("a.pdf", Mode::Outline), "42".into());
        let path = save_result(&out, &r).unwrap();
        assert_eq!(path, out.join("a-outline.json"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"mode\": \"outline\""));
        let back: SavedResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }
}
