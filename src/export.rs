use crate::provider::GenerationMetadata;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ExportedDraft<'a> {
    text: &'a str,
    metadata: &'a GenerationMetadata,
}

/// Persist a finished draft.
///
/// `.json` paths get `{text, metadata}`; anything else gets the bare text.
/// Takes the parts of a `Success` result only.
pub fn save_draft(
    path: impl AsRef<Path>,
    text: &str,
    metadata: &GenerationMetadata,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    }

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let bytes = if is_json {
        serde_json::to_vec_pretty(&ExportedDraft { text, metadata })
            .context("failed to serialize draft")?
    } else {
        text.as_bytes().to_vec()
    };

    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write draft: {}", path.display()))?;
    tracing::info!(path = %path.display(), "draft saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StopReason;
    use crate::request::{CaseFacts, GenerationRequest, SamplingParams};
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("draft-stream-test-{}", std::process::id()))
            .join(name)
    }

    fn metadata() -> GenerationMetadata {
        let facts = CaseFacts {
            case_type: Some("Consumer claim".into()),
            ..CaseFacts::default()
        };
        let req = GenerationRequest::new(facts, String::new(), SamplingParams::default());
        let stop = StopReason::NaturalEnd;
        let mut m = GenerationMetadata::for_request(&req, "claude-sonnet-4-5", 10, 20, stop);
        m.estimated_cost = 0.0016;
        m
    }

    #[test]
    fn json_export_carries_text_and_metadata() {
        let path = scratch("draft.json");
        save_draft(&path, "Full defense.", &metadata()).expect("save");

        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(v["text"], "Full defense.");
        assert_eq!(v["metadata"]["model"], "claude-sonnet-4-5");
        assert_eq!(v["metadata"]["output_tokens"], 20);
        assert_eq!(v["metadata"]["stop_reason"], "natural_end");
        assert_eq!(v["metadata"]["case_type"], "Consumer claim");
        assert!(v["metadata"].get("classification_confidence").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn other_extensions_get_plain_text() {
        let path = scratch("draft.md");
        save_draft(&path, "Full defense.", &metadata()).expect("save");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "Full defense.");
        let _ = std::fs::remove_file(&path);
    }
}
