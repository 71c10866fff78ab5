use crate::pricing::ModelPricing;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Default model.
    pub model: Option<String>,

    /// Provider identifier ("anthropic" or "stub").
    pub provider: Option<String>,

    pub anthropic: AnthropicSection,

    pub sampling: SamplingSection,

    pub stub: StubSection,

    /// Per-model price overrides, keyed by model id.
    pub pricing: BTreeMap<String, ModelPricing>,
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnthropicSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

// Keep the key out of `debug!(?cfg)`.
impl std::fmt::Debug for AnthropicSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicSection")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SamplingSection {
    pub temperature: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
}

/// Offline provider tuning, for demos without network access.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StubSection {
    pub delay_ms: Option<u64>,
    /// Fail with `fail_message` after this many fragments; past the end of
    /// the draft, fail instead of completing.
    pub fail_after: Option<usize>,
    pub fail_message: Option<String>,
}

impl Config {
    /// Load a config file that must exist, e.g. one named by `--config`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&s, path)
    }

    /// Load the default config file, or Ok(None) when there is none.
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(s) => Self::parse(&s, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("failed to read config: {}", path.display())),
        }
    }

    fn parse(s: &str, path: &Path) -> anyhow::Result<Self> {
        toml::from_str(s).with_context(|| format!("failed to parse TOML: {}", path.display()))
    }
}
