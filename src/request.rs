use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const MIN_TEMPERATURE: f64 = 0.3;
pub const MAX_TEMPERATURE: f64 = 0.9;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

pub const MIN_TOP_K: u32 = 20;
pub const MAX_TOP_K: u32 = 60;
pub const DEFAULT_TOP_K: u32 = 40;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Facts extracted from the uploaded petition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseFacts {
    /// Classified case type, e.g. "moral damages".
    #[serde(default)]
    pub case_type: Option<String>,

    /// Classifier confidence in [0, 1].
    #[serde(default)]
    pub confidence: Option<f64>,

    /// Full statement of facts.
    #[serde(default)]
    pub facts: String,

    /// Any other extracted fields (parties, claims, amounts...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CaseFacts {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read facts: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse facts JSON: {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl SamplingParams {
    /// Clamp into the supported ranges. Out-of-range values are normalized,
    /// not rejected.
    pub fn clamped(self) -> Self {
        let temperature = if self.temperature.is_nan() {
            DEFAULT_TEMPERATURE
        } else {
            self.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        };
        let top_k = self.top_k.clamp(MIN_TOP_K, MAX_TOP_K);
        let max_tokens = if self.max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            self.max_tokens
        };

        let out = Self {
            temperature,
            top_k,
            max_tokens,
        };
        if out != self {
            tracing::warn!(
                requested = ?self,
                effective = ?out,
                "sampling parameters clamped"
            );
        }
        out
    }
}

/// One generation call. Built once per user action and never mutated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub facts: CaseFacts,

    /// Pre-assembled retrieval context (precedents, templates, statutes).
    pub context: String,

    pub sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(facts: CaseFacts, context: String, sampling: SamplingParams) -> Self {
        Self {
            facts,
            context,
            sampling: sampling.clamped(),
        }
    }
}
