use crate::request::GenerationRequest;
use futures_core::stream::BoxStream;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Why the model stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NaturalEnd,
    MaxLengthReached,
    Other(String),
}

impl StopReason {
    /// Maps the vendor's `stop_reason` string.
    pub fn from_vendor(raw: Option<&str>) -> Self {
        match raw {
            Some("end_turn") | Some("stop_sequence") => Self::NaturalEnd,
            Some("max_tokens") => Self::MaxLengthReached,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other("unknown".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetadata {
    pub model: String,
    pub temperature: f64,
    pub top_k: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: StopReason,

    /// USD. Zero until the aggregator (or the non-streaming path) prices it.
    pub estimated_cost: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_confidence: Option<f64>,
}

impl GenerationMetadata {
    /// Unpriced metadata for a finished call on `req`.
    pub fn for_request(
        req: &GenerationRequest,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        stop_reason: StopReason,
    ) -> Self {
        Self {
            model: model.into(),
            temperature: req.sampling.temperature,
            top_k: req.sampling.top_k,
            input_tokens,
            output_tokens,
            stop_reason,
            estimated_cost: 0.0,
            case_type: req.facts.case_type.clone(),
            classification_confidence: req.facts.confidence,
        }
    }
}

/// One item of a streaming generation.
///
/// Zero or more `Fragment`s, then exactly one of `Completed` / `Failed`.
/// Transport failures arrive as `Err` items on the [`EventStream`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment { text: String },
    Completed { metadata: GenerationMetadata },
    Failed { message: String },
}

pub type EventStream = BoxStream<'static, anyhow::Result<StreamEvent>>;

/// Result of a non-streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: StopReason,
    pub model_id: String,
}

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// Generation service interface.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Model this provider was configured with.
    fn model(&self) -> &str;

    /// Start streaming a response.
    fn stream_generate(&self, req: GenerationRequest) -> ProviderFuture<EventStream>;

    /// Request the whole response at once.
    fn generate(&self, req: GenerationRequest) -> ProviderFuture<CompleteResponse>;
}
