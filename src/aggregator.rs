//! Folds a provider's event stream into progress updates and one terminal
//! result.

use crate::pricing::ModelPricing;
use crate::provider::{CompleteResponse, EventStream, GenerationMetadata, StreamEvent};
use crate::request::{GenerationRequest, DEFAULT_MAX_TOKENS};
use futures_core::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

/// Progress never reaches 1.0 before the terminal update.
pub const PROGRESS_CAP: f64 = 0.99;

/// Characters per token for the in-flight estimate.
const CHARS_PER_TOKEN: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Success {
        text: String,
        metadata: GenerationMetadata,
    },
    Error {
        message: String,
        partial_text: String,
    },
}

impl GenerationResult {
    /// Non-streaming mode: wrap a complete response, priced the same way the
    /// streaming path prices `Completed`.
    pub fn from_complete(
        resp: CompleteResponse,
        req: &GenerationRequest,
        pricing: &ModelPricing,
    ) -> Self {
        let mut metadata = GenerationMetadata::for_request(
            req,
            resp.model_id,
            resp.input_tokens,
            resp.output_tokens,
            resp.stop_reason,
        );
        metadata.estimated_cost =
            pricing.estimate_cost(metadata.input_tokens, metadata.output_tokens);
        Self::Success {
            text: resp.text,
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Final or partial text, whichever this result carries.
    pub fn text(&self) -> &str {
        match self {
            Self::Success { text, .. } => text,
            Self::Error { partial_text, .. } => partial_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationUpdate {
    /// `text` is the whole accumulated text so far, not a delta.
    Progress {
        text: String,
        progress: f64,
        elapsed: Duration,
    },
    Done {
        result: GenerationResult,
        elapsed: Duration,
    },
}

/// Per-session mutable state. Never shared between sessions.
#[derive(Debug)]
pub struct AggregationState {
    text: String,
    chars: usize,
    started: Instant,
}

impl AggregationState {
    fn new() -> Self {
        Self {
            text: String::new(),
            chars: 0,
            started: Instant::now(),
        }
    }

    fn append(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.chars += fragment.chars().count();
    }

    pub fn estimated_tokens(&self) -> f64 {
        self.chars as f64 / CHARS_PER_TOKEN
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Consumes one upstream [`EventStream`] exactly once.
///
/// Dropping the aggregator before the `Done` update drops the upstream
/// stream with it and produces no result.
pub struct Aggregator {
    upstream: Option<EventStream>,
    state: AggregationState,
    expected_max_tokens: u32,
    pricing: ModelPricing,
    fragments: u64,
}

impl Aggregator {
    pub fn new(events: EventStream, expected_max_tokens: u32, pricing: ModelPricing) -> Self {
        let expected_max_tokens = if expected_max_tokens == 0 {
            tracing::debug!(fallback = DEFAULT_MAX_TOKENS, "invalid expected_max_tokens");
            DEFAULT_MAX_TOKENS
        } else {
            expected_max_tokens
        };
        Self {
            upstream: Some(events),
            state: AggregationState::new(),
            expected_max_tokens,
            pricing,
            fragments: 0,
        }
    }

    /// Drive to the end and return only the terminal result.
    #[cfg(test)]
    pub async fn finish(mut self) -> GenerationResult {
        use tokio_stream::StreamExt;

        while let Some(update) = self.next().await {
            if let AggregationUpdate::Done { result, .. } = update {
                return result;
            }
        }
        GenerationResult::Error {
            message: "aggregation already finished".to_string(),
            partial_text: String::new(),
        }
    }

    fn on_fragment(&mut self, fragment: &str) -> AggregationUpdate {
        self.fragments += 1;
        self.state.append(fragment);
        let progress = (self.state.estimated_tokens() / f64::from(self.expected_max_tokens))
            .min(PROGRESS_CAP);
        tracing::trace!(fragments = self.fragments, progress, "fragment");
        AggregationUpdate::Progress {
            text: self.state.text.clone(),
            progress,
            elapsed: self.state.elapsed(),
        }
    }

    fn on_completed(&mut self, mut metadata: GenerationMetadata) -> AggregationUpdate {
        metadata.estimated_cost = self
            .pricing
            .estimate_cost(metadata.input_tokens, metadata.output_tokens);
        tracing::info!(
            fragments = self.fragments,
            input_tokens = metadata.input_tokens,
            output_tokens = metadata.output_tokens,
            cost = metadata.estimated_cost,
            "generation stream completed"
        );
        AggregationUpdate::Done {
            result: GenerationResult::Success {
                text: std::mem::take(&mut self.state.text),
                metadata,
            },
            elapsed: self.state.elapsed(),
        }
    }

    fn on_failed(&mut self, message: String) -> AggregationUpdate {
        tracing::warn!(fragments = self.fragments, %message, "generation stream failed");
        AggregationUpdate::Done {
            result: GenerationResult::Error {
                message,
                partial_text: std::mem::take(&mut self.state.text),
            },
            elapsed: self.state.elapsed(),
        }
    }
}

impl Stream for Aggregator {
    type Item = AggregationUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        let update = match ready!(upstream.as_mut().poll_next(cx)) {
            Some(Ok(StreamEvent::Fragment { text })) => {
                return Poll::Ready(Some(this.on_fragment(&text)));
            }
            Some(Ok(StreamEvent::Completed { metadata })) => this.on_completed(metadata),
            Some(Ok(StreamEvent::Failed { message })) => this.on_failed(message),
            Some(Err(e)) => this.on_failed(format!("{e:#}")),
            None => this.on_failed("generation stream ended without a final event".to_string()),
        };

        // Terminal: release the upstream now rather than on drop.
        this.upstream = None;
        Poll::Ready(Some(update))
    }
}

impl FusedStream for Aggregator {
    fn is_terminated(&self) -> bool {
        self.upstream.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StopReason;
    use crate::request::{CaseFacts, SamplingParams};
    use anyhow::anyhow;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_stream::StreamExt;

    fn frag(s: &str) -> anyhow::Result<StreamEvent> {
        Ok(StreamEvent::Fragment { text: s.to_string() })
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(CaseFacts::default(), String::new(), SamplingParams::default())
    }

    fn metadata(input_tokens: u64, output_tokens: u64) -> GenerationMetadata {
        GenerationMetadata::for_request(
            &request(),
            "claude-sonnet-4-5",
            input_tokens,
            output_tokens,
            StopReason::NaturalEnd,
        )
    }

    fn aggregator(events: Vec<anyhow::Result<StreamEvent>>, max_tokens: u32) -> Aggregator {
        Aggregator::new(
            Box::pin(tokio_stream::iter(events)),
            max_tokens,
            ModelPricing::default(),
        )
    }

    async fn collect(agg: Aggregator) -> Vec<AggregationUpdate> {
        agg.collect::<Vec<_>>().await
    }

    fn progress_of(u: &AggregationUpdate) -> Option<(&str, f64)> {
        match u {
            AggregationUpdate::Progress { text, progress, .. } => Some((text.as_str(), *progress)),
            AggregationUpdate::Done { .. } => None,
        }
    }

    #[tokio::test]
    async fn accumulates_fragments_in_order() {
        let parts = ["The ", "defendant ", "", "contests ", "all claims."];
        let mut events: Vec<_> = parts.iter().map(|p| frag(p)).collect();
        events.push(Ok(StreamEvent::Completed {
            metadata: metadata(10, 20),
        }));

        let updates = collect(aggregator(events, 1000)).await;
        assert_eq!(updates.len(), parts.len() + 1);

        for (k, update) in updates.iter().take(parts.len()).enumerate() {
            let (text, _) = progress_of(update).expect("progress");
            assert_eq!(text, parts[..=k].concat());
        }
        match updates.last() {
            Some(AggregationUpdate::Done {
                result: GenerationResult::Success { text, metadata },
                ..
            }) => {
                assert_eq!(text, "The defendant contests all claims.");
                assert_eq!(metadata.input_tokens, 10);
            }
            other => panic!("unexpected terminal update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_is_capped_and_non_decreasing() {
        // 400 chars ~ 100 tokens against a cap of 50 tokens.
        let events: Vec<_> = (0..40)
            .map(|_| frag("0123456789"))
            .chain(std::iter::once(Ok(StreamEvent::Completed {
                metadata: metadata(1, 1),
            })))
            .collect();

        let updates = collect(aggregator(events, 50)).await;
        let fractions: Vec<f64> = updates.iter().filter_map(progress_of).map(|(_, p)| p).collect();
        assert_eq!(fractions.len(), 40);
        assert!(fractions.iter().all(|p| (0.0..=PROGRESS_CAP).contains(p)));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(PROGRESS_CAP));
        // 10 chars = 2.5 tokens of 50
        assert!((fractions[0] - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn exactly_one_terminal_update_and_nothing_after() {
        let events = vec![
            frag("a"),
            Ok(StreamEvent::Failed {
                message: "first".into(),
            }),
            frag("never"),
            Ok(StreamEvent::Completed {
                metadata: metadata(1, 1),
            }),
        ];
        let mut agg = aggregator(events, 100);
        let mut done = 0;
        let mut after_done = 0;
        while let Some(u) = agg.next().await {
            if done > 0 {
                after_done += 1;
            }
            if matches!(u, AggregationUpdate::Done { .. }) {
                done += 1;
            }
        }
        assert_eq!(done, 1);
        assert_eq!(after_done, 0);
        assert!(agg.is_terminated());
        assert!(agg.next().await.is_none());
    }

    #[tokio::test]
    async fn completed_is_priced() {
        let events = vec![Ok(StreamEvent::Completed {
            metadata: metadata(1_000_000, 1_000_000),
        })];
        match aggregator(events, 100).finish().await {
            GenerationResult::Success { metadata, text } => {
                assert_eq!(metadata.estimated_cost, 90.0);
                assert!(text.is_empty());
            }
            other => panic!("expected success, got {other:?}"),
        }

        let events = vec![Ok(StreamEvent::Completed {
            metadata: metadata(0, 0),
        })];
        match aggregator(events, 100).finish().await {
            GenerationResult::Success { metadata, .. } => assert_eq!(metadata.estimated_cost, 0.0),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_failure_preserves_partial_text() {
        let events = vec![
            frag("Hello "),
            frag("world"),
            Ok(StreamEvent::Failed {
                message: "rate limited".into(),
            }),
        ];
        assert_eq!(
            aggregator(events, 100).finish().await,
            GenerationResult::Error {
                message: "rate limited".into(),
                partial_text: "Hello world".into(),
            }
        );
    }

    #[tokio::test]
    async fn transport_error_becomes_error_result() {
        let events = vec![
            frag("partial"),
            Err(anyhow!("connection reset").context("network stream error")),
        ];
        match aggregator(events, 100).finish().await {
            GenerationResult::Error {
                message,
                partial_text,
            } => {
                assert_eq!(partial_text, "partial");
                assert!(message.contains("network stream error"));
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abrupt_end_is_synthesized_into_error() {
        let events = vec![frag("cut "), frag("off")];
        match aggregator(events, 100).finish().await {
            GenerationResult::Error { partial_text, .. } => assert_eq!(partial_text, "cut off"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_and_non_streaming_costs_match() {
        let pricing = ModelPricing::default();
        let req = request();
        let (input, output) = (12_345, 6_789);

        let streamed = aggregator(
            vec![Ok(StreamEvent::Completed {
                metadata: metadata(input, output),
            })],
            100,
        )
        .finish()
        .await;
        let direct = GenerationResult::from_complete(
            CompleteResponse {
                text: String::new(),
                input_tokens: input,
                output_tokens: output,
                stop_reason: StopReason::NaturalEnd,
                model_id: "claude-sonnet-4-5".into(),
            },
            &req,
            &pricing,
        );

        match (streamed, direct) {
            (
                GenerationResult::Success { metadata: a, .. },
                GenerationResult::Success { metadata: b, .. },
            ) => assert_eq!(a.estimated_cost.to_bits(), b.estimated_cost.to_bits()),
            other => panic!("expected two successes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_fragment_changes_nothing() {
        let events = vec![
            frag("abcdefgh"),
            frag(""),
            Ok(StreamEvent::Completed {
                metadata: metadata(1, 1),
            }),
        ];
        let updates = collect(aggregator(events, 100)).await;
        let first = progress_of(&updates[0]).expect("progress");
        let second = progress_of(&updates[1]).expect("progress");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn zero_expected_tokens_falls_back_to_default() {
        let events = vec![frag(&"x".repeat(400))];
        let updates = collect(aggregator(events, 0)).await;
        let (_, p) = progress_of(&updates[0]).expect("progress");
        assert!((p - 100.0 / f64::from(DEFAULT_MAX_TOKENS)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn abandoned_session_releases_upstream_without_result() {
        let (tx, rx) = mpsc::channel::<anyhow::Result<StreamEvent>>(1);
        let mut agg =
            Aggregator::new(Box::pin(ReceiverStream::new(rx)), 100, ModelPricing::default());

        tx.send(frag("first")).await.expect("send");
        let update = agg.next().await.expect("update");
        assert!(matches!(update, AggregationUpdate::Progress { .. }));
        assert!(!tx.is_closed());

        drop(agg);
        assert!(tx.is_closed());
        assert!(tx
            .send(Ok(StreamEvent::Completed {
                metadata: metadata(1, 1)
            }))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let done = || {
            Ok(StreamEvent::Completed {
                metadata: metadata(1, 1),
            })
        };
        let a = aggregator(vec![frag("one"), done()], 10);
        let b = aggregator(vec![frag("two"), done()], 10);
        let (ra, rb) = tokio::join!(a.finish(), b.finish());
        assert_eq!(ra.text(), "one");
        assert_eq!(rb.text(), "two");
    }
}
