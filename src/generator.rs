use crate::aggregator::{Aggregator, GenerationResult};
use crate::pricing::ModelPricing;
use crate::provider::{EventStream, Provider, StreamEvent};
use crate::request::GenerationRequest;

/// A configured provider plus the prices of its model.
pub struct Generator {
    provider: Box<dyn Provider + Send + Sync>,
    pricing: ModelPricing,
}

impl Generator {
    pub fn new(provider: Box<dyn Provider + Send + Sync>, pricing: ModelPricing) -> Self {
        Self { provider, pricing }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Start a streaming session.
    ///
    /// If the provider cannot even start, the returned aggregator yields a
    /// single `Done` carrying the error.
    pub async fn stream(&self, req: GenerationRequest) -> Aggregator {
        let max_tokens = req.sampling.max_tokens;
        tracing::info!(
            provider = self.provider.name(),
            model = self.model(),
            "starting streaming generation"
        );
        let events: EventStream = match self.provider.stream_generate(req).await {
            Ok(events) => events,
            Err(e) => Box::pin(tokio_stream::once(Err::<StreamEvent, _>(
                e.context("provider failed to start streaming"),
            ))),
        };
        Aggregator::new(events, max_tokens, self.pricing)
    }

    /// Non-streaming call.
    pub async fn generate(&self, req: GenerationRequest) -> GenerationResult {
        tracing::info!(
            provider = self.provider.name(),
            model = self.model(),
            "starting generation"
        );
        match self.provider.generate(req.clone()).await {
            Ok(resp) => {
                let result = GenerationResult::from_complete(resp, &req, &self.pricing);
                if let GenerationResult::Success { metadata, .. } = &result {
                    tracing::info!(
                        input_tokens = metadata.input_tokens,
                        output_tokens = metadata.output_tokens,
                        cost = metadata.estimated_cost,
                        "generation completed"
                    );
                }
                result
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "generation failed");
                GenerationResult::Error {
                    message: format!("{e:#}"),
                    partial_text: String::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregationUpdate;
    use crate::provider::stub::StubProvider;
    use crate::provider::{CompleteResponse, ProviderFuture};
    use crate::request::{CaseFacts, SamplingParams};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest::new(CaseFacts::default(), String::new(), SamplingParams::default())
    }

    fn stub() -> StubProvider {
        StubProvider::new().with_delay(Duration::ZERO)
    }

    struct Unreachable;

    impl Provider for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn model(&self) -> &str {
            "m"
        }

        fn stream_generate(&self, _req: GenerationRequest) -> ProviderFuture<EventStream> {
            Box::pin(async { Err::<EventStream, _>(anyhow::anyhow!("HTTP 529: overloaded")) })
        }

        fn generate(&self, _req: GenerationRequest) -> ProviderFuture<CompleteResponse> {
            Box::pin(async { Err::<CompleteResponse, _>(anyhow::anyhow!("HTTP 529: overloaded")) })
        }
    }

    #[tokio::test]
    async fn streaming_and_direct_results_agree() {
        let g = Generator::new(Box::new(stub()), ModelPricing::default());
        let streamed = g.stream(request()).await.finish().await;
        let direct = g.generate(request()).await;

        match (streamed, direct) {
            (
                GenerationResult::Success { text: a, metadata: ma },
                GenerationResult::Success { text: b, metadata: mb },
            ) => {
                assert_eq!(a, b);
                assert_eq!(ma.input_tokens, mb.input_tokens);
                assert_eq!(ma.output_tokens, mb.output_tokens);
                assert_eq!(ma.estimated_cost.to_bits(), mb.estimated_cost.to_bits());
            }
            other => panic!("expected two successes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_failure_is_a_single_done() {
        let g = Generator::new(Box::new(Unreachable), ModelPricing::default());
        let updates: Vec<_> = g.stream(request()).await.collect().await;
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            AggregationUpdate::Done {
                result: GenerationResult::Error { message, partial_text },
                ..
            } => {
                assert!(message.contains("overloaded"));
                assert!(partial_text.is_empty());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_failure_is_an_error_result() {
        let g = Generator::new(Box::new(Unreachable), ModelPricing::default());
        assert!(!g.generate(request()).await.is_success());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let provider = stub().failing_after(3, "rate limited");
        let g = Generator::new(Box::new(provider), ModelPricing::default());
        match g.stream(request()).await.finish().await {
            GenerationResult::Error { message, partial_text } => {
                assert_eq!(message, "rate limited");
                assert!(partial_text.starts_with("DEFENSE"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }
}
