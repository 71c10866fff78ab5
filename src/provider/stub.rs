use super::{
    CompleteResponse, EventStream, GenerationMetadata, Provider, ProviderFuture, StopReason,
    StreamEvent,
};
use crate::prompt;
use crate::request::GenerationRequest;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline provider that drips a canned draft.
#[derive(Debug, Clone)]
pub struct StubProvider {
    model: String,
    delay: Duration,
    fail_after: Option<(usize, String)>,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            model: "stub".to_string(),
            delay: Duration::from_millis(60),
            fail_after: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Emit `Failed { message }` after `fragments` fragments instead of
    /// completing. A count past the end of the draft fails in place of
    /// `Completed`.
    pub fn failing_after(mut self, fragments: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((fragments, message.into()));
        self
    }

    fn draft(req: &GenerationRequest) -> Vec<String> {
        let case_type = req.facts.case_type.as_deref().unwrap_or("civil claim");
        let facts = req.facts.facts.trim();
        let mut parts = vec![
            "DEFENSE\n\n".to_string(),
            format!("The defendant, in the {case_type} brought against it, "),
            "respectfully submits this answer.\n\n".to_string(),
            "I. FACTS\n\n".to_string(),
        ];
        if facts.is_empty() {
            parts.push("The plaintiff's account is disputed in full.\n\n".to_string());
        } else {
            parts.push(format!("The plaintiff alleges: {facts}\n\n"));
        }
        parts.push("II. LEGAL GROUNDS\n\n".to_string());
        parts.push("The claims lack evidentiary support. ".to_string());
        parts.push("III. REQUESTS\n\n".to_string());
        parts.push("The defendant asks that the claims be dismissed.\n".to_string());
        parts
    }
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn stream_generate(&self, req: GenerationRequest) -> ProviderFuture<EventStream> {
        let this = self.clone();

        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<anyhow::Result<StreamEvent>>(32);

            tokio::spawn(async move {
                let parts = Self::draft(&req);
                let output_tokens = prompt::estimate_tokens(&parts.concat());

                for (i, text) in parts.into_iter().enumerate() {
                    if let Some((n, message)) = &this.fail_after {
                        if i == *n {
                            let failed = StreamEvent::Failed {
                                message: message.clone(),
                            };
                            let _ = tx.send(Ok(failed)).await;
                            return;
                        }
                    }
                    if !this.delay.is_zero() {
                        tokio::time::sleep(this.delay).await;
                    }
                    if tx.send(Ok(StreamEvent::Fragment { text })).await.is_err() {
                        return;
                    }
                }
                if let Some((_, message)) = &this.fail_after {
                    let failed = StreamEvent::Failed {
                        message: message.clone(),
                    };
                    let _ = tx.send(Ok(failed)).await;
                    return;
                }

                let input_tokens = prompt::estimate_tokens(prompt::SYSTEM_PROMPT)
                    + prompt::estimate_tokens(&prompt::user_prompt(&req));
                let metadata = GenerationMetadata::for_request(
                    &req,
                    this.model.clone(),
                    input_tokens,
                    output_tokens,
                    StopReason::NaturalEnd,
                );
                let _ = tx.send(Ok(StreamEvent::Completed { metadata })).await;
            });

            Ok::<_, anyhow::Error>(Box::pin(ReceiverStream::new(rx)) as EventStream)
        })
    }

    fn generate(&self, req: GenerationRequest) -> ProviderFuture<CompleteResponse> {
        let this = self.clone();

        Box::pin(async move {
            if let Some((_, message)) = &this.fail_after {
                anyhow::bail!("{message}");
            }
            let text = Self::draft(&req).concat();
            let input_tokens = prompt::estimate_tokens(prompt::SYSTEM_PROMPT)
                + prompt::estimate_tokens(&prompt::user_prompt(&req));
            Ok(CompleteResponse {
                output_tokens: prompt::estimate_tokens(&text),
                text,
                input_tokens,
                stop_reason: StopReason::NaturalEnd,
                model_id: this.model.clone(),
            })
        })
    }
}
