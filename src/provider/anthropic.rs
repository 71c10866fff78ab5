use super::sse::{SseFrame, SseParser};
use super::{
    CompleteResponse, EventStream, GenerationMetadata, Provider, ProviderFuture, StopReason,
    StreamEvent,
};
use crate::prompt;
use crate::request::GenerationRequest;
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    config: AnthropicConfig,
    messages_url: Url,
}

impl AnthropicProvider {
    /// Fails without a credential, before any request is made.
    pub fn new(http: reqwest::Client, config: AnthropicConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!("missing Anthropic API key");
        }
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid Anthropic base URL: {}", config.base_url))?;
        let messages_url = base.join("v1/messages")?;
        Ok(Self {
            http,
            config,
            messages_url,
        })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        let key = HeaderValue::from_str(&self.config.api_key).map_err(|e| anyhow!(e))?;
        h.insert("x-api-key", key);
        Ok(h)
    }

    fn body(&self, req: &GenerationRequest, stream: bool) -> MessagesRequest {
        let user = prompt::user_prompt(req);
        let estimated_input_tokens =
            prompt::estimate_tokens(prompt::SYSTEM_PROMPT) + prompt::estimate_tokens(&user);
        tracing::info!(
            model = %self.config.model,
            temperature = req.sampling.temperature,
            top_k = req.sampling.top_k,
            max_tokens = req.sampling.max_tokens,
            stream,
            estimated_input_tokens,
            "calling Anthropic Messages API"
        );
        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: req.sampling.max_tokens,
            temperature: req.sampling.temperature,
            top_k: req.sampling.top_k,
            system: prompt::SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user,
            }],
            stream,
        }
    }

    async fn send(&self, body: &MessagesRequest) -> anyhow::Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.messages_url.clone())
            .headers(self.headers()?)
            .timeout(self.config.timeout)
            .json(body)
            .send()
            .await
            .context("failed to start Anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error: HTTP {status}: {text}"));
        }
        Ok(resp)
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn stream_generate(&self, req: GenerationRequest) -> ProviderFuture<EventStream> {
        let this = self.clone();

        Box::pin(async move {
            let body = this.body(&req, true);
            let resp = this.send(&body).await?;

            let (tx, rx) = mpsc::channel::<anyhow::Result<StreamEvent>>(64);

            tokio::spawn(async move {
                let mut bytes = resp.bytes_stream();
                let mut parser = SseParser::new();
                let mut decoder = MessageStreamDecoder::new(req, this.config.model.clone());

                loop {
                    // Dropping the receiver closes the connection, even while the
                    // server is silent.
                    let item = tokio::select! {
                        _ = tx.closed() => {
                            tracing::debug!("event receiver dropped, closing Anthropic stream");
                            return;
                        }
                        item = bytes.next() => item,
                    };
                    let Some(item) = item else {
                        // Body ended without message_stop; the aggregator reports it.
                        return;
                    };
                    let chunk = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                            return;
                        }
                    };

                    for frame in parser.push(&chunk) {
                        let event = match frame.and_then(|f| decoder.decode(&f)) {
                            Ok(Some(ev)) => Ok(ev),
                            Ok(None) => continue,
                            Err(e) => Err(e),
                        };
                        let terminal = !matches!(event, Ok(StreamEvent::Fragment { .. }));
                        if tx.send(event).await.is_err() || terminal {
                            // Receiver gone, or the stream is over.
                            return;
                        }
                    }
                }
            });

            Ok::<_, anyhow::Error>(Box::pin(ReceiverStream::new(rx)) as EventStream)
        })
    }

    fn generate(&self, req: GenerationRequest) -> ProviderFuture<CompleteResponse> {
        let this = self.clone();

        Box::pin(async move {
            let body = this.body(&req, false);
            let resp = this.send(&body).await?;
            let msg: MessagesResponse = resp
                .json()
                .await
                .context("failed to parse Anthropic response JSON")?;

            let text = msg
                .content
                .iter()
                .filter_map(|block| block.text.as_deref())
                .collect::<String>();

            Ok::<_, anyhow::Error>(CompleteResponse {
                text,
                input_tokens: msg.usage.input_tokens,
                output_tokens: msg.usage.output_tokens,
                stop_reason: StopReason::from_vendor(msg.stop_reason.as_deref()),
                model_id: msg.model.unwrap_or_else(|| this.config.model.clone()),
            })
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    top_k: u32,
    system: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Streaming payloads, discriminated by their `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Error {
        error: WireError,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Turns Messages API stream frames into [`StreamEvent`]s.
///
/// Usage and stop reason arrive spread over `message_start` and
/// `message_delta`; they are held here until `message_stop`.
struct MessageStreamDecoder {
    req: GenerationRequest,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    stop_reason: Option<String>,
}

impl MessageStreamDecoder {
    fn new(req: GenerationRequest, model: String) -> Self {
        Self {
            req,
            model,
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
        }
    }

    fn decode(&mut self, frame: &SseFrame) -> anyhow::Result<Option<StreamEvent>> {
        if frame.event.as_deref() == Some("ping") || frame.data.trim().is_empty() {
            return Ok(None);
        }
        let event: WireEvent =
            serde_json::from_str(&frame.data).context("failed to parse SSE JSON")?;

        Ok(match event {
            WireEvent::MessageStart { message } => {
                if let Some(model) = message.model {
                    self.model = model;
                }
                self.input_tokens = message.usage.input_tokens;
                self.output_tokens = message.usage.output_tokens;
                None
            }
            WireEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            } => Some(StreamEvent::Fragment { text }),
            WireEvent::ContentBlockDelta { .. } => None,
            WireEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(n) = usage.and_then(|u| u.output_tokens) {
                    self.output_tokens = n;
                }
                None
            }
            WireEvent::MessageStop => Some(StreamEvent::Completed {
                metadata: GenerationMetadata::for_request(
                    &self.req,
                    self.model.clone(),
                    self.input_tokens,
                    self.output_tokens,
                    StopReason::from_vendor(self.stop_reason.as_deref()),
                ),
            }),
            WireEvent::Error { error } => {
                let kind = error.kind.unwrap_or_else(|| "error".to_string());
                let message = error.message.unwrap_or_default();
                Some(StreamEvent::Failed {
                    message: format!("{kind}: {message}"),
                })
            }
            WireEvent::Ignored => None,
        })
    }
}
