//! OpenAI-compatible provider adapter.
//!
//! Implements [`InferenceAdapter`] over the `/v1/chat/completions` endpoint
//! with `stream: true`, decoding `data: {...}` SSE frames into plain text
//! deltas. Works against any OpenAI-compatible backend, hosted or local.
//!
//! Cancellation: each `stream` call spawns a pump task that reads the HTTP
//! byte stream and forwards deltas over a channel. [`cancel`] trips a
//! [`CancellationToken`] and awaits the pump task's join handle, so when it
//! returns the connection is closed and no further delta will be produced.
//!
//! [`cancel`]: InferenceAdapter::cancel
//!
//! # Examples
//!
//! ```rust,no_run
//! use selkie::providers::openai::{OpenAiAdapter, OpenAiConfig};
//! use selkie::provider::{InferenceAdapter, Message};
//!
//! # async fn example() -> selkie::Result<()> {
//! let config = OpenAiConfig::new("sk-...", "gpt-4o");
//! let adapter = OpenAiAdapter::new(config);
//!
//! let messages = vec![Message::user("Hello")];
//! let stream = adapter.stream(&messages, "You are helpful.", 0.6).await?;
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SelkieError};
use crate::provider::{DeltaStream, InferenceAdapter, Message};
use crate::providers::sse::SseDecoder;

/// Deadline for the request phase (headers received); streaming itself is
/// unbounded.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Configuration for the OpenAI-compatible adapter.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    /// The model to use.
    pub model: String,
}

impl OpenAiConfig {
    /// Create a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".into(),
            model: model.into(),
        }
    }

    /// Set a custom base URL (e.g. a local inference server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_key deliberately omitted.
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Build the JSON request body for a streaming chat completion.
pub fn build_chat_request(
    model: &str,
    messages: &[Message],
    system_prompt: &str,
    temperature: f64,
) -> serde_json::Value {
    let mut wire_messages = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        wire_messages.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));
    }
    for message in messages {
        wire_messages.push(serde_json::json!({
            "role": message.role.as_str(),
            "content": message.content,
        }));
    }

    serde_json::json!({
        "model": model,
        "messages": wire_messages,
        "temperature": temperature,
        "stream": true,
    })
}

/// Extract the text delta from one streamed completion chunk, if any.
fn extract_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(String::from)
}

/// Longest failure reason kept from a provider error body.
const MAX_ERROR_REASON: usize = 240;

/// Map an HTTP error status and response body to the appropriate error
/// variant.
///
/// A healthy gateway answers with a JSON envelope carrying a nested
/// message; a broken one may return HTML, proxy banners, or megabytes of
/// junk, so the raw-body fallback is trimmed and truncated before it ends
/// up in logs or on screen.
fn map_http_error(status: reqwest::StatusCode, body: &str) -> SelkieError {
    let reason = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(envelope) => match envelope.pointer("/error/message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => truncate_reason(body),
        },
        Err(_) => truncate_reason(body),
    };

    match status.as_u16() {
        401 | 403 => SelkieError::Auth(format!("provider rejected credentials: {reason}")),
        429 => SelkieError::Request(format!("provider rate limited: {reason}")),
        code => SelkieError::Provider(format!("provider HTTP {code}: {reason}")),
    }
}

/// Trim a raw error body down to something fit for a log line.
fn truncate_reason(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_REASON {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MAX_ERROR_REASON).collect();
    format!("{head} [truncated]")
}

/// The pump task and token for the stream currently in flight.
struct ActiveStream {
    token: CancellationToken,
    pump: tokio::task::JoinHandle<()>,
}

/// OpenAI-compatible streaming adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
    active: tokio::sync::Mutex<Option<ActiveStream>>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            active: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl InferenceAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: &str,
        temperature: f64,
    ) -> Result<DeltaStream> {
        let body = build_chat_request(&self.config.model, messages, system_prompt, temperature);
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let request_id = uuid::Uuid::new_v4();

        tracing::debug!(
            %request_id,
            model = %self.config.model,
            temperature,
            messages = messages.len(),
            "starting chat completion stream"
        );

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send();
        let response = tokio::time::timeout(REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| {
                SelkieError::Timeout(format!(
                    "no response headers within {}s",
                    REQUEST_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SelkieError::Request(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        let byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>> =
            Box::pin(response.bytes_stream());

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(32);
        let pump = tokio::spawn(pump_deltas(byte_stream, tx, token.clone()));

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            // A replaced stream is shut down before the new one is tracked.
            previous.token.cancel();
            let _ = previous.pump.await;
        }
        *active = Some(ActiveStream { token, pump });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn cancel(&self) {
        let taken = self.active.lock().await.take();
        if let Some(active) = taken {
            active.token.cancel();
            let _ = active.pump.await;
            tracing::debug!("active stream cancelled");
        }
    }
}

/// Read the HTTP byte stream, decode SSE frames, and forward text deltas
/// until the stream ends, errors, or the token is cancelled.
async fn pump_deltas(
    mut byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    tx: mpsc::Sender<Result<String>>,
    token: CancellationToken,
) {
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return,
            chunk = byte_stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.push(&bytes) {
                    if frame.is_done() {
                        return;
                    }
                    if let Some(delta) = extract_delta(&frame.data)
                        && !delta.is_empty()
                        && tx.send(Ok(delta)).await.is_err()
                    {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(SelkieError::StreamInterrupted(format!(
                        "stream read failed: {e}"
                    ))))
                    .await;
                return;
            }
            None => {
                if let Some(frame) = decoder.flush()
                    && !frame.is_done()
                    && let Some(delta) = extract_delta(&frame.data)
                    && !delta.is_empty()
                {
                    let _ = tx.send(Ok(delta)).await;
                }
                return;
            }
        }
    }
}
