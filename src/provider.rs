//! Inference adapter trait and message types.
//!
//! Defines the [`InferenceAdapter`] contract every LLM backend satisfies:
//! open a streaming generation that yields plain text deltas, and cancel the
//! active stream on demand. The orchestrator consumes this trait only; test
//! doubles satisfy it by yielding a scripted list of deltas and recording
//! cancel calls.
//!
//! # Examples
//!
//! ```rust,no_run
//! use selkie::provider::{InferenceAdapter, Message};
//!
//! async fn example(adapter: &dyn InferenceAdapter) {
//!     let messages = vec![Message::user("Hello")];
//!     let stream = adapter.stream(&messages, "You are helpful.", 0.6).await;
//! }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Role in a conversation.
///
/// The system prompt travels out-of-band on [`InferenceAdapter::stream`],
/// so only the two conversational roles exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The wire-format name of this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A boxed stream of text deltas from an active generation.
///
/// Items are `Ok(delta)` for generated text and `Err` for a provider
/// failure that terminates the stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for streaming LLM backends.
///
/// Implementations normalize their provider API into plain text deltas;
/// structured provider events never cross this seam.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Returns the adapter name (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Open a streaming generation.
    ///
    /// # Arguments
    ///
    /// * `messages` — The conversation to continue
    /// * `system_prompt` — System instructions, carried out-of-band
    /// * `temperature` — Sampling temperature for this generation
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be initiated (auth, network,
    /// HTTP status). Failures after the stream opens are delivered as `Err`
    /// items on the stream itself.
    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: &str,
        temperature: f64,
    ) -> Result<DeltaStream>;

    /// Cancel the currently active stream.
    ///
    /// Must complete the underlying shutdown before returning, so a caller
    /// may immediately start a new stream. Safe to call when no stream is
    /// active.
    async fn cancel(&self);
}
