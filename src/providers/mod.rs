//! Inference adapter implementations.
//!
//! Each submodule implements the
//! [`InferenceAdapter`](crate::provider::InferenceAdapter) trait for a
//! specific backend, normalizing its streaming wire format to plain text
//! deltas.
//!
//! # Available adapters
//!
//! - [`openai`] — OpenAI-compatible `/v1/chat/completions` endpoints
//!   (hosted or local)
//! - [`sse`] — Shared Server-Sent Events decoding

pub mod openai;
pub mod sse;

pub use openai::{OpenAiAdapter, OpenAiConfig};
