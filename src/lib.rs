//! Selkie: cognitive backtracking for streaming LLM generation.
//!
//! An upstream model emits a token stream that may contain inline control
//! markers. Selkie intercepts those markers, strips them from user-visible
//! output, and — when a rewind marker is seen — cancels the active
//! generation, truncates the accumulated response back to a prior
//! checkpoint, and restarts generation from that point with an accumulated
//! hint telling the model why the previous path was abandoned.
//!
//! # Architecture
//!
//! Two subsystems form the core:
//!
//! - The [`signal`] module: a character-level state machine that separates
//!   ordinary text from embedded `<<checkpoint:...>>` / `<<backtrack:...>>`
//!   markers while the stream is still being produced, without buffering
//!   indefinitely and without mis-recognising ordinary text (e.g. C++ shift
//!   operators) as a marker.
//! - The [`engine`] module: an orchestrator that consumes parser events,
//!   maintains checkpoint state, enforces rewind budgets and marker spacing,
//!   prunes stale state on rewind, composes continuation requests, and
//!   drives a small set of callbacks to the surrounding application.
//!
//! Everything else is plumbing around them: the [`provider`] seam and its
//! [`providers`] implementations, the committed [`history`], and the
//! [`config`] bundle.
//!
//! # Errors
//!
//! [`SelkieError`] only covers failures that end a turn, split by the stage
//! the turn was in when it failed (configuration, request phase, or
//! mid-stream). Malformed markers and semantic violations never surface as
//! errors; the parser and orchestrator recover from them in place.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod provider;
pub mod providers;
pub mod signal;

pub use config::{ModeTemperatures, SelkieConfig, default_config_path, load_config};
pub use engine::{
    CONTINUE_PROMPT, CheckpointRecord, CheckpointStore, TurnEngine, TurnSink, build_system_prompt,
};
pub use error::{Result, SelkieError};
pub use history::ConversationHistory;
pub use provider::{DeltaStream, InferenceAdapter, Message, Role};
pub use providers::{OpenAiAdapter, OpenAiConfig};
pub use signal::{BacktrackSignal, CognitiveMode, SignalEvent, SignalParser};
