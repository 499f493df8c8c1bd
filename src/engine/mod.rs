//! Turn orchestration: checkpoints, run state, prompts, and the processor.
//!
//! # Architecture
//!
//! ```text
//! TurnEngine
//!   +-- SelkieConfig (budgets, spacing, temperatures)
//!   +-- InferenceAdapter (streaming LLM backend)
//!   +-- ConversationHistory (committed turns)
//!   +-- per turn: RunContext (accumulators, CheckpointStore, hints)
//! ```
//!
//! # Submodules
//!
//! - [`checkpoints`] — In-response checkpoint registry
//! - [`context`] — Per-turn run state and rewind mechanics
//! - [`prompt`] — System prompt construction and hint sanitisation
//! - [`processor`] — The retry loop driving inference, parsing, and callbacks

pub mod checkpoints;
pub mod context;
pub mod processor;
pub mod prompt;

pub use checkpoints::{CheckpointRecord, CheckpointStore};
pub use context::RunContext;
pub use processor::{CONTINUE_PROMPT, TurnEngine, TurnSink};
pub use prompt::{build_system_prompt, sanitize_hint};
