//! Inline control-signal grammar and streaming parser.
//!
//! The model's output stream may contain two marker forms that must never
//! reach the user: `<<checkpoint:ID>>` names a rewind point and
//! `<<backtrack:...>>` requests a rewind to one. This module defines the
//! grammar and the character-level parser that separates markers from text
//! while the stream is still arriving.
//!
//! # Submodules
//!
//! - [`grammar`] — Marker syntax, ID validation, cognitive modes, body parsing
//! - [`parser`] — Incremental four-state parser with `push`/`flush`

pub mod grammar;
pub mod parser;

pub use grammar::{BacktrackSignal, CognitiveMode, SignalEvent};
pub use parser::SignalParser;
