//! Per-turn run state.
//!
//! A [`RunContext`] is created fresh at the start of each user turn and
//! discarded when the turn completes. It carries the two response
//! accumulators, the checkpoint store, the hints gathered from honoured
//! backtracks, and the budget counters.
//!
//! The visible accumulator is what the user sees; the raw accumulator is the
//! same text with checkpoint markers preserved, shown only to the model when
//! a continuation request is composed.

use crate::config::ModeTemperatures;
use crate::signal::grammar::{BacktrackSignal, CHECKPOINT_TAG, CognitiveMode, SIGNAL_CLOSE, SIGNAL_OPEN};

use super::checkpoints::{CheckpointRecord, CheckpointStore};

/// Transient state for one user turn.
#[derive(Debug)]
pub struct RunContext {
    /// User-visible response text accumulated so far.
    pub visible: String,
    /// Response text with checkpoint markers preserved verbatim.
    pub raw: String,
    /// Checkpoints registered during this turn.
    pub checkpoints: CheckpointStore,
    /// Reasons from honoured backtracks, in order.
    pub hints: Vec<String>,
    /// Current cognitive mode.
    pub mode: CognitiveMode,
    /// Explicit temperature override from the latest honoured backtrack.
    pub temperature_override: Option<f64>,
    /// Honoured rewinds so far.
    pub rewinds_used: u32,
    /// Characters of visible text since the last marker (checkpoint or
    /// honoured backtrack).
    pub chars_since_marker: usize,
}

impl RunContext {
    /// Create the context for a fresh turn.
    ///
    /// The spacing counter starts saturated so the first checkpoint of the
    /// turn is always eligible.
    pub fn new(mode: CognitiveMode, min_spacing: usize) -> Self {
        Self {
            visible: String::new(),
            raw: String::new(),
            checkpoints: CheckpointStore::new(),
            hints: Vec::new(),
            mode,
            temperature_override: None,
            rewinds_used: 0,
            chars_since_marker: min_spacing,
        }
    }

    /// Append a run of visible text to both accumulators.
    pub fn append_text(&mut self, text: &str) {
        self.visible.push_str(text);
        self.raw.push_str(text);
        self.chars_since_marker = self
            .chars_since_marker
            .saturating_add(text.chars().count());
    }

    /// Register a checkpoint marker, unless it violates the spacing policy.
    ///
    /// On registration the literal marker is appended to the raw accumulator
    /// only, and the recorded raw prefix includes it, so a later continuation
    /// context still shows the model every checkpoint it can rewind to.
    /// Returns whether the checkpoint was registered.
    pub fn register_checkpoint(&mut self, id: &str, min_spacing: usize) -> bool {
        if self.chars_since_marker < min_spacing {
            tracing::debug!(
                id,
                chars_since_marker = self.chars_since_marker,
                min_spacing,
                "checkpoint too close to last marker, ignored"
            );
            return false;
        }
        self.raw
            .push_str(&format!("{SIGNAL_OPEN}{CHECKPOINT_TAG}{id}{SIGNAL_CLOSE}"));
        self.checkpoints
            .register(id, self.visible.clone(), self.raw.clone());
        self.chars_since_marker = 0;
        true
    }

    /// Apply an honoured backtrack: truncate both accumulators to the
    /// checkpoint, prune later checkpoints, record the hint, and adopt the
    /// requested mode and temperature.
    ///
    /// An unknown mode name is treated as absent. The temperature override
    /// is replaced wholesale: a backtrack without a `temp:` field falls back
    /// to deriving from the (possibly updated) mode.
    pub fn rewind_to(&mut self, record: &CheckpointRecord, signal: &BacktrackSignal) {
        self.visible = record.visible_prefix.clone();
        self.raw = record.raw_prefix.clone();
        self.checkpoints.prune_after(record.position);
        self.hints.push(signal.reason.clone());
        if let Some(mode) = signal.mode.as_deref().and_then(CognitiveMode::from_name) {
            self.mode = mode;
        }
        self.temperature_override = signal.temperature.filter(|t| (0.0..=1.0).contains(t));
        self.rewinds_used += 1;
        self.chars_since_marker = 0;
    }

    /// The temperature for the next generation: the explicit override when
    /// present, otherwise the configured temperature of the current mode.
    pub fn effective_temperature(&self, table: &ModeTemperatures) -> f64 {
        self.temperature_override
            .unwrap_or_else(|| table.for_mode(self.mode))
    }
}
