//! Inline signal grammar: marker syntax, cognitive modes, and body parsing.
//!
//! The model embeds two marker forms in its output stream, each wrapped in
//! `<<` and `>>`:
//!
//! ```text
//! <<checkpoint:ID>>
//! <<backtrack:ID|REASON[|rephrase:TEXT][|mode:NAME][|temp:FLOAT]>>
//! ```
//!
//! The optional backtrack fields are unordered. An unknown field prefix
//! invalidates the whole marker; the streaming parser then emits it as
//! literal text instead of a signal.
//!
//! # Examples
//!
//! ```
//! use selkie::signal::grammar::{parse_backtrack_body, is_valid_signal_id};
//!
//! assert!(is_valid_signal_id("draft-2"));
//! assert!(!is_valid_signal_id("a|b"));
//!
//! let signal = parse_backtrack_body("intro|too verbose|mode:precise");
//! assert!(signal.is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opening delimiter for both marker forms.
pub const SIGNAL_OPEN: &str = "<<";

/// Closing delimiter for both marker forms.
pub const SIGNAL_CLOSE: &str = ">>";

/// Tag keyword introducing a checkpoint marker body.
pub const CHECKPOINT_TAG: &str = "checkpoint:";

/// Tag keyword introducing a backtrack marker body.
pub const BACKTRACK_TAG: &str = "backtrack:";

/// Maximum characters in a marker body after the tag keyword.
///
/// Exceeding this makes the streaming parser flush the buffered content as
/// literal text, bounding worst-case buffering for indefinite streams.
pub const MAX_SIGNAL_BODY: usize = 500;

/// Characters that may not appear in a signal ID (field separators and
/// delimiter characters).
const RESERVED_ID_CHARS: [char; 4] = ['|', '>', '<', ':'];

/// Whether `id` is a valid signal identifier.
///
/// Valid IDs are non-empty runs of printable characters excluding the
/// reserved separators and whitespace.
pub fn is_valid_signal_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !RESERVED_ID_CHARS.contains(&c))
}

/// A named generation preset the model may request as part of a backtrack.
///
/// Each mode maps to a default sampling temperature; an explicit `temp:`
/// field on the backtrack marker overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveMode {
    /// Low-temperature, deterministic output.
    Precise,
    /// Default balance of coherence and variety.
    #[default]
    Balanced,
    /// Critical re-examination of the abandoned path.
    Adversarial,
    /// High-temperature divergent output.
    Exploratory,
}

impl CognitiveMode {
    /// The built-in default temperature for this mode.
    pub fn default_temperature(self) -> f64 {
        match self {
            Self::Precise => 0.2,
            Self::Balanced => 0.6,
            Self::Adversarial => 0.7,
            Self::Exploratory => 0.9,
        }
    }

    /// Resolve a mode name as it appears in a `mode:` field.
    ///
    /// Returns `None` for unknown names; the orchestrator treats an unknown
    /// mode as absent rather than rejecting the marker.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "precise" => Some(Self::Precise),
            "balanced" => Some(Self::Balanced),
            "adversarial" => Some(Self::Adversarial),
            "exploratory" => Some(Self::Exploratory),
            _ => None,
        }
    }
}

impl fmt::Display for CognitiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precise => write!(f, "precise"),
            Self::Balanced => write!(f, "balanced"),
            Self::Adversarial => write!(f, "adversarial"),
            Self::Exploratory => write!(f, "exploratory"),
        }
    }
}

/// A parsed backtrack directive.
///
/// The `mode` field is carried as raw text: resolving it against the known
/// mode table is the orchestrator's concern, so an unknown mode name does
/// not invalidate the marker.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktrackSignal {
    /// The checkpoint to rewind to.
    pub id: String,
    /// Why the path after the checkpoint was abandoned.
    pub reason: String,
    /// Optional guidance on how to rephrase the retry.
    pub rephrase: Option<String>,
    /// Optional requested cognitive mode (raw, unresolved).
    pub mode: Option<String>,
    /// Optional temperature override, already range-checked to `[0.0, 1.0]`.
    pub temperature: Option<f64>,
}

/// An event emitted by the streaming signal parser, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// A contiguous run of user-visible characters.
    Text(String),
    /// A named rewind point.
    Checkpoint(String),
    /// A rewind directive.
    Backtrack(BacktrackSignal),
}

/// Parse the body of a checkpoint marker (the text after `checkpoint:`).
///
/// Returns `None` when the body is not a valid signal ID; the parser then
/// falls back to emitting the marker as literal text.
pub fn parse_checkpoint_body(body: &str) -> Option<SignalEvent> {
    if is_valid_signal_id(body) {
        Some(SignalEvent::Checkpoint(body.to_string()))
    } else {
        None
    }
}

/// Parse the body of a backtrack marker (the text after `backtrack:`).
///
/// The body is `ID|REASON` followed by optional `|`-separated fields, each
/// introduced by a known prefix. Returns `None` on any malformation: bad ID,
/// missing or empty reason, unknown field prefix, or a `temp:` value that
/// does not parse as a float. A `temp:` value that parses but falls outside
/// `[0.0, 1.0]` keeps the marker valid with the temperature discarded.
pub fn parse_backtrack_body(body: &str) -> Option<BacktrackSignal> {
    let mut parts = body.split('|');

    let id = parts.next()?;
    if !is_valid_signal_id(id) {
        return None;
    }

    let reason = parts.next()?;
    if reason.is_empty() {
        return None;
    }

    let mut rephrase = None;
    let mut mode = None;
    let mut temperature = None;

    for field in parts {
        if let Some(value) = field.strip_prefix("rephrase:") {
            rephrase = Some(value.to_string());
        } else if let Some(value) = field.strip_prefix("mode:") {
            mode = Some(value.to_string());
        } else if let Some(value) = field.strip_prefix("temp:") {
            let parsed: f64 = value.parse().ok()?;
            temperature = (0.0..=1.0).contains(&parsed).then_some(parsed);
        } else {
            // Unknown field prefix invalidates the whole marker.
            return None;
        }
    }

    Some(BacktrackSignal {
        id: id.to_string(),
        reason: reason.to_string(),
        rephrase,
        mode,
        temperature,
    })
}
