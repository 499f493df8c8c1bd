//! Failure taxonomy.
//!
//! Only failures that end a turn (or prevent startup) live here. Marker
//! problems never do: the signal parser swallows malformed markers by
//! emitting them as literal text, and the orchestrator ignores semantic
//! violations (unknown checkpoint, exhausted rewind budget) while the
//! stream keeps flowing. Cancellation is likewise absent: it is the normal
//! mechanism that ends an inner stream on a rewind, not an error.
//!
//! What remains is split by the stage a turn was in when it failed:
//! configuration problems surface at startup, [`Auth`], [`Request`], and
//! [`Timeout`] happen before the first delta arrives, and
//! [`StreamInterrupted`] happens after streaming has begun — the one case
//! where the user may already have seen part of a response that the
//! rolled-back turn no longer backs.
//!
//! [`Auth`]: SelkieError::Auth
//! [`Request`]: SelkieError::Request
//! [`Timeout`]: SelkieError::Timeout
//! [`StreamInterrupted`]: SelkieError::StreamInterrupted

/// A failure that ends a turn or prevents startup.
#[derive(Debug, thiserror::Error)]
pub enum SelkieError {
    /// The settings bundle could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The provider rejected the request's credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The generation request failed before any delta arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The request phase exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// An open stream broke after deltas had started arriving.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// A provider response that fits none of the cases above.
    #[error("provider error: {0}")]
    Provider(String),
}

impl SelkieError {
    /// Whether the failure happened after the provider had begun streaming.
    ///
    /// When true, the application may already have rendered partial text
    /// for the turn that was just rolled back and should treat the visible
    /// response as abandoned rather than merely missing.
    pub fn occurred_mid_stream(&self) -> bool {
        matches!(self, Self::StreamInterrupted(_))
    }
}

/// Convenience alias for selkie results.
pub type Result<T> = std::result::Result<T, SelkieError>;
