//! Streaming signal parser.
//!
//! A four-state, character-level machine that separates ordinary text from
//! embedded control markers while the stream is still being produced. Feed
//! arbitrarily chunked input via [`SignalParser::push`] and collect emitted
//! [`SignalEvent`]s; call [`SignalParser::flush`] at end-of-stream to emit
//! any partially buffered content as literal text.
//!
//! The parser never raises to its caller: malformed markers, unknown field
//! prefixes, and over-long bodies all degrade to literal text. Buffering is
//! bounded by the tag keyword plus the body cap, so the machine is safe for
//! indefinite streams.
//!
//! Recognition is deliberately strict: after `<<`, every subsequent
//! character must extend a prefix of `checkpoint:` or `backtrack:`, so
//! ordinary text such as `std::cout << "x"` is classified as text within a
//! couple of characters.
//!
//! # Examples
//!
//! ```
//! use selkie::signal::parser::SignalParser;
//! use selkie::signal::grammar::SignalEvent;
//!
//! let mut parser = SignalParser::new();
//! let events = parser.push("<<checkpoint:a>>Hello");
//! assert_eq!(
//!     events,
//!     vec![
//!         SignalEvent::Checkpoint("a".into()),
//!         SignalEvent::Text("Hello".into()),
//!     ]
//! );
//! assert!(parser.flush().is_empty());
//! ```

use super::grammar::{
    BACKTRACK_TAG, CHECKPOINT_TAG, MAX_SIGNAL_BODY, SIGNAL_OPEN, SignalEvent, parse_backtrack_body,
    parse_checkpoint_body,
};

/// Which marker form the parser is currently buffering a body for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalKind {
    Checkpoint,
    Backtrack,
}

impl SignalKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Checkpoint => CHECKPOINT_TAG,
            Self::Backtrack => BACKTRACK_TAG,
        }
    }
}

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Scanning ordinary text.
    Text,
    /// Saw a single `<`; it may open a marker or be plain text.
    MaybeOpen,
    /// Saw `<<`; matching the following characters against the tag keywords.
    TagCheck,
    /// Matched a full tag keyword; buffering the marker body.
    InSignal(SignalKind),
}

/// Collects text characters and completed events for one `push` call,
/// coalescing adjacent text into a single [`SignalEvent::Text`].
#[derive(Debug, Default)]
struct Emitted {
    text: String,
    events: Vec<SignalEvent>,
}

impl Emitted {
    fn text_char(&mut self, c: char) {
        self.text.push(c);
    }

    fn text_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn event(&mut self, event: SignalEvent) {
        if !self.text.is_empty() {
            self.events
                .push(SignalEvent::Text(std::mem::take(&mut self.text)));
        }
        self.events.push(event);
    }

    fn finish(mut self) -> Vec<SignalEvent> {
        if !self.text.is_empty() {
            self.events
                .push(SignalEvent::Text(std::mem::take(&mut self.text)));
        }
        self.events
    }
}

/// Incremental marker parser over a character stream.
///
/// State survives across `push` calls, so markers split across chunk
/// boundaries are recognised identically to unsplit input.
#[derive(Debug)]
pub struct SignalParser {
    state: ParseState,
    /// Characters matched so far against a tag keyword (after `<<`).
    tag: String,
    /// Marker body accumulated after a matched tag keyword.
    body: String,
    /// Character count of `body` (tracked to avoid re-counting per char).
    body_chars: usize,
}

impl SignalParser {
    /// Create a parser in the initial text state.
    pub fn new() -> Self {
        Self {
            state: ParseState::Text,
            tag: String::new(),
            body: String::new(),
            body_chars: 0,
        }
    }

    /// Feed a chunk of input, returning the events it completes.
    ///
    /// Text is coalesced per chunk: adjacent visible characters arrive as a
    /// single [`SignalEvent::Text`]. Partially matched markers stay buffered
    /// for the next chunk.
    pub fn push(&mut self, chunk: &str) -> Vec<SignalEvent> {
        let mut out = Emitted::default();
        for c in chunk.chars() {
            self.step(c, &mut out);
        }
        out.finish()
    }

    /// Emit any partially buffered content as literal text.
    ///
    /// Call at end-of-stream. A second flush emits nothing additional.
    pub fn flush(&mut self) -> Vec<SignalEvent> {
        let mut out = Emitted::default();
        match std::mem::replace(&mut self.state, ParseState::Text) {
            ParseState::Text => {}
            ParseState::MaybeOpen => out.text_char('<'),
            ParseState::TagCheck => {
                out.text_str(SIGNAL_OPEN);
                out.text_str(&std::mem::take(&mut self.tag));
            }
            ParseState::InSignal(kind) => {
                out.text_str(SIGNAL_OPEN);
                out.text_str(kind.tag());
                out.text_str(&std::mem::take(&mut self.body));
                self.body_chars = 0;
            }
        }
        out.finish()
    }

    /// Advance the machine by one character.
    fn step(&mut self, c: char, out: &mut Emitted) {
        match self.state {
            ParseState::Text => {
                if c == '<' {
                    self.state = ParseState::MaybeOpen;
                } else {
                    out.text_char(c);
                }
            }
            ParseState::MaybeOpen => {
                if c == '<' {
                    self.state = ParseState::TagCheck;
                    self.tag.clear();
                } else {
                    out.text_char('<');
                    out.text_char(c);
                    self.state = ParseState::Text;
                }
            }
            ParseState::TagCheck => {
                if self.tag.is_empty() && c == '<' {
                    // `<<<`: the leading `<` is plain text and the trailing
                    // pair remains a live opener.
                    out.text_char('<');
                    return;
                }
                self.tag.push(c);
                if self.tag == CHECKPOINT_TAG {
                    self.begin_body(SignalKind::Checkpoint);
                } else if self.tag == BACKTRACK_TAG {
                    self.begin_body(SignalKind::Backtrack);
                } else if CHECKPOINT_TAG.starts_with(self.tag.as_str())
                    || BACKTRACK_TAG.starts_with(self.tag.as_str())
                {
                    // Still a viable keyword prefix; keep matching.
                } else {
                    // Diverged from both keywords: everything buffered is
                    // text, and the diverging character is reprocessed so a
                    // `<` can open a fresh candidate.
                    self.tag.pop();
                    out.text_str(SIGNAL_OPEN);
                    let stalled = std::mem::take(&mut self.tag);
                    out.text_str(&stalled);
                    self.state = ParseState::Text;
                    self.step(c, out);
                }
            }
            ParseState::InSignal(kind) => {
                if c == '>' && self.body.ends_with('>') {
                    self.body.pop();
                    let body = std::mem::take(&mut self.body);
                    self.body_chars = 0;
                    self.state = ParseState::Text;
                    self.finish_signal(kind, &body, out);
                } else {
                    self.body.push(c);
                    self.body_chars += 1;
                    // A trailing `>` one past the cap may still be the first
                    // half of the closing delimiter; hold judgement for one
                    // more character.
                    let pending_close =
                        self.body_chars == MAX_SIGNAL_BODY + 1 && self.body.ends_with('>');
                    if self.body_chars > MAX_SIGNAL_BODY && !pending_close {
                        out.text_str(SIGNAL_OPEN);
                        out.text_str(kind.tag());
                        let body = std::mem::take(&mut self.body);
                        out.text_str(&body);
                        self.body_chars = 0;
                        self.state = ParseState::Text;
                    }
                }
            }
        }
    }

    fn begin_body(&mut self, kind: SignalKind) {
        self.state = ParseState::InSignal(kind);
        self.body.clear();
        self.body_chars = 0;
    }

    /// Validate a completed marker body and emit the signal, or the original
    /// marker text when the body is malformed.
    fn finish_signal(&self, kind: SignalKind, body: &str, out: &mut Emitted) {
        match kind {
            SignalKind::Checkpoint => match parse_checkpoint_body(body) {
                Some(event) => out.event(event),
                None => out.text_str(&format!("{SIGNAL_OPEN}{CHECKPOINT_TAG}{body}>>")),
            },
            SignalKind::Backtrack => match parse_backtrack_body(body) {
                Some(signal) => out.event(SignalEvent::Backtrack(signal)),
                None => out.text_str(&format!("{SIGNAL_OPEN}{BACKTRACK_TAG}{body}>>")),
            },
        }
    }
}

impl Default for SignalParser {
    fn default() -> Self {
        Self::new()
    }
}
