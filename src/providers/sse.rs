//! Server-Sent Events decoding for streaming chat completions.
//!
//! A minimal incremental SSE decoder: feed raw response bytes via
//! [`SseDecoder::push`], collect complete `data:` frames, and [`flush`]
//! trailing state when the connection closes. Comment lines and unknown
//! fields are skipped; multiple `data:` lines in one frame are joined with
//! `\n` per the SSE spec.
//!
//! # Examples
//!
//! ```
//! use selkie::providers::sse::SseDecoder;
//!
//! let mut decoder = SseDecoder::new();
//! let frames = decoder.push(b"data: {\"text\":\"hi\"}\n\n");
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].data, "{\"text\":\"hi\"}");
//! ```

/// A complete SSE frame's data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The payload from the frame's `data:` line(s), joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Whether this frame is the `[DONE]` end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder with internal line-buffer state.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: String,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of response bytes, returning any frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let text = String::from_utf8_lossy(chunk);
        let mut frames = Vec::new();

        for c in text.chars() {
            if c == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(frame) = self.take_line(line) {
                    frames.push(frame);
                }
            } else {
                self.line_buffer.push(c);
            }
        }

        frames
    }

    /// Emit any buffered frame when the stream ends without a final blank line.
    pub fn flush(&mut self) -> Option<SseFrame> {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            let _ = self.take_line(line);
        }
        self.build_frame()
    }

    /// Process a complete line; a blank line terminates the current frame.
    fn take_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.build_frame();
        }
        // Comment line per the SSE spec.
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data_lines.push(value.to_string());
        }
        // Unknown fields (event:, id:, retry:) are ignored.
        None
    }

    fn build_frame(&mut self) -> Option<SseFrame> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(SseFrame {
            data: std::mem::take(&mut self.data_lines).join("\n"),
        })
    }
}
