//! Incremental Server-Sent Events decoding for streamed chat responses.
//!
//! The gateway streams completions as `text/event-stream`: colon-separated
//! fields, one per line, with a blank line closing each event and the payload
//! carried in `data:` lines. [`SseParser`] consumes the body as it arrives:
//! [`SseParser::feed`] accepts any byte split and yields the data payload of
//! every event the chunk completes, so chunk boundaries never change the
//! decoded output. Lines are buffered as bytes and only decoded once
//! complete, which keeps multi-byte UTF-8 characters intact across reads.
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hi"}}]}
//!
//! data: [DONE]
//! ```

/// Sentinel payload that ends a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental SSE decoder with `feed(chunk)` semantics.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Bytes of the line currently being received.
    line: Vec<u8>,
    /// `data:` values of the event currently being received.
    data_lines: Vec<String>,
}

impl SseParser {
    /// Create a new incremental parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of body bytes into the parser.
    ///
    /// Returns the data payloads of all events completed by this chunk, in
    /// order. Multiple `data:` lines within one event are joined with `\n`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.line);
                if let Some(payload) = self.end_line(&raw) {
                    payloads.push(payload);
                }
            } else {
                self.line.push(byte);
            }
        }

        payloads
    }

    /// Flush the parser at end of stream.
    ///
    /// Emits the payload of a trailing event that was never closed by a
    /// blank line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if !self.line.is_empty() {
            let raw = std::mem::take(&mut self.line);
            self.end_line(&raw);
        }
        if self.data_lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data_lines).join("\n"))
        }
    }

    /// Handle one completed line. Returns an event payload when the line is
    /// the blank event boundary and data has accumulated.
    fn end_line(&mut self, raw: &[u8]) -> Option<String> {
        // Tolerate CRLF framing.
        let raw = match raw.last() {
            Some(b'\r') => &raw[..raw.len() - 1],
            _ => raw,
        };
        let line = String::from_utf8_lossy(raw);

        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data_lines).join("\n"));
        }

        // Comment line.
        if line.starts_with(':') {
            return None;
        }

        if let Some((field, value)) = split_field(&line)
            && field == "data"
        {
            self.data_lines.push(value.to_owned());
        }
        // event:/id:/retry: fields carry nothing the chat stream uses.

        None
    }
}

/// Split a line into (field, value), stripping the single optional space
/// after the colon.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let field = &line[..colon];
    let value = line[colon + 1..].strip_prefix(' ').unwrap_or(&line[colon + 1..]);
    Some((field, value))
}
