//! Decoder for the `POST /threads/message` response body.
//!
//! DESIGN
//! ======
//! The backend frames events as `data: <json>\n\n`. Bytes arrive in arbitrary
//! chunks, so the decoder keeps the trailing partial line between pushes and
//! only decodes complete lines. A line that fails to parse is logged and
//! skipped; it never poisons the rest of the stream.

use serde::{Deserialize, Serialize};

const DATA_PREFIX: &str = "data: ";

/// One decoded event from the chat stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A content delta from one agent.
    #[serde(rename = "message")]
    Message {
        agent_code: String,
        #[serde(default)]
        content: String,
        /// Running token count for this agent's reply, not a delta.
        #[serde(default)]
        tokens: u64,
        #[serde(default)]
        created_date: Option<String>,
    },

    /// No more deltas for the current reply.
    #[serde(rename = "stream_end")]
    StreamEnd,

    /// Any event type this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Incremental line decoder. Feed it chunks with [`SseDecoder::push`].
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the trailing line once the body has closed.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    /// Number of malformed lines skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let Ok(line) = std::str::from_utf8(raw) else {
            self.skipped += 1;
            tracing::warn!(len = raw.len(), "skipping stream line with invalid utf-8");
            return None;
        };
        let payload = line.strip_prefix(DATA_PREFIX)?;
        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, payload, "skipping malformed stream chunk");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;
