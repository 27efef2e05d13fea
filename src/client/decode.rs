//! Decoding of the relay's newline-delimited reply stream.
//!
//! Each line is normally a JSON fragment object, but the decoder is lenient:
//! a bare JSON string is taken as-is and a line that is not JSON at all is
//! shown literally rather than dropped.

use bytes::{Buf, BytesMut};
use serde_json::Value;

/// One decoded line of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// Text extracted from a JSON value (possibly empty).
    Parsed(String),
    /// A line that was not JSON (or was `null`), trimmed.
    Literal(String),
}

impl DecodedLine {
    /// Text to append to the reply.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Parsed(text) | Self::Literal(text) => text,
        }
    }
}

/// Decode a single line. Blank lines yield `None`.
#[must_use]
pub fn decode_line(line: &str) -> Option<DecodedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let decoded = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(text)) => DecodedLine::Parsed(text),
        Ok(Value::Object(map)) => {
            let text = ["text", "content"]
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .find(|text| !text.is_empty())
                .unwrap_or_default();
            DecodedLine::Parsed(text.to_string())
        }
        // A null has no fields to read, so it is shown like any non-JSON line.
        Ok(Value::Null) | Err(_) => DecodedLine::Literal(trimmed.to_string()),
        Ok(_) => DecodedLine::Parsed(String::new()),
    };
    Some(decoded)
}

/// Splits a byte stream into lines, holding partial lines between chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            if let Some(decoded) = decode_line(&String::from_utf8_lossy(&line)) {
                lines.push(decoded);
            }
        }
        lines
    }

    /// Decode whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<DecodedLine> {
        let rest = self.buffer.split();
        decode_line(&String::from_utf8_lossy(&rest))
    }
}
