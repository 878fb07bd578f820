//! Line framing for `text/event-stream` completion bodies.
//!
//! Chunks from the transport arrive at arbitrary boundaries, so bytes are
//! buffered until a full newline-terminated line is available. Only lines
//! carrying the `data: ` marker produce frames; `[DONE]` ends the stream.

use log::debug;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    Data(String),
    Terminator,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feeds one transport chunk and returns every frame completed by it.
    ///
    /// Once a `Terminator` has been produced, further input is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.terminated {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line) {
                frames.push(frame);
                if self.terminated {
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.terminated || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamFrame> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            debug!("Skipping non-data line: {}", line);
            return None;
        };
        if payload == DONE_SENTINEL {
            self.terminated = true;
            return Some(StreamFrame::Terminator);
        }
        Some(StreamFrame::Data(payload.to_string()))
    }
}

/// Decodes a complete body in one pass.
pub fn decode_all(body: &[u8]) -> Vec<StreamFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.push(body);
    frames.extend(decoder.finish());
    frames
}
