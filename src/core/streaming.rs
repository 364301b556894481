//! SSE (Server-Sent Events) decoding for upstream provider streams.
//!
//! Providers deliver chat completions as `data: <json>` lines over a
//! chunked body; chunk boundaries fall anywhere, so the decoder buffers
//! partial lines between pushes. The buffer is bounded so a malformed
//! stream cannot grow it without limit.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    // 1MB cap; past this the oldest half is discarded.
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes, returning every complete `data:` frame.
    /// Incomplete trailing data stays buffered for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!(
                "SSE buffer exceeded {}KB, discarding oldest half",
                Self::MAX_BUFFER_SIZE / 1024
            );
            let mut keep_from = self.buffer.len() - Self::MAX_BUFFER_SIZE / 2;
            // drain must not split a multibyte character
            while !self.buffer.is_char_boundary(keep_from) {
                keep_from -= 1;
            }
            self.buffer.drain(..keep_from);
        }

        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();

            if let Some(data) = line.strip_prefix("data:") {
                frames.push(SseFrame {
                    data: data.trim_start().to_string(),
                });
            }
            // event:/id:/retry: lines carry nothing we consume
        }

        frames
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// One complete `data:` line, prefix stripped.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    /// The OpenAI-style end-of-stream sentinel
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data)
            .map_err(|e| anyhow::anyhow!("SSE JSON parse error: {e}. Data: {}", self.preview()))
    }

    /// Parse as JSON, swallowing frames that are not valid payloads
    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }

    fn preview(&self) -> &str {
        let end = self
            .data
            .char_indices()
            .nth(200)
            .map(|(i, _)| i)
            .unwrap_or(self.data.len());
        &self.data[..end]
    }
}
