//! Think-tag extraction for reasoning model variants.
//!
//! Some upstream models interleave chain-of-thought inside
//! `<think>...</think>` spans of the ordinary text stream. This wrapper
//! re-emits those spans as `ReasoningDelta` events so downstream code
//! sees a clean text/reasoning split regardless of backend. Tags split
//! across chunk boundaries are buffered until they resolve.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ChatRequest, ChatResponse, Provider, StreamEvent, ToolContinueRequest};

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Wrap a backend so `<think>` spans surface as reasoning events.
pub fn with_reasoning_extraction(inner: Arc<dyn Provider>) -> Arc<dyn Provider> {
    Arc::new(ReasoningExtractor { inner })
}

struct ReasoningExtractor {
    inner: Arc<dyn Provider>,
}

#[derive(Debug, PartialEq)]
enum Span {
    Text(String),
    Reasoning(String),
}

/// Incremental `<think>` tag scanner.
///
/// Holds back any trailing bytes that could be the start of the next
/// expected tag, so a tag arriving as `<th` + `ink>` still matches.
#[derive(Default)]
struct TagScanner {
    in_reasoning: bool,
    pending: String,
}

impl TagScanner {
    fn feed(&mut self, chunk: &str) -> Vec<Span> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();

        loop {
            let tag = if self.in_reasoning { CLOSE_TAG } else { OPEN_TAG };

            if let Some(idx) = self.pending.find(tag) {
                if idx > 0 {
                    out.push(self.span(self.pending[..idx].to_string()));
                }
                self.pending.drain(..idx + tag.len());
                self.in_reasoning = !self.in_reasoning;
                continue;
            }

            let hold = partial_suffix_len(&self.pending, tag);
            let emit_len = self.pending.len() - hold;
            if emit_len > 0 {
                let emitted: String = self.pending.drain(..emit_len).collect();
                out.push(self.span(emitted));
            }
            break;
        }

        out
    }

    /// Emit whatever is still buffered, in the current mode. Called at
    /// end of stream; an unterminated partial tag is surfaced as text.
    fn flush(&mut self) -> Option<Span> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(self.span(rest))
    }

    fn span(&self, s: String) -> Span {
        if self.in_reasoning {
            Span::Reasoning(s)
        } else {
            Span::Text(s)
        }
    }
}

/// Length of the longest proper suffix of `s` that is a prefix of `tag`
fn partial_suffix_len(s: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(s.len());
    for k in (1..=max).rev() {
        if s.ends_with(&tag[..k]) {
            return k;
        }
    }
    0
}

fn spawn_extraction(mut rx: mpsc::Receiver<StreamEvent>) -> mpsc::Receiver<StreamEvent> {
    let (tx, out_rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut scanner = TagScanner::default();

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    for span in scanner.feed(&delta) {
                        let mapped = match span {
                            Span::Text(s) => StreamEvent::TextDelta(s),
                            Span::Reasoning(s) => StreamEvent::ReasoningDelta(s),
                        };
                        let _ = tx.send(mapped).await;
                    }
                }
                StreamEvent::Done => {
                    if let Some(span) = scanner.flush() {
                        let mapped = match span {
                            Span::Text(s) => StreamEvent::TextDelta(s),
                            Span::Reasoning(s) => StreamEvent::ReasoningDelta(s),
                        };
                        let _ = tx.send(mapped).await;
                    }
                    let _ = tx.send(StreamEvent::Done).await;
                }
                other => {
                    let _ = tx.send(other).await;
                }
            }
        }
    });

    out_rx
}

/// Split a complete text into (visible text, reasoning) for the
/// non-streaming path.
fn extract_from_text(text: &str) -> (String, Option<String>) {
    let mut scanner = TagScanner::default();
    let mut visible = String::new();
    let mut reasoning = String::new();

    let mut spans = scanner.feed(text);
    if let Some(tail) = scanner.flush() {
        spans.push(tail);
    }
    for span in spans {
        match span {
            Span::Text(s) => visible.push_str(&s),
            Span::Reasoning(s) => reasoning.push_str(&s),
        }
    }

    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning)
    };
    (visible, reasoning)
}

#[async_trait]
impl Provider for ReasoningExtractor {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let rx = self.inner.create_stream(request).await?;
        Ok(spawn_extraction(rx))
    }

    async fn create(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut response = self.inner.create(request).await?;
        if response.reasoning.is_none() {
            let (text, reasoning) = extract_from_text(&response.text);
            response.text = text;
            response.reasoning = reasoning;
        }
        Ok(response)
    }

    async fn continue_with_tools_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let rx = self.inner.continue_with_tools_stream(request).await?;
        Ok(spawn_extraction(rx))
    }
}
