//! Small shared primitives: SSE wire decoding and output smoothing.

pub mod chunking;
pub mod streaming;

pub use chunking::WordChunker;
pub use streaming::{SseDecoder, SseFrame};
