//! HTTP API support types

pub mod error;

pub use error::{ChatError, ChatResult};
