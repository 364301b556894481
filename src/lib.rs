//! riptide - streaming LLM chat backend
//!
//! One chat turn flows through: auth gate -> conversation store ->
//! stream orchestrator (model router + tool registry) -> SSE envelope
//! stream, optionally fronted by the resumable stream registry.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod core;
pub mod provider;
pub mod server;
pub mod store;
pub mod tools;
