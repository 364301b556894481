//! Model-invocable tools.
//!
//! Tool failures never surface as request-level faults: every error is
//! returned to the model as a structured `{"error": …, "data": null}`
//! value so the model can recover or explain.

pub mod documents;
pub mod query;
pub mod suggestions;

use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chat::Emitter;
use crate::provider::{Provider, ToolDefinition};
use crate::store::ConversationStore;

/// Everything a tool execution may touch
pub struct ToolContext {
    pub store: ConversationStore,
    /// Dedicated pool for the read-only query tool; None when no tool
    /// database is configured.
    pub tool_db: Option<SqlitePool>,
    /// Artifact-model backend for document/suggestion generation
    pub artifact: Option<(String, Arc<dyn Provider>)>,
    pub emitter: Emitter,
    pub user_id: String,
}

/// Structured failure value returned to the model
pub(crate) fn tool_error(message: impl Into<String>) -> Value {
    json!({ "error": message.into(), "data": null })
}

pub struct Toolbox;

impl Toolbox {
    /// JSON-schema definitions advertised to the model
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "queryDatabase".into(),
                description: "Run a read-only SQL SELECT query against the application database \
                              and return the matching rows."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "A single SQL SELECT statement"
                        },
                        "description": {
                            "type": "string",
                            "description": "Human-readable description of what the query retrieves"
                        }
                    },
                    "required": ["query", "description"]
                }),
            },
            ToolDefinition {
                name: "createDocument".into(),
                description: "Create a document artifact (text, code, or sheet) that is shown \
                              to the user alongside the conversation."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "kind": { "type": "string", "enum": ["text", "code", "sheet"] }
                    },
                    "required": ["title", "kind"]
                }),
            },
            ToolDefinition {
                name: "updateDocument".into(),
                description: "Rewrite an existing document artifact following a description of \
                              the requested changes."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Id of the document to update" },
                        "description": { "type": "string" }
                    },
                    "required": ["id", "description"]
                }),
            },
            ToolDefinition {
                name: "requestSuggestions".into(),
                description: "Generate improvement suggestions for an existing document."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "documentId": { "type": "string" }
                    },
                    "required": ["documentId"]
                }),
            },
        ]
    }

    /// Execute a named tool. `raw_args` is the model-produced argument
    /// JSON; malformed input is a tool-level failure, not a crash.
    pub async fn execute(name: &str, raw_args: &str, ctx: &ToolContext) -> Value {
        debug!(tool = name, "executing tool");

        let args: Value = match serde_json::from_str(raw_args) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = name, error = %e, "malformed tool arguments");
                return tool_error(format!("invalid tool arguments: {e}"));
            }
        };

        match name {
            "queryDatabase" => query::run(&args, ctx).await,
            "createDocument" => documents::create(&args, ctx).await,
            "updateDocument" => documents::update(&args, ctx).await,
            "requestSuggestions" => suggestions::run(&args, ctx).await,
            other => tool_error(format!("unknown tool: {other}")),
        }
    }
}
