//! Improvement suggestions for persisted documents.

use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::chat::ChatEvent;
use crate::provider::{ChatRequest, MessageRole, ProviderMessage};
use crate::store::{Suggestion, now_ms};

use super::{ToolContext, tool_error};

const SYSTEM_PROMPT: &str =
    "You review documents and propose targeted improvements. Respond with a JSON array only; \
     each element is an object with keys \"originalText\", \"suggestedText\" and \
     \"description\". Propose at most five suggestions.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedSuggestion {
    original_text: String,
    suggested_text: String,
    description: String,
}

pub async fn run(args: &Value, ctx: &ToolContext) -> Value {
    let Some(document_id) = args.get("documentId").and_then(Value::as_str) else {
        return tool_error("missing required argument: documentId");
    };

    let document = match ctx.store.get_document(document_id).await {
        Ok(d) => d,
        Err(_) => return tool_error(format!("document not found: {document_id}")),
    };
    if document.user_id != ctx.user_id {
        return tool_error("document belongs to another user");
    }

    let Some((model, backend)) = ctx.artifact.as_ref() else {
        return tool_error("no artifact backend is configured");
    };

    let request = ChatRequest::new(model, SYSTEM_PROMPT).with_messages(vec![ProviderMessage {
        role: MessageRole::User,
        content: document.content.clone(),
    }]);

    let response = match backend.create(request).await {
        Ok(r) => r,
        Err(e) => return tool_error(format!("suggestion generation failed: {e}")),
    };

    let proposed: Vec<ProposedSuggestion> = match parse_suggestions(&response.text) {
        Ok(p) => p,
        Err(e) => return tool_error(format!("could not parse suggestions: {e}")),
    };

    let suggestions: Vec<Suggestion> = proposed
        .into_iter()
        .map(|p| Suggestion {
            id: Uuid::new_v4().to_string(),
            document_id: document.id.clone(),
            original_text: p.original_text,
            suggested_text: p.suggested_text,
            description: Some(p.description),
            is_resolved: false,
            created_at: now_ms(),
        })
        .collect();

    if let Err(e) = ctx.store.save_suggestions(&suggestions).await {
        return tool_error(format!("failed to save suggestions: {e}"));
    }

    for s in &suggestions {
        ctx.emitter
            .send(ChatEvent::Suggestion {
                document_id: s.document_id.clone(),
                description: s.description.clone().unwrap_or_default(),
            })
            .await;
    }

    json!({
        "id": document.id,
        "title": document.title,
        "kind": document.kind.as_str(),
        "message": "Suggestions have been added to the document."
    })
}

/// Models often wrap JSON in a code fence; strip it before parsing.
fn parse_suggestions(raw: &str) -> Result<Vec<ProposedSuggestion>, serde_json::Error> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    serde_json::from_str(trimmed.trim())
}
