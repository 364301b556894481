//! Document artifact tools.
//!
//! Content generation is delegated to the family's artifact backend;
//! progress streams through the turn's shared emitter as `document-*`
//! events so the client renders the artifact while the tool runs.

use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::chat::ChatEvent;
use crate::provider::{ChatRequest, MessageRole, Provider, ProviderMessage, StreamEvent};
use crate::store::DocumentKind;

use super::{ToolContext, tool_error};

fn system_prompt_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Text => {
            "Write about the given topic. Markdown is supported. Use headings wherever appropriate."
        }
        DocumentKind::Code => {
            "Generate a self-contained, runnable code snippet for the given topic. Include brief \
             comments where they aid understanding. Output only the code."
        }
        DocumentKind::Sheet => {
            "Create a spreadsheet for the given topic in CSV format. The first row is the header. \
             Output only the CSV."
        }
    }
}

const UPDATE_PROMPT: &str =
    "Rewrite the following document in full based on the given instructions. Output only the \
     updated document content.";

pub async fn create(args: &Value, ctx: &ToolContext) -> Value {
    let Some(title) = args.get("title").and_then(Value::as_str) else {
        return tool_error("missing required argument: title");
    };
    let kind = args
        .get("kind")
        .and_then(Value::as_str)
        .and_then(DocumentKind::parse)
        .unwrap_or(DocumentKind::Text);

    let Some((model, backend)) = ctx.artifact.as_ref() else {
        return tool_error("no artifact backend is configured");
    };

    let id = Uuid::new_v4().to_string();
    ctx.emitter
        .send(ChatEvent::DocumentStart {
            id: id.clone(),
            title: title.to_string(),
            kind: kind.as_str().to_string(),
        })
        .await;

    let content = match stream_artifact(ctx, &id, backend, model, system_prompt_for(kind), title)
        .await
    {
        Ok(content) => content,
        Err(e) => return tool_error(format!("document generation failed: {e}")),
    };

    if let Err(e) = ctx
        .store
        .create_document(&id, &ctx.user_id, title, kind, &content)
        .await
    {
        return tool_error(format!("failed to save document: {e}"));
    }

    ctx.emitter
        .send(ChatEvent::DocumentFinish { id: id.clone() })
        .await;

    json!({
        "id": id,
        "title": title,
        "kind": kind.as_str(),
        "message": "A document was created and is now visible to the user."
    })
}

pub async fn update(args: &Value, ctx: &ToolContext) -> Value {
    let Some(id) = args.get("id").and_then(Value::as_str) else {
        return tool_error("missing required argument: id");
    };
    let Some(description) = args.get("description").and_then(Value::as_str) else {
        return tool_error("missing required argument: description");
    };

    let document = match ctx.store.get_document(id).await {
        Ok(d) => d,
        Err(_) => return tool_error(format!("document not found: {id}")),
    };
    if document.user_id != ctx.user_id {
        return tool_error("document belongs to another user");
    }

    let Some((model, backend)) = ctx.artifact.as_ref() else {
        return tool_error("no artifact backend is configured");
    };

    ctx.emitter
        .send(ChatEvent::DocumentStart {
            id: document.id.clone(),
            title: document.title.clone(),
            kind: document.kind.as_str().to_string(),
        })
        .await;

    let instructions = format!(
        "Instructions: {description}\n\nCurrent document:\n{}",
        document.content
    );
    let content =
        match stream_artifact(ctx, &document.id, backend, model, UPDATE_PROMPT, &instructions)
            .await
        {
            Ok(content) => content,
            Err(e) => return tool_error(format!("document update failed: {e}")),
        };

    if let Err(e) = ctx.store.update_document_content(&document.id, &content).await {
        return tool_error(format!("failed to save document: {e}"));
    }

    ctx.emitter
        .send(ChatEvent::DocumentFinish {
            id: document.id.clone(),
        })
        .await;

    json!({
        "id": document.id,
        "title": document.title,
        "kind": document.kind.as_str(),
        "message": "The document has been updated."
    })
}

/// Stream artifact content, forwarding deltas through the emitter and
/// returning the accumulated text.
async fn stream_artifact(
    ctx: &ToolContext,
    document_id: &str,
    backend: &Arc<dyn Provider>,
    model: &str,
    system: &str,
    input: &str,
) -> anyhow::Result<String> {
    let request = ChatRequest::new(model, system).with_messages(vec![ProviderMessage {
        role: MessageRole::User,
        content: input.to_string(),
    }]);

    let mut rx = backend.create_stream(request).await?;
    let mut content = String::new();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta(delta) => {
                content.push_str(&delta);
                ctx.emitter
                    .send(ChatEvent::DocumentDelta {
                        id: document_id.to_string(),
                        text: delta,
                    })
                    .await;
            }
            StreamEvent::Error(e) => anyhow::bail!(e),
            StreamEvent::Done => break,
            // artifact generation is plain text; other events ignored
            _ => {}
        }
    }

    Ok(content)
}
