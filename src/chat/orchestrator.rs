//! Stream orchestrator: drives one generation turn.
//!
//! A turn moves through validation, authorization, and preparation on
//! the request task; generation then runs as a detached task whose
//! lifetime is independent of the client connection. Events flow
//! through a single emitter in strict production order, and the same
//! sequence is accumulated into the message parts that get persisted
//! once the stream completes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ChatError, ChatResult};
use crate::auth::{Session, check_quota};
use crate::core::WordChunker;
use crate::provider::{
    ChatRequest, MessageRole, ModelRouter, ProviderMessage, ResolvedModel, StreamEvent,
    ToolContinueRequest, ToolOutcome, Usage,
};
use crate::store::{ConversationStore, Message, MessagePart, NewMessage, Role, UsageSnapshot,
    Visibility, now_ms};
use crate::tools::{ToolContext, Toolbox};

use super::prompts::{self, RequestHints};
use super::resume::StreamRegistry;
use super::title;
use super::types::{ChatEvent, TurnRequest};
use super::Emitter;

/// At most this many sequential tool-augmented steps per turn
const MAX_TOOL_STEPS: usize = 5;

/// Lifecycle of one turn, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Validating,
    Authorizing,
    Preparing,
    Generating,
    Persisting,
    Done,
    Errored,
    PartiallyPersisted,
}

/// Everything the orchestrator needs from the application
#[derive(Clone)]
pub struct TurnDeps {
    pub store: ConversationStore,
    pub tool_db: Option<sqlx::SqlitePool>,
    pub router: Arc<ModelRouter>,
    pub registry: Option<Arc<StreamRegistry>>,
}

/// Run the pre-stream phases of a turn and spawn detached generation.
///
/// Returns the client's event receiver. Errors before the first event
/// surface as `ChatError` so the handler can answer with a status code;
/// anything after that is delivered in-band.
pub async fn run_turn(
    deps: TurnDeps,
    session: Session,
    hints: RequestHints,
    request: TurnRequest,
) -> ChatResult<mpsc::Receiver<ChatEvent>> {
    // Validating
    debug!(chat_id = %request.id, phase = ?TurnPhase::Validating, "turn started");
    let visibility = Visibility::parse(&request.selected_visibility_type)
        .ok_or_else(|| ChatError::bad_request("invalid visibility type"))?;
    if request.message.role != Role::User {
        return Err(ChatError::bad_request("message role must be 'user'"));
    }
    if request.message.parts.is_empty() {
        return Err(ChatError::bad_request("message has no parts"));
    }

    // Authorizing
    debug!(chat_id = %request.id, phase = ?TurnPhase::Authorizing, "authorizing");
    let resolved = deps.router.resolve(&request.selected_chat_model)?;
    if !session
        .entitlements()
        .available_model_ids
        .contains(&resolved.spec.id)
    {
        return Err(ChatError::forbidden("model not available on this plan"));
    }
    check_quota(&session, &deps.store).await?;

    // Preparing
    debug!(chat_id = %request.id, phase = ?TurnPhase::Preparing, "preparing");
    let message_text = request.message.text();
    let chat = match deps.store.find_chat(&request.id).await? {
        Some(chat) => {
            if chat.user_id != session.user_id {
                return Err(ChatError::forbidden("chat belongs to another user"));
            }
            chat
        }
        None => {
            let chat_title = match deps.router.title_backend(&request.selected_chat_model) {
                Ok((model, backend)) => {
                    title::generate_title(&backend, &model, &message_text).await
                }
                Err(_) => title::fallback_title(&message_text),
            };
            deps.store
                .create_chat(&request.id, &session.user_id, &chat_title, visibility)
                .await?
        }
    };

    let history = deps.store.get_messages(&chat.id).await?;

    let user_message = NewMessage {
        id: request
            .message
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        chat_id: chat.id.clone(),
        role: Role::User,
        parts: request.message.parts.clone(),
        created_at: now_ms(),
    };
    deps.store.append_messages(&[user_message.clone()]).await?;

    let stream_id = Uuid::new_v4().to_string();
    deps.store.create_stream_record(&stream_id, &chat.id).await?;
    match &deps.registry {
        Some(registry) => registry.register(&stream_id),
        None => {
            static LOGGED: std::sync::Once = std::sync::Once::new();
            LOGGED.call_once(|| {
                info!("stream resumption disabled, turns run over one-shot streams");
            });
        }
    }

    let with_tools = !resolved.spec.supports_reasoning;
    let system = prompts::system_prompt(&hints, with_tools);

    let mut messages = provider_messages(&history);
    messages.push(ProviderMessage {
        role: MessageRole::User,
        content: message_text,
    });

    let (tx, rx) = mpsc::channel(100);
    let emitter = Emitter::new(
        tx,
        deps.registry
            .as_ref()
            .map(|r| (Arc::clone(r), stream_id.clone())),
    );

    // Generating runs detached: client disconnect must never cancel
    // generation or persistence.
    let turn = GenerationTurn {
        deps,
        emitter,
        resolved,
        system,
        messages,
        chat_id: chat.id,
        user_id: session.user_id,
        model_id: request.selected_chat_model,
    };
    tokio::spawn(turn.run());

    Ok(rx)
}

/// Flatten stored messages into backend conversation form. Tool parts
/// are not replayed to the backend; their outcome is already reflected
/// in the assistant text.
fn provider_messages(history: &[Message]) -> Vec<ProviderMessage> {
    history
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => MessageRole::User,
                Role::Assistant => MessageRole::Assistant,
                Role::System => MessageRole::System,
            };
            let content: String = m
                .parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            if content.is_empty() {
                None
            } else {
                Some(ProviderMessage { role, content })
            }
        })
        .collect()
}

struct GenerationTurn {
    deps: TurnDeps,
    emitter: Emitter,
    resolved: ResolvedModel,
    system: String,
    messages: Vec<ProviderMessage>,
    chat_id: String,
    user_id: String,
    model_id: String,
}

/// What one streaming step produced
#[derive(Default)]
struct StepOutcome {
    pending_calls: Vec<(String, String, String)>, // (call_id, name, raw args)
    usage: Option<Usage>,
    step_text: String,
    errored: bool,
}

impl GenerationTurn {
    async fn run(mut self) {
        debug!(chat_id = %self.chat_id, phase = ?TurnPhase::Generating, "generation started");

        let assistant_id = Uuid::new_v4().to_string();
        self.emitter
            .send(ChatEvent::MessageStart {
                message_id: assistant_id.clone(),
                chat_id: self.chat_id.clone(),
            })
            .await;

        let tools = if self.resolved.spec.supports_reasoning {
            Vec::new()
        } else {
            Toolbox::definitions()
        };

        let tool_ctx = ToolContext {
            store: self.deps.store.clone(),
            tool_db: self.deps.tool_db.clone(),
            artifact: self.deps.router.artifact_backend(&self.model_id).ok(),
            emitter: self.emitter.clone(),
            user_id: self.user_id.clone(),
        };

        let mut parts: Vec<MessagePart> = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut errored = false;
        let mut tool_results: Vec<ToolOutcome> = Vec::new();

        for step in 0..MAX_TOOL_STEPS {
            let stream = if step == 0 {
                let request = ChatRequest::new(
                    self.resolved.spec.upstream_id,
                    self.system.clone(),
                )
                .with_messages(self.messages.clone())
                .with_tools(tools.clone());
                self.resolved.backend.create_stream(request).await
            } else {
                let request = ToolContinueRequest {
                    model: self.resolved.spec.upstream_id.to_string(),
                    system: self.system.clone(),
                    messages: self.messages.clone(),
                    tool_results: std::mem::take(&mut tool_results),
                    tools: tools.clone(),
                };
                self.resolved
                    .backend
                    .continue_with_tools_stream(request)
                    .await
            };

            let rx = match stream {
                Ok(rx) => rx,
                Err(e) => {
                    self.emit_error(&e.to_string()).await;
                    errored = true;
                    break;
                }
            };

            let outcome = self.consume_stream(rx, &mut parts).await;
            if let Some(u) = outcome.usage {
                usage = Some(u);
            }
            if outcome.errored {
                errored = true;
                break;
            }
            if outcome.pending_calls.is_empty() {
                break;
            }

            // carry this step's visible text into the continuation
            if !outcome.step_text.is_empty() {
                self.messages.push(ProviderMessage {
                    role: MessageRole::Assistant,
                    content: outcome.step_text,
                });
            }

            for (call_id, name, raw_args) in outcome.pending_calls {
                let arguments: serde_json::Value =
                    serde_json::from_str(&raw_args).unwrap_or(serde_json::Value::Null);
                parts.push(MessagePart::ToolCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments,
                });

                let output = Toolbox::execute(&name, &raw_args, &tool_ctx).await;
                self.emitter
                    .send(ChatEvent::ToolCallResult {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        output: output.clone(),
                    })
                    .await;
                parts.push(MessagePart::ToolResult {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    output: output.clone(),
                });
                tool_results.push(ToolOutcome {
                    call_id,
                    name,
                    output: output.to_string(),
                });
            }

            // Calls streamed on the final step still execute and their
            // results are delivered and recorded above; only the
            // follow-up completion is skipped.
            if step == MAX_TOOL_STEPS - 1 {
                warn!(chat_id = %self.chat_id, "tool step budget exhausted");
            }
        }

        let snapshot = usage.map(|u| UsageSnapshot {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(snapshot) = snapshot {
            self.emitter.send(ChatEvent::Usage(snapshot)).await;
        }

        // Persisting: only after the full event sequence was observed.
        debug!(chat_id = %self.chat_id, phase = ?TurnPhase::Persisting, "persisting");
        if !parts.is_empty() {
            let assistant = NewMessage {
                id: assistant_id,
                chat_id: self.chat_id.clone(),
                role: Role::Assistant,
                parts,
                created_at: now_ms(),
            };
            if let Err(e) = self.deps.store.append_messages(&[assistant]).await {
                // the stream was already delivered; surface loudly
                error!(chat_id = %self.chat_id, error = %e,
                    phase = ?TurnPhase::PartiallyPersisted,
                    "assistant message persistence failed");
            }
        }

        if let Some(snapshot) = snapshot {
            if let Err(e) = self
                .deps
                .store
                .update_last_context(&self.chat_id, &snapshot)
                .await
            {
                warn!(chat_id = %self.chat_id, error = %e, "usage snapshot not persisted");
            }
        }

        self.emitter.send(ChatEvent::Done).await;
        self.emitter.finish();

        let phase = if errored {
            TurnPhase::Errored
        } else {
            TurnPhase::Done
        };
        debug!(chat_id = %self.chat_id, phase = ?phase, "turn finished");
    }

    /// Drain one streaming step, forwarding events in production order
    /// and accumulating parts.
    async fn consume_stream(
        &self,
        mut rx: mpsc::Receiver<StreamEvent>,
        parts: &mut Vec<MessagePart>,
    ) -> StepOutcome {
        struct InFlight {
            name: String,
            args: String,
        }

        let mut outcome = StepOutcome::default();
        let mut chunker = WordChunker::new();
        let mut in_flight: HashMap<String, InFlight> = HashMap::new();

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    for word in chunker.feed(&delta) {
                        outcome.step_text.push_str(&word);
                        push_text(parts, &word);
                        self.emitter
                            .send(ChatEvent::TextDelta { text: word })
                            .await;
                    }
                }
                StreamEvent::ReasoningDelta(delta) => {
                    self.flush_text(&mut chunker, parts, &mut outcome.step_text)
                        .await;
                    push_reasoning(parts, &delta);
                    self.emitter
                        .send(ChatEvent::ReasoningDelta { text: delta })
                        .await;
                }
                StreamEvent::FunctionCallStart { call_id, name } => {
                    self.flush_text(&mut chunker, parts, &mut outcome.step_text)
                        .await;
                    in_flight.insert(
                        call_id.clone(),
                        InFlight {
                            name: name.clone(),
                            args: String::new(),
                        },
                    );
                    self.emitter
                        .send(ChatEvent::ToolCallStart { call_id, name })
                        .await;
                }
                StreamEvent::FunctionCallDelta {
                    call_id,
                    arguments_delta,
                } => {
                    if let Some(call) = in_flight.get_mut(&call_id) {
                        call.args.push_str(&arguments_delta);
                    }
                }
                StreamEvent::FunctionCallEnd { call_id } => {
                    if let Some(call) = in_flight.remove(&call_id) {
                        outcome.pending_calls.push((call_id, call.name, call.args));
                    }
                }
                StreamEvent::Usage(u) => {
                    outcome.usage = Some(u);
                }
                StreamEvent::Error(raw) => {
                    self.flush_text(&mut chunker, parts, &mut outcome.step_text)
                        .await;
                    self.emit_error(&raw).await;
                    outcome.errored = true;
                    break;
                }
                StreamEvent::Done => break,
            }
        }

        self.flush_text(&mut chunker, parts, &mut outcome.step_text)
            .await;
        outcome
    }

    async fn flush_text(
        &self,
        chunker: &mut WordChunker,
        parts: &mut Vec<MessagePart>,
        step_text: &mut String,
    ) {
        if let Some(tail) = chunker.flush() {
            step_text.push_str(&tail);
            push_text(parts, &tail);
            self.emitter.send(ChatEvent::TextDelta { text: tail }).await;
        }
    }

    /// Synthesize a human-readable in-band error event from a raw
    /// backend failure.
    async fn emit_error(&self, raw: &str) {
        let classified = ChatError::from_provider_failure(raw);
        warn!(chat_id = %self.chat_id, error = raw, code = classified.code(),
            "generation failed");
        self.emitter
            .send(ChatEvent::Error {
                code: classified.code().to_string(),
                message: classified.to_string(),
            })
            .await;
    }
}

fn push_text(parts: &mut Vec<MessagePart>, s: &str) {
    if let Some(MessagePart::Text { text }) = parts.last_mut() {
        text.push_str(s);
    } else {
        parts.push(MessagePart::Text { text: s.to_string() });
    }
}

fn push_reasoning(parts: &mut Vec<MessagePart>, s: &str) {
    if let Some(MessagePart::Reasoning { text }) = parts.last_mut() {
        text.push_str(s);
    } else {
        parts.push(MessagePart::Reasoning {
            text: s.to_string(),
        });
    }
}
