//! Model backends and routing.
//!
//! A `Provider` is a streaming text-generation backend speaking the
//! OpenAI-compatible chat completions protocol. The `ModelRouter` maps
//! logical model identifiers from the enumerated catalog onto concrete
//! backends; it is built once at startup from configuration and passed
//! by reference into the orchestrator, so tests can substitute
//! backends freely.

mod catalog;
pub mod openai;
pub mod reasoning;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{ChatError, ChatResult};
use crate::config::Config;

pub use catalog::{MODEL_CATALOG, ModelSpec, ProviderFamily};
pub use openai::OpenAiCompatProvider;
pub use reasoning::with_reasoning_extraction;

/// Unified trait for streaming LLM backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a streaming chat completion
    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Create a non-streaming chat completion (title generation)
    async fn create(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Continue a conversation with tool results (streaming)
    async fn continue_with_tools_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Conversation role as sent to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// One backend-facing conversation message
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: MessageRole,
    pub content: String,
}

/// A tool the model may call
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A completed tool call from a non-streaming response
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// An executed tool's output, fed back for continuation
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub output: String,
}

/// Request for a fresh completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ProviderMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ProviderMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Continuation request carrying executed tool results
#[derive(Debug, Clone)]
pub struct ToolContinueRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ProviderMessage>,
    pub tool_results: Vec<ToolOutcome>,
    pub tools: Vec<ToolDefinition>,
}

/// Token accounting reported by a backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Discrete events produced by a streaming completion
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    ReasoningDelta(String),
    FunctionCallStart {
        call_id: String,
        name: String,
    },
    FunctionCallDelta {
        call_id: String,
        arguments_delta: String,
    },
    FunctionCallEnd {
        call_id: String,
    },
    Usage(Usage),
    Error(String),
    Done,
}

/// Non-streaming completion result
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

/// A catalog model resolved to its backend
#[derive(Clone)]
pub struct ResolvedModel {
    pub spec: &'static ModelSpec,
    pub backend: Arc<dyn Provider>,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Maps logical model ids to concrete backends.
pub struct ModelRouter {
    backends: HashMap<ProviderFamily, Arc<dyn Provider>>,
    default_family: ProviderFamily,
}

impl ModelRouter {
    /// Build the router from configuration; one backend per provider
    /// family with a configured API key.
    pub fn from_config(config: &Config) -> Self {
        let mut backends: HashMap<ProviderFamily, Arc<dyn Provider>> = HashMap::new();

        if let Some(key) = config.openai_api_key() {
            backends.insert(
                ProviderFamily::OpenAi,
                Arc::new(OpenAiCompatProvider::new(
                    ProviderFamily::OpenAi.chat_completions_url(),
                    key,
                    "openai",
                )) as Arc<dyn Provider>,
            );
        }
        if let Some(key) = config.anthropic_api_key() {
            backends.insert(
                ProviderFamily::Anthropic,
                Arc::new(OpenAiCompatProvider::new(
                    ProviderFamily::Anthropic.chat_completions_url(),
                    key,
                    "anthropic",
                )) as Arc<dyn Provider>,
            );
        }
        if let Some(key) = config.google_api_key() {
            backends.insert(
                ProviderFamily::Google,
                Arc::new(OpenAiCompatProvider::new(
                    ProviderFamily::Google.chat_completions_url(),
                    key,
                    "google",
                )) as Arc<dyn Provider>,
            );
        }

        let default_family = std::env::var("LLM_PROVIDER")
            .ok()
            .and_then(|v| ProviderFamily::parse(&v))
            .unwrap_or(ProviderFamily::OpenAi);

        Self {
            backends,
            default_family,
        }
    }

    /// Build a router with explicit backends (tests, embedding)
    pub fn with_backends(
        backends: HashMap<ProviderFamily, Arc<dyn Provider>>,
        default_family: ProviderFamily,
    ) -> Self {
        Self {
            backends,
            default_family,
        }
    }

    fn backend(&self, family: ProviderFamily) -> ChatResult<Arc<dyn Provider>> {
        self.backends.get(&family).cloned().ok_or_else(|| {
            ChatError::Offline(format!(
                "no API key configured for provider family '{}'",
                family.as_str()
            ))
        })
    }

    /// Effective family for a spec; logical `chat-model*` ids follow
    /// the process-wide default family.
    fn family_for(&self, spec: &ModelSpec) -> ProviderFamily {
        spec.family.unwrap_or(self.default_family)
    }

    /// Resolve a logical model id to a spec and backend. Unknown ids
    /// fail; there is no silent fallback on this path.
    pub fn resolve(&self, model_id: &str) -> ChatResult<ResolvedModel> {
        let spec = catalog::find(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;

        let family = self.family_for(spec);
        let backend = self.backend(family)?;

        let backend = if spec.supports_reasoning {
            with_reasoning_extraction(backend)
        } else {
            backend
        };

        Ok(ResolvedModel { spec, backend })
    }

    /// Cheaper same-family variant used for chat titles
    pub fn title_backend(&self, model_id: &str) -> ChatResult<(String, Arc<dyn Provider>)> {
        let spec = catalog::find(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        let family = self.family_for(spec);
        Ok((family.title_model().to_string(), self.backend(family)?))
    }

    /// Same-family variant used for artifact (document) generation
    pub fn artifact_backend(&self, model_id: &str) -> ChatResult<(String, Arc<dyn Provider>)> {
        let spec = catalog::find(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        let family = self.family_for(spec);
        Ok((family.artifact_model().to_string(), self.backend(family)?))
    }
}
