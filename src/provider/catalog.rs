//! Enumerated model catalog.
//!
//! Logical ids are what clients select; each maps to a provider family
//! and an upstream model id. `chat-model` / `chat-model-reasoning`
//! are family-agnostic aliases that follow the process default family.

/// Upstream provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "openai",
            ProviderFamily::Anthropic => "anthropic",
            ProviderFamily::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderFamily::OpenAi),
            "anthropic" => Some(ProviderFamily::Anthropic),
            "google" => Some(ProviderFamily::Google),
            _ => None,
        }
    }

    /// OpenAI-compatible chat completions endpoint for the family
    pub fn chat_completions_url(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "https://api.openai.com/v1/chat/completions",
            ProviderFamily::Anthropic => "https://api.anthropic.com/v1/chat/completions",
            ProviderFamily::Google => {
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
            }
        }
    }

    /// Cheap/fast model used for chat titles
    pub fn title_model(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "gpt-4o-mini",
            ProviderFamily::Anthropic => "claude-3-5-haiku-20241022",
            ProviderFamily::Google => "gemini-1.5-flash-002",
        }
    }

    /// Model used for artifact (document) generation
    pub fn artifact_model(&self) -> &'static str {
        match self {
            ProviderFamily::OpenAi => "gpt-4o",
            ProviderFamily::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderFamily::Google => "gemini-1.5-pro-002",
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Logical id selected by clients
    pub id: &'static str,
    pub display_name: &'static str,
    /// None = follow the process default family
    pub family: Option<ProviderFamily>,
    /// Upstream model id sent to the backend
    pub upstream_id: &'static str,
    /// Reasoning variants get the think-tag extraction wrapper and no tools
    pub supports_reasoning: bool,
}

/// The enumerated allow-list of selectable models
pub static MODEL_CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "chat-model",
        display_name: "Chat model",
        family: None,
        upstream_id: "gpt-4o",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "chat-model-reasoning",
        display_name: "Chat model (reasoning)",
        family: None,
        upstream_id: "gpt-4o",
        supports_reasoning: true,
    },
    ModelSpec {
        id: "openai-gpt-4o",
        display_name: "GPT-4o",
        family: Some(ProviderFamily::OpenAi),
        upstream_id: "gpt-4o",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "openai-gpt-4o-mini",
        display_name: "GPT-4o Mini",
        family: Some(ProviderFamily::OpenAi),
        upstream_id: "gpt-4o-mini",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "anthropic-claude-3.5-sonnet",
        display_name: "Claude 3.5 Sonnet",
        family: Some(ProviderFamily::Anthropic),
        upstream_id: "claude-3-5-sonnet-20241022",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "anthropic-claude-3.5-haiku",
        display_name: "Claude 3.5 Haiku",
        family: Some(ProviderFamily::Anthropic),
        upstream_id: "claude-3-5-haiku-20241022",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "google-gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        family: Some(ProviderFamily::Google),
        upstream_id: "gemini-1.5-pro-002",
        supports_reasoning: false,
    },
    ModelSpec {
        id: "google-gemini-1.5-flash",
        display_name: "Gemini 1.5 Flash",
        family: Some(ProviderFamily::Google),
        upstream_id: "gemini-1.5-flash-002",
        supports_reasoning: false,
    },
];

/// Look up a catalog entry by logical id
pub fn find(model_id: &str) -> Option<&'static ModelSpec> {
    MODEL_CATALOG.iter().find(|m| m.id == model_id)
}
