//! Domain records for the conversation store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Visibility::Private),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// One typed content part within a message.
///
/// Reasoning is its own part type so model "thinking" text never mixes
/// with answer text; tool calls and results keep backend production
/// order when persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    #[serde(rename = "tool-call")]
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },

    #[serde(rename = "tool-result")]
    ToolResult {
        call_id: String,
        name: String,
        output: Value,
    },

    #[serde(rename = "attachment")]
    Attachment {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

/// A chat row
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub visibility: Visibility,
    /// Last usage snapshot, overwritten after each completed turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_context: Option<UsageSnapshot>,
    pub created_at: i64,
}

/// A message row with decoded parts
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: i64,
}

/// Message to insert; timestamps assigned by the caller so a batch
/// keeps its relative order.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: i64,
}

/// A vote row; at most one per message
#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub chat_id: String,
    pub message_id: String,
    pub is_upvoted: bool,
}

/// Token accounting attached to a chat after each turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An artifact document written by the document tools
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub kind: DocumentKind,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Code,
    Sheet,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Code => "code",
            DocumentKind::Sheet => "sheet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(DocumentKind::Text),
            "code" => Some(DocumentKind::Code),
            "sheet" => Some(DocumentKind::Sheet),
            _ => None,
        }
    }
}

/// A suggestion generated for a document
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub document_id: String,
    pub original_text: String,
    pub suggested_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_resolved: bool,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_serialization_tags() {
        let part = MessagePart::Text { text: "hi".into() };
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "text");

        let part = MessagePart::ToolCall {
            call_id: "c1".into(),
            name: "queryDatabase".into(),
            arguments: json!({"query": "select 1"}),
        };
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "tool-call");
        assert_eq!(v["name"], "queryDatabase");
    }

    #[test]
    fn test_part_round_trip() {
        let parts = vec![
            MessagePart::Reasoning { text: "hm".into() },
            MessagePart::Text { text: "answer".into() },
        ];
        let json = serde_json::to_string(&parts).unwrap();
        let back: Vec<MessagePart> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parts);
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("secret"), None);
    }
}
