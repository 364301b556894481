//! Turn request schema and the client-visible event envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{MessagePart, Role, UsageSnapshot};

/// Body of a turn submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TurnRequest {
    pub id: String,
    pub message: IncomingMessage,
    pub selected_chat_model: String,
    pub selected_visibility_type: String,
}

/// The new message carried by a turn submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl IncomingMessage {
    /// Concatenated text content, used for prompts and title fallback
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One client-visible streamed event. Serialized as a `{type, data}`
/// JSON envelope, one per SSE frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ChatEvent {
    MessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ToolCallStart {
        #[serde(rename = "callId")]
        call_id: String,
        name: String,
    },
    ToolCallResult {
        #[serde(rename = "callId")]
        call_id: String,
        name: String,
        output: Value,
    },
    DocumentStart {
        id: String,
        title: String,
        kind: String,
    },
    DocumentDelta {
        id: String,
        text: String,
    },
    DocumentFinish {
        id: String,
    },
    Suggestion {
        #[serde(rename = "documentId")]
        document_id: String,
        description: String,
    },
    Usage(UsageSnapshot),
    Error {
        code: String,
        message: String,
    },
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_request_parses_camel_case() {
        let body = r#"{
            "id": "c1",
            "message": {"role": "user", "parts": [{"type": "text", "text": "hello"}]},
            "selectedChatModel": "chat-model",
            "selectedVisibilityType": "private"
        }"#;
        let req: TurnRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.id, "c1");
        assert_eq!(req.selected_chat_model, "chat-model");
        assert_eq!(req.message.text(), "hello");
    }

    #[test]
    fn test_turn_request_rejects_unknown_fields() {
        let body = r#"{"id":"c1","message":{"role":"user","parts":[]},"selectedChatModel":"m","selectedVisibilityType":"private","bogus":1}"#;
        assert!(serde_json::from_str::<TurnRequest>(body).is_err());
    }

    #[test]
    fn test_event_envelope_shape() {
        let event = ChatEvent::TextDelta {
            text: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text-delta");
        assert_eq!(json["data"]["text"], "hi");
    }

    #[test]
    fn test_done_has_no_data() {
        let json = serde_json::to_value(ChatEvent::Done).unwrap();
        assert_eq!(json["type"], "done");
    }
}
