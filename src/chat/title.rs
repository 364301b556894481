//! Chat title generation.
//!
//! One non-tool completion on the family's title model. This path must
//! never block chat creation: any failure falls back to a title derived
//! from the message text.

use std::sync::Arc;
use tracing::warn;

use crate::provider::{ChatRequest, MessageRole, Provider, ProviderMessage};

const TITLE_SYSTEM: &str = "Generate a short title summarizing the first message a user starts \
     a conversation with. At most 80 characters. Do not use quotes or colons. Respond with the \
     title only.";

const MAX_TITLE_CHARS: usize = 80;

pub async fn generate_title(
    backend: &Arc<dyn Provider>,
    model: &str,
    first_message_text: &str,
) -> String {
    let request = ChatRequest::new(model, TITLE_SYSTEM).with_messages(vec![ProviderMessage {
        role: MessageRole::User,
        content: first_message_text.to_string(),
    }]);

    match backend.create(request).await {
        Ok(response) => {
            let title = sanitize(&response.text);
            if title.is_empty() {
                fallback_title(first_message_text)
            } else {
                title
            }
        }
        Err(e) => {
            warn!(error = %e, "title generation failed, using fallback");
            fallback_title(first_message_text)
        }
    }
}

/// Derive a non-empty title from the message text itself
pub fn fallback_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "New chat".to_string()
    } else {
        truncate_chars(trimmed, MAX_TITLE_CHARS)
    }
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '\u{201c}' || c == '\u{201d}')
        .chars()
        .filter(|c| *c != ':' && *c != '\n')
        .collect();
    truncate_chars(cleaned.trim(), MAX_TITLE_CHARS)
}

/// Truncate on a character boundary, never mid-codepoint
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_quotes_and_colons() {
        assert_eq!(sanitize("\"Travel plans: Lisbon\""), "Travel plans Lisbon");
    }

    #[test]
    fn test_sanitize_truncates_long_titles() {
        let long = "x".repeat(200);
        assert_eq!(sanitize(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_truncate_respects_multibyte_boundaries() {
        let s = "é".repeat(100);
        let t = truncate_chars(&s, MAX_TITLE_CHARS);
        assert_eq!(t.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_fallback_from_empty_text() {
        assert_eq!(fallback_title("   "), "New chat");
    }

    #[test]
    fn test_fallback_from_message_text() {
        assert_eq!(fallback_title("hello there"), "hello there");
    }
}
