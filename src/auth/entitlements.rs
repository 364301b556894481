//! Per-tier entitlements: daily message volume and permitted models.

use super::UserType;

/// What a tier is allowed to do
#[derive(Debug, Clone)]
pub struct Entitlements {
    pub max_messages_per_day: i64,
    pub available_model_ids: &'static [&'static str],
}

const REGULAR_MODELS: &[&str] = &[
    "chat-model",
    "chat-model-reasoning",
    "openai-gpt-4o",
    "openai-gpt-4o-mini",
    "anthropic-claude-3.5-sonnet",
    "anthropic-claude-3.5-haiku",
    "google-gemini-1.5-pro",
    "google-gemini-1.5-flash",
];

/// Resolve the entitlements for a tier
pub fn entitlements_for(user_type: UserType) -> Entitlements {
    match user_type {
        UserType::Regular => Entitlements {
            max_messages_per_day: 100,
            available_model_ids: REGULAR_MODELS,
        },
        UserType::Admin => Entitlements {
            max_messages_per_day: 999_999,
            available_model_ids: REGULAR_MODELS,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_limits() {
        let e = entitlements_for(UserType::Regular);
        assert_eq!(e.max_messages_per_day, 100);
        assert!(e.available_model_ids.contains(&"chat-model"));
    }

    #[test]
    fn test_admin_effectively_unlimited() {
        let e = entitlements_for(UserType::Admin);
        assert!(e.max_messages_per_day > 100_000);
    }
}
