// tests/turn_tests.rs
// End-to-end turn orchestration against an in-memory database and a
// scripted mock backend: first-turn lifecycle, quota refusal, unknown
// models, title fallback, the tool loop, and resume replay.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use riptide::api::ChatError;
use riptide::chat::{ChatEvent, StreamRegistry, TurnRequest, prompts::RequestHints, run_turn};
use riptide::provider::StreamEvent;
use riptide::store::{ConversationStore, MessagePart, NewMessage, Role, now_ms};

use common::{MockProvider, router_with, test_pool, test_user, turn_deps};

fn turn_request(chat_id: &str, text: &str, model: &str) -> TurnRequest {
    serde_json::from_value(serde_json::json!({
        "id": chat_id,
        "message": { "role": "user", "parts": [{ "type": "text", "text": text }] },
        "selectedChatModel": model,
        "selectedVisibilityType": "private"
    }))
    .unwrap()
}

/// Drain the event stream until `done`; the orchestrator persists
/// before emitting `done`, so the store is settled afterwards.
async fn collect_events(
    mut rx: tokio::sync::mpsc::Receiver<ChatEvent>,
) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, ChatEvent::Done);
        events.push(event);
        if done {
            break;
        }
    }
    events
}

#[tokio::test]
async fn test_first_turn_end_to_end() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;
    let provider = Arc::new(MockProvider::default());
    let deps = turn_deps(&pool, router_with(Arc::clone(&provider)), None);
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "hello", "chat-model"),
    )
    .await
    .unwrap();
    let events = collect_events(rx).await;

    // chat created with the generated title
    let chat = store.get_chat("c1").await.unwrap();
    assert_eq!(chat.title, "Friendly greeting");
    assert!(chat.title.chars().count() <= 80);

    // streamed at least one text delta and exactly one usage event
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::TextDelta { .. }))
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ChatEvent::Usage(_)))
            .count(),
        1
    );
    assert!(matches!(events.last(), Some(ChatEvent::Done)));

    // one user message and exactly one assistant message persisted
    let messages = store.get_messages("c1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(
        messages[1].parts,
        vec![MessagePart::Text {
            text: "Hello world".into()
        }]
    );

    // usage snapshot attached to the chat
    let chat = store.get_chat("c1").await.unwrap();
    assert_eq!(chat.last_context.unwrap().total_tokens, 15);
}

#[tokio::test]
async fn test_title_failure_falls_back() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;
    let provider = Arc::new(MockProvider {
        create_text: None,
        ..Default::default()
    });
    let deps = turn_deps(&pool, router_with(provider), None);
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "plan my trip to Lisbon", "chat-model"),
    )
    .await
    .unwrap();
    collect_events(rx).await;

    let chat = store.get_chat("c1").await.unwrap();
    assert!(!chat.title.is_empty());
    assert_eq!(chat.title, "plan my trip to Lisbon");
}

#[tokio::test]
async fn test_unknown_model_makes_no_backend_call() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;
    let provider = Arc::new(MockProvider::default());
    let deps = turn_deps(&pool, router_with(Arc::clone(&provider)), None);
    let store = deps.store.clone();

    let err = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "hello", "model-that-does-not-exist"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ChatError::UnknownModel(_)));
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
    assert!(store.find_chat("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_quota_refusal_has_no_side_effects() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;
    let store = ConversationStore::new(pool.clone());

    // exhaust the regular tier's daily quota
    store
        .create_chat("old", &session.user_id, "old", riptide::store::Visibility::Private)
        .await
        .unwrap();
    let filler: Vec<NewMessage> = (0..100)
        .map(|i| NewMessage {
            id: format!("m{i}"),
            chat_id: "old".into(),
            role: Role::User,
            parts: vec![MessagePart::Text { text: "x".into() }],
            created_at: now_ms(),
        })
        .collect();
    store.append_messages(&filler).await.unwrap();

    let provider = Arc::new(MockProvider::default());
    let deps = turn_deps(&pool, router_with(Arc::clone(&provider)), None);

    let err = run_turn(
        deps,
        session.clone(),
        RequestHints::default(),
        turn_request("c2", "one more", "chat-model"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ChatError::RateLimitExceeded(_)));
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 0);
    assert!(store.find_chat("c2").await.unwrap().is_none());
    assert_eq!(
        store
            .message_count_for_user_since(&session.user_id, 24)
            .await
            .unwrap(),
        100
    );
}

#[tokio::test]
async fn test_foreign_chat_is_forbidden() {
    let pool = test_pool().await;
    let (owner, _) = test_user(&pool, "owner@example.com").await;
    let (intruder, _) = test_user(&pool, "other@example.com").await;
    let store = ConversationStore::new(pool.clone());
    store
        .create_chat("c1", &owner.user_id, "t", riptide::store::Visibility::Private)
        .await
        .unwrap();

    let deps = turn_deps(&pool, router_with(Arc::new(MockProvider::default())), None);
    let err = run_turn(
        deps,
        intruder,
        RequestHints::default(),
        turn_request("c1", "hi", "chat-model"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));
}

#[tokio::test]
async fn test_tool_loop_executes_and_persists_in_order() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;

    let provider = Arc::new(MockProvider {
        stream_events: vec![
            StreamEvent::FunctionCallStart {
                call_id: "call_1".into(),
                name: "queryDatabase".into(),
            },
            StreamEvent::FunctionCallDelta {
                call_id: "call_1".into(),
                arguments_delta:
                    r#"{"query":"SELECT email FROM users","description":"all users"}"#.into(),
            },
            StreamEvent::FunctionCallEnd {
                call_id: "call_1".into(),
            },
            StreamEvent::Done,
        ],
        continuation_events: vec![
            StreamEvent::TextDelta("Found one user. ".into()),
            StreamEvent::Done,
        ],
        ..Default::default()
    });
    let deps = turn_deps(&pool, router_with(Arc::clone(&provider)), None);
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "who is registered?", "chat-model"),
    )
    .await
    .unwrap();
    let events = collect_events(rx).await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::ToolCallStart { name, .. } if name == "queryDatabase"))
    );
    let result = events
        .iter()
        .find_map(|e| match e {
            ChatEvent::ToolCallResult { output, .. } => Some(output),
            _ => None,
        })
        .expect("tool result event");
    assert_eq!(result["rowCount"], 1);

    // first stream + one continuation
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 2);

    // persisted parts keep production order: call, result, then text
    let messages = store.get_messages("c1").await.unwrap();
    let assistant = &messages[1];
    assert!(matches!(assistant.parts[0], MessagePart::ToolCall { .. }));
    assert!(matches!(assistant.parts[1], MessagePart::ToolResult { .. }));
    assert!(
        matches!(&assistant.parts[2], MessagePart::Text { text } if text == "Found one user. ")
    );
}

#[tokio::test]
async fn test_exhausted_tool_budget_still_answers_every_call() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;

    // a backend that asks for another tool call on every step
    let call_events = vec![
        StreamEvent::FunctionCallStart {
            call_id: "call_1".into(),
            name: "queryDatabase".into(),
        },
        StreamEvent::FunctionCallDelta {
            call_id: "call_1".into(),
            arguments_delta:
                r#"{"query":"SELECT email FROM users","description":"all users"}"#.into(),
        },
        StreamEvent::FunctionCallEnd {
            call_id: "call_1".into(),
        },
        StreamEvent::Done,
    ];
    let provider = Arc::new(MockProvider {
        stream_events: call_events.clone(),
        continuation_events: call_events,
        ..Default::default()
    });
    let deps = turn_deps(&pool, router_with(Arc::clone(&provider)), None);
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "keep digging", "chat-model"),
    )
    .await
    .unwrap();
    let events = collect_events(rx).await;

    // bounded: one initial stream plus four continuations
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 5);

    // every streamed call start got a matching result
    let starts = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::ToolCallStart { .. }))
        .count();
    let results = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::ToolCallResult { .. }))
        .count();
    assert_eq!(starts, 5);
    assert_eq!(results, 5);
    assert!(matches!(events.last(), Some(ChatEvent::Done)));

    // the persisted record carries the same calls the client saw
    let messages = store.get_messages("c1").await.unwrap();
    let assistant = &messages[1];
    let persisted_calls = assistant
        .parts
        .iter()
        .filter(|p| matches!(p, MessagePart::ToolCall { .. }))
        .count();
    let persisted_results = assistant
        .parts
        .iter()
        .filter(|p| matches!(p, MessagePart::ToolResult { .. }))
        .count();
    assert_eq!(persisted_calls, 5);
    assert_eq!(persisted_results, 5);
}

#[tokio::test]
async fn test_reasoning_model_splits_parts() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;

    let provider = Arc::new(MockProvider {
        stream_events: vec![
            StreamEvent::TextDelta("<think>check the docs</think>Use sqlx.".into()),
            StreamEvent::Done,
        ],
        ..Default::default()
    });
    let deps = turn_deps(&pool, router_with(provider), None);
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "how?", "chat-model-reasoning"),
    )
    .await
    .unwrap();
    let events = collect_events(rx).await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::ReasoningDelta { .. }))
    );

    let messages = store.get_messages("c1").await.unwrap();
    let assistant = &messages[1];
    assert_eq!(assistant.parts.len(), 2);
    assert!(
        matches!(&assistant.parts[0], MessagePart::Reasoning { text } if text == "check the docs")
    );
    assert!(matches!(&assistant.parts[1], MessagePart::Text { text } if text == "Use sqlx."));
}

#[tokio::test]
async fn test_backend_error_becomes_in_band_event() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;

    let provider = Arc::new(MockProvider {
        stream_events: vec![StreamEvent::Error("Rate limit reached for gpt-4o".into())],
        ..Default::default()
    });
    let deps = turn_deps(&pool, router_with(provider), None);

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "hi", "chat-model"),
    )
    .await
    .unwrap();
    let events = collect_events(rx).await;

    let (code, _) = events
        .iter()
        .find_map(|e| match e {
            ChatEvent::Error { code, message } => Some((code.clone(), message.clone())),
            _ => None,
        })
        .expect("in-band error event");
    assert_eq!(code, "rate_limit:chat");
    // stream still closed cleanly
    assert!(matches!(events.last(), Some(ChatEvent::Done)));
}

#[tokio::test]
async fn test_finished_stream_replays_from_registry() {
    let pool = test_pool().await;
    let (session, _) = test_user(&pool, "a@example.com").await;
    let registry = Arc::new(StreamRegistry::new(None));
    let deps = turn_deps(
        &pool,
        router_with(Arc::new(MockProvider::default())),
        Some(Arc::clone(&registry)),
    );
    let store = deps.store.clone();

    let rx = run_turn(
        deps,
        session,
        RequestHints::default(),
        turn_request("c1", "hello", "chat-model"),
    )
    .await
    .unwrap();
    let live_events = collect_events(rx).await;

    let stream_id = store.latest_stream_id("c1").await.unwrap().unwrap();
    let sub = registry.subscribe(&stream_id).unwrap();
    assert!(sub.live.is_none());
    assert_eq!(sub.replay, live_events);
}
