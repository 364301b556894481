//! Shared test fixtures: in-memory database, a scriptable mock model
//! backend, and state builders.

// not every test binary uses every fixture
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::SqlitePool;

use riptide::auth::{self, Session, UserType};
use riptide::chat::{StreamRegistry, TurnDeps};
use riptide::provider::{
    ChatRequest, ChatResponse, ModelRouter, Provider, ProviderFamily, StreamEvent,
    ToolContinueRequest,
};
use riptide::server::AppState;
use riptide::store::ConversationStore;
use riptide::store::db::run_migrations;

/// Single-connection pool: with `sqlite::memory:` every connection is
/// its own database, so the pool must never open a second one.
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Scriptable backend: replays fixed event sequences and counts calls.
pub struct MockProvider {
    /// Events for the first streaming call of a turn
    pub stream_events: Vec<StreamEvent>,
    /// Events for tool continuation calls
    pub continuation_events: Vec<StreamEvent>,
    /// Non-streaming response text; None makes `create` fail
    pub create_text: Option<String>,
    pub stream_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            stream_events: vec![
                StreamEvent::TextDelta("Hello world".into()),
                StreamEvent::Usage(riptide::provider::Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                StreamEvent::Done,
            ],
            continuation_events: vec![StreamEvent::TextDelta("done".into()), StreamEvent::Done],
            create_text: Some("Friendly greeting".into()),
            stream_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }
}

fn replay(events: Vec<StreamEvent>) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_stream(&self, _request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        Ok(replay(self.stream_events.clone()))
    }

    async fn create(&self, _request: ChatRequest) -> Result<ChatResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match &self.create_text {
            Some(text) => Ok(ChatResponse {
                text: text.clone(),
                reasoning: None,
                tool_calls: vec![],
                usage: None,
            }),
            None => anyhow::bail!("mock backend down"),
        }
    }

    async fn continue_with_tools_stream(
        &self,
        _request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        Ok(replay(self.continuation_events.clone()))
    }
}

pub fn router_with(provider: Arc<MockProvider>) -> Arc<ModelRouter> {
    let mut backends: HashMap<ProviderFamily, Arc<dyn Provider>> = HashMap::new();
    backends.insert(ProviderFamily::OpenAi, provider as Arc<dyn Provider>);
    Arc::new(ModelRouter::with_backends(backends, ProviderFamily::OpenAi))
}

pub fn turn_deps(
    pool: &SqlitePool,
    router: Arc<ModelRouter>,
    registry: Option<Arc<StreamRegistry>>,
) -> TurnDeps {
    TurnDeps {
        store: ConversationStore::new(pool.clone()),
        tool_db: Some(pool.clone()),
        router,
        registry,
    }
}

pub fn app_state(
    pool: &SqlitePool,
    router: Arc<ModelRouter>,
    registry: Option<Arc<StreamRegistry>>,
) -> AppState {
    AppState {
        store: ConversationStore::new(pool.clone()),
        tool_db: Some(pool.clone()),
        router,
        registry,
    }
}

/// Provision a user and return (session, bearer headers)
pub async fn test_user(pool: &SqlitePool, email: &str) -> (Session, HeaderMap) {
    let (user_id, token) = auth::provision_user(pool, email, UserType::Regular)
        .await
        .unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    (
        Session {
            user_id,
            user_type: UserType::Regular,
        },
        headers,
    )
}
