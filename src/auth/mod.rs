//! Session/entitlement gate.
//!
//! Resolves a bearer token to an identity and tier, and enforces the
//! rolling 24-hour message quota before a turn may start. Tokens are
//! stored as SHA-256 digests; the plaintext only exists in the
//! `create-user` CLI output and the client's Authorization header.

mod entitlements;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::api::{ChatError, ChatResult};
use crate::store::{ConversationStore, now_ms};

pub use entitlements::{Entitlements, entitlements_for};

/// Caller classification bounding quota and permitted models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Regular,
    Admin,
}

impl UserType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(UserType::Regular),
            "admin" => Some(UserType::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Regular => "regular",
            UserType::Admin => "admin",
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub user_type: UserType,
}

impl Session {
    pub fn entitlements(&self) -> Entitlements {
        entitlements_for(self.user_type)
    }
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the caller's identity from the Authorization header.
pub async fn authenticate(headers: &HeaderMap, db: &SqlitePool) -> ChatResult<Session> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ChatError::unauthorized("missing bearer token"))?;

    let row: Option<(String, String, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT u.id, u.role, s.expires_at
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = $1
        "#,
    )
    .bind(token_digest(token))
    .fetch_optional(db)
    .await?;

    let (user_id, role, expires_at) =
        row.ok_or_else(|| ChatError::unauthorized("invalid session"))?;

    if let Some(expires_at) = expires_at {
        if expires_at < now_ms() {
            return Err(ChatError::unauthorized("session expired"));
        }
    }

    Ok(Session {
        user_id,
        user_type: UserType::parse(&role).unwrap_or(UserType::Regular),
    })
}

/// Enforce the tier's daily message quota. Counts are read at request
/// time; exact concurrent double-submission races are accepted.
pub async fn check_quota(session: &Session, store: &ConversationStore) -> ChatResult<()> {
    let limit = session.entitlements().max_messages_per_day;
    let count = store
        .message_count_for_user_since(&session.user_id, 24)
        .await?;

    if count >= limit {
        tracing::info!(user_id = %session.user_id, count, limit, "daily quota exhausted");
        return Err(ChatError::rate_limited(
            "You have exceeded your maximum number of messages for the day. Please try again later.",
        ));
    }
    Ok(())
}

/// Create a user and issue a session token (used by the CLI).
/// Returns (user_id, plaintext token).
pub async fn provision_user(
    db: &SqlitePool,
    email: &str,
    user_type: UserType,
) -> ChatResult<(String, String)> {
    let user_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, email, role, created_at) VALUES ($1, $2, $3, $4)")
        .bind(&user_id)
        .bind(email)
        .bind(user_type.as_str())
        .bind(now_ms())
        .execute(db)
        .await?;

    let token = issue_session(db, &user_id).await?;
    Ok((user_id, token))
}

/// Issue a fresh non-expiring session token for a user
pub async fn issue_session(db: &SqlitePool, user_id: &str) -> ChatResult<String> {
    let token = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES ($1, $2, $3, NULL)",
    )
    .bind(token_digest(&token))
    .bind(user_id)
    .bind(now_ms())
    .execute(db)
    .await?;
    Ok(token)
}
