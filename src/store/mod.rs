//! Conversation store: durable chats, messages, votes, and stream
//! records over SQLite.
//!
//! Message history is append-only; the only mutation is the explicit
//! trailing-message truncation used for edit/regenerate. All write
//! paths are scoped to the owning user by the HTTP handlers before
//! they reach this module.

pub mod db;
pub mod types;

use sqlx::SqlitePool;
use tracing::debug;

use crate::api::{ChatError, ChatResult};
pub use types::{
    Chat, Document, DocumentKind, Message, MessagePart, NewMessage, Role, Suggestion,
    UsageSnapshot, Visibility, Vote,
};

/// Current unix time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Durable record of chats, messages, votes, and stream identifiers.
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    pub async fn create_chat(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        visibility: Visibility,
    ) -> ChatResult<Chat> {
        let created_at = now_ms();
        sqlx::query(
            r#"
            INSERT INTO chats (id, user_id, title, visibility, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(visibility.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        debug!(chat_id = id, "chat created");

        Ok(Chat {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            visibility,
            last_context: None,
            created_at,
        })
    }

    /// Fetch a chat, or None if absent
    pub async fn find_chat(&self, id: &str) -> ChatResult<Option<Chat>> {
        let row: Option<(String, String, String, String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, visibility, last_context, created_at
            FROM chats WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(decode_chat))
    }

    /// Fetch a chat, failing with NotFound if absent
    pub async fn get_chat(&self, id: &str) -> ChatResult<Chat> {
        self.find_chat(id)
            .await?
            .ok_or_else(|| ChatError::not_found("chat not found"))
    }

    /// Delete a chat and (via cascades) its messages, votes, and stream
    /// records. Returns the deleted record.
    pub async fn delete_chat(&self, id: &str) -> ChatResult<Chat> {
        let chat = self.get_chat(id).await?;
        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(chat)
    }

    pub async fn update_visibility(&self, chat_id: &str, visibility: Visibility) -> ChatResult<()> {
        sqlx::query("UPDATE chats SET visibility = $1 WHERE id = $2")
            .bind(visibility.as_str())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite the chat's last usage snapshot. Callers treat failures
    /// here as best-effort.
    pub async fn update_last_context(
        &self,
        chat_id: &str,
        usage: &UsageSnapshot,
    ) -> ChatResult<()> {
        sqlx::query("UPDATE chats SET last_context = $1 WHERE id = $2")
            .bind(serde_json::to_string(usage).map_err(|e| ChatError::internal(e.to_string()))?)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// List a chat's messages ordered by creation time ascending
    pub async fn get_messages(&self, chat_id: &str) -> ChatResult<Vec<Message>> {
        let rows: Vec<(String, String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, chat_id, role, parts, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(decode_message).collect())
    }

    pub async fn get_message(&self, id: &str) -> ChatResult<Message> {
        let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, chat_id, role, parts, created_at FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_message)
            .ok_or_else(|| ChatError::not_found("message not found"))
    }

    /// Append one or more messages in a single transaction
    pub async fn append_messages(&self, messages: &[NewMessage]) -> ChatResult<()> {
        let mut tx = self.pool.begin().await?;
        for m in messages {
            sqlx::query(
                r#"
                INSERT INTO messages (id, chat_id, role, parts, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&m.id)
            .bind(&m.chat_id)
            .bind(m.role.as_str())
            .bind(serde_json::to_string(&m.parts).map_err(|e| ChatError::internal(e.to_string()))?)
            .bind(m.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove every message in the chat created at or after the
    /// reference timestamp (edit/regenerate truncation).
    pub async fn delete_trailing_messages(
        &self,
        chat_id: &str,
        from_created_at: i64,
    ) -> ChatResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE chat_id = $1 AND created_at >= $2")
            .bind(chat_id)
            .bind(from_created_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count user-authored messages across the caller's chats within
    /// the rolling window. Read at request time; concurrent
    /// double-submissions can race past the limit.
    pub async fn message_count_for_user_since(
        &self,
        user_id: &str,
        window_hours: i64,
    ) -> ChatResult<i64> {
        let cutoff = now_ms() - window_hours * 3600 * 1000;
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN chats c ON c.id = m.chat_id
            WHERE c.user_id = $1 AND m.role = 'user' AND m.created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------

    /// Upsert a vote; re-voting overwrites (last write wins per message)
    pub async fn upsert_vote(
        &self,
        chat_id: &str,
        message_id: &str,
        is_upvoted: bool,
    ) -> ChatResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (chat_id, message_id, is_upvoted)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO UPDATE SET is_upvoted = excluded.is_upvoted
            "#,
        )
        .bind(chat_id)
        .bind(message_id)
        .bind(is_upvoted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn votes_for_chat(&self, chat_id: &str) -> ChatResult<Vec<Vote>> {
        let rows: Vec<(String, String, bool)> =
            sqlx::query_as("SELECT chat_id, message_id, is_upvoted FROM votes WHERE chat_id = $1")
                .bind(chat_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, message_id, is_upvoted)| Vote {
                chat_id,
                message_id,
                is_upvoted,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Stream records
    // ------------------------------------------------------------------

    /// Record a freshly allocated stream id for a chat. Never mutated.
    pub async fn create_stream_record(&self, stream_id: &str, chat_id: &str) -> ChatResult<()> {
        sqlx::query("INSERT INTO streams (id, chat_id, created_at) VALUES ($1, $2, $3)")
            .bind(stream_id)
            .bind(chat_id)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent stream id for a chat, if any
    pub async fn latest_stream_id(&self, chat_id: &str) -> ChatResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM streams WHERE chat_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    // ------------------------------------------------------------------
    // Documents & suggestions (artifact tools)
    // ------------------------------------------------------------------

    pub async fn create_document(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        kind: DocumentKind,
        content: &str,
    ) -> ChatResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, title, kind, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(kind.as_str())
        .bind(content)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> ChatResult<Document> {
        let row: Option<(String, String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, user_id, title, kind, content, created_at FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (id, user_id, title, kind, content, created_at) =
            row.ok_or_else(|| ChatError::not_found("document not found"))?;

        Ok(Document {
            id,
            user_id,
            title,
            kind: DocumentKind::parse(&kind).unwrap_or(DocumentKind::Text),
            content,
            created_at,
        })
    }

    pub async fn update_document_content(&self, id: &str, content: &str) -> ChatResult<()> {
        sqlx::query("UPDATE documents SET content = $1 WHERE id = $2")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_suggestions(&self, suggestions: &[Suggestion]) -> ChatResult<()> {
        let mut tx = self.pool.begin().await?;
        for s in suggestions {
            sqlx::query(
                r#"
                INSERT INTO suggestions
                    (id, document_id, original_text, suggested_text, description, is_resolved, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&s.id)
            .bind(&s.document_id)
            .bind(&s.original_text)
            .bind(&s.suggested_text)
            .bind(&s.description)
            .bind(s.is_resolved)
            .bind(s.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn decode_chat(row: (String, String, String, String, Option<String>, i64)) -> Chat {
    let (id, user_id, title, visibility, last_context, created_at) = row;
    Chat {
        id,
        user_id,
        title,
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Private),
        last_context: last_context.and_then(|j| serde_json::from_str(&j).ok()),
        created_at,
    }
}

fn decode_message(row: (String, String, String, String, i64)) -> Message {
    let (id, chat_id, role, parts_json, created_at) = row;
    Message {
        id,
        chat_id,
        role: Role::parse(&role).unwrap_or(Role::User),
        parts: serde_json::from_str(&parts_json).unwrap_or_default(),
        created_at,
    }
}
