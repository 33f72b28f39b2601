//! Repository for chat and message persistence.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Chat, ChatMessage};

/// Repository for chat database operations.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new repository instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========== Chat Operations ==========

    /// Create a new chat.
    pub async fn create_chat(&self, name: &str) -> Result<Chat> {
        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO chats (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .context("inserting chat")?;

        self.get_chat(&id)
            .await?
            .context("fetching chat after insert")
    }

    /// Get a chat by ID.
    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        sqlx::query_as::<_, Chat>("SELECT id, name, created_at FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching chat")
    }

    /// List all chats, oldest first.
    pub async fn list_chats(&self) -> Result<Vec<Chat>> {
        sqlx::query_as::<_, Chat>("SELECT id, name, created_at FROM chats ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .context("listing chats")
    }

    /// Delete a chat and its messages. Returns false if the chat was absent.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("deleting chat")?;

        Ok(result.rows_affected() > 0)
    }

    // ========== Message Operations ==========

    /// Append a finalized user message.
    pub async fn append_user_message(&self, chat_id: &str, text: &str) -> Result<ChatMessage> {
        let created_at = Utc::now().to_rfc3339();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (chat_id, sender, text, finalized, created_at)
            VALUES (?, 'user', ?, 1, ?)
            RETURNING id
            "#,
        )
        .bind(chat_id)
        .bind(text)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await
        .context("inserting user message")?;

        self.get_message(id).await
    }

    /// Insert the placeholder row for an assistant reply that is about to
    /// stream. The id exists for the whole life of the generation; the text
    /// is filled in by [`finalize_message`](Self::finalize_message).
    pub async fn begin_assistant_message(&self, chat_id: &str) -> Result<i64> {
        let created_at = Utc::now().to_rfc3339();

        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (chat_id, sender, text, finalized, created_at)
            VALUES (?, 'assistant', '', 0, ?)
            RETURNING id
            "#,
        )
        .bind(chat_id)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await
        .context("inserting assistant placeholder")
    }

    /// Store the final (possibly partial) text of a streamed reply and mark
    /// it finalized.
    pub async fn finalize_message(&self, message_id: i64, text: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET text = ?, finalized = 1 WHERE id = ?")
            .bind(text)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .context("finalizing message")?;
        Ok(())
    }

    /// Get a message by ID.
    pub async fn get_message(&self, message_id: i64) -> Result<ChatMessage> {
        sqlx::query_as::<_, ChatMessage>(
            "SELECT id, chat_id, sender, text, finalized, created_at FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .context("fetching message")
    }

    /// List a chat's finalized messages in creation order.
    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, chat_id, sender, text, finalized, created_at
            FROM messages
            WHERE chat_id = ? AND finalized = 1
            ORDER BY id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .context("listing messages")
    }

    /// List finalized messages with an id past the given marker, in
    /// creation order. With no marker this is the full history.
    pub async fn messages_after(
        &self,
        chat_id: &str,
        after_id: Option<i64>,
    ) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, chat_id, sender, text, finalized, created_at
            FROM messages
            WHERE chat_id = ? AND finalized = 1 AND id > ?
            ORDER BY id ASC
            "#,
        )
        .bind(chat_id)
        .bind(after_id.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .context("listing messages after marker")
    }
}
