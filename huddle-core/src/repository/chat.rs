use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{ChatMessage, MeetingId},
    Result,
};

use super::ChatStore;

/// Chat message repository for database operations
#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &PgRow) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: row.try_get("id")?,
            meeting_id: row.try_get("meeting_id")?,
            user_id: row.try_get("user_id")?,
            message: row.try_get("message")?,
            sent_at: row.try_get("sent_at")?,
        })
    }
}

#[async_trait]
impl ChatStore for ChatRepository {
    async fn append(&self, message: &ChatMessage) -> Result<ChatMessage> {
        let row = sqlx::query(
            r"
            INSERT INTO meeting_chats (id, meeting_id, user_id, message, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, meeting_id, user_id, message, sent_at
            ",
        )
        .bind(message.id)
        .bind(message.meeting_id)
        .bind(message.user_id)
        .bind(&message.message)
        .bind(message.sent_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_message(&row)
    }

    async fn history(&self, meeting_id: &MeetingId) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, meeting_id, user_id, message, sent_at
            FROM meeting_chats
            WHERE meeting_id = $1
            ORDER BY sent_at ASC
            ",
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_append_message() {
        // Integration test placeholder
    }
}
