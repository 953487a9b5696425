//! Message Repository Implementation
//!
//! PostgreSQL implementation of message storage. Inserts are keyed by message
//! id and never overwrite; seen flags only move from false to true.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ChatMessage, ImageRef, InsertOutcome, MessageKind, MessageRepository};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: String,
    text: Option<String>,
    image_url: Option<String>,
    image_storage_key: Option<String>,
    kind: String,
    seen: bool,
    seen_at: Option<DateTime<Utc>>,
    submission_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to domain ChatMessage entity.
    fn into_message(self) -> ChatMessage {
        let image = match (self.image_url, self.image_storage_key) {
            (Some(url), Some(storage_key)) => Some(ImageRef { url, storage_key }),
            _ => None,
        };

        ChatMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            text: self.text,
            image,
            kind: MessageKind::from_str(&self.kind),
            seen: self.seen,
            seen_at: self.seen_at,
            submission_id: self.submission_id,
            created_at: self.created_at,
        }
    }
}

const MESSAGE_COLUMNS: &str = r#"
    id, conversation_id, sender_id, text, image_url, image_storage_key,
    kind, seen, seen_at, submission_id, created_at
"#;

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// Insert with `ON CONFLICT DO NOTHING`; a conflict returns the stored row.
    async fn insert(&self, message: &ChatMessage) -> Result<InsertOutcome, AppError> {
        let started = Instant::now();
        let inserted = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, text, image_url,
                                  image_storage_key, kind, seen, seen_at, submission_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, NULL, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.text)
        .bind(message.image.as_ref().map(|i| i.url.as_str()))
        .bind(message.image.as_ref().map(|i| i.storage_key.as_str()))
        .bind(message.kind.as_str())
        .bind(message.submission_id)
        .bind(message.created_at)
        .fetch_optional(&self.pool)
        .await?;
        metrics::record_db_query("insert", "messages", started.elapsed().as_secs_f64());

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.into_message()));
        }

        let existing = self
            .find_by_id(message.id)
            .await?
            .ok_or_else(|| AppError::Internal("Message vanished after conflict".into()))?;
        Ok(InsertOutcome::AlreadyStored(existing))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MessageRow::into_message))
    }

    async fn find_by_submission(&self, submission_id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        let started = Instant::now();
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE submission_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;
        metrics::record_db_query("find_by_submission", "messages", started.elapsed().as_secs_f64());

        Ok(row.map(MessageRow::into_message))
    }

    async fn find_recent_from_sender(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND sender_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(conversation_id)
        .bind(sender_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn find_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn mark_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET seen = TRUE, seen_at = $2 WHERE id = $1 AND seen = FALSE",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_seen_many(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let flipped = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET seen = TRUE, seen_at = $4
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND id = ANY($3)
              AND seen = FALSE
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(ids)
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        Ok(flipped)
    }

    async fn mark_conversation_seen(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let flipped = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET seen = TRUE, seen_at = $3
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND seen = FALSE
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        Ok(flipped)
    }

    async fn count_unseen(&self, conversation_id: Uuid, reader_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2 AND seen = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
