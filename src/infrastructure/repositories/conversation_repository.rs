//! Conversation Repository Implementation
//!
//! PostgreSQL implementation of conversation lookups and the
//! last-writer-wins `latestMessage` update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ChatConversation, ConversationRepository, LatestMessage};
use crate::shared::error::AppError;

/// PostgreSQL conversation repository implementation.
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    /// Creates a new PgConversationRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for conversation queries.
#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    participant_a: String,
    participant_b: String,
    latest_text: Option<String>,
    latest_sender_id: Option<String>,
    latest_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self) -> ChatConversation {
        let latest_message = match (self.latest_text, self.latest_sender_id, self.latest_sent_at) {
            (Some(text), Some(sender_id), Some(sent_at)) => Some(LatestMessage {
                text,
                sender_id,
                sent_at,
            }),
            _ => None,
        };

        ChatConversation {
            id: self.id,
            participants: [self.participant_a, self.participant_b],
            latest_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const SELECT_CONVERSATION: &str = r#"
    SELECT id, participant_a, participant_b, latest_text, latest_sender_id,
           latest_sent_at, created_at, updated_at
    FROM conversations
"#;

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatConversation>, AppError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!("{SELECT_CONVERSATION} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ConversationRow::into_conversation))
    }

    async fn find_by_participants(&self, a: &str, b: &str) -> Result<Option<ChatConversation>, AppError> {
        let [first, second] = ChatConversation::participant_key(a, b);
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "{SELECT_CONVERSATION} WHERE participant_a = $1 AND participant_b = $2"
        ))
        .bind(first)
        .bind(second)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ConversationRow::into_conversation))
    }

    /// Insert the pair, or return the conversation a concurrent caller created.
    async fn create_or_get(
        &self,
        conversation: &ChatConversation,
    ) -> Result<(ChatConversation, bool), AppError> {
        let [first, second] = &conversation.participants;
        let inserted = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (participant_a, participant_b) DO NOTHING
            RETURNING id, participant_a, participant_b, latest_text, latest_sender_id,
                      latest_sent_at, created_at, updated_at
            "#,
        )
        .bind(conversation.id)
        .bind(first)
        .bind(second)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_conversation(), true));
        }

        let existing = self
            .find_by_participants(first, second)
            .await?
            .ok_or_else(|| AppError::Internal("Conversation vanished after conflict".into()))?;
        Ok((existing, false))
    }

    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ChatConversation>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "{SELECT_CONVERSATION} WHERE participant_a = $1 OR participant_b = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationRow::into_conversation).collect())
    }

    /// Last-writer-wins on `latest_sent_at`; an equal timestamp overwrites.
    async fn update_latest_message(&self, id: Uuid, latest: &LatestMessage) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET latest_text = $2,
                latest_sender_id = $3,
                latest_sent_at = $4,
                updated_at = GREATEST(updated_at, $4)
            WHERE id = $1
              AND (latest_sent_at IS NULL OR latest_sent_at <= $4)
            "#,
        )
        .bind(id)
        .bind(&latest.text)
        .bind(&latest.sender_id)
        .bind(latest.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
