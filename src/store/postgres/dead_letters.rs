use async_trait::async_trait;
use sqlx::PgPool;

use crate::store::{DeadLetter, DeadLetterStore, StoreError};

pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn add(&self, letter: DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO dead_letter_queue (
                id, aggregate_id, event_type, topic, payload,
                error_message, failure_count, first_failed_at, last_failed_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET
                error_message = EXCLUDED.error_message,
                failure_count = dead_letter_queue.failure_count + EXCLUDED.failure_count,
                last_failed_at = EXCLUDED.last_failed_at",
        )
        .bind(letter.id)
        .bind(letter.aggregate_id)
        .bind(&letter.event_type)
        .bind(&letter.topic)
        .bind(&letter.payload)
        .bind(&letter.error_message)
        .bind(letter.failure_count)
        .bind(letter.first_failed_at)
        .bind(letter.last_failed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let letters = sqlx::query_as(
            "SELECT id, aggregate_id, event_type, topic, payload, error_message,
                    failure_count, first_failed_at, last_failed_at
             FROM dead_letter_queue
             ORDER BY last_failed_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(letters)
    }
}
