use chrono::{DateTime, Utc};
use hsc_core::model::{AttemptRecord, CardId, CardProgress, UserId};

use super::{
    SqliteRepository,
    mapping::{card_id_i64, conn, id_i64, map_attempt_row, map_progress_row, user_text, write_err},
};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    user_id, card_id, attempts, correct_attempts, last_attempt_at, next_review_at,
    ease_factor, interval_days
";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM card_progress WHERE user_id = ?1 AND card_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user_text(user_id))
            .bind(card_id_i64(card_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CardProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM card_progress WHERE user_id = ?1 ORDER BY card_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_text(user_id))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }

    async fn due_progress(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CardProgress>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS}
            FROM card_progress
            WHERE user_id = ?1 AND next_review_at <= ?2
              AND card_id IN (SELECT id FROM cards WHERE is_active = 1 AND is_archived = 0)
            ORDER BY next_review_at ASC, card_id ASC
            LIMIT ?3
            "
        );
        let rows = sqlx::query(&sql)
            .bind(user_text(user_id))
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }

    async fn record_attempt(
        &self,
        progress: &CardProgress,
        attempt: &AttemptRecord,
    ) -> Result<(), StorageError> {
        if progress.user_id() != attempt.user_id || progress.card_id() != attempt.card_id {
            return Err(StorageError::Conflict);
        }

        let user = user_text(progress.user_id());
        let card = card_id_i64(progress.card_id())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO card_progress (
                user_id, card_id, attempts, correct_attempts, last_attempt_at,
                next_review_at, ease_factor, interval_days
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, card_id) DO UPDATE SET
                attempts = excluded.attempts,
                correct_attempts = excluded.correct_attempts,
                last_attempt_at = excluded.last_attempt_at,
                next_review_at = excluded.next_review_at,
                ease_factor = excluded.ease_factor,
                interval_days = excluded.interval_days
            ",
        )
        .bind(&user)
        .bind(card)
        .bind(i64::from(progress.attempts()))
        .bind(i64::from(progress.correct_attempts()))
        .bind(progress.last_attempt_at())
        .bind(progress.next_review_at())
        .bind(progress.ease_factor())
        .bind(i64::from(progress.interval_days()))
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        sqlx::query(
            r"
            INSERT INTO attempts (user_id, card_id, is_correct, answered_at, response_time_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&user)
        .bind(card)
        .bind(attempt.is_correct)
        .bind(attempt.answered_at)
        .bind(
            attempt
                .response_time_ms
                .map(|ms| id_i64("response_time_ms", ms))
                .transpose()?,
        )
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn attempts_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, card_id, is_correct, answered_at, response_time_ms
            FROM attempts
            WHERE user_id = ?1 AND (?2 IS NULL OR answered_at >= ?2)
            ORDER BY answered_at ASC, id ASC
            ",
        )
        .bind(user_text(user_id))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_attempt_row).collect()
    }
}
