//! `user_feedback` table operations

use async_trait::async_trait;
use sift_common::db::FeedbackDocument;
use sift_common::{time, Error, Result};
use sqlx::{Row, SqlitePool};

use super::retry_on_lock;

/// SQLite caps bound parameters per statement; stay well below it
const UPDATE_CHUNK_SIZE: usize = 500;

/// Document store holding user feedback
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Insert one feedback document
    async fn insert(&self, document: &FeedbackDocument) -> Result<()>;

    /// All documents whose need-for-train flag is set, oldest first
    async fn find_needing_training(&self) -> Result<Vec<FeedbackDocument>>;

    /// Number of documents whose need-for-train flag is set
    async fn count_needing_training(&self) -> Result<u64>;

    /// Clear the need-for-train flag on the given documents
    ///
    /// Returns the number of documents changed.
    async fn clear_need_for_train(&self, ids: &[String]) -> Result<u64>;

    /// Fetch one document by id
    async fn get(&self, id: &str) -> Result<Option<FeedbackDocument>>;
}

/// [`FeedbackStore`] backed by the shared SQLite pool
#[derive(Clone)]
pub struct SqliteFeedbackStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteFeedbackStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl FeedbackStore for SqliteFeedbackStore {
    async fn insert(&self, document: &FeedbackDocument) -> Result<()> {
        let timestamp = document.timestamp.to_rfc3339();

        retry_on_lock("insert_feedback", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO user_feedback (
                    id, image, image_label, model_prediction,
                    user_feedback, platform, need_for_train, timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&document.id)
            .bind(&document.image)
            .bind(&document.image_label)
            .bind(&document.model_prediction)
            .bind(&document.user_feedback)
            .bind(&document.platform)
            .bind(document.need_for_train)
            .bind(&timestamp)
            .execute(&self.pool)
            .await?;

            Ok::<(), Error>(())
        })
        .await
    }

    async fn find_needing_training(&self) -> Result<Vec<FeedbackDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, image, image_label, model_prediction,
                   user_feedback, platform, need_for_train, timestamp
            FROM user_feedback
            WHERE need_for_train = 1
            ORDER BY timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn count_needing_training(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_feedback WHERE need_for_train = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn clear_need_for_train(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        retry_on_lock("clear_need_for_train", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let mut changed = 0u64;

            for chunk in ids.chunks(UPDATE_CHUNK_SIZE) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "UPDATE user_feedback SET need_for_train = 0 WHERE need_for_train = 1 AND id IN ({})",
                    placeholders
                );
                let mut query = sqlx::query(&sql);
                for id in chunk {
                    query = query.bind(id);
                }
                changed += query.execute(&mut *tx).await?.rows_affected();
            }

            tx.commit().await?;
            Ok::<u64, Error>(changed)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<FeedbackDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, image, image_label, model_prediction,
                   user_feedback, platform, need_for_train, timestamp
            FROM user_feedback
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FeedbackDocument> {
    let timestamp: String = row.try_get("timestamp")?;

    Ok(FeedbackDocument {
        id: row.try_get("id")?,
        image: row.try_get("image")?,
        image_label: row.try_get("image_label")?,
        model_prediction: row.try_get("model_prediction")?,
        user_feedback: row.try_get("user_feedback")?,
        platform: row.try_get("platform")?,
        need_for_train: row.try_get("need_for_train")?,
        timestamp: time::parse_rfc3339(&timestamp)?,
    })
}
