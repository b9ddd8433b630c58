//! RecordStore — append-only log of completed uploads.

use crate::models::upload_record::{NewUploadRecord, UploadRecord};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

const MAX_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct RecordStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl RecordStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Append one row. There is no update or delete path.
    pub async fn insert(&self, record: &NewUploadRecord) -> Result<UploadRecord, sqlx::Error> {
        sqlx::query_as::<_, UploadRecord>(
            r#"
            INSERT INTO upload_records (filename, url, repo, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, filename, url, repo, created_at
            "#,
        )
        .bind(&record.filename)
        .bind(&record.url)
        .bind(&record.repo)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
    }

    /// Most recent records first. `limit` is clamped to 1..=100.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<UploadRecord>, sqlx::Error> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT id, filename, url, repo, created_at
             FROM upload_records ORDER BY id DESC LIMIT ?",
        )
        .bind(limit.clamp(1, MAX_LIST_LIMIT))
        .fetch_all(&*self.db)
        .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM upload_records")
            .fetch_one(&*self.db)
            .await
    }
}
