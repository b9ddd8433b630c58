//! Represents a completed upload as recorded in the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `upload_records`. Rows are only ever appended.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadRecord {
    /// Autoincrement row id.
    pub id: i64,

    /// Timestamped object name, e.g. `20250101120000_cat.png`.
    pub filename: String,

    /// Public raw-content URL the object is served from.
    pub url: String,

    /// Repository the object was written to.
    pub repo: String,

    pub created_at: DateTime<Utc>,
}

/// Values for a new `upload_records` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUploadRecord {
    pub filename: String,
    pub url: String,
    pub repo: String,
}
