//! Core data models for the upload relay.
//!
//! Sessions live in memory only; records map to the `upload_records` table
//! via `sqlx::FromRow`; messages are the streaming transport's wire format.

pub mod messages;
pub mod upload_record;
pub mod upload_session;
