use async_trait::async_trait;
use thiserror::Error;

use crate::event::{OpenEvent, SentMessage};

pub mod memory;
pub mod postgres;

/// Errors from the storage backends, wrapped with the failing operation so
/// logs say more than "sqlx error".
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("{operation} query failed: {error}")]
    Query {
        operation: &'static str,
        error: sqlx::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(&'static str),
}

/// Append-only log of pixel fetches. No uniqueness constraint: the same
/// tracking id legitimately collects many events, including concurrent
/// ones, and each must be kept as a distinct record.
#[async_trait]
pub trait EventStore {
    async fn append(&self, event: OpenEvent) -> Result<(), StoreError>;

    /// All events for a tracking id, ordered by `observed_at` ascending
    /// with insertion order breaking ties.
    async fn opens_for(&self, tracking_id: &str) -> Result<Vec<OpenEvent>, StoreError>;
}

/// Durable link between a tracking id and the message it was attached to.
#[async_trait]
pub trait MailRegistry {
    /// Idempotent upsert keyed by tracking id. Duplicate send reports are
    /// resolved by first-non-empty-field-wins: an earlier non-empty value
    /// is never overwritten, and `sent_at` keeps the first report's time.
    async fn upsert(&self, message: SentMessage) -> Result<(), StoreError>;

    async fn get(&self, tracking_id: &str) -> Result<Option<SentMessage>, StoreError>;

    /// All messages sent by `owner`, newest first.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<SentMessage>, StoreError>;
}
