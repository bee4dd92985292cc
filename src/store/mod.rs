//! Persistence layer
//!
//! Three append-oriented collections behind one trait:
//! - `users`: accounts for JWT login
//! - `classification_log`: every successful classification, write-only
//! - `transactions`: immutable transaction records with filtered reads
//!
//! `PgStore` is the production backend; `MemoryStore` keeps everything in
//! process for local demos and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ClassificationLogEntry, NewTransactionRecord, NewUser, TransactionFilter, TransactionRecord,
    User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError>;

    async fn log_classification(&self, entry: ClassificationLogEntry) -> Result<(), StoreError>;

    /// Insert a record; no validation beyond required fields
    async fn append_transaction(
        &self,
        new: NewTransactionRecord,
    ) -> Result<TransactionRecord, StoreError>;

    /// Matching records, newest first
    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}
