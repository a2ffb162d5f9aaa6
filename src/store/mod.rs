//! Record store capability used by the data service.
//!
//! The service only needs a handful of operations, so the store is a trait
//! rather than a concrete client. [`SqliteStore`] is the implementation the
//! server runs on.

pub mod predicate;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use predicate::{Condition, OrderBy, Predicate, Range, SortDirection};
pub use sqlite::SqliteStore;

/// A stored record: a JSON object whose `id` is assigned by the store.
pub type Record = Map<String, Value>;
pub type RecordId = i64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record targeted by an update or delete does not exist (or is excluded by the guard).
    #[error("record to mutate was not found")]
    RecordNotFound,
    #[error("invalid field name '{0}'")]
    InvalidField(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("stored record {id} is not a JSON object: {message}")]
    Corrupt { id: RecordId, message: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            other => StoreError::Sqlx(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub predicate: Predicate,
    pub order_by: OrderBy,
    /// `None` returns every match.
    pub limit: Option<u64>,
    pub offset: u64,
}

impl FindQuery {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate, ..Self::default() }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Record>>;

    async fn find_first(&self, predicate: &Predicate) -> StoreResult<Option<Record>> {
        let query = FindQuery { predicate: predicate.clone(), limit: Some(1), ..FindQuery::default() };
        Ok(self.find_many(&query).await?.into_iter().next())
    }

    async fn count(&self, predicate: &Predicate) -> StoreResult<u64>;

    /// Persists `data` and returns it with its assigned `id`.
    async fn create(&self, data: Record) -> StoreResult<Record>;

    /// Shallow-merges `patch` into the record `id` if it also matches `guard`.
    async fn update(&self, id: RecordId, patch: Record, guard: &Predicate) -> StoreResult<Record>;

    /// Removes the record `id` if it also matches `guard`, returning it.
    async fn delete(&self, id: RecordId, guard: &Predicate) -> StoreResult<Record>;

    /// Trivial round trip used by health checks.
    async fn ping(&self) -> StoreResult<()>;
}
