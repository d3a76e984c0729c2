//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{InsertResult, Record, Table};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// A missing key is never an error; lookups report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Schema provisioning failed: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("A {record} record cannot be written to the {table} table")]
    TableMismatch { table: Table, record: Table },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// A gateway owns one logical database with the tables listed in
/// [`Table::ALL`]. Implementations must be shareable between tasks.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Creates the database and every table if they do not already exist
    ///
    /// Already-existing objects are logged and skipped; only genuine backend
    /// failures are reported, as [`StorageError::Schema`].
    async fn ensure_schema(&self) -> StorageResult<()>;

    /// Gets the record stored under `key`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Record))` - The stored record
    /// * `Ok(None)` - No record with this key
    /// * `Err(StorageError::Unavailable)` - The backend could not answer, or
    ///   the stored row could not be read back
    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Record>>;

    /// Inserts a record keyed by its `id`
    ///
    /// With `overwrite` false an existing key is a conflict, reported in the
    /// returned [`InsertResult`]. With `overwrite` true the existing row is
    /// replaced in a single step.
    async fn insert(&self, table: Table, record: Record, overwrite: bool)
        -> StorageResult<InsertResult>;

    /// Counts the records in a table
    async fn count(&self, table: Table) -> StorageResult<u64>;
}
