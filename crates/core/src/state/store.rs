//! Reingest storage trait and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ReingestRecord, ReingestStatus, StatusCounts};

/// Error type for reingest store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for this package.
    #[error("Package not found in reingest store: {0}")]
    NotFound(String),

    /// The persisted status does not allow the requested transition.
    #[error("Cannot {operation} package {package_id}: current status is {current}")]
    InvalidTransition {
        package_id: String,
        current: ReingestStatus,
        operation: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// A persisted row could not be decoded.
    #[error("Corrupt reingest record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Trait for reingest state backends.
///
/// Every write is durable before the call returns.
pub trait ReingestStore: Send + Sync {
    /// Insert a `NEW` record unless the package is already known.
    /// Returns whether a row was inserted.
    fn upsert_new(&self, package_id: &str, pipeline_id: &str) -> Result<bool, StoreError>;

    /// Get a record by package id.
    fn get(&self, package_id: &str) -> Result<Option<ReingestRecord>, StoreError>;

    /// `NEW -> IN_PROGRESS`.
    fn set_in_progress(
        &self,
        package_id: &str,
        transfer_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError>;

    /// `IN_PROGRESS -> COMPLETE`.
    fn set_complete(
        &self,
        package_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError>;

    /// `IN_PROGRESS -> ERROR`.
    fn set_error(
        &self,
        package_id: &str,
        message: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError>;

    /// `NEW -> ERROR`, for packages whose reingest could not be started.
    fn set_initiation_failed(
        &self,
        package_id: &str,
        message: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError>;

    /// Number of in-flight records for a pipeline.
    fn count_in_progress(&self, pipeline_id: &str) -> Result<usize, StoreError>;

    /// Up to `limit` `NEW` records for a pipeline, in insertion order.
    fn list_new(&self, pipeline_id: &str, limit: usize) -> Result<Vec<ReingestRecord>, StoreError>;

    /// All `IN_PROGRESS` records for a pipeline, in insertion order.
    fn list_in_progress(&self, pipeline_id: &str) -> Result<Vec<ReingestRecord>, StoreError>;

    /// All records with the given status, across pipelines.
    fn list_by_status(&self, status: ReingestStatus) -> Result<Vec<ReingestRecord>, StoreError>;

    /// Record counts per status, across pipelines.
    fn status_counts(&self) -> Result<StatusCounts, StoreError>;

    /// Every record, in insertion order.
    fn dump(&self) -> Result<Vec<ReingestRecord>, StoreError>;
}
