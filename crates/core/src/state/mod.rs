//! Persistent reingest state: one durable record per package.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteReingestStore;
pub use store::{ReingestStore, StoreError};
pub use types::{ReingestRecord, ReingestStatus, StatusCounts};
