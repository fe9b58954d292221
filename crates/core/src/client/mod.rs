//! Preservation platform API client.
//!
//! `PreservationApi` covers both remote services the reingest loop talks to:
//! the processing pipeline (transfer/ingest status, approval) and the
//! storage backend (package listing, package detail, reingest initiation).

mod http;
mod types;

pub use http::HttpPreservationClient;
pub use types::*;
