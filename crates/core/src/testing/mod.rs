//! Testing utilities and mock implementations.
//!
//! `MockPreservationApi` stands in for both remote services so the
//! orchestrator can be driven end to end without a pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use reingestor_core::testing::MockPreservationApi;
//!
//! let api = MockPreservationApi::new();
//! api.add_pipeline(PIPELINE, "default").await;
//! api.add_stored_package("aip-1", Some(PIPELINE), true).await;
//! ```

mod mock_preservation_api;

pub use mock_preservation_api::{MockPreservationApi, RecordedReingest};
