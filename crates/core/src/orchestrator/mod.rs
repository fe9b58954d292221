//! Reingest orchestrator.
//!
//! A run is a single reconcile pass, not a daemon:
//! - **Register**: candidates become `NEW` records
//! - **Advance**: in-progress packages are polled, approved, completed or failed
//! - **Start**: new reingests are initiated up to the throttle

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::ReingestOrchestrator;
pub use types::{CompletionReport, OrchestratorError, RunSummary};
