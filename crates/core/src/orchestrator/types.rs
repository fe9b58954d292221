//! Types for the reingest orchestrator.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{ReingestRecord, StatusCounts};

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Reingest store error.
    #[error("reingest store error")]
    Store(#[from] crate::state::StoreError),

    /// Preservation API error.
    #[error("preservation API error")]
    Api(#[from] crate::client::ApiError),

    /// Candidate selection error.
    #[error("candidate selection failed")]
    Source(#[from] crate::source::SourceError),

    /// Run lock error.
    #[error("run lock error")]
    Lock(#[from] crate::coordinator::LockError),

    /// The configured pipeline or processing configuration does not exist.
    #[error("preflight check failed: {0}")]
    Preflight(String),
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Candidates handed to the run.
    pub candidates: usize,
    /// Candidates that were not yet known to the store.
    pub registered: usize,
    /// In-progress records polled.
    pub polled: usize,
    /// Transfers approved.
    pub approved: usize,
    /// Records that reached `COMPLETE`.
    pub completed: usize,
    /// Records that reached `ERROR`, including failed initiations.
    pub errored: usize,
    /// Reingests started.
    pub started: usize,
    /// Records skipped because of a transient or per-record failure.
    pub skipped: usize,
    /// Store counts after the run.
    pub counts: StatusCounts,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidates={} registered={} polled={} approved={} completed={} errored={} started={} skipped={} | new={} in_progress={} complete={} error={}",
            self.candidates,
            self.registered,
            self.polled,
            self.approved,
            self.completed,
            self.errored,
            self.started,
            self.skipped,
            self.counts.new,
            self.counts.in_progress,
            self.counts.complete,
            self.counts.error,
        )
    }
}

/// Final statistics once nothing is waiting or running.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub complete: Vec<ReingestRecord>,
    pub errored: Vec<ReingestRecord>,
}

impl CompletionReport {
    /// Sum of processing times of completed packages.
    pub fn total_processing_time(&self) -> Duration {
        self.complete
            .iter()
            .filter_map(ReingestRecord::processing_time)
            .fold(Duration::zero(), |acc, d| acc + d)
    }

    /// Mean processing time of completed packages, if any completed.
    pub fn average_processing_time(&self) -> Option<Duration> {
        let timed = self
            .complete
            .iter()
            .filter(|r| r.processing_time().is_some())
            .count();
        if timed == 0 {
            return None;
        }
        let timed = i64::try_from(timed).ok()?;
        Some(Duration::milliseconds(
            self.total_processing_time().num_milliseconds() / timed,
        ))
    }
}
