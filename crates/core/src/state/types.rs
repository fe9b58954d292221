//! Core reingest record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a package under reingest management.
///
/// `New -> InProgress -> {Complete | Error}`, with `New -> Error` when
/// initiation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReingestStatus {
    New,
    InProgress,
    Complete,
    Error,
}

impl ReingestStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [ReingestStatus; 4] = [
        ReingestStatus::New,
        ReingestStatus::InProgress,
        ReingestStatus::Complete,
        ReingestStatus::Error,
    ];

    /// Returns the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReingestStatus::New => "NEW",
            ReingestStatus::InProgress => "IN_PROGRESS",
            ReingestStatus::Complete => "COMPLETE",
            ReingestStatus::Error => "ERROR",
        }
    }

    /// Terminal records are never polled or transitioned again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReingestStatus::Complete | ReingestStatus::Error)
    }
}

impl fmt::Display for ReingestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReingestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ReingestStatus::New),
            "IN_PROGRESS" => Ok(ReingestStatus::InProgress),
            "COMPLETE" => Ok(ReingestStatus::Complete),
            "ERROR" => Ok(ReingestStatus::Error),
            other => Err(format!("unknown reingest status: {}", other)),
        }
    }
}

/// One package slated for reingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReingestRecord {
    /// Archived package (AIP) identifier.
    pub package_id: String,
    /// Pipeline the package is reingested into.
    pub pipeline_id: String,
    /// Transfer created by reingest initiation.
    pub transfer_id: Option<String>,
    pub status: ReingestStatus,
    /// Diagnostic text, set on errors.
    pub message: Option<String>,
    /// When initiation succeeded.
    pub start_time: Option<DateTime<Utc>>,
    /// When a terminal status was reached.
    pub end_time: Option<DateTime<Utc>>,
    /// When the record was first loaded.
    pub created_at: DateTime<Utc>,
}

impl ReingestRecord {
    /// Approximate time spent reingesting. Accuracy is bounded by how often
    /// runs are scheduled.
    pub fn processing_time(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

impl fmt::Display for ReingestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "package={} transfer={} status={} message={}",
            self.package_id,
            self.transfer_id.as_deref().unwrap_or("-"),
            self.status,
            self.message.as_deref().unwrap_or(""),
        )?;
        if let Some(elapsed) = self.processing_time() {
            write!(f, " processing_time={}s", elapsed.num_seconds())?;
        }
        Ok(())
    }
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ReingestStatus) -> usize {
        match status {
            ReingestStatus::New => self.new,
            ReingestStatus::InProgress => self.in_progress,
            ReingestStatus::Complete => self.complete,
            ReingestStatus::Error => self.error,
        }
    }

    pub(crate) fn set(&mut self, status: ReingestStatus, count: usize) {
        match status {
            ReingestStatus::New => self.new = count,
            ReingestStatus::InProgress => self.in_progress = count,
            ReingestStatus::Complete => self.complete = count,
            ReingestStatus::Error => self.error = count,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.in_progress + self.complete + self.error
    }

    /// True when nothing is waiting to start or still running.
    pub fn is_drained(&self) -> bool {
        self.new == 0 && self.in_progress == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ReingestStatus::ALL {
            assert_eq!(status.as_str().parse::<ReingestStatus>(), Ok(status));
        }
        assert!("STATUS_NEW".parse::<ReingestStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ReingestStatus::New.is_terminal());
        assert!(!ReingestStatus::InProgress.is_terminal());
        assert!(ReingestStatus::Complete.is_terminal());
        assert!(ReingestStatus::Error.is_terminal());
    }

    #[test]
    fn test_processing_time_requires_both_timestamps() {
        let start = Utc::now();
        let mut record = ReingestRecord {
            package_id: "pkg".to_string(),
            pipeline_id: "pipe".to_string(),
            transfer_id: Some("tx".to_string()),
            status: ReingestStatus::InProgress,
            message: None,
            start_time: Some(start),
            end_time: None,
            created_at: start,
        };
        assert!(record.processing_time().is_none());

        record.end_time = Some(start + Duration::seconds(90));
        record.status = ReingestStatus::Complete;
        assert_eq!(record.processing_time().unwrap().num_seconds(), 90);
        assert!(record.to_string().contains("processing_time=90s"));
    }

    #[test]
    fn test_status_counts_drained() {
        let mut counts = StatusCounts::default();
        assert!(counts.is_drained());
        counts.set(ReingestStatus::InProgress, 2);
        assert!(!counts.is_drained());
        assert_eq!(counts.get(ReingestStatus::InProgress), 2);
        assert_eq!(counts.total(), 2);
    }
}
