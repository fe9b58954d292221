//! One orchestration pass, from lock acquisition to release.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Span};
use uuid::Uuid;

use crate::orchestrator::RunSummary;

use super::lock::{LockAcquisition, LockError, RunLock};

/// Result of trying to begin a run.
#[derive(Debug)]
pub enum SessionStart {
    Started(RunSession),
    /// Another live run holds the lock; nothing may be touched.
    Held { pid: Option<u32> },
}

/// A run holding the lock. Carries the run id and a tracing span for the
/// run's logs.
#[derive(Debug)]
pub struct RunSession {
    lock: RunLock,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    span: Span,
}

impl RunSession {
    /// Take the run lock at `lock_path` and open a session.
    pub fn begin(lock_path: &Path) -> Result<SessionStart, LockError> {
        let (lock, reclaimed_from) = match RunLock::acquire(lock_path)? {
            LockAcquisition::Acquired {
                lock,
                reclaimed_from,
            } => (lock, reclaimed_from),
            LockAcquisition::Held { pid } => {
                info!(
                    pid = ?pid,
                    lock = %lock_path.display(),
                    "Another run is in progress, skipping"
                );
                return Ok(SessionStart::Held { pid });
            }
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        {
            let _enter = span.enter();
            if let Some(stale) = reclaimed_from {
                warn!(stale_pid = stale, "Reclaimed run lock from dead process");
            }
            info!(pid = lock.pid(), "Run started");
        }

        Ok(SessionStart::Started(Self {
            lock,
            run_id,
            started_at: Utc::now(),
            span,
        }))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Span under which the run's work is logged.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Log the outcome and release the lock.
    pub fn finish(mut self, summary: &RunSummary) -> Result<(), LockError> {
        let _enter = self.span.enter();
        let elapsed = Utc::now() - self.started_at;
        info!(
            elapsed_ms = elapsed.num_milliseconds(),
            "Run finished: {}", summary
        );
        self.lock.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lck");

        let session = match RunSession::begin(&path).unwrap() {
            SessionStart::Started(session) => session,
            SessionStart::Held { pid } => panic!("lock unexpectedly held by {:?}", pid),
        };
        assert!(path.exists());
        assert!(session.started_at() <= Utc::now());

        // A second session is refused while the first holds the lock
        assert!(matches!(
            RunSession::begin(&path).unwrap(),
            SessionStart::Held { .. }
        ));

        session.finish(&RunSummary::default()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_run_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lck");

        let first = match RunSession::begin(&path).unwrap() {
            SessionStart::Started(session) => session,
            SessionStart::Held { .. } => panic!("lock held"),
        };
        let first_id = first.run_id();
        first.finish(&RunSummary::default()).unwrap();

        let second = match RunSession::begin(&path).unwrap() {
            SessionStart::Started(session) => session,
            SessionStart::Held { .. } => panic!("lock held"),
        };
        assert_ne!(first_id, second.run_id());
    }
}
