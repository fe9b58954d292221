//! Run coordination: at most one orchestration pass at a time.

mod lock;
mod session;

pub use lock::{LockAcquisition, LockError, RunLock};
pub use session::{RunSession, SessionStart};
