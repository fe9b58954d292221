//! Pid lock file guarding against overlapping runs.
//!
//! Exclusion comes from an OS advisory lock held on the open file for the
//! whole run. The recorded pid identifies the owner in logs and lets a lock
//! file left behind by a process that never took the advisory lock be
//! judged live or stale.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use thiserror::Error;
use tracing::{debug, warn};

/// Attempts before giving up on a lock file that keeps being replaced.
const MAX_ATTEMPTS: usize = 3;

/// Errors that can occur handling the lock file.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock file error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of trying to take the run lock.
#[derive(Debug)]
pub enum LockAcquisition {
    /// The lock is ours. `reclaimed_from` names the dead owner of a stale
    /// lock that was taken over.
    Acquired {
        lock: RunLock,
        reclaimed_from: Option<u32>,
    },
    /// Another live process holds the lock. `pid` is `None` when the holder
    /// has not written its pid yet.
    Held { pid: Option<u32> },
}

/// An acquired run lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl RunLock {
    /// Try to take the lock at `path` without waiting.
    pub fn acquire(path: &Path) -> Result<LockAcquisition, LockError> {
        let pid = std::process::id();

        for _ in 0..MAX_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| LockError::io(path, e))?;

            match file.try_lock() {
                Ok(()) => {}
                Err(TryLockError::WouldBlock) => {
                    return Ok(LockAcquisition::Held {
                        pid: read_owner(path)?,
                    });
                }
                Err(TryLockError::Error(e)) => return Err(LockError::io(path, e)),
            }

            // A releasing owner unlinks the file before unlocking it, so the
            // handle we locked may no longer be the lock file.
            if !is_current(&file, path).map_err(|e| LockError::io(path, e))? {
                debug!(path = %path.display(), "Lock file replaced while locking, retrying");
                continue;
            }

            let contents = read_contents(&file).map_err(|e| LockError::io(path, e))?;
            let owner: Option<u32> = contents.trim().parse().ok();

            // Written by a process that does not take the advisory lock
            if let Some(owner) = owner {
                if owner != pid && process_alive(owner) {
                    return Ok(LockAcquisition::Held { pid: Some(owner) });
                }
            }
            if !contents.trim().is_empty() {
                warn!(
                    path = %path.display(),
                    stale_pid = ?owner,
                    "Taking over stale run lock"
                );
            }

            write_pid(&file, pid).map_err(|e| LockError::io(path, e))?;
            debug!(path = %path.display(), pid, "Run lock acquired");
            return Ok(LockAcquisition::Acquired {
                lock: Self {
                    file,
                    path: path.to_path_buf(),
                    pid,
                    released: false,
                },
                reclaimed_from: owner.filter(|&owner| owner != pid),
            });
        }

        Err(LockError::io(
            path,
            io::Error::new(io::ErrorKind::WouldBlock, "lock file contended"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the lock file, then drop the advisory lock.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Run lock file already removed");
            }
            Err(e) => return Err(LockError::io(&self.path, e)),
        }
        self.file
            .unlock()
            .map_err(|e| LockError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "Run lock released");
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(LockError::Io { path, source }) = self.release() {
            warn!(path = %path.display(), "Failed to release run lock: {}", source);
        }
    }
}

/// Pid recorded in the lock file. `None` when the file is gone or does not
/// hold a pid.
fn read_owner(path: &Path) -> Result<Option<u32>, LockError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockError::io(path, e)),
    }
}

fn read_contents(mut file: &File) -> io::Result<String> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

fn write_pid(mut file: &File, pid: u32) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", pid)?;
    file.sync_all()
}

/// Whether `file` is still the file found at `path`.
#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_current(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new_with_specifics(RefreshKind::nothing());
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        false,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).is_some()
}
