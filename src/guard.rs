//! Run guard.
//!
//! Serializes runs across processes with a marker file holding a
//! [`RunLockRecord`]. A marker younger than the staleness window blocks a
//! new run; an older one is treated as left behind by a crashed run and is
//! replaced. Markers dated in the future are stale. The marker is created
//! exclusively, so two runs starting together cannot both acquire it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::types::SidepotError;

/// Default marker path.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/espn_sidepots.lock";

/// Markers older than this are stale.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 300;

/// Contents of the lock marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLockRecord {
    pub created_at: DateTime<Utc>,
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquire {
    Acquired,
    /// Another run holds a fresh marker.
    Busy { age: Duration },
}

/// Mutual exclusion for one orchestrator invocation.
pub trait RunGuard: Send + Sync {
    /// Take the lock unless a fresh marker exists.
    fn acquire(&self, now: DateTime<Utc>) -> Result<Acquire, SidepotError>;

    /// Remove the marker. Missing markers are not an error.
    fn release(&self) -> Result<(), SidepotError>;
}

/// Whether a marker created at `created_at` still blocks a run at `now`.
/// A marker from the future came from a skewed clock and never blocks.
fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    created_at <= now && now - created_at < stale_after
}

// ---------------------------------------------------------------------------
// Scoped acquisition
// ---------------------------------------------------------------------------

/// An acquired guard. Releases the marker when dropped.
///
/// Call [`RunLease::release`] on the normal path to surface release errors;
/// `Drop` covers early returns and panics.
pub struct RunLease<'a> {
    guard: Option<&'a dyn RunGuard>,
}

impl<'a> RunLease<'a> {
    /// Attempt to acquire `guard`. `None` means another run is active.
    pub fn acquire(guard: &'a dyn RunGuard, now: DateTime<Utc>) -> Result<Option<Self>, SidepotError> {
        match guard.acquire(now)? {
            Acquire::Acquired => Ok(Some(Self { guard: Some(guard) })),
            Acquire::Busy { age } => {
                info!(age_secs = age.num_seconds(), "Run lock present, skipping run");
                Ok(None)
            }
        }
    }

    /// Release the marker now, propagating any error.
    pub fn release(mut self) -> Result<(), SidepotError> {
        match self.guard.take() {
            Some(guard) => guard.release(),
            None => Ok(()),
        }
    }
}

impl Drop for RunLease<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if let Err(e) = guard.release() {
                error!(error = %e, "Failed to release run lock");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem guard
// ---------------------------------------------------------------------------

/// Marker-file guard shared by every run on the host.
pub struct FileRunGuard {
    path: PathBuf,
    stale_after: Duration,
}

impl FileRunGuard {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    fn lock_error(&self, source: std::io::Error) -> SidepotError {
        SidepotError::Lock {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Creation time of the existing marker, if any.
    ///
    /// Prefers the timestamp recorded inside the marker; falls back to the
    /// file's mtime when the contents cannot be parsed.
    fn marker_created_at(&self) -> Result<Option<DateTime<Utc>>, SidepotError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.lock_error(e)),
        };

        if let Ok(record) = serde_json::from_str::<RunLockRecord>(&contents) {
            return Ok(Some(record.created_at));
        }

        warn!(path = %self.path.display(), "Unreadable lock marker, using file mtime");
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| self.lock_error(e))?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    /// Create the marker only if no other run has created it meanwhile.
    fn create_marker(&self, now: DateTime<Utc>) -> Result<Acquire, SidepotError> {
        let record = RunLockRecord { created_at: now };
        let json = serde_json::to_string(&record)
            .map_err(|e| self.lock_error(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!(path = %self.path.display(), "Run lock taken by a concurrent run");
                return Ok(Acquire::Busy { age: Duration::zero() });
            }
            Err(e) => return Err(self.lock_error(e)),
        };
        file.write_all(json.as_bytes()).map_err(|e| self.lock_error(e))?;

        debug!(path = %self.path.display(), "Run lock acquired");
        Ok(Acquire::Acquired)
    }
}

impl RunGuard for FileRunGuard {
    fn acquire(&self, now: DateTime<Utc>) -> Result<Acquire, SidepotError> {
        if let Some(created_at) = self.marker_created_at()? {
            if is_fresh(created_at, now, self.stale_after) {
                return Ok(Acquire::Busy { age: now - created_at });
            }
            warn!(
                path = %self.path.display(),
                created_at = %created_at,
                "Overriding stale run lock"
            );
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(self.lock_error(e)),
            }
        }

        self.create_marker(now)
    }

    fn release(&self) -> Result<(), SidepotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Run lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.lock_error(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory guard
// ---------------------------------------------------------------------------

/// Process-local guard with the same semantics, for tests and embedding.
pub struct MemoryRunGuard {
    marker: Mutex<Option<RunLockRecord>>,
    stale_after: Duration,
}

impl MemoryRunGuard {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            marker: Mutex::new(None),
            stale_after,
        }
    }

    pub fn is_held(&self) -> bool {
        self.marker.lock().map(|m| m.is_some()).unwrap_or(false)
    }
}

impl Default for MemoryRunGuard {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALE_AFTER_SECS))
    }
}

impl RunGuard for MemoryRunGuard {
    fn acquire(&self, now: DateTime<Utc>) -> Result<Acquire, SidepotError> {
        let mut marker = self
            .marker
            .lock()
            .map_err(|_| SidepotError::Config("memory run guard poisoned".into()))?;
        if let Some(record) = marker.as_ref() {
            if is_fresh(record.created_at, now, self.stale_after) {
                return Ok(Acquire::Busy { age: now - record.created_at });
            }
        }
        *marker = Some(RunLockRecord { created_at: now });
        Ok(Acquire::Acquired)
    }

    fn release(&self) -> Result<(), SidepotError> {
        let mut marker = self
            .marker
            .lock()
            .map_err(|_| SidepotError::Config("memory run guard poisoned".into()))?;
        *marker = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
