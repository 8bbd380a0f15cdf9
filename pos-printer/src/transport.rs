//! Delivery transport
//!
//! Moves a compiled job to its printer:
//!
//! ```text
//! Idle -> Staged -> Transmitting -> Completed | TimedOut | Failed
//! ```
//!
//! The job's bytes are staged in a temporary file that is owned by exactly
//! one job and deleted on every exit path. A per-endpoint lock keeps two jobs
//! from staging or transmitting against the same printer at once.
//!
//! A timeout ends the caller's wait. The transmission itself keeps running
//! in its task until the endpoint returns, then releases its buffer and the
//! endpoint lock the same way a completed job does.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use crate::job::PrintJob;
use crate::printer::Printer;

/// Stand-in deadline for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Where a delivery is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Staged,
    Transmitting,
    Completed,
    TimedOut,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Completed | DeliveryState::TimedOut | DeliveryState::Failed
        )
    }
}

/// Outcome of a completed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub endpoint: String,
    pub bytes: usize,
    /// Time from submission to completion, lock wait included
    pub elapsed: Duration,
    pub state: DeliveryState,
}

/// Transport counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    staged: AtomicU64,
    released: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliverySnapshot {
    pub staged: u64,
    pub released: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            staged: self.staged.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn finish(&self, state: DeliveryState) {
        let counter = match state {
            DeliveryState::Completed => &self.completed,
            DeliveryState::TimedOut => &self.timed_out,
            DeliveryState::Failed => &self.failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bytes staged on disk for a single transmission
///
/// Deleted when dropped, whichever way the job ended.
pub(crate) struct TransientBuffer {
    file: Option<NamedTempFile>,
    path: PathBuf,
    stats: Arc<DeliveryStats>,
}

impl TransientBuffer {
    pub(crate) fn stage(
        dir: &Path,
        bytes: &[u8],
        stats: Arc<DeliveryStats>,
    ) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("print-")
            .suffix(".bin")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        stats.staged.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            path: file.path().to_path_buf(),
            file: Some(file),
            stats,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientBuffer {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = file.close() {
            // the file may already be gone; the buffer is released either way
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged buffer");
        }
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        debug!(path = %self.path.display(), "Staged buffer released");
    }
}

/// Timeout-bounded, per-endpoint serialized delivery
#[derive(Debug, Clone)]
pub struct DeliveryTransport {
    staging_dir: PathBuf,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryTransport {
    /// Transport staging buffers in `staging_dir`
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            locks: Arc::new(DashMap::new()),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn from_config(config: &PrinterConfig) -> Self {
        Self::new(config.staging_dir())
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.stats.snapshot()
    }

    /// Lock for one endpoint identity
    ///
    /// Entries are created on first use and pruned by [`settle`](Self::settle)
    /// once nothing holds them. A transport usually serves a handful of
    /// printers, so the map stays small.
    fn endpoint_lock(&self, endpoint: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Deliver a job, waiting at most `job.timeout`
    ///
    /// The deadline covers waiting for the endpoint as well as the
    /// transmission. On timeout this returns at the deadline; the staged
    /// buffer is released once the endpoint call returns.
    #[instrument(skip(self, printer, job), fields(endpoint = %printer.endpoint(), bytes = job.bytes.len()))]
    pub async fn deliver(
        &self,
        printer: Arc<dyn Printer>,
        job: PrintJob,
    ) -> PrintResult<DeliveryReport> {
        let endpoint = printer.endpoint().to_string();
        let timeout = job.timeout;
        let bytes = job.bytes;
        let len = bytes.len();
        let started = Instant::now();
        // Duration::MAX and friends mean "no deadline"
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        debug!(state = ?DeliveryState::Idle, ?timeout);

        let lock = self.endpoint_lock(&endpoint);
        let stats = Arc::clone(&self.stats);
        let staging_dir = self.staging_dir.clone();
        let task_endpoint = endpoint.clone();

        let task = tokio::spawn(async move {
            let Ok(_guard) = tokio::time::timeout_at(deadline, lock.lock_owned()).await else {
                debug!(endpoint = %task_endpoint, "Deadline passed waiting for endpoint");
                return Err(PrintError::Timeout {
                    endpoint: task_endpoint,
                    timeout,
                });
            };

            let buffer = match TransientBuffer::stage(&staging_dir, &bytes, stats) {
                Ok(buffer) => buffer,
                Err(e) => return Err(PrintError::Io(e)),
            };
            debug!(endpoint = %task_endpoint, state = ?DeliveryState::Staged, path = %buffer.path().display());

            debug!(endpoint = %task_endpoint, state = ?DeliveryState::Transmitting);
            let result = printer.transmit(buffer.path()).await;

            // buffer goes before the endpoint is handed to the next job
            drop(buffer);
            result
        });

        let (state, result) = match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(Ok(()))) => (DeliveryState::Completed, Ok(())),
            Ok(Ok(Err(e))) if e.is_timeout() => (DeliveryState::TimedOut, Err(e)),
            Ok(Ok(Err(e))) => (DeliveryState::Failed, Err(e)),
            Ok(Err(join_err)) => (
                DeliveryState::Failed,
                Err(PrintError::Io(std::io::Error::other(format!(
                    "Delivery task failed: {}",
                    join_err
                )))),
            ),
            // dropping the handle detaches the task; it still cleans up
            Err(_) => (
                DeliveryState::TimedOut,
                Err(PrintError::Timeout {
                    endpoint: endpoint.clone(),
                    timeout,
                }),
            ),
        };
        self.stats.finish(state);
        debug!(?state);

        let elapsed = started.elapsed();
        match result {
            Ok(()) => {
                info!(?elapsed, "Print job delivered");
                Ok(DeliveryReport {
                    endpoint,
                    bytes: len,
                    elapsed,
                    state,
                })
            }
            Err(e) => {
                match state {
                    DeliveryState::TimedOut => warn!(?timeout, "Print job timed out"),
                    _ => error!(error = %e, "Print job failed"),
                }
                Err(e)
            }
        }
    }

    /// Wait until no job holds `endpoint`
    ///
    /// After a timeout the abandoned transmission may still be running;
    /// this returns once it has finished and released its buffer.
    pub async fn settle(&self, endpoint: &str) {
        let Some(lock) = self.locks.get(endpoint).map(|entry| Arc::clone(entry.value())) else {
            return;
        };
        drop(lock.lock().await);
        drop(lock);

        // unused entries go; a job still holding a clone keeps its entry
        self.locks
            .remove_if(endpoint, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of endpoints with a lock entry
    pub fn tracked_endpoints(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(DeliveryStats::default());

        let buffer = TransientBuffer::stage(dir.path(), b"abc", Arc::clone(&stats)).unwrap();
        let path = buffer.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc".to_vec());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("print-"));

        drop(buffer);
        assert!(!path.exists());
        let snap = stats.snapshot();
        assert_eq!((snap.staged, snap.released), (1, 1));
    }

    #[test]
    fn test_buffer_released_once_if_file_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(DeliveryStats::default());

        let buffer = TransientBuffer::stage(dir.path(), b"abc", Arc::clone(&stats)).unwrap();
        std::fs::remove_file(buffer.path()).unwrap();
        drop(buffer);

        assert_eq!(stats.snapshot().released, 1);
    }

    #[test]
    fn test_stage_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(DeliveryStats::default());
        let missing = dir.path().join("missing");

        assert!(TransientBuffer::stage(&missing, b"abc", Arc::clone(&stats)).is_err());
        assert_eq!(stats.snapshot(), DeliverySnapshot::default());
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryState::Completed.is_terminal());
        assert!(DeliveryState::TimedOut.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
        assert!(!DeliveryState::Staged.is_terminal());
    }

    #[tokio::test]
    async fn test_settle_prunes_idle_endpoint() {
        let transport = DeliveryTransport::new(std::env::temp_dir());
        let held = transport.endpoint_lock("COM1");
        drop(transport.endpoint_lock("COM2"));
        assert_eq!(transport.tracked_endpoints(), 2);

        transport.settle("COM2").await;
        assert_eq!(transport.tracked_endpoints(), 1);

        // a clone held elsewhere keeps the entry alive
        transport.settle("COM1").await;
        assert_eq!(transport.tracked_endpoints(), 1);
        drop(held);
        transport.settle("COM1").await;
        assert_eq!(transport.tracked_endpoints(), 0);

        transport.settle("unknown").await;
    }

    #[test]
    fn test_same_endpoint_shares_lock() {
        let transport = DeliveryTransport::new(std::env::temp_dir());
        let a = transport.endpoint_lock("COM1");
        let b = transport.endpoint_lock("COM1");
        let c = transport.endpoint_lock("COM2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
