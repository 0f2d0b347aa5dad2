//! File-block monitor workers.
//!
//! A monitor holds a suspension until a file on disk disappears, then
//! resumes the token. Polling keeps this portable; the cadence is short
//! enough to be invisible to test pacing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use fcache_error::{EngineError, Result};
use fcache_types::SuspendToken;

use crate::suspend::SuspensionMap;

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Tracks spawned monitor workers so shutdown can join them.
#[derive(Default)]
pub struct MonitorSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl MonitorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a worker that resumes `token` once `path` no longer names a
    /// file. The caller has already registered the suspension and verified
    /// the file exists.
    pub fn spawn(
        &self,
        token: SuspendToken,
        path: PathBuf,
        suspensions: Arc<SuspensionMap>,
    ) -> Result<()> {
        let stop = Arc::clone(&self.stop);
        let spawned = thread::Builder::new()
            .name(format!("ewb-blockmon-{}", token.get()))
            .spawn(move || {
                debug!(%token, path = %path.display(), "block monitor started");
                while path.is_file() {
                    if stop.load(Ordering::Relaxed) {
                        debug!(%token, "block monitor stopping at shutdown");
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                debug!(%token, path = %path.display(), "monitored file is gone");
                if !suspensions.resume(token) {
                    // The token was resumed by hand while we were polling.
                    debug!(%token, "block monitor found its token already resumed");
                }
            });

        match spawned {
            Ok(handle) => {
                self.handles.lock().push(handle);
                Ok(())
            }
            Err(err) => {
                warn!(%token, %err, "failed to spawn block monitor");
                Err(EngineError::Failed)
            }
        }
    }

    /// Number of workers spawned over the set's lifetime.
    #[must_use]
    pub fn spawned_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Drop for MonitorSet {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!("block monitor worker panicked");
            }
        }
    }
}
