//! The notification pump.
//!
//! Injected would-block answers promise the host a later "I/O complete"
//! callback. Those callbacks are funneled through one background worker so
//! they are delivered in FIFO order and never from under a shim lock: the
//! worker pops one cookie at a time and releases the queue lock across the
//! host call, because the host may re-enter the engine immediately.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use fcache_engine::Host;
use fcache_types::Cookie;

struct QueueState {
    pending: VecDeque<Cookie>,
    stopped: bool,
}

/// The pending-notify FIFO shared between producers and the pump worker.
pub struct NotifyQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

impl NotifyQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                stopped: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Enqueue a cookie for an I/O-complete callback.
    pub fn schedule(&self, cookie: Cookie) {
        {
            let mut state = self.state.lock();
            state.pending.push_back(cookie);
        }
        debug!(%cookie, "scheduled resume notification");
        self.condvar.notify_one();
    }

    /// Cookies currently waiting for delivery.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
impl NotifyQueue {
    /// A detached queue with no pump, for unit tests that only inspect it.
    pub(crate) fn new_for_tests() -> Self {
        Self::new()
    }
}

/// The background worker draining [`NotifyQueue`].
///
/// Dropping the pump stops and joins the worker; cookies still queued at
/// that point are delivered first.
pub struct NotifyPump {
    queue: Arc<NotifyQueue>,
    worker: Option<JoinHandle<()>>,
}

impl NotifyPump {
    /// Start the pump for the given host.
    pub fn start(host: Arc<dyn Host>) -> Self {
        let queue = Arc::new(NotifyQueue::new());
        let worker_queue = Arc::clone(&queue);
        let worker = thread::Builder::new()
            .name("ewb-pending-io".to_string())
            .spawn(move || run(&worker_queue, host.as_ref()))
            .map_err(|err| {
                warn!(%err, "failed to spawn notification pump");
                err
            })
            .ok();
        Self { queue, worker }
    }

    /// The shared queue, for components that schedule notifications.
    #[must_use]
    pub fn queue(&self) -> Arc<NotifyQueue> {
        Arc::clone(&self.queue)
    }

    /// Enqueue a cookie for an I/O-complete callback.
    pub fn schedule(&self, cookie: Cookie) {
        self.queue.schedule(cookie);
    }
}

impl Drop for NotifyPump {
    fn drop(&mut self) {
        self.queue.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("notification pump panicked");
            }
        }
    }
}

fn run(queue: &NotifyQueue, host: &dyn Host) {
    debug!("notification pump running");
    loop {
        let cookie = {
            let mut state = queue.state.lock();
            while state.pending.is_empty() && !state.stopped {
                queue.condvar.wait(&mut state);
            }
            match state.pending.pop_front() {
                Some(cookie) => cookie,
                // Queue drained and stop requested.
                None => break,
            }
        };
        debug!(%cookie, "notifying io complete");
        host.notify_io_complete(cookie, Ok(()));
    }
    debug!("notification pump stopping");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    use fcache_error::Result;
    use fcache_types::ConnectionId;

    use super::*;

    #[derive(Default)]
    struct RecordingHost {
        notified: StdMutex<Vec<Cookie>>,
    }

    impl Host for RecordingHost {
        fn connection_id(&self, cookie: Cookie) -> ConnectionId {
            ConnectionId::new(cookie.get())
        }

        fn notify_io_complete(&self, cookie: Cookie, _status: Result<()>) {
            self.notified.lock().expect("lock").push(cookie);
        }
    }

    fn wait_for(host: &RecordingHost, count: usize) -> Vec<Cookie> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let seen = host.notified.lock().expect("lock").clone();
            if seen.len() >= count {
                return seen;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {count} notifications");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn delivers_in_fifo_order() {
        let host = Arc::new(RecordingHost::default());
        let pump = NotifyPump::start(host.clone());
        for raw in [3u64, 1, 2] {
            pump.schedule(Cookie::new(raw));
        }
        let seen = wait_for(&host, 3);
        assert_eq!(seen, vec![Cookie::new(3), Cookie::new(1), Cookie::new(2)]);
    }

    #[test]
    fn drains_queued_cookies_before_stopping() {
        let host = Arc::new(RecordingHost::default());
        {
            let pump = NotifyPump::start(host.clone());
            for raw in 0u64..16 {
                pump.schedule(Cookie::new(raw));
            }
            // Drop stops and joins; everything queued must still go out.
        }
        let seen = host.notified.lock().expect("lock").clone();
        assert_eq!(seen.len(), 16, "drop must drain the queue, saw {seen:?}");
    }

    #[test]
    fn stop_with_empty_queue_joins_cleanly() {
        let host = Arc::new(RecordingHost::default());
        let pump = NotifyPump::start(host.clone());
        drop(pump);
        assert!(host.notified.lock().expect("lock").is_empty());
    }
}
