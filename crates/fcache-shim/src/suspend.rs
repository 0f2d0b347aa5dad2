//! Named suspensions.
//!
//! A suspension holds a cookie in the would-block state under a
//! caller-chosen token until something resumes that token. One cookie may be
//! held under several tokens at once; it stays suspended until the last one
//! is resumed. Resuming schedules exactly one I/O-complete notification.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use fcache_types::{Cookie, SuspendToken};

use crate::notify::NotifyQueue;

/// The token→cookie suspension table.
///
/// Guarded by its own mutex, disjoint from the injector registry's: the two
/// are never held together.
pub struct SuspensionMap {
    tokens: Mutex<HashMap<SuspendToken, Cookie>>,
    notify: Arc<NotifyQueue>,
}

impl SuspensionMap {
    /// Create an empty table that resumes through `notify`.
    #[must_use]
    pub fn new(notify: Arc<NotifyQueue>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            notify,
        }
    }

    /// Register a suspension. Returns `false` when the token is already
    /// taken (the existing suspension is untouched).
    #[must_use]
    pub fn suspend(&self, token: SuspendToken, cookie: Cookie) -> bool {
        let mut tokens = self.tokens.lock();
        if tokens.contains_key(&token) {
            return false;
        }
        debug!(%token, %cookie, "suspending connection");
        tokens.insert(token, cookie);
        true
    }

    /// Resume a token: drop the entry and schedule one notification for its
    /// cookie. Returns `false` when the token is unknown.
    #[must_use]
    pub fn resume(&self, token: SuspendToken) -> bool {
        let cookie = {
            let mut tokens = self.tokens.lock();
            match tokens.remove(&token) {
                Some(cookie) => cookie,
                None => return false,
            }
        };
        debug!(%token, %cookie, "resuming connection");
        // The notification is scheduled outside the suspension lock.
        self.notify.schedule(cookie);
        true
    }

    /// Whether any token currently holds this cookie. Linear scan;
    /// suspensions are rare and the table is small.
    #[must_use]
    pub fn is_suspended(&self, cookie: Cookie) -> bool {
        self.tokens.lock().values().any(|held| *held == cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> SuspensionMap {
        // A queue with no pump: tests inspect it directly.
        let pump_less = Arc::new(crate::notify::NotifyQueue::new_for_tests());
        SuspensionMap::new(pump_less)
    }

    const COOKIE: Cookie = Cookie::new(0x20);
    const TOKEN: SuspendToken = SuspendToken::new(7);

    #[test]
    fn suspend_resume_round_trip() {
        let suspensions = map();
        assert!(suspensions.suspend(TOKEN, COOKIE));
        assert!(suspensions.is_suspended(COOKIE));
        assert!(suspensions.resume(TOKEN));
        assert!(!suspensions.is_suspended(COOKIE));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let suspensions = map();
        assert!(suspensions.suspend(TOKEN, COOKIE));
        assert!(!suspensions.suspend(TOKEN, Cookie::new(0x21)));
        assert!(suspensions.is_suspended(COOKIE), "original suspension untouched");
    }

    #[test]
    fn resume_of_unknown_token_fails() {
        let suspensions = map();
        assert!(!suspensions.resume(SuspendToken::new(99)));
    }

    #[test]
    fn cookie_stays_suspended_until_last_token_resumes() {
        let suspensions = map();
        assert!(suspensions.suspend(SuspendToken::new(1), COOKIE));
        assert!(suspensions.suspend(SuspendToken::new(2), COOKIE));
        assert!(suspensions.resume(SuspendToken::new(1)));
        assert!(suspensions.is_suspended(COOKIE), "second token still holds");
        assert!(suspensions.resume(SuspendToken::new(2)));
        assert!(!suspensions.is_suspended(COOKIE));
    }

    #[test]
    fn resume_schedules_exactly_one_notification() {
        let queue = Arc::new(crate::notify::NotifyQueue::new_for_tests());
        let suspensions = SuspensionMap::new(Arc::clone(&queue));
        assert!(suspensions.suspend(TOKEN, COOKIE));
        assert!(suspensions.resume(TOKEN));
        assert_eq!(queue.pending_len(), 1);
    }
}
