//! The connection→injector registry.
//!
//! One injector per connection id, installed by the control channel and
//! consulted by the injection gate. The gate's decision runs under the
//! registry lock because deciding advances the injector's state.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use fcache_error::EngineError;
use fcache_types::{ConnectionId, Cookie, EngineOp};

use crate::injector::FaultInjector;

/// What the registry concluded for one gated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The error to inject.
    pub error: EngineError,
    /// Whether a would-block may schedule a resume notification.
    pub notifies: bool,
}

#[derive(Default)]
struct Entries {
    map: HashMap<ConnectionId, (Cookie, FaultInjector)>,
}

/// Registry of per-connection fault injectors.
#[derive(Default)]
pub struct InjectorRegistry {
    entries: Mutex<Entries>,
}

impl InjectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an injector for a connection, replacing any previous entry
    /// (and its cookie) without notice.
    pub fn install(&self, id: ConnectionId, cookie: Cookie, injector: FaultInjector) {
        debug!(%id, %cookie, %injector, "installing injector");
        self.entries.lock().map.insert(id, (cookie, injector));
    }

    /// Drop the entry for a connection. Idempotent.
    pub fn remove(&self, id: ConnectionId) {
        self.entries.lock().map.remove(&id);
    }

    /// Consult the injector for one gated call.
    ///
    /// Returns `None` (pass through) when no entry exists. When the stored
    /// cookie differs from the caller's the entry is stale — the connection
    /// was reused — and is evicted without transferring the injector.
    pub fn decide(&self, id: ConnectionId, cookie: Cookie, op: EngineOp) -> Option<Decision> {
        let mut entries = self.entries.lock();
        let (stored_cookie, injector) = entries.map.get_mut(&id)?;
        if *stored_cookie != cookie {
            entries.map.remove(&id);
            return None;
        }
        let error = injector.decide(op)?;
        let notifies = injector.notifies();
        Some(Decision { error, notifies })
    }

    /// Number of installed injectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Whether no injector is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().map.is_empty()
    }
}
