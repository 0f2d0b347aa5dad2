//! The shim engine: a transparent proxy that injects faults.
//!
//! Every gated operation first asks [`ShimEngine::should_inject`]; a clean
//! answer forwards the call to the wrapped engine untouched. Flush and the
//! void item setters are never gated: flush's retry semantics are
//! host-managed, and the setters have no error return.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use fcache_engine::{CollectionId, Collections, Dcp, Engine, Host};
use fcache_error::{EngineError, Result};
use fcache_types::flags::{CompressionMode, Datatype, EngineFeatures};
use fcache_types::item::{
    DocStateFilter, DocumentState, DurabilityRequirements, ItemHandle, ItemInfo, MutationDescr,
    StoreOperation,
};
use fcache_types::message::{Request, Response};
use fcache_types::{Cookie, DocKey, EngineOp, Vbid};

use crate::config::{split_config_str, ShimConfig};
use crate::dcp::{canned_mutation_item, SyntheticStream};
use crate::monitor::MonitorSet;
use crate::notify::NotifyPump;
use crate::registry::InjectorRegistry;
use crate::suspend::SuspensionMap;

/// The fault-injection proxy engine.
///
/// Wraps a real [`Engine`] and exposes the same surface. Construction
/// starts the notification pump; `Drop` stops and joins it along with any
/// file-monitor workers.
pub struct ShimEngine {
    pub(crate) host: Arc<dyn Host>,
    pub(crate) real: Arc<dyn Engine>,
    pub(crate) config: ShimConfig,
    pub(crate) registry: InjectorRegistry,
    pub(crate) suspensions: Arc<SuspensionMap>,
    pub(crate) streams: Mutex<HashMap<Cookie, SyntheticStream>>,
    pub(crate) canned_mutation: ItemHandle,
    pub(crate) clustermap_revno: AtomicU64,
    // Monitors are declared before the pump: they are joined first, while
    // the pump can still drain the notifications their resumes enqueue.
    pub(crate) monitors: MonitorSet,
    pub(crate) pump: NotifyPump,
}

impl ShimEngine {
    /// Wrap `real`, reaching back into the server through `host`.
    #[must_use]
    pub fn new(config: ShimConfig, real: Arc<dyn Engine>, host: Arc<dyn Host>) -> Self {
        let pump = NotifyPump::start(Arc::clone(&host));
        let suspensions = Arc::new(SuspensionMap::new(pump.queue()));
        Self {
            host,
            real,
            config,
            registry: InjectorRegistry::new(),
            suspensions,
            streams: Mutex::new(HashMap::new()),
            canned_mutation: canned_mutation_item(),
            clustermap_revno: AtomicU64::new(1),
            monitors: MonitorSet::new(),
            pump,
        }
    }

    /// Current cluster-map revision.
    #[must_use]
    pub fn cluster_map_revno(&self) -> u64 {
        self.clustermap_revno.load(Ordering::Relaxed)
    }

    /// The host told us this connection went away: drop its injector.
    /// Suspensions and synthetic streams keyed by the dead cookie are left
    /// behind; no live lookup will match them again.
    pub fn handle_disconnect(&self, cookie: Cookie) {
        debug!(%cookie, "connection disconnected");
        let id = self.host.connection_id(cookie);
        self.registry.remove(id);
    }

    /// The per-call injection decision.
    ///
    /// An explicit suspension dominates any programmed injector, and a
    /// suspended cookie never enqueues here — the resume does. Otherwise
    /// the registry decides; a would-block whose policy permits
    /// notification promises the host exactly one later callback.
    pub(crate) fn should_inject(&self, op: EngineOp, cookie: Cookie) -> Option<EngineError> {
        if self.suspensions.is_suspended(cookie) {
            return Some(EngineError::WouldBlock);
        }

        let id = self.host.connection_id(cookie);
        let decision = self.registry.decide(id, cookie, op)?;
        debug!(%cookie, %op, error = %decision.error, "injecting error");
        if decision.error == EngineError::WouldBlock && decision.notifies {
            self.pump.schedule(cookie);
        }
        Some(decision.error)
    }

    fn gate(&self, op: EngineOp, cookie: Cookie) -> Result<()> {
        match self.should_inject(op, cookie) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn store_op(operation: StoreOperation) -> EngineOp {
        if operation == StoreOperation::Cas {
            EngineOp::Cas
        } else {
            EngineOp::Store
        }
    }
}

impl Engine for ShimEngine {
    fn initialize(&self, config: &str) -> Result<()> {
        // The wrapped engine is injected at construction; only its share of
        // the configuration string is forwarded.
        let split = split_config_str(config);
        debug!(engine = split.engine, "initializing wrapped engine");
        self.real.initialize(split.tail)
    }

    fn allocate(
        &self,
        cookie: Cookie,
        key: &DocKey,
        nbytes: usize,
        flags: u32,
        exptime: u32,
        datatype: Datatype,
        vbucket: Vbid,
    ) -> Result<ItemHandle> {
        self.gate(EngineOp::Allocate, cookie)?;
        self.real
            .allocate(cookie, key, nbytes, flags, exptime, datatype, vbucket)
    }

    fn allocate_ex(
        &self,
        cookie: Cookie,
        key: &DocKey,
        nbytes: usize,
        priv_nbytes: usize,
        flags: u32,
        exptime: u32,
        datatype: Datatype,
        vbucket: Vbid,
    ) -> Result<ItemHandle> {
        self.gate(EngineOp::Allocate, cookie)?;
        self.real.allocate_ex(
            cookie, key, nbytes, priv_nbytes, flags, exptime, datatype, vbucket,
        )
    }

    fn get(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        filter: DocStateFilter,
    ) -> Result<ItemHandle> {
        self.gate(EngineOp::Get, cookie)?;
        self.real.get(cookie, key, vbucket, filter)
    }

    fn get_if(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        predicate: &dyn Fn(&ItemInfo) -> bool,
    ) -> Result<Option<ItemHandle>> {
        self.gate(EngineOp::Get, cookie)?;
        self.real.get_if(cookie, key, vbucket, predicate)
    }

    fn get_and_touch(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        exptime: u32,
        durability: Option<DurabilityRequirements>,
    ) -> Result<ItemHandle> {
        self.gate(EngineOp::Get, cookie)?;
        self.real
            .get_and_touch(cookie, key, vbucket, exptime, durability)
    }

    fn get_locked(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        lock_timeout: u32,
    ) -> Result<ItemHandle> {
        self.gate(EngineOp::Lock, cookie)?;
        self.real.get_locked(cookie, key, vbucket, lock_timeout)
    }

    fn unlock(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid, cas: u64) -> Result<()> {
        self.gate(EngineOp::Unlock, cookie)?;
        self.real.unlock(cookie, key, vbucket, cas)
    }

    fn get_meta(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid) -> Result<ItemInfo> {
        self.gate(EngineOp::GetMeta, cookie)?;
        self.real.get_meta(cookie, key, vbucket)
    }

    fn store(
        &self,
        cookie: Cookie,
        item: &ItemHandle,
        cas: u64,
        operation: StoreOperation,
        durability: Option<DurabilityRequirements>,
        document_state: DocumentState,
    ) -> Result<u64> {
        self.gate(Self::store_op(operation), cookie)?;
        self.real
            .store(cookie, item, cas, operation, durability, document_state)
    }

    fn store_if(
        &self,
        cookie: Cookie,
        item: &ItemHandle,
        cas: u64,
        operation: StoreOperation,
        predicate: &dyn Fn(Option<&ItemInfo>) -> bool,
        durability: Option<DurabilityRequirements>,
        document_state: DocumentState,
    ) -> Result<u64> {
        self.gate(Self::store_op(operation), cookie)?;
        self.real.store_if(
            cookie,
            item,
            cas,
            operation,
            predicate,
            durability,
            document_state,
        )
    }

    fn remove(
        &self,
        cookie: Cookie,
        key: &DocKey,
        cas: u64,
        vbucket: Vbid,
        durability: Option<DurabilityRequirements>,
    ) -> Result<MutationDescr> {
        self.gate(EngineOp::Remove, cookie)?;
        self.real.remove(cookie, key, cas, vbucket, durability)
    }

    fn flush(&self, cookie: Cookie) -> Result<()> {
        // Never gated: the host treats a would-block from flush as "issue
        // the next command", not "re-flush", so injecting here would lie.
        self.real.flush(cookie)
    }

    fn get_stats(
        &self,
        cookie: Cookie,
        key: &str,
        add_stat: &mut dyn FnMut(&str, &str),
    ) -> Result<()> {
        self.gate(EngineOp::GetStats, cookie)?;
        self.real.get_stats(cookie, key, add_stat)
    }

    fn reset_stats(&self, cookie: Cookie) {
        self.real.reset_stats(cookie);
    }

    fn unknown_command(&self, cookie: Cookie, request: &Request) -> Result<Response> {
        if request.opcode == self.config.control_opcode {
            return self.handle_control(cookie, request);
        }
        self.gate(EngineOp::UnknownCommand, cookie)?;
        self.real.unknown_command(cookie, request)
    }

    fn item_set_cas(&self, item: &ItemHandle, cas: u64) {
        // No error return, so never gated.
        self.real.item_set_cas(item, cas);
    }

    fn item_set_datatype(&self, item: &ItemHandle, datatype: Datatype) {
        // No error return, so never gated.
        self.real.item_set_datatype(item, datatype);
    }

    fn get_item_info(&self, item: &ItemHandle) -> Option<ItemInfo> {
        if item.same_record(&self.canned_mutation) {
            // The synthetic stream's item never visited the wrapped engine.
            return Some(item.info());
        }
        self.real.get_item_info(item)
    }

    fn features(&self) -> EngineFeatures {
        self.real.features()
    }

    fn is_xattr_enabled(&self) -> bool {
        self.real.is_xattr_enabled()
    }

    fn compression_mode(&self) -> CompressionMode {
        self.real.compression_mode()
    }

    fn max_item_size(&self) -> usize {
        self.real.max_item_size()
    }

    fn min_compression_ratio(&self) -> f32 {
        self.real.min_compression_ratio()
    }

    fn dcp(&self) -> Option<&dyn Dcp> {
        Some(self)
    }

    fn collections(&self) -> Option<&dyn Collections> {
        Some(self)
    }
}

impl Collections for ShimEngine {
    fn set_manifest(&self, cookie: Cookie, json: &str) -> Result<()> {
        match self.real.collections() {
            Some(collections) => collections.set_manifest(cookie, json),
            None => Err(EngineError::NotSupported),
        }
    }

    fn get_manifest(&self, cookie: Cookie) -> Result<String> {
        match self.real.collections() {
            Some(collections) => collections.get_manifest(cookie),
            None => Err(EngineError::NotSupported),
        }
    }

    fn get_collection_id(&self, cookie: Cookie, path: &str) -> Result<CollectionId> {
        match self.real.collections() {
            Some(collections) => collections.get_collection_id(cookie, path),
            None => Err(EngineError::NotSupported),
        }
    }
}
