//! Test doubles shared by the integration tests: a recording host, a
//! call-counting engine wrapper, a recording producer sink, and control
//! request builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fcache_engine::{Collections, Dcp, Engine, Host, MemoryEngine};
use fcache_error::Result;
use fcache_shim::config::ShimConfig;
use fcache_shim::ShimEngine;
use fcache_types::control::{ControlMode, ControlPayload, DEFAULT_CONTROL_OPCODE};
use fcache_types::flags::{CompressionMode, Datatype, EngineFeatures};
use fcache_types::item::{
    DocStateFilter, DocumentState, DurabilityRequirements, ItemHandle, ItemInfo, MutationDescr,
    StoreOperation,
};
use fcache_types::message::{Request, Response};
use fcache_types::{ConnectionId, Cookie, DocKey, Vbid};

/// Host double: cookie → connection id is identity unless overridden with
/// [`RecordingHost::bind`]; notifications are recorded in arrival order.
#[derive(Default)]
pub struct RecordingHost {
    bindings: Mutex<Vec<(Cookie, ConnectionId)>>,
    notified: Mutex<Vec<Cookie>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Map a cookie onto a specific connection id, so two cookies can share
    /// a connection.
    pub fn bind(&self, cookie: Cookie, id: ConnectionId) {
        self.bindings.lock().expect("bindings lock").push((cookie, id));
    }

    pub fn notifications(&self) -> Vec<Cookie> {
        self.notified.lock().expect("notified lock").clone()
    }

    /// Block until at least `count` notifications arrived, or panic after a
    /// generous deadline.
    pub fn wait_for_notifications(&self, count: usize) -> Vec<Cookie> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let seen = self.notifications();
            if seen.len() >= count {
                return seen;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} notifications, saw {seen:?}"
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Host for RecordingHost {
    fn connection_id(&self, cookie: Cookie) -> ConnectionId {
        let bindings = self.bindings.lock().expect("bindings lock");
        bindings
            .iter()
            .rev()
            .find(|(bound, _)| *bound == cookie)
            .map(|(_, id)| *id)
            .unwrap_or(ConnectionId::new(cookie.get()))
    }

    fn notify_io_complete(&self, cookie: Cookie, _status: Result<()>) {
        self.notified.lock().expect("notified lock").push(cookie);
    }
}

/// Engine double: delegates to [`MemoryEngine`] while counting the calls
/// that actually reached it.
#[derive(Default)]
pub struct SpyEngine {
    inner: MemoryEngine,
    pub gets: AtomicUsize,
    pub stores: AtomicUsize,
    pub unknown_commands: AtomicUsize,
}

impl SpyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn unknown_command_count(&self) -> usize {
        self.unknown_commands.load(Ordering::SeqCst)
    }
}

impl Engine for SpyEngine {
    fn initialize(&self, config: &str) -> Result<()> {
        self.inner.initialize(config)
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
        self.inner
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
        self.inner.allocate_ex(
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
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(cookie, key, vbucket, filter)
    }

    fn get_if(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        predicate: &dyn Fn(&ItemInfo) -> bool,
    ) -> Result<Option<ItemHandle>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_if(cookie, key, vbucket, predicate)
    }

    fn get_and_touch(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        exptime: u32,
        durability: Option<DurabilityRequirements>,
    ) -> Result<ItemHandle> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner
            .get_and_touch(cookie, key, vbucket, exptime, durability)
    }

    fn get_locked(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        lock_timeout: u32,
    ) -> Result<ItemHandle> {
        self.inner.get_locked(cookie, key, vbucket, lock_timeout)
    }

    fn unlock(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid, cas: u64) -> Result<()> {
        self.inner.unlock(cookie, key, vbucket, cas)
    }

    fn get_meta(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid) -> Result<ItemInfo> {
        self.inner.get_meta(cookie, key, vbucket)
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
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner
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
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store_if(
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
        self.inner.remove(cookie, key, cas, vbucket, durability)
    }

    fn flush(&self, cookie: Cookie) -> Result<()> {
        self.inner.flush(cookie)
    }

    fn get_stats(
        &self,
        cookie: Cookie,
        key: &str,
        add_stat: &mut dyn FnMut(&str, &str),
    ) -> Result<()> {
        self.inner.get_stats(cookie, key, add_stat)
    }

    fn reset_stats(&self, cookie: Cookie) {
        self.inner.reset_stats(cookie);
    }

    fn unknown_command(&self, cookie: Cookie, request: &Request) -> Result<Response> {
        self.unknown_commands.fetch_add(1, Ordering::SeqCst);
        self.inner.unknown_command(cookie, request)
    }

    fn item_set_cas(&self, item: &ItemHandle, cas: u64) {
        self.inner.item_set_cas(item, cas);
    }

    fn item_set_datatype(&self, item: &ItemHandle, datatype: Datatype) {
        self.inner.item_set_datatype(item, datatype);
    }

    fn get_item_info(&self, item: &ItemHandle) -> Option<ItemInfo> {
        self.inner.get_item_info(item)
    }

    fn features(&self) -> EngineFeatures {
        self.inner.features()
    }

    fn is_xattr_enabled(&self) -> bool {
        self.inner.is_xattr_enabled()
    }

    fn compression_mode(&self) -> CompressionMode {
        self.inner.compression_mode()
    }

    fn max_item_size(&self) -> usize {
        self.inner.max_item_size()
    }

    fn min_compression_ratio(&self) -> f32 {
        self.inner.min_compression_ratio()
    }

    fn dcp(&self) -> Option<&dyn Dcp> {
        None
    }

    fn collections(&self) -> Option<&dyn Collections> {
        None
    }
}

/// A producer sink recording the mutations a stream emits.
#[derive(Default)]
pub struct RecordingProducers {
    pub mutations: Vec<(u32, ItemHandle, Vbid, u64)>,
}

impl fcache_engine::DcpMessageProducers for RecordingProducers {
    fn mutation(
        &mut self,
        opaque: u32,
        item: &ItemHandle,
        vbucket: Vbid,
        by_seqno: u64,
        _rev_seqno: u64,
        _lock_time: u32,
        _nru: u8,
    ) -> Result<()> {
        self.mutations.push((opaque, item.clone(), vbucket, by_seqno));
        Ok(())
    }

    fn snapshot_marker(
        &mut self,
        _opaque: u32,
        _vbucket: Vbid,
        _start_seqno: u64,
        _end_seqno: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn stream_end(&mut self, _opaque: u32, _vbucket: Vbid) -> Result<()> {
        Ok(())
    }

    fn noop(&mut self, _opaque: u32) -> Result<()> {
        Ok(())
    }
}

/// A shim wrapping a [`SpyEngine`], with handles on every double.
pub struct Fixture {
    pub shim: ShimEngine,
    pub host: Arc<RecordingHost>,
    pub real: Arc<SpyEngine>,
}

/// Install the test log subscriber once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        let host = RecordingHost::new();
        let real = Arc::new(SpyEngine::new());
        let shim = ShimEngine::new(
            ShimConfig::default(),
            Arc::clone(&real) as Arc<dyn Engine>,
            Arc::clone(&host) as Arc<dyn Host>,
        );
        Self { shim, host, real }
    }

    /// Store `value` under `key` through the shim and return the new CAS.
    pub fn seed(&self, cookie: Cookie, key: &str, value: &[u8]) -> u64 {
        let item = self
            .shim
            .allocate(
                cookie,
                &DocKey::from(key),
                value.len(),
                0,
                0,
                Datatype::RAW,
                Vbid::new(0),
            )
            .expect("allocate");
        item.set_value(value.to_vec());
        self.shim
            .store(
                cookie,
                &item,
                0,
                StoreOperation::Set,
                None,
                DocumentState::Alive,
            )
            .expect("seed store")
    }

    /// Issue a control request through the shim's unknown-command path.
    pub fn control(
        &self,
        cookie: Cookie,
        mode: ControlMode,
        value: u32,
        inject_error: u32,
        key: &[u8],
    ) -> Result<Response> {
        self.shim
            .unknown_command(cookie, &control_request(mode, value, inject_error, key))
    }
}

/// Build a control request against the default control opcode.
pub fn control_request(mode: ControlMode, value: u32, inject_error: u32, key: &[u8]) -> Request {
    let payload = ControlPayload {
        mode,
        value,
        inject_error,
    };
    Request::new(DEFAULT_CONTROL_OPCODE)
        .with_extras(payload.encode().to_vec())
        .with_key(key.to_vec())
}
