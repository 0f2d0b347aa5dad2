//! The engine-side and host-side capability traits.

use fcache_error::Result;
use fcache_types::flags::{CompressionMode, Datatype, EngineFeatures};
use fcache_types::item::{
    DocStateFilter, DocumentState, DurabilityRequirements, ItemHandle, ItemInfo, MutationDescr,
    StoreOperation,
};
use fcache_types::message::{Request, Response};
use fcache_types::{ConnectionId, Cookie, DocKey, Vbid};

use crate::dcp::Dcp;

/// Result of a collection-id lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionId {
    /// Manifest revision the lookup was answered from.
    pub manifest_uid: u64,
    /// The collection's numeric id.
    pub collection: u32,
}

/// Collection management, an optional engine sub-capability.
pub trait Collections: Send + Sync {
    /// Install a new collections manifest (JSON).
    fn set_manifest(&self, cookie: Cookie, json: &str) -> Result<()>;

    /// Fetch the current collections manifest (JSON).
    fn get_manifest(&self, cookie: Cookie) -> Result<String>;

    /// Resolve a `scope.collection` path to its id.
    fn get_collection_id(&self, cookie: Cookie, path: &str) -> Result<CollectionId>;
}

/// Services the host (server front-end) provides to an engine.
pub trait Host: Send + Sync {
    /// The connection id behind a cookie. Stable across requests on the
    /// same connection.
    fn connection_id(&self, cookie: Cookie) -> ConnectionId;

    /// Tell the server a previously would-blocked request may be resumed.
    /// Must not be called while holding engine locks.
    fn notify_io_complete(&self, cookie: Cookie, status: Result<()>);
}

/// The full operation surface of a storage engine.
///
/// Engines are shared across server worker threads; every method takes
/// `&self` and implementations are internally synchronized. Teardown is
/// `Drop`.
pub trait Engine: Send + Sync {
    /// Apply the engine's configuration string. Called once before any
    /// operation is dispatched.
    fn initialize(&self, config: &str) -> Result<()>;

    /// Allocate an item of `nbytes` value bytes for a later store.
    #[allow(clippy::too_many_arguments)]
    fn allocate(
        &self,
        cookie: Cookie,
        key: &DocKey,
        nbytes: usize,
        flags: u32,
        exptime: u32,
        datatype: Datatype,
        vbucket: Vbid,
    ) -> Result<ItemHandle>;

    /// Extended allocate carrying a privileged-bytes reservation.
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<ItemHandle>;

    /// Point read.
    fn get(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        filter: DocStateFilter,
    ) -> Result<ItemHandle>;

    /// Conditional read: the item is returned only when `predicate` accepts
    /// its metadata. `Ok(None)` means the item exists but was filtered.
    fn get_if(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        predicate: &dyn Fn(&ItemInfo) -> bool,
    ) -> Result<Option<ItemHandle>>;

    /// Read and update the expiry time in one step.
    fn get_and_touch(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        exptime: u32,
        durability: Option<DurabilityRequirements>,
    ) -> Result<ItemHandle>;

    /// Read and lock the item against other writers.
    fn get_locked(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        lock_timeout: u32,
    ) -> Result<ItemHandle>;

    /// Release a lock taken by [`Engine::get_locked`].
    fn unlock(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid, cas: u64) -> Result<()>;

    /// Metadata-only read.
    fn get_meta(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid) -> Result<ItemInfo>;

    /// Store an item. Returns the CAS assigned to the stored document.
    #[allow(clippy::too_many_arguments)]
    fn store(
        &self,
        cookie: Cookie,
        item: &ItemHandle,
        cas: u64,
        operation: StoreOperation,
        durability: Option<DurabilityRequirements>,
        document_state: DocumentState,
    ) -> Result<u64>;

    /// Store guarded by a predicate over the currently stored metadata
    /// (`None` when the key is absent). The store proceeds only when the
    /// predicate accepts.
    #[allow(clippy::too_many_arguments)]
    fn store_if(
        &self,
        cookie: Cookie,
        item: &ItemHandle,
        cas: u64,
        operation: StoreOperation,
        predicate: &dyn Fn(Option<&ItemInfo>) -> bool,
        durability: Option<DurabilityRequirements>,
        document_state: DocumentState,
    ) -> Result<u64>;

    /// Remove a document.
    fn remove(
        &self,
        cookie: Cookie,
        key: &DocKey,
        cas: u64,
        vbucket: Vbid,
        durability: Option<DurabilityRequirements>,
    ) -> Result<MutationDescr>;

    /// Drop all documents.
    fn flush(&self, cookie: Cookie) -> Result<()>;

    /// Emit statistics through `add_stat`. An empty `key` requests the
    /// default stat group.
    fn get_stats(
        &self,
        cookie: Cookie,
        key: &str,
        add_stat: &mut dyn FnMut(&str, &str),
    ) -> Result<()>;

    /// Reset statistics counters.
    fn reset_stats(&self, cookie: Cookie);

    /// Handle an opcode the server does not dispatch explicitly.
    fn unknown_command(&self, cookie: Cookie, request: &Request) -> Result<Response>;

    /// Overwrite an item's CAS. No error return.
    fn item_set_cas(&self, item: &ItemHandle, cas: u64);

    /// Overwrite an item's datatype bits. No error return.
    fn item_set_datatype(&self, item: &ItemHandle, datatype: Datatype);

    /// Snapshot an item's metadata, or `None` when the handle is foreign to
    /// this engine.
    fn get_item_info(&self, item: &ItemHandle) -> Option<ItemInfo>;

    /// Optional capabilities this engine advertises.
    fn features(&self) -> EngineFeatures;

    /// Whether extended attributes are accepted on stored values.
    fn is_xattr_enabled(&self) -> bool {
        true
    }

    /// Value compression policy.
    fn compression_mode(&self) -> CompressionMode {
        CompressionMode::Off
    }

    /// Largest accepted item value, in bytes.
    fn max_item_size(&self) -> usize {
        20 * 1024 * 1024
    }

    /// Minimum compression ratio worth storing compressed.
    fn min_compression_ratio(&self) -> f32 {
        1.2
    }

    /// The change-stream capability, when this engine has one.
    fn dcp(&self) -> Option<&dyn Dcp> {
        None
    }

    /// The collections capability, when this engine has one.
    fn collections(&self) -> Option<&dyn Collections> {
        None
    }
}
