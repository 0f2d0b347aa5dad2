//! The document/item model.
//!
//! Engines hand out [`ItemHandle`]s: cheaply clonable references to a shared
//! item record. A handle returned from a read and the engine's stored copy
//! alias the same record, so mutators without an error return (set-cas,
//! set-datatype) are visible to both sides.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::flags::Datatype;
use crate::{DocKey, Vbid};

/// Filter applied to reads: which document states the caller wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocStateFilter {
    /// Only live documents.
    #[default]
    Alive,
    /// Only deleted documents (tombstones).
    Deleted,
    /// Both live and deleted documents.
    AliveOrDeleted,
}

/// Whether a store writes a live document or a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentState {
    /// The document is live after the operation.
    #[default]
    Alive,
    /// The document is logically deleted after the operation.
    Deleted,
}

/// Mutation flavors for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Store regardless of the current state.
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists.
    Replace,
    /// Compare-and-swap: store only if the caller's CAS matches.
    Cas,
}

/// Durability level requested for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurabilityLevel {
    /// Replicated to a majority of nodes.
    Majority,
    /// Majority plus persistence on the active node.
    MajorityAndPersistOnMaster,
    /// Persisted to a majority of nodes.
    PersistToMajority,
}

/// Durability requirements attached to a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurabilityRequirements {
    /// Requested level.
    pub level: DurabilityLevel,
    /// Timeout in milliseconds; 0 means the bucket default.
    pub timeout_ms: u16,
}

/// Descriptor returned from a successful remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationDescr {
    /// Sequence number assigned to the deletion.
    pub seqno: u64,
    /// UUID of the vbucket the deletion landed in.
    pub vbucket_uuid: u64,
}

/// The record behind an [`ItemHandle`].
#[derive(Debug, Clone)]
pub struct ItemData {
    /// Document key.
    pub key: DocKey,
    /// Value bytes (including any extended-attribute section).
    pub value: Vec<u8>,
    /// Compare-and-swap value.
    pub cas: u64,
    /// Client-visible flags.
    pub flags: u32,
    /// Expiry time, seconds (0 = never).
    pub exptime: u32,
    /// Value encoding bits.
    pub datatype: Datatype,
    /// Owning vbucket.
    pub vbucket: Vbid,
}

/// A snapshot of an item's metadata and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    /// Document key.
    pub key: DocKey,
    /// Value bytes.
    pub value: Vec<u8>,
    /// Compare-and-swap value.
    pub cas: u64,
    /// Sequence number of the last mutation.
    pub seqno: u64,
    /// UUID of the owning vbucket.
    pub vbucket_uuid: u64,
    /// Client-visible flags.
    pub flags: u32,
    /// Expiry time, seconds.
    pub exptime: u32,
    /// Value encoding bits.
    pub datatype: Datatype,
    /// Owning vbucket.
    pub vbucket: Vbid,
}

/// Shared reference to an item record.
///
/// Clones alias the same record. Equality is record identity, not value
/// equality, matching how a server compares the handles an engine returns.
#[derive(Debug, Clone)]
pub struct ItemHandle {
    inner: Arc<RwLock<ItemData>>,
}

impl ItemHandle {
    /// Wrap a fresh item record.
    #[must_use]
    pub fn new(data: ItemData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Run `f` with read access to the record.
    pub fn with<R>(&self, f: impl FnOnce(&ItemData) -> R) -> R {
        f(&self.inner.read())
    }

    /// The item's key (cloned out of the record).
    #[must_use]
    pub fn key(&self) -> DocKey {
        self.inner.read().key.clone()
    }

    /// The item's current CAS.
    #[must_use]
    pub fn cas(&self) -> u64 {
        self.inner.read().cas
    }

    /// Overwrite the item's CAS. Visible to every handle on the record.
    pub fn set_cas(&self, cas: u64) {
        self.inner.write().cas = cas;
    }

    /// Overwrite the item's datatype bits.
    pub fn set_datatype(&self, datatype: Datatype) {
        self.inner.write().datatype = datatype;
    }

    /// Overwrite the item's expiry time.
    pub fn set_exptime(&self, exptime: u32) {
        self.inner.write().exptime = exptime;
    }

    /// Replace the item's value bytes.
    pub fn set_value(&self, value: Vec<u8>) {
        self.inner.write().value = value;
    }

    /// Snapshot the record into an [`ItemInfo`]. Sequence numbers are not
    /// tracked on the handle itself; callers that know them fill them in.
    #[must_use]
    pub fn info(&self) -> ItemInfo {
        let data = self.inner.read();
        ItemInfo {
            key: data.key.clone(),
            value: data.value.clone(),
            cas: data.cas,
            seqno: 0,
            vbucket_uuid: 0,
            flags: data.flags,
            exptime: data.exptime,
            datatype: data.datatype,
            vbucket: data.vbucket,
        }
    }

    /// Whether two handles alias the same record.
    #[must_use]
    pub fn same_record(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ItemHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_record(other)
    }
}

impl Eq for ItemHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &[u8]) -> ItemHandle {
        ItemHandle::new(ItemData {
            key: DocKey::from(key),
            value: value.to_vec(),
            cas: 0,
            flags: 0,
            exptime: 0,
            datatype: Datatype::RAW,
            vbucket: Vbid::new(0),
        })
    }

    #[test]
    fn clones_alias_the_same_record() {
        let a = item("k", b"v");
        let b = a.clone();
        b.set_cas(42);
        assert_eq!(a.cas(), 42, "set_cas through one handle must be visible to all");
        assert!(a.same_record(&b));
    }

    #[test]
    fn distinct_records_are_not_equal() {
        let a = item("k", b"v");
        let b = item("k", b"v");
        assert_ne!(a, b, "equality is record identity, not value equality");
    }

    #[test]
    fn info_snapshots_the_record() {
        let a = item("k", b"hello");
        a.set_datatype(Datatype::XATTR);
        let info = a.info();
        assert_eq!(info.key, DocKey::from("k"));
        assert_eq!(info.value, b"hello");
        assert_eq!(info.datatype, Datatype::XATTR);
    }
}
