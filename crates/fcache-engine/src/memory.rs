//! A minimal thread-safe in-memory engine.
//!
//! `MemoryEngine` is the reference implementation of [`Engine`]: enough
//! behavior to back tests and demos that wrap a real engine, with memcached
//! store semantics (add/replace/CAS) and simple per-key locking. It exposes
//! no change-stream capability.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use fcache_error::{EngineError, Result};
use fcache_types::flags::{Datatype, EngineFeatures};
use fcache_types::item::{
    DocStateFilter, DocumentState, DurabilityRequirements, ItemData, ItemHandle, ItemInfo,
    MutationDescr, StoreOperation,
};
use fcache_types::message::{Request, Response};
use fcache_types::{Cookie, DocKey, Vbid};

use crate::traits::Engine;

struct Store {
    items: HashMap<DocKey, ItemHandle>,
    locked: HashSet<DocKey>,
}

/// In-memory [`Engine`] backing tests and demos.
pub struct MemoryEngine {
    store: RwLock<Store>,
    next_cas: AtomicU64,
    next_seqno: AtomicU64,
    vbucket_uuid: u64,
}

impl MemoryEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store {
                items: HashMap::new(),
                locked: HashSet::new(),
            }),
            next_cas: AtomicU64::new(1),
            next_seqno: AtomicU64::new(1),
            vbucket_uuid: 0xcafe_f00d,
        }
    }

    /// Number of live documents.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.store.read().items.len()
    }

    fn fresh_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::Relaxed)
    }

    fn fresh_seqno(&self) -> u64 {
        self.next_seqno.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn initialize(&self, config: &str) -> Result<()> {
        debug!(config, "memory engine initialized");
        Ok(())
    }

    fn allocate(
        &self,
        _cookie: Cookie,
        key: &DocKey,
        nbytes: usize,
        flags: u32,
        exptime: u32,
        datatype: Datatype,
        vbucket: Vbid,
    ) -> Result<ItemHandle> {
        Ok(ItemHandle::new(ItemData {
            key: key.clone(),
            value: vec![0; nbytes],
            cas: 0,
            flags,
            exptime,
            datatype,
            vbucket,
        }))
    }

    fn allocate_ex(
        &self,
        cookie: Cookie,
        key: &DocKey,
        nbytes: usize,
        _priv_nbytes: usize,
        flags: u32,
        exptime: u32,
        datatype: Datatype,
        vbucket: Vbid,
    ) -> Result<ItemHandle> {
        self.allocate(cookie, key, nbytes, flags, exptime, datatype, vbucket)
    }

    fn get(
        &self,
        _cookie: Cookie,
        key: &DocKey,
        _vbucket: Vbid,
        filter: DocStateFilter,
    ) -> Result<ItemHandle> {
        if filter == DocStateFilter::Deleted {
            // Tombstones are not retained.
            return Err(EngineError::KeyNotFound);
        }
        self.store
            .read()
            .items
            .get(key)
            .cloned()
            .ok_or(EngineError::KeyNotFound)
    }

    fn get_if(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        predicate: &dyn Fn(&ItemInfo) -> bool,
    ) -> Result<Option<ItemHandle>> {
        let item = self.get(cookie, key, vbucket, DocStateFilter::Alive)?;
        if predicate(&item.info()) {
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    fn get_and_touch(
        &self,
        cookie: Cookie,
        key: &DocKey,
        vbucket: Vbid,
        exptime: u32,
        _durability: Option<DurabilityRequirements>,
    ) -> Result<ItemHandle> {
        let item = self.get(cookie, key, vbucket, DocStateFilter::Alive)?;
        // Touch updates expiry and CAS.
        item.set_exptime(exptime);
        item.set_cas(self.fresh_cas());
        Ok(item)
    }

    fn get_locked(
        &self,
        _cookie: Cookie,
        key: &DocKey,
        _vbucket: Vbid,
        _lock_timeout: u32,
    ) -> Result<ItemHandle> {
        let mut store = self.store.write();
        let item = store
            .items
            .get(key)
            .cloned()
            .ok_or(EngineError::KeyNotFound)?;
        if !store.locked.insert(key.clone()) {
            return Err(EngineError::Locked);
        }
        item.set_cas(self.fresh_cas());
        Ok(item)
    }

    fn unlock(&self, _cookie: Cookie, key: &DocKey, _vbucket: Vbid, cas: u64) -> Result<()> {
        let mut store = self.store.write();
        let item = store
            .items
            .get(key)
            .cloned()
            .ok_or(EngineError::KeyNotFound)?;
        if !store.locked.contains(key) {
            return Err(EngineError::TemporaryFailure);
        }
        if item.cas() != cas {
            return Err(EngineError::Locked);
        }
        store.locked.remove(key);
        Ok(())
    }

    fn get_meta(&self, cookie: Cookie, key: &DocKey, vbucket: Vbid) -> Result<ItemInfo> {
        let item = self.get(cookie, key, vbucket, DocStateFilter::Alive)?;
        let mut info = item.info();
        info.vbucket_uuid = self.vbucket_uuid;
        Ok(info)
    }

    fn store(
        &self,
        _cookie: Cookie,
        item: &ItemHandle,
        cas: u64,
        operation: StoreOperation,
        _durability: Option<DurabilityRequirements>,
        _document_state: DocumentState,
    ) -> Result<u64> {
        let key = item.key();
        let mut store = self.store.write();
        let existing = store.items.get(&key).cloned();

        match operation {
            StoreOperation::Add if existing.is_some() => return Err(EngineError::NotStored),
            StoreOperation::Replace if existing.is_none() => {
                return Err(EngineError::NotStored)
            }
            StoreOperation::Cas => {
                let Some(current) = existing.as_ref() else {
                    return Err(EngineError::KeyNotFound);
                };
                if current.cas() != cas {
                    return Err(EngineError::KeyExists);
                }
            }
            StoreOperation::Set | StoreOperation::Add | StoreOperation::Replace => {
                if store.locked.contains(&key) {
                    return Err(EngineError::Locked);
                }
            }
        }

        let new_cas = self.fresh_cas();
        item.set_cas(new_cas);
        store.items.insert(key.clone(), item.clone());
        // A successful CAS store releases any lock on the key.
        store.locked.remove(&key);
        Ok(new_cas)
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
        let existing = self.store.read().items.get(&item.key()).cloned();
        let info = existing.map(|i| i.info());
        if !predicate(info.as_ref()) {
            return Err(EngineError::NotStored);
        }
        self.store(cookie, item, cas, operation, durability, document_state)
    }

    fn remove(
        &self,
        _cookie: Cookie,
        key: &DocKey,
        cas: u64,
        _vbucket: Vbid,
        _durability: Option<DurabilityRequirements>,
    ) -> Result<MutationDescr> {
        let mut store = self.store.write();
        let existing = store.items.get(key).cloned().ok_or(EngineError::KeyNotFound)?;
        if cas != 0 && existing.cas() != cas {
            return Err(EngineError::KeyExists);
        }
        if store.locked.contains(key) && cas == 0 {
            return Err(EngineError::Locked);
        }
        store.items.remove(key);
        store.locked.remove(key);
        Ok(MutationDescr {
            seqno: self.fresh_seqno(),
            vbucket_uuid: self.vbucket_uuid,
        })
    }

    fn flush(&self, _cookie: Cookie) -> Result<()> {
        let mut store = self.store.write();
        store.items.clear();
        store.locked.clear();
        Ok(())
    }

    fn get_stats(
        &self,
        _cookie: Cookie,
        key: &str,
        add_stat: &mut dyn FnMut(&str, &str),
    ) -> Result<()> {
        if !key.is_empty() {
            return Err(EngineError::KeyNotFound);
        }
        let store = self.store.read();
        add_stat("curr_items", &store.items.len().to_string());
        add_stat("curr_locked", &store.locked.len().to_string());
        Ok(())
    }

    fn reset_stats(&self, _cookie: Cookie) {}

    fn unknown_command(&self, _cookie: Cookie, request: &Request) -> Result<Response> {
        debug!(opcode = request.opcode, "memory engine: unknown command");
        Err(EngineError::NotSupported)
    }

    fn item_set_cas(&self, item: &ItemHandle, cas: u64) {
        item.set_cas(cas);
    }

    fn item_set_datatype(&self, item: &ItemHandle, datatype: Datatype) {
        item.set_datatype(datatype);
    }

    fn get_item_info(&self, item: &ItemHandle) -> Option<ItemInfo> {
        let mut info = item.info();
        info.vbucket_uuid = self.vbucket_uuid;
        Some(info)
    }

    fn features(&self) -> EngineFeatures {
        EngineFeatures::empty()
    }
}
