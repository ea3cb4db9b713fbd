//! Handle table: the single registry of live native objects.
//!
//! Script code only ever holds the integer ids handed out here. Each entry
//! is reference counted; disposing an id removes it from the table at once,
//! so later resolves fail with `InvalidHandle`, and then releases the native
//! resource. Release waits for any operation that already resolved the
//! object to finish, so nothing is freed under an in-flight call.
//!
//! Iterators are owned by their store: disposing a store disposes its
//! iterators first. Batches only record which store they target and keep
//! living until applied or discarded.
//!
//! [`HandleTable::dispose_all`] closes the table for good. An object built
//! by a call that was already running is released instead of registered.

use crate::batch::BatchHandle;
use crate::cursor::CursorHandle;
use crate::error::{KvError, KvResult};
use crate::session::StoreSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Opaque identifier handed to script code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Store,
    Iterator,
    Batch,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Store => "store",
            HandleKind::Iterator => "iterator",
            HandleKind::Batch => "batch",
        })
    }
}

/// A native object registered in the table
#[derive(Clone)]
pub enum Resource {
    Store(Arc<StoreSession>),
    Iterator(Arc<CursorHandle>),
    Batch(Arc<BatchHandle>),
}

impl Resource {
    pub fn kind(&self) -> HandleKind {
        match self {
            Resource::Store(_) => HandleKind::Store,
            Resource::Iterator(_) => HandleKind::Iterator,
            Resource::Batch(_) => HandleKind::Batch,
        }
    }

    fn release(&self) {
        match self {
            Resource::Store(session) => {
                session.close();
            }
            Resource::Iterator(cursor) => {
                cursor.close();
            }
            Resource::Batch(batch) => {
                batch.discard();
            }
        }
    }
}

struct Slot {
    resource: Resource,
    owner: Option<HandleId>,
}

pub struct HandleTable {
    next_id: AtomicU64,
    slots: Mutex<HashMap<HandleId, Slot>>,
    // Written only with `slots` held
    closed: AtomicBool,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new object and return its id.
    ///
    /// `build` receives the id the object will live under. Ids are never
    /// reused. When `owner` is given it must name a live store; if the store
    /// went away meanwhile, the new object is released and `InvalidHandle`
    /// is returned, so an iterator can never outlive its store.
    ///
    /// Once the table is closed nothing is built, and an object finished
    /// after closing is released before the error is returned.
    pub fn register<F>(&self, owner: Option<HandleId>, build: F) -> KvResult<HandleId>
    where
        F: FnOnce(HandleId) -> KvResult<Resource>,
    {
        if self.is_closed() {
            return Err(Self::closed_error());
        }
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let resource = build(id)?;
        let kind = resource.kind();

        let mut slots = self.slots.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(slots);
            resource.release();
            debug!(handle = id.get(), %kind, "Released handle built after teardown");
            return Err(Self::closed_error());
        }
        if let Some(owner_id) = owner {
            let owner_live = matches!(
                slots.get(&owner_id),
                Some(Slot { resource: Resource::Store(_), .. })
            );
            if !owner_live {
                drop(slots);
                resource.release();
                return Err(KvError::invalid_handle(HandleKind::Store, owner_id));
            }
        }
        slots.insert(id, Slot { resource, owner });
        drop(slots);

        debug!(handle = id.get(), %kind, owner = owner.map(HandleId::get), "Registered handle");
        Ok(id)
    }

    /// Look up a live object of any kind
    pub fn resolve(&self, id: HandleId) -> Option<Resource> {
        self.slots.lock().get(&id).map(|slot| slot.resource.clone())
    }

    pub fn store(&self, id: HandleId) -> KvResult<Arc<StoreSession>> {
        match self.resolve(id) {
            Some(Resource::Store(session)) => Ok(session),
            _ => Err(KvError::invalid_handle(HandleKind::Store, id)),
        }
    }

    pub fn cursor(&self, id: HandleId) -> KvResult<Arc<CursorHandle>> {
        match self.resolve(id) {
            Some(Resource::Iterator(cursor)) => Ok(cursor),
            _ => Err(KvError::invalid_handle(HandleKind::Iterator, id)),
        }
    }

    pub fn batch(&self, id: HandleId) -> KvResult<Arc<BatchHandle>> {
        match self.resolve(id) {
            Some(Resource::Batch(batch)) => Ok(batch),
            _ => Err(KvError::invalid_handle(HandleKind::Batch, id)),
        }
    }

    /// Dispose `id` and, for a store, every iterator it owns.
    ///
    /// Returns whether `id` was live. Disposing an unknown or already
    /// disposed id is a no-op.
    pub fn dispose(&self, id: HandleId) -> bool {
        let released = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.remove(&id) else {
                return false;
            };

            let children: Vec<HandleId> = slots
                .iter()
                .filter(|(_, child)| child.owner == Some(id))
                .map(|(child_id, _)| *child_id)
                .collect();

            let mut released: Vec<Resource> = children
                .iter()
                .filter_map(|child_id| slots.remove(child_id))
                .map(|child| child.resource)
                .collect();
            released.push(slot.resource);
            released
        };

        let cascaded = released.len() - 1;
        for resource in &released {
            resource.release();
        }

        debug!(handle = id.get(), cascaded, "Disposed handle");
        true
    }

    /// Dispose every live handle, iterators and batches before stores, and
    /// close the table to new registrations. Returns the number of handles
    /// disposed.
    pub fn dispose_all(&self) -> usize {
        let mut drained: Vec<(HandleId, Resource)> = {
            let mut slots = self.slots.lock();
            self.closed.store(true, Ordering::Release);
            slots.drain().map(|(id, slot)| (id, slot.resource)).collect()
        };

        drained.sort_by_key(|(id, resource)| {
            let rank = match resource.kind() {
                HandleKind::Iterator => 0,
                HandleKind::Batch => 1,
                HandleKind::Store => 2,
            };
            (rank, *id)
        });

        for (_, resource) in &drained {
            resource.release();
        }

        debug!(count = drained.len(), "Disposed all handles");
        drained.len()
    }

    /// Whether [`dispose_all`](Self::dispose_all) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn closed_error() -> KvError {
        KvError::engine("handle table closed: the host context is being destroyed")
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Number of live handles of one kind
    pub fn count(&self, kind: HandleKind) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.resource.kind() == kind)
            .count()
    }

    /// Snapshot of the live stores
    pub fn stores(&self) -> Vec<Arc<StoreSession>> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match &slot.resource {
                Resource::Store(session) => Some(session.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorOptions;
    use crate::error::ErrorKind;
    use crate::session::OpenOptions;
    use tempfile::TempDir;

    fn open_store(table: &HandleTable, dir: &TempDir, name: &str) -> HandleId {
        let path = dir.path().join(name);
        table
            .register(None, |id| {
                StoreSession::open(id, &path, &OpenOptions::default())
                    .map(|session| Resource::Store(Arc::new(session)))
            })
            .unwrap()
    }

    fn open_cursor(table: &HandleTable, store: HandleId) -> KvResult<HandleId> {
        let session = table.store(store)?;
        table.register(Some(store), |id| {
            CursorHandle::open(id, &session, CursorOptions::default())
                .map(|cursor| Resource::Iterator(Arc::new(cursor)))
        })
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let a = open_store(&table, &dir, "a");
        let b = open_store(&table, &dir, "b");
        assert!(b > a);

        table.dispose(a);
        let c = open_store(&table, &dir, "c");
        assert!(c > b);
    }

    #[test]
    fn test_resolve_after_dispose_fails() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let id = open_store(&table, &dir, "db");
        let session = table.store(id).unwrap();

        assert!(table.dispose(id));
        assert!(session.is_closed());
        assert_eq!(table.store(id).unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert!(table.resolve(id).is_none());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let id = open_store(&table, &dir, "db");

        assert!(table.dispose(id));
        assert!(!table.dispose(id));
        assert!(!table.dispose(HandleId::from_raw(9999)));
    }

    #[test]
    fn test_wrong_kind_is_invalid_handle() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let store = open_store(&table, &dir, "db");

        let err = table.cursor(store).unwrap_err();
        assert!(matches!(
            err,
            KvError::InvalidHandle {
                kind: HandleKind::Iterator,
                ..
            }
        ));
        assert!(table.batch(store).is_err());
    }

    #[test]
    fn test_store_dispose_cascades_to_iterators() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let store = open_store(&table, &dir, "db");
        let other = open_store(&table, &dir, "other");
        let it1 = open_cursor(&table, store).unwrap();
        let it2 = open_cursor(&table, store).unwrap();
        let kept = open_cursor(&table, other).unwrap();
        let cursor = table.cursor(it1).unwrap();

        assert_eq!(table.count(HandleKind::Iterator), 3);
        table.dispose(store);

        assert!(table.cursor(it1).is_err());
        assert!(table.cursor(it2).is_err());
        assert!(cursor.is_closed());
        assert!(table.cursor(kept).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_register_with_dead_owner_fails() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let store = open_store(&table, &dir, "db");
        let session = table.store(store).unwrap();
        table.dispose(store);

        let result = table.register(Some(store), |id| {
            Ok(Resource::Batch(Arc::new(BatchHandle::new(id, session.id()))))
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert!(table.is_empty());
    }

    #[test]
    fn test_dispose_all() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let store = open_store(&table, &dir, "db");
        let _it = open_cursor(&table, store).unwrap();
        let session = table.store(store).unwrap();
        table
            .register(None, |id| {
                Ok(Resource::Batch(Arc::new(BatchHandle::new(id, store))))
            })
            .unwrap();

        assert_eq!(table.dispose_all(), 3);
        assert!(table.is_empty());
        assert!(session.is_closed());
        assert!(table.is_closed());
        assert_eq!(table.dispose_all(), 0);
    }

    #[test]
    fn test_register_after_dispose_all_fails() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        table.dispose_all();

        let path = dir.path().join("db");
        let err = table
            .register(None, |id| {
                StoreSession::open(id, &path, &OpenOptions::default())
                    .map(|session| Resource::Store(Arc::new(session)))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(table.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_object_built_during_dispose_all_is_released() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let path = dir.path().join("db");
        let mut built = None;

        let err = table
            .register(None, |id| {
                let session = Arc::new(StoreSession::open(id, &path, &OpenOptions::default())?);
                built = Some(session.clone());
                // Teardown lands between build and insert
                table.dispose_all();
                Ok(Resource::Store(session))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(table.is_empty());
        assert!(built.unwrap().is_closed());
    }
}
