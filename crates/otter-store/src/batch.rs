//! Pending write batches

use crate::codec::ByteView;
use crate::error::{KvError, KvResult};
use crate::handles::{HandleId, HandleKind};
use crate::session::{StoreSession, WriteOptions};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: ByteView, value: ByteView },
    Delete { key: ByteView },
}

/// Ordered list of writes applied atomically by [`StoreSession::write`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<ByteView>, value: impl Into<ByteView>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<ByteView>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A batch registered in the handle table, targeting one store
pub struct BatchHandle {
    id: HandleId,
    store: HandleId,
    batch: Mutex<Option<WriteBatch>>,
}

impl BatchHandle {
    pub fn new(id: HandleId, store: HandleId) -> Self {
        Self {
            id,
            store,
            batch: Mutex::new(Some(WriteBatch::new())),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Store the batch will be applied to
    pub fn store(&self) -> HandleId {
        self.store
    }

    pub fn is_closed(&self) -> bool {
        self.batch.lock().is_none()
    }

    fn with_batch<T>(&self, f: impl FnOnce(&mut WriteBatch) -> T) -> KvResult<T> {
        let mut guard = self.batch.lock();
        let batch = guard
            .as_mut()
            .ok_or_else(|| KvError::invalid_handle(HandleKind::Batch, self.id))?;
        Ok(f(batch))
    }

    pub fn put(&self, key: ByteView, value: ByteView) -> KvResult<()> {
        self.with_batch(|batch| batch.put(key, value))
    }

    pub fn delete(&self, key: ByteView) -> KvResult<()> {
        self.with_batch(|batch| batch.delete(key))
    }

    /// Write the batch to `store` and discard it. Appends issued while the
    /// write runs wait for it. On failure the batch is kept so the caller
    /// can retry or discard it.
    pub fn apply(&self, store: &StoreSession, options: WriteOptions) -> KvResult<usize> {
        let mut guard = self.batch.lock();
        let batch = guard
            .as_ref()
            .ok_or_else(|| KvError::invalid_handle(HandleKind::Batch, self.id))?;
        store.write(batch, options)?;
        let applied = batch.len();
        *guard = None;
        Ok(applied)
    }

    /// Drop pending writes. Returns whether anything was discarded.
    pub fn discard(&self) -> bool {
        self.batch.lock().take().is_some()
    }
}
