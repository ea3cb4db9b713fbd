//! Store session: one opened database.
//!
//! A store lives in its own directory holding the engine's data file. The
//! engine is redb, so every point write is its own transaction and a batch
//! is a single transaction, which gives batch atomicity for free.

use crate::batch::{BatchOp, WriteBatch};
use crate::codec::ByteView;
use crate::error::{KvError, KvResult};
use crate::handles::{HandleId, HandleKind};
use parking_lot::RwLock;
use redb::{
    Builder, Database, Durability, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition,
    WriteTransaction,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Engine data file inside a store directory
pub const DATA_FILE: &str = "data.redb";

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// Read-only view of the entry table
pub type EntryTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

/// Options for opening a store. Field names are camelCase as script code
/// passes them; config files may also use snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenOptions {
    /// Create the store when it does not exist
    #[serde(alias = "create_if_missing")]
    pub create_if_missing: bool,
    /// Fail when the store already exists
    #[serde(alias = "error_if_exists")]
    pub error_if_exists: bool,
    /// Engine page cache size
    #[serde(alias = "block_cache_size_bytes")]
    pub block_cache_size_bytes: Option<usize>,
    /// Resource cap on open files. The engine keeps a single file per
    /// store, so this is validated and recorded only.
    #[serde(alias = "max_open_files")]
    pub max_open_files: Option<u32>,
    /// Default durability for writes that do not set their own
    pub sync: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            block_cache_size_bytes: None,
            max_open_files: None,
            sync: false,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    pub fn error_if_exists(mut self, enabled: bool) -> Self {
        self.error_if_exists = enabled;
        self
    }

    pub fn block_cache_size_bytes(mut self, bytes: usize) -> Self {
        self.block_cache_size_bytes = Some(bytes);
        self
    }

    pub fn max_open_files(mut self, files: u32) -> Self {
        self.max_open_files = Some(files);
        self
    }

    pub fn sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    pub fn validate(&self) -> KvResult<()> {
        if self.block_cache_size_bytes == Some(0) {
            return Err(KvError::invalid_argument(
                "blockCacheSizeBytes must be greater than 0",
            ));
        }
        if self.max_open_files == Some(0) {
            return Err(KvError::invalid_argument(
                "maxOpenFiles must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Per-call write options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Flush to stable storage before returning. `None` uses the store default.
    pub sync: Option<bool>,
}

impl WriteOptions {
    pub fn sync(enabled: bool) -> Self {
        Self {
            sync: Some(enabled),
        }
    }
}

/// Point-in-time view of a store
pub struct Snapshot {
    table: EntryTable,
    _txn: ReadTransaction,
}

impl Snapshot {
    pub fn table(&self) -> &EntryTable {
        &self.table
    }
}

pub struct StoreSession {
    id: HandleId,
    path: PathBuf,
    options: OpenOptions,
    db: RwLock<Option<Database>>,
}

impl std::fmt::Debug for StoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StoreSession {
    /// Open or create the store at `path` (a directory).
    pub fn open(id: HandleId, path: &Path, options: &OpenOptions) -> KvResult<Self> {
        options.validate()?;

        let file = path.join(DATA_FILE);
        let exists = file.exists();
        if exists && options.error_if_exists {
            return Err(KvError::engine(format!(
                "Invalid argument: {}: exists (error_if_exists is true)",
                path.display()
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(KvError::engine(format!(
                "Invalid argument: {}: does not exist (create_if_missing is false)",
                path.display()
            )));
        }
        if !exists {
            std::fs::create_dir_all(path)?;
        }

        let mut builder = Builder::new();
        if let Some(bytes) = options.block_cache_size_bytes {
            builder.set_cache_size(bytes);
        }
        let db = if exists {
            builder.open(&file)?
        } else {
            builder.create(&file)?
        };

        // Make sure the table exists so readers never see TableDoesNotExist
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(ENTRIES)?;
            write_txn.commit()?;
        }

        if options.max_open_files.is_some() {
            debug!(store = id.get(), "maxOpenFiles has no effect on a single-file store");
        }
        debug!(store = id.get(), path = %path.display(), created = !exists, "Opened store");

        Ok(Self {
            id,
            path: path.to_path_buf(),
            options: options.clone(),
            db: RwLock::new(Some(db)),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    /// Run `f` against the open database. The read lock is held for the
    /// whole call, so `close` waits for it to finish.
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> KvResult<T>) -> KvResult<T> {
        let guard = self.db.read();
        let db = guard
            .as_ref()
            .ok_or_else(|| KvError::invalid_handle(HandleKind::Store, self.id))?;
        f(db)
    }

    fn begin_write(&self, db: &Database, options: WriteOptions) -> KvResult<WriteTransaction> {
        let mut txn = db.begin_write()?;
        let sync = options.sync.unwrap_or(self.options.sync);
        txn.set_durability(if sync {
            Durability::Immediate
        } else {
            Durability::Eventual
        });
        Ok(txn)
    }

    /// Run `f` against a fresh read-only view of the current contents
    pub(crate) fn read_view<T>(&self, f: impl FnOnce(&EntryTable) -> KvResult<T>) -> KvResult<T> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(ENTRIES)?;
            f(&table)
        })
    }

    /// Run `f` while holding the store open, without touching the engine
    pub(crate) fn while_open<T>(&self, f: impl FnOnce() -> KvResult<T>) -> KvResult<T> {
        self.with_db(|_| f())
    }

    pub fn get(&self, key: &[u8]) -> KvResult<Option<ByteView>> {
        self.read_view(|table| {
            Ok(table
                .get(key)?
                .map(|guard| ByteView::copy_from_slice(guard.value())))
        })
    }

    /// Existence check without copying the value out
    pub fn has(&self, key: &[u8]) -> KvResult<bool> {
        self.read_view(|table| Ok(table.get(key)?.is_some()))
    }

    pub fn put(&self, key: &[u8], value: &[u8], options: WriteOptions) -> KvResult<()> {
        self.with_db(|db| {
            let txn = self.begin_write(db, options)?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                table.insert(key, value)?;
            }
            txn.commit()?;
            Ok(())
        })
    }

    /// Remove `key`. Removing a missing key is not an error.
    pub fn delete(&self, key: &[u8], options: WriteOptions) -> KvResult<()> {
        self.with_db(|db| {
            let txn = self.begin_write(db, options)?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                table.remove(key)?;
            }
            txn.commit()?;
            Ok(())
        })
    }

    /// Apply every operation of `batch` in order, atomically.
    pub fn write(&self, batch: &WriteBatch, options: WriteOptions) -> KvResult<()> {
        self.with_db(|db| {
            let txn = self.begin_write(db, options)?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                for op in batch.ops() {
                    match op {
                        BatchOp::Put { key, value } => {
                            table.insert(key.as_bytes(), value.as_bytes())?;
                        }
                        BatchOp::Delete { key } => {
                            table.remove(key.as_bytes())?;
                        }
                    }
                }
            }
            txn.commit()?;
            debug!(store = self.id.get(), ops = batch.len(), "Applied batch");
            Ok(())
        })
    }

    pub fn snapshot(&self) -> KvResult<Snapshot> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(ENTRIES)?;
            Ok(Snapshot { table, _txn: txn })
        })
    }

    /// Visit every entry in ascending key order
    pub fn for_each<F>(&self, mut f: F) -> KvResult<usize>
    where
        F: FnMut(&[u8], &[u8]) -> KvResult<()>,
    {
        self.read_view(|table| {
            let mut count = 0;
            for item in table.iter()? {
                let (key, value) = item?;
                f(key.value(), value.value())?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Release the engine. Waits for in-flight operations; returns whether
    /// this call did the closing.
    pub fn close(&self) -> bool {
        let db = self.db.write().take();
        match db {
            Some(db) => {
                drop(db);
                debug!(store = self.id.get(), path = %self.path.display(), "Closed store");
                true
            }
            None => false,
        }
    }
}

/// Copy every entry of `src` into `dst`. With `batched`, all writes land in
/// one atomic batch; otherwise each entry is written on its own.
///
/// `src` is read completely before `dst` is touched, so the two stores are
/// never locked at the same time.
pub fn merge(dst: &StoreSession, src: &StoreSession, batched: bool) -> KvResult<usize> {
    if dst.id() == src.id() {
        return Err(KvError::invalid_argument("cannot merge a store into itself"));
    }

    let mut batch = WriteBatch::new();
    let count = src.for_each(|key, value| {
        batch.put(key, value);
        Ok(())
    })?;

    let options = WriteOptions::default();
    if batched {
        dst.write(&batch, options)?;
    } else {
        for op in batch.ops() {
            if let BatchOp::Put { key, value } = op {
                dst.put(key.as_bytes(), value.as_bytes(), options)?;
            }
        }
    }
    Ok(count)
}

/// Remove the on-disk files of a store that is not open. A missing store is
/// not an error.
pub fn destroy(path: &Path) -> KvResult<()> {
    let file = path.join(DATA_FILE);
    match std::fs::remove_file(&file) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    // Leave the directory alone if something else lives in it
    if let Err(e) = std::fs::remove_dir(path) {
        warn!(path = %path.display(), error = %e, "Store directory not removed");
    }
    debug!(path = %path.display(), "Destroyed store");
    Ok(())
}
