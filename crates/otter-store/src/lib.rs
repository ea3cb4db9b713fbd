//! Otter Store - embedded ordered key-value store for Otter runtime
//!
//! Exposes a redb-backed store to script code through synchronous ops.
//! Script code holds integer handles only; the native stores, iterators and
//! batches behind them live in a per-context handle table and are released
//! exactly once, either explicitly or when the context is destroyed.
//!
//! # Usage
//!
//! ```typescript
//! const db = open("app.db", { createIfMissing: true });
//! put(db, "user:1", "alice");
//! get(db, "user:1");                  // ArrayBuffer
//! getStr(db, "user:1");               // "alice"
//!
//! const it = newIterator(db, { lowerBound: "user:", upperBound: "user;" });
//! for (iterSeekToFirst(it); iterValid(it); iterNext(it)) {
//!   iterKeyStr(it);
//! }
//! iterClose(it);
//!
//! const batch = beginBatch(db);
//! batchPut(batch, "a", "1");
//! batchDelete(batch, "b");
//! applyBatch(batch, { sync: true });
//! close(db);
//! ```

pub mod args;
pub mod batch;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod extension;
pub mod handles;
pub mod session;

pub use batch::{BatchHandle, BatchOp, WriteBatch};
pub use codec::{ByteView, Encoding};
pub use config::StoreConfig;
pub use cursor::{Cursor, CursorHandle, CursorOptions, CursorState};
pub use error::{ErrorKind, KvError, KvResult};
pub use extension::{EXTENSION_NAME, StoreState, store_extension};
pub use handles::{HandleId, HandleKind, HandleTable, Resource};
pub use session::{OpenOptions, Snapshot, StoreSession, WriteOptions};

use otter_host::{HostContext, HostResult};

/// Build a host context with only the store extension installed. Returns
/// once the default store, if configured, is open.
pub fn store_context(config: StoreConfig) -> HostResult<HostContext> {
    HostContext::builder()
        .extension(store_extension(config))
        .build()
}
