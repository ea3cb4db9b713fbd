//! Store extension for the Otter host
//!
//! Registers the store ops with a host context. Every op resolves its handle
//! arguments through the context's [`HandleTable`] and runs synchronously on
//! the calling thread; failures are raised as exceptions named after the
//! error kind.

use crate::args::Args;
use crate::batch::BatchHandle;
use crate::codec::{self, ByteView, Encoding};
use crate::config::StoreConfig;
use crate::cursor::{Cursor, CursorHandle, CursorOptions};
use crate::error::{KvError, KvResult};
use crate::handles::{HandleId, HandleTable, Resource};
use crate::session::{self, OpenOptions, StoreSession, WriteOptions};
use otter_host::{Extension, HostError, HostValue, OpDecl, op_sync};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const EXTENSION_NAME: &str = "otter-store";

/// Native state shared by every store op of one context
pub struct StoreState {
    config: StoreConfig,
    handles: HandleTable,
    default_store: Mutex<Option<HandleId>>,
}

impl StoreState {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            handles: HandleTable::new(),
            default_store: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Handle of the store opened when the context was created
    pub fn default_store(&self) -> Option<HandleId> {
        *self.default_store.lock()
    }

    /// Open the store `name` and register it
    pub fn open_store(&self, name: &str, options: &OpenOptions) -> KvResult<HandleId> {
        let path = self.config.resolve_path(name)?;
        if let Some(open) = self.open_at(&path) {
            return Err(KvError::engine(format!(
                "IO error: lock {}: already held by store {}",
                path.display(),
                open.id()
            )));
        }
        self.handles.register(None, |id| {
            StoreSession::open(id, &path, options).map(|session| Resource::Store(Arc::new(session)))
        })
    }

    /// Close a store and every iterator reading from it
    pub fn close_store(&self, id: HandleId) -> KvResult<()> {
        self.handles.store(id)?;
        self.handles.dispose(id);
        let mut default_store = self.default_store.lock();
        if *default_store == Some(id) {
            *default_store = None;
        }
        Ok(())
    }

    fn open_at(&self, path: &Path) -> Option<Arc<StoreSession>> {
        self.handles
            .stores()
            .into_iter()
            .find(|session| session.path() == path)
    }
}

/// Create the store extension
pub fn store_extension(config: StoreConfig) -> Extension {
    Extension::new(EXTENSION_NAME)
        .with_ops(vec![
            store_op("open", store_open),
            store_op("close", store_close),
            store_op("get", |state, args| store_get(state, args, Encoding::Buffer)),
            store_op("getStr", |state, args| store_get(state, args, Encoding::Utf8)),
            store_op("put", store_put),
            store_op("delete", store_delete),
            store_op("has", store_has),
            store_op("newIterator", iter_new),
            store_op("iterSeekToFirst", |state, args| {
                iter_move(state, args, Cursor::seek_to_first)
            }),
            store_op("iterSeekToLast", |state, args| {
                iter_move(state, args, Cursor::seek_to_last)
            }),
            store_op("iterSeek", iter_seek),
            store_op("iterNext", |state, args| iter_move(state, args, Cursor::next)),
            store_op("iterPrev", |state, args| iter_move(state, args, Cursor::prev)),
            store_op("iterValid", iter_valid),
            store_op("iterKey", |state, args| {
                iter_read(state, args, Cursor::key, Encoding::Buffer)
            }),
            store_op("iterValue", |state, args| {
                iter_read(state, args, Cursor::value, Encoding::Buffer)
            }),
            store_op("iterKeyStr", |state, args| {
                iter_read(state, args, Cursor::key, Encoding::Utf8)
            }),
            store_op("iterValueStr", |state, args| {
                iter_read(state, args, Cursor::value, Encoding::Utf8)
            }),
            store_op("iterClose", iter_close),
            store_op("beginBatch", batch_begin),
            store_op("batchPut", batch_put),
            store_op("batchDelete", batch_delete),
            store_op("applyBatch", batch_apply),
            store_op("discardBatch", batch_discard),
            store_op("destroy", store_destroy),
            store_op("merge", store_merge),
            store_op("defaultStore", |state, _| {
                Ok(HostValue::from(state.default_store().map(HandleId::get)))
            }),
        ])
        .with_init(move |ext_state| {
            ext_state.put(StoreState::new(config.clone()));
        })
        .on_context_created(|ext_state| {
            let state = ext_state
                .get::<StoreState>()
                .ok_or_else(|| HostError::internal("otter-store state missing"))?;
            let Some(name) = state.config().default_store.clone() else {
                return Ok(());
            };
            let id = state
                .open_store(&name, &state.config().open)
                .map_err(|e| e.into_host("open"))?;
            *state.default_store.lock() = Some(id);
            info!(store = id.get(), name = %name, "Opened default store");
            Ok(())
        })
        .on_context_destroyed(|ext_state| {
            if let Some(state) = ext_state.get::<StoreState>() {
                let count = state.handles().dispose_all();
                *state.default_store.lock() = None;
                debug!(count, "Released store handles on context teardown");
            }
        })
}

type StoreOpFn = fn(&StoreState, &Args<'_>) -> KvResult<HostValue>;

/// Wrap a store op: look up the shared state and turn a [`KvError`] into
/// the exception raised for `name`.
fn store_op(name: &'static str, handler: StoreOpFn) -> OpDecl {
    op_sync(name, move |ctx, args| {
        let state = ctx
            .state()
            .get::<StoreState>()
            .ok_or_else(|| HostError::internal(format!("{name}: otter-store is not installed")))?;
        handler(&state, &Args::new(&args)).map_err(|e| e.into_host(name))
    })
}

fn handle_value(id: HandleId) -> HostValue {
    HostValue::from(id.get())
}

fn store_open(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let path = args.string(0, "path")?;
    let options: OpenOptions = args.options(1, "options")?;
    state.open_store(path, &options).map(handle_value)
}

fn store_close(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    state.close_store(args.handle(0, "store")?)?;
    Ok(HostValue::Undefined)
}

fn store_get(state: &StoreState, args: &Args<'_>, encoding: Encoding) -> KvResult<HostValue> {
    let store = state.handles().store(args.handle(0, "store")?)?;
    let key = args.bytes(1, "key")?;
    Ok(codec::encode_lookup(store.get(&key)?, encoding))
}

fn store_put(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let store = state.handles().store(args.handle(0, "store")?)?;
    let key = args.bytes(1, "key")?;
    let value = args.bytes(2, "value")?;
    let options: WriteOptions = args.options(3, "options")?;
    store.put(&key, &value, options)?;
    Ok(HostValue::Undefined)
}

fn store_delete(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let store = state.handles().store(args.handle(0, "store")?)?;
    let key = args.bytes(1, "key")?;
    let options: WriteOptions = args.options(2, "options")?;
    store.delete(&key, options)?;
    Ok(HostValue::Undefined)
}

fn store_has(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let store = state.handles().store(args.handle(0, "store")?)?;
    let key = args.bytes(1, "key")?;
    Ok(HostValue::Bool(store.has(&key)?))
}

fn store_destroy(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let path = state.config().resolve_path(args.string(0, "path")?)?;
    if let Some(open) = state.open_at(&path) {
        return Err(KvError::engine(format!(
            "IO error: {}: store is open as handle {}",
            path.display(),
            open.id()
        )));
    }
    session::destroy(&path)?;
    Ok(HostValue::Undefined)
}

fn store_merge(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let dst = state.handles().store(args.handle(0, "destination store")?)?;
    let src = state.handles().store(args.handle(1, "source store")?)?;
    let batched = args.bool_or(2, "batched", false)?;
    let copied = session::merge(&dst, &src, batched)?;
    Ok(HostValue::from(copied as u64))
}

fn cursor_options(value: Option<&HostValue>) -> KvResult<CursorOptions> {
    let Some(value) = value.filter(|v| !v.is_nullish()) else {
        return Ok(CursorOptions::default());
    };
    if value.as_object().is_none() {
        return Err(KvError::invalid_argument(format!(
            "options must be an object, got {}",
            value.type_name()
        )));
    }

    let flag = |name: &str| match value.get(name) {
        None | Some(HostValue::Undefined | HostValue::Null) => Ok(false),
        Some(HostValue::Bool(b)) => Ok(*b),
        Some(other) => Err(KvError::invalid_argument(format!(
            "options.{name} must be a boolean, got {}",
            other.type_name()
        ))),
    };

    Ok(CursorOptions {
        lower_bound: codec::decode_bound(value.get("lowerBound"), "options.lowerBound")?,
        upper_bound: codec::decode_bound(value.get("upperBound"), "options.upperBound")?,
        reverse: flag("reverse")?,
        use_snapshot: flag("useSnapshot")?,
    })
}

fn iter_new(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let store_id = args.handle(0, "store")?;
    let options = cursor_options(args.get(1))?;
    let session = state.handles().store(store_id)?;
    state
        .handles()
        .register(Some(store_id), |id| {
            CursorHandle::open(id, &session, options)
                .map(|cursor| Resource::Iterator(Arc::new(cursor)))
        })
        .map(handle_value)
}

fn iter_move(
    state: &StoreState,
    args: &Args<'_>,
    step: fn(&mut Cursor) -> KvResult<()>,
) -> KvResult<HostValue> {
    let cursor = state.handles().cursor(args.handle(0, "iterator")?)?;
    cursor.with(step)?;
    Ok(HostValue::Undefined)
}

fn iter_seek(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let cursor = state.handles().cursor(args.handle(0, "iterator")?)?;
    let target = args.bytes(1, "key")?;
    cursor.with(|c| c.seek(&target))?;
    Ok(HostValue::Undefined)
}

fn iter_valid(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let cursor = state.handles().cursor(args.handle(0, "iterator")?)?;
    Ok(HostValue::Bool(cursor.with(|c| Ok(c.valid()))?))
}

fn iter_read(
    state: &StoreState,
    args: &Args<'_>,
    field: fn(&Cursor) -> KvResult<&ByteView>,
    encoding: Encoding,
) -> KvResult<HostValue> {
    let cursor = state.handles().cursor(args.handle(0, "iterator")?)?;
    cursor.with(|c| field(c).map(|view| codec::encode(view, encoding)))
}

fn iter_close(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let id = args.handle(0, "iterator")?;
    state.handles().cursor(id)?;
    state.handles().dispose(id);
    Ok(HostValue::Undefined)
}

fn batch_begin(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let store_id = args.handle(0, "store")?;
    state.handles().store(store_id)?;
    // Batches do not belong to the store: closing it leaves them alive
    state
        .handles()
        .register(None, |id| {
            Ok(Resource::Batch(Arc::new(BatchHandle::new(id, store_id))))
        })
        .map(handle_value)
}

fn batch_put(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let batch = state.handles().batch(args.handle(0, "batch")?)?;
    let key = args.bytes(1, "key")?;
    let value = args.bytes(2, "value")?;
    batch.put(key, value)?;
    Ok(HostValue::Undefined)
}

fn batch_delete(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let batch = state.handles().batch(args.handle(0, "batch")?)?;
    batch.delete(args.bytes(1, "key")?)?;
    Ok(HostValue::Undefined)
}

fn batch_apply(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let id = args.handle(0, "batch")?;
    let batch = state.handles().batch(id)?;
    let options: WriteOptions = args.options(1, "options")?;
    let store = state.handles().store(batch.store())?;
    batch.apply(&store, options)?;
    state.handles().dispose(id);
    Ok(HostValue::Undefined)
}

fn batch_discard(state: &StoreState, args: &Args<'_>) -> KvResult<HostValue> {
    let id = args.handle(0, "batch")?;
    state.handles().batch(id)?;
    state.handles().dispose(id);
    Ok(HostValue::Undefined)
}
