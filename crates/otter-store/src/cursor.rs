//! Iterator cursors over a key range.
//!
//! A cursor is in one of three states: before the first entry, on an entry,
//! or past the last entry. All movement is expressed in iteration order, so
//! for a reverse cursor `seek_to_first` lands on the highest key and `next`
//! walks downwards.
//!
//! Positioning never keeps an engine iterator open between calls. Each move
//! is a bounded range lookup against either the pinned snapshot or a fresh
//! view of the store, and the entry found is copied into the cursor.

use crate::codec::ByteView;
use crate::error::{KvError, KvResult};
use crate::handles::{HandleId, HandleKind};
use crate::session::{EntryTable, Snapshot, StoreSession};
use parking_lot::Mutex;
use redb::ReadableTable;
use std::ops::Bound;
use std::sync::{Arc, Weak};

/// Options fixed when a cursor is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// Inclusive lower bound
    pub lower_bound: Option<ByteView>,
    /// Exclusive upper bound
    pub upper_bound: Option<ByteView>,
    /// Iterate from the highest key to the lowest
    pub reverse: bool,
    /// Pin a point-in-time view at creation
    pub use_snapshot: bool,
}

impl CursorOptions {
    pub fn lower_bound(mut self, key: impl Into<ByteView>) -> Self {
        self.lower_bound = Some(key.into());
        self
    }

    pub fn upper_bound(mut self, key: impl Into<ByteView>) -> Self {
        self.upper_bound = Some(key.into());
        self
    }

    pub fn reverse(mut self, enabled: bool) -> Self {
        self.reverse = enabled;
        self
    }

    pub fn use_snapshot(mut self, enabled: bool) -> Self {
        self.use_snapshot = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    BeforeStart,
    OnEntry,
    AfterEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    BeforeStart,
    OnEntry { key: ByteView, value: ByteView },
    AfterEnd,
}

enum View {
    Live,
    Snapshot(Snapshot),
}

type Entry = (ByteView, ByteView);

pub struct Cursor {
    store: Weak<StoreSession>,
    store_id: HandleId,
    view: View,
    lower: Option<ByteView>,
    upper: Option<ByteView>,
    reverse: bool,
    position: Position,
}

impl Cursor {
    pub fn new(store: &Arc<StoreSession>, options: CursorOptions) -> KvResult<Self> {
        let view = if options.use_snapshot {
            View::Snapshot(store.snapshot()?)
        } else {
            store.while_open(|| Ok(()))?;
            View::Live
        };

        Ok(Self {
            store: Arc::downgrade(store),
            store_id: store.id(),
            view,
            lower: options.lower_bound,
            upper: options.upper_bound,
            reverse: options.reverse,
            position: Position::BeforeStart,
        })
    }

    pub fn store_id(&self) -> HandleId {
        self.store_id
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn state(&self) -> CursorState {
        match self.position {
            Position::BeforeStart => CursorState::BeforeStart,
            Position::OnEntry { .. } => CursorState::OnEntry,
            Position::AfterEnd => CursorState::AfterEnd,
        }
    }

    pub fn valid(&self) -> bool {
        matches!(self.position, Position::OnEntry { .. })
    }

    pub fn key(&self) -> KvResult<&ByteView> {
        match &self.position {
            Position::OnEntry { key, .. } => Ok(key),
            _ => Err(self.not_positioned("key")),
        }
    }

    pub fn value(&self) -> KvResult<&ByteView> {
        match &self.position {
            Position::OnEntry { value, .. } => Ok(value),
            _ => Err(self.not_positioned("value")),
        }
    }

    pub fn seek_to_first(&mut self) -> KvResult<()> {
        let found = self.forward(Bound::Unbounded)?;
        self.land(found, Position::AfterEnd);
        Ok(())
    }

    pub fn seek_to_last(&mut self) -> KvResult<()> {
        let found = self.backward(Bound::Unbounded)?;
        self.land(found, Position::BeforeStart);
        Ok(())
    }

    /// Position at the first entry at or past `target` in iteration order
    pub fn seek(&mut self, target: &[u8]) -> KvResult<()> {
        let found = self.forward(Bound::Included(target))?;
        self.land(found, Position::AfterEnd);
        Ok(())
    }

    pub fn next(&mut self) -> KvResult<()> {
        let found = match &self.position {
            Position::BeforeStart => return self.seek_to_first(),
            Position::AfterEnd => return Err(self.not_positioned("next")),
            Position::OnEntry { key, .. } => self.forward(Bound::Excluded(key.as_bytes()))?,
        };
        self.land(found, Position::AfterEnd);
        Ok(())
    }

    pub fn prev(&mut self) -> KvResult<()> {
        let found = match &self.position {
            Position::AfterEnd => return self.seek_to_last(),
            Position::BeforeStart => return Err(self.not_positioned("prev")),
            Position::OnEntry { key, .. } => self.backward(Bound::Excluded(key.as_bytes()))?,
        };
        self.land(found, Position::BeforeStart);
        Ok(())
    }

    fn land(&mut self, found: Option<Entry>, otherwise: Position) {
        self.position = match found {
            Some((key, value)) => Position::OnEntry { key, value },
            None => otherwise,
        };
    }

    fn not_positioned(&self, op: &str) -> KvError {
        let state = match self.state() {
            CursorState::BeforeStart => "before the first entry",
            CursorState::AfterEnd => "past the last entry",
            CursorState::OnEntry => "on an entry",
        };
        KvError::cursor_state(format!("cannot {op}: cursor is {state}"))
    }

    fn forward(&self, from: Bound<&[u8]>) -> KvResult<Option<Entry>> {
        if self.reverse {
            self.descending(from)
        } else {
            self.ascending(from)
        }
    }

    fn backward(&self, from: Bound<&[u8]>) -> KvResult<Option<Entry>> {
        if self.reverse {
            self.ascending(from)
        } else {
            self.descending(from)
        }
    }

    /// Lowest entry at or above `from`, within the cursor bounds
    fn ascending(&self, from: Bound<&[u8]>) -> KvResult<Option<Entry>> {
        let (lo, hi) = self.clamp(from, Bound::Unbounded);
        self.with_view(|table| first_in(table, lo, hi))
    }

    /// Highest entry at or below `from`, within the cursor bounds
    fn descending(&self, from: Bound<&[u8]>) -> KvResult<Option<Entry>> {
        let (lo, hi) = self.clamp(Bound::Unbounded, from);
        self.with_view(|table| last_in(table, lo, hi))
    }

    fn clamp<'a>(
        &'a self,
        lo: Bound<&'a [u8]>,
        hi: Bound<&'a [u8]>,
    ) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
        let lower = match &self.lower {
            Some(key) => Bound::Included(key.as_bytes()),
            None => Bound::Unbounded,
        };
        let upper = match &self.upper {
            Some(key) => Bound::Excluded(key.as_bytes()),
            None => Bound::Unbounded,
        };
        (tighter_lower(lower, lo), tighter_upper(upper, hi))
    }

    fn with_view<T>(&self, f: impl FnOnce(&EntryTable) -> KvResult<T>) -> KvResult<T> {
        let store = self
            .store
            .upgrade()
            .ok_or_else(|| KvError::invalid_handle(HandleKind::Store, self.store_id))?;
        match &self.view {
            View::Live => store.read_view(f),
            View::Snapshot(snapshot) => store.while_open(|| f(snapshot.table())),
        }
    }
}

fn tighter_lower<'a>(a: Bound<&'a [u8]>, b: Bound<&'a [u8]>) -> Bound<&'a [u8]> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(inc), Bound::Excluded(exc)) | (Bound::Excluded(exc), Bound::Included(inc)) => {
            if inc > exc {
                Bound::Included(inc)
            } else {
                Bound::Excluded(exc)
            }
        }
    }
}

fn tighter_upper<'a>(a: Bound<&'a [u8]>, b: Bound<&'a [u8]>) -> Bound<&'a [u8]> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
        (Bound::Included(inc), Bound::Excluded(exc)) | (Bound::Excluded(exc), Bound::Included(inc)) => {
            if inc < exc {
                Bound::Included(inc)
            } else {
                Bound::Excluded(exc)
            }
        }
    }
}

fn is_empty_range(lo: Bound<&[u8]>, hi: Bound<&[u8]>) -> bool {
    match (lo, hi) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        _ => false,
    }
}

fn first_in(table: &EntryTable, lo: Bound<&[u8]>, hi: Bound<&[u8]>) -> KvResult<Option<Entry>> {
    if is_empty_range(lo, hi) {
        return Ok(None);
    }
    let mut range = table.range::<&[u8]>((lo, hi))?;
    match range.next() {
        Some(item) => {
            let (key, value) = item?;
            Ok(Some((
                ByteView::copy_from_slice(key.value()),
                ByteView::copy_from_slice(value.value()),
            )))
        }
        None => Ok(None),
    }
}

fn last_in(table: &EntryTable, lo: Bound<&[u8]>, hi: Bound<&[u8]>) -> KvResult<Option<Entry>> {
    if is_empty_range(lo, hi) {
        return Ok(None);
    }
    let mut range = table.range::<&[u8]>((lo, hi))?;
    match range.next_back() {
        Some(item) => {
            let (key, value) = item?;
            Ok(Some((
                ByteView::copy_from_slice(key.value()),
                ByteView::copy_from_slice(value.value()),
            )))
        }
        None => Ok(None),
    }
}

/// A cursor registered in the handle table
pub struct CursorHandle {
    id: HandleId,
    cursor: Mutex<Option<Cursor>>,
}

impl std::fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl CursorHandle {
    pub fn open(id: HandleId, store: &Arc<StoreSession>, options: CursorOptions) -> KvResult<Self> {
        Ok(Self {
            id,
            cursor: Mutex::new(Some(Cursor::new(store, options)?)),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.lock().is_none()
    }

    /// Run `f` on the cursor. Calls on one cursor are serialized.
    pub fn with<T>(&self, f: impl FnOnce(&mut Cursor) -> KvResult<T>) -> KvResult<T> {
        let mut guard = self.cursor.lock();
        let cursor = guard
            .as_mut()
            .ok_or_else(|| KvError::invalid_handle(HandleKind::Iterator, self.id))?;
        f(cursor)
    }

    /// Release the cursor and its snapshot. Waits for an in-flight call.
    pub fn close(&self) -> bool {
        self.cursor.lock().take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::{OpenOptions, WriteOptions};
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, keys: &[&str]) -> Arc<StoreSession> {
        let store =
            StoreSession::open(HandleId::from_raw(1), &dir.path().join("db"), &OpenOptions::default())
                .unwrap();
        for key in keys {
            store
                .put(key.as_bytes(), format!("v-{key}").as_bytes(), WriteOptions::default())
                .unwrap();
        }
        Arc::new(store)
    }

    fn collect(cursor: &mut Cursor) -> Vec<String> {
        let mut keys = Vec::new();
        cursor.seek_to_first().unwrap();
        while cursor.valid() {
            keys.push(cursor.key().unwrap().to_string_lossy());
            cursor.next().unwrap();
        }
        keys
    }

    #[test]
    fn test_forward_iteration() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["c", "a", "b"]);
        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();

        assert_eq!(cursor.state(), CursorState::BeforeStart);
        assert_eq!(collect(&mut cursor), vec!["a", "b", "c"]);
        assert_eq!(cursor.state(), CursorState::AfterEnd);
    }

    #[test]
    fn test_reverse_iteration() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["c", "a", "b"]);
        let mut cursor = Cursor::new(&store, CursorOptions::default().reverse(true)).unwrap();
        assert_eq!(collect(&mut cursor), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_bounds_include_lower_exclude_upper() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a", "b", "c", "d"]);
        let options = CursorOptions::default().lower_bound("b").upper_bound("d");

        let mut forward = Cursor::new(&store, options.clone()).unwrap();
        assert_eq!(collect(&mut forward), vec!["b", "c"]);

        let mut reverse = Cursor::new(&store, options.reverse(true)).unwrap();
        assert_eq!(collect(&mut reverse), vec!["c", "b"]);
    }

    #[test]
    fn test_seek() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a", "c", "e"]);

        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();
        cursor.seek(b"b").unwrap();
        assert_eq!(cursor.key().unwrap(), &ByteView::from("c"));
        cursor.seek(b"c").unwrap();
        assert_eq!(cursor.key().unwrap(), &ByteView::from("c"));
        assert_eq!(cursor.value().unwrap(), &ByteView::from("v-c"));
        cursor.seek(b"f").unwrap();
        assert_eq!(cursor.state(), CursorState::AfterEnd);

        let mut reverse = Cursor::new(&store, CursorOptions::default().reverse(true)).unwrap();
        reverse.seek(b"d").unwrap();
        assert_eq!(reverse.key().unwrap(), &ByteView::from("c"));
        reverse.seek(b"0").unwrap();
        assert_eq!(reverse.state(), CursorState::AfterEnd);
    }

    #[test]
    fn test_seek_clamped_to_bounds() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a", "b", "c"]);
        let mut cursor = Cursor::new(
            &store,
            CursorOptions::default().lower_bound("b").upper_bound("c"),
        )
        .unwrap();

        cursor.seek(b"a").unwrap();
        assert_eq!(cursor.key().unwrap(), &ByteView::from("b"));
        cursor.seek(b"c").unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn test_empty_range_states() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);
        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();

        cursor.seek_to_first().unwrap();
        assert_eq!(cursor.state(), CursorState::AfterEnd);
        cursor.seek_to_last().unwrap();
        assert_eq!(cursor.state(), CursorState::BeforeStart);

        let mut inverted = Cursor::new(
            &store,
            CursorOptions::default().lower_bound("z").upper_bound("a"),
        )
        .unwrap();
        inverted.seek_to_first().unwrap();
        assert!(!inverted.valid());
    }

    #[test]
    fn test_next_and_prev_from_edges() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a", "b"]);
        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();

        // next from BeforeStart behaves like seek_to_first
        cursor.next().unwrap();
        assert_eq!(cursor.key().unwrap(), &ByteView::from("a"));

        cursor.prev().unwrap();
        assert_eq!(cursor.state(), CursorState::BeforeStart);
        assert_eq!(cursor.prev().unwrap_err().kind(), ErrorKind::InvalidCursorState);

        cursor.seek_to_last().unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.state(), CursorState::AfterEnd);
        assert_eq!(cursor.next().unwrap_err().kind(), ErrorKind::InvalidCursorState);

        // prev from AfterEnd behaves like seek_to_last
        cursor.prev().unwrap();
        assert_eq!(cursor.key().unwrap(), &ByteView::from("b"));
    }

    #[test]
    fn test_key_value_require_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a"]);
        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();

        assert_eq!(cursor.key().unwrap_err().kind(), ErrorKind::InvalidCursorState);
        cursor.seek_to_first().unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.value().unwrap_err().kind(), ErrorKind::InvalidCursorState);
    }

    #[test]
    fn test_snapshot_ignores_later_writes() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a", "b"]);
        let mut pinned = Cursor::new(&store, CursorOptions::default().use_snapshot(true)).unwrap();
        let mut live = Cursor::new(&store, CursorOptions::default()).unwrap();

        store.put(b"c", b"new", WriteOptions::default()).unwrap();
        store.delete(b"a", WriteOptions::default()).unwrap();

        assert_eq!(collect(&mut pinned), vec!["a", "b"]);
        assert_eq!(collect(&mut live), vec!["b", "c"]);
    }

    #[test]
    fn test_closed_store_invalidates_cursor() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a"]);
        let mut cursor = Cursor::new(&store, CursorOptions::default()).unwrap();
        store.close();

        assert_eq!(cursor.seek_to_first().unwrap_err().kind(), ErrorKind::InvalidHandle);

        drop(store);
        assert_eq!(cursor.seek_to_last().unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_handle_close() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &["a"]);
        let handle = CursorHandle::open(HandleId::from_raw(5), &store, CursorOptions::default()).unwrap();

        handle.with(|cursor| cursor.seek_to_first()).unwrap();
        assert!(handle.close());
        assert!(!handle.close());
        let err = handle.with(|cursor| cursor.next()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_tighter_bounds() {
        let a: &[u8] = b"a";
        let b: &[u8] = b"b";
        assert_eq!(tighter_lower(Bound::Included(a), Bound::Excluded(a)), Bound::Excluded(a));
        assert_eq!(tighter_lower(Bound::Included(b), Bound::Excluded(a)), Bound::Included(b));
        assert_eq!(tighter_upper(Bound::Excluded(b), Bound::Included(b)), Bound::Excluded(b));
        assert_eq!(tighter_upper(Bound::Unbounded, Bound::Included(a)), Bound::Included(a));
        assert!(is_empty_range(Bound::Included(a), Bound::Excluded(a)));
        assert!(!is_empty_range(Bound::Included(a), Bound::Included(a)));
        assert!(!is_empty_range(Bound::Unbounded, Bound::Excluded(a)));
    }
}
