// src/session.rs
use crate::error::TabservResult;
use crate::signature::RequestSignature;
use crate::source::{ColumnInfo, Datum, RowCursor};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One window of rows pulled off a session cursor, plus the schema snapshot
/// so the caller can serialize without holding the cursor lock.
pub struct RowBatch {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Datum>>,
    pub total_count: Option<u64>,
}

/// Live row-iteration state for one open query.
///
/// `current_row` is the 1-based index of the row the cursor is positioned
/// at (the next row a read would return); 0 means not yet positioned. Only
/// the owning request thread advances it, serialized by the store's
/// per-cursor lock.
pub struct SessionCursor {
    cursor: Box<dyn RowCursor>,
    current_row: u64,
    columns: Vec<ColumnInfo>,
    total_count: Option<u64>,
}

impl SessionCursor {
    pub fn new(cursor: Box<dyn RowCursor>) -> Self {
        let columns = cursor.columns().to_vec();
        let total_count = cursor.total_count();
        Self {
            cursor,
            current_row: 0,
            columns,
            total_count,
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Read up to `limit` rows starting at 1-based row `start` (`limit` 0
    /// means unlimited). A `start` behind the current position triggers a
    /// full rewind followed by a forward skip; iteration cost is always
    /// forward-only, never a backward seek.
    pub fn fetch(&mut self, start: u64, limit: u64) -> RowBatch {
        let start = start.max(1);

        if self.current_row == 0 || start < self.current_row {
            self.cursor.rewind();
            self.current_row = 1;
        }
        if start > self.current_row {
            self.cursor.skip(start - self.current_row);
            self.current_row = start;
        }

        let mut rows = Vec::new();
        while limit == 0 || (rows.len() as u64) < limit {
            match self.cursor.read() {
                Some(row) => {
                    rows.push(row);
                    self.current_row += 1;
                }
                None => break,
            }
        }

        RowBatch {
            columns: self.columns.clone(),
            rows,
            total_count: self.total_count,
        }
    }
}

/// Registry of live cursors keyed by request signature.
///
/// One coarse lock guards map membership; each cursor carries its own lock
/// so two requests racing on the same signature serialize their row
/// advancement instead of corrupting position. Entries are never evicted on
/// their own: the store lives as long as the server and is emptied by
/// `clear` on stop.
#[derive(Default)]
pub struct SessionCursorStore {
    cursors: Mutex<HashMap<RequestSignature, Arc<Mutex<SessionCursor>>>>,
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cursor for `signature`, constructing it via `factory` on
    /// first access. The factory runs under the store lock, so even racing
    /// first requests construct exactly one cursor; a factory failure
    /// leaves no entry behind.
    pub fn get_or_create<F>(
        &self,
        signature: RequestSignature,
        factory: F,
    ) -> TabservResult<Arc<Mutex<SessionCursor>>>
    where
        F: FnOnce() -> TabservResult<SessionCursor>,
    {
        let mut cursors = lock_unpoisoned(&self.cursors);
        match cursors.entry(signature) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let cursor = factory()?;
                debug!(%signature, "opened session cursor");
                Ok(entry.insert(Arc::new(Mutex::new(cursor))).clone())
            }
        }
    }

    pub fn remove(&self, signature: RequestSignature) {
        lock_unpoisoned(&self.cursors).remove(&signature);
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.cursors).clear();
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.cursors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a cursor handed out by the store, surviving a panicked peer.
pub fn lock_cursor(cursor: &Mutex<SessionCursor>) -> MutexGuard<'_, SessionCursor> {
    lock_unpoisoned(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, ParsedRequest};
    use crate::signature::signature_of;
    use crate::source::{ColumnInfo, ColumnType, MemorySource, TabularSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn hundred_row_source() -> MemorySource {
        let mut source = MemorySource::new();
        source.add_table(
            "/rows",
            vec![ColumnInfo::new("n", ColumnType::Integer)],
            (1..=100).map(|n| vec![crate::source::Datum::Integer(n)]).collect(),
        );
        source
    }

    fn sig(uri: &str) -> RequestSignature {
        signature_of(&ParsedRequest::new(Method::Get, uri))
    }

    fn nth(batch: &RowBatch, i: usize) -> i64 {
        batch.rows[i][0].as_i64().unwrap()
    }

    #[test]
    fn test_pagination_windows_without_requery() {
        let source = hundred_row_source();
        let store = SessionCursorStore::new();
        let signature = sig("/rows");

        let cursor = store
            .get_or_create(signature, || {
                Ok(SessionCursor::new(
                    source.execute_query("SELECT * FROM /rows")?,
                ))
            })
            .unwrap();

        // a second request with the same signature reuses the live cursor
        let again = store
            .get_or_create(signature, || unreachable!("cursor already cached"))
            .unwrap();
        assert!(Arc::ptr_eq(&cursor, &again));
        assert_eq!(source.queries_executed(), 1);

        let batch = lock_cursor(&cursor).fetch(1, 10);
        assert_eq!(batch.rows.len(), 10);
        assert_eq!((nth(&batch, 0), nth(&batch, 9)), (1, 10));

        let batch = lock_cursor(&cursor).fetch(11, 10);
        assert_eq!((nth(&batch, 0), nth(&batch, 9)), (11, 20));

        // going backwards resets and replays forward
        let batch = lock_cursor(&cursor).fetch(1, 10);
        assert_eq!((nth(&batch, 0), nth(&batch, 9)), (1, 10));

        assert_eq!(source.queries_executed(), 1);
        assert_eq!(batch.total_count, Some(100));
    }

    #[test]
    fn test_limit_zero_reads_to_end() {
        let source = hundred_row_source();
        let mut cursor = SessionCursor::new(source.execute_query("SELECT * FROM /rows").unwrap());

        let batch = cursor.fetch(91, 0);
        assert_eq!(batch.rows.len(), 10);
        assert_eq!(nth(&batch, 9), 100);
    }

    #[test]
    fn test_short_batch_at_end_of_data() {
        let source = hundred_row_source();
        let mut cursor = SessionCursor::new(source.execute_query("SELECT * FROM /rows").unwrap());

        let batch = cursor.fetch(96, 10);
        assert_eq!(batch.rows.len(), 5);

        let batch = cursor.fetch(101, 10);
        assert!(batch.rows.is_empty());
    }

    #[test]
    fn test_store_remove_and_clear() {
        let source = hundred_row_source();
        let store = SessionCursorStore::new();

        for uri in ["/a", "/b"] {
            store
                .get_or_create(sig(uri), || {
                    Ok(SessionCursor::new(
                        source.execute_query("SELECT * FROM /rows")?,
                    ))
                })
                .unwrap();
        }
        assert_eq!(store.len(), 2);

        store.remove(sig("/a"));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_create_runs_factory_once() {
        let source = Arc::new(hundred_row_source());
        let store = Arc::new(SessionCursorStore::new());
        let signature = sig("/rows");
        let factory_runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let source = source.clone();
                let store = store.clone();
                let factory_runs = factory_runs.clone();
                thread::spawn(move || {
                    store
                        .get_or_create(signature, || {
                            factory_runs.fetch_add(1, Ordering::SeqCst);
                            Ok(SessionCursor::new(
                                source.execute_query("SELECT * FROM /rows")?,
                            ))
                        })
                        .unwrap()
                })
            })
            .collect();

        let cursors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(factory_runs.load(Ordering::SeqCst), 1);
        for pair in cursors.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_failed_factory_leaves_no_entry() {
        let store = SessionCursorStore::new();
        let signature = sig("/broken");

        let result = store.get_or_create(signature, || {
            Err(crate::error::TabservError::QueryFailed("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
