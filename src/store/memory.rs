//! In-memory implementation of the storage traits.
//!
//! [`MemoryStore`] owns every conglomerate behind one mutex, together with a
//! per-transaction undo log. Transactions are handed out as
//! [`MemoryTransaction`] values; a transaction dropped without commit is
//! aborted and its undo log applied.
//!
//! # Locking
//!
//! Opening anything with [`LockMode::Table`] takes a table lock through the
//! [`TransactionManager`]. Lock requests never wait: a conflict fails at once
//! with a retryable `TxError::LockTimeout`.
//!
//! # Fault injection
//!
//! [`MemoryStore::fail_after`] makes the n+1-th operation at a
//! [`FaultPoint`] fail, which lets tests drive error paths deterministically.

mod handles;
mod heap;
mod index;

pub use handles::{MemoryConglomerate, MemoryRelocationScan, MemoryScan};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use self::heap::{HeapConglomerate, Slot};
use self::index::{EntryState, IndexConglomerate, IndexKey};
use super::error::StoreError;
use super::location::{ConglomId, RowLocation};
use super::traits::{
    LocatedRow, LockMode, NestedTransaction, OpenMode, OpenOptions, ScanRange, SpaceInfo,
    TransactionController,
};
use crate::config::{ConfigError, MemoryStoreConfig};
use crate::datum::{Type, Value};
use crate::tx::{TransactionManager, TxError, TxId, TxState};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Inserting an index entry.
    IndexInsert,
    /// Deleting through a scan.
    ScanDelete,
    /// Fetching a relocation batch.
    RelocationBatch,
}

#[derive(Debug)]
enum Conglomerate {
    Heap(HeapConglomerate),
    Index(IndexConglomerate),
}

/// One change to undo if the owning transaction aborts.
#[derive(Debug)]
enum Undo {
    HeapSlot {
        heap: ConglomId,
        location: RowLocation,
        prior: Slot,
    },
    IndexEntry {
        index: ConglomId,
        key: IndexKey,
        prior: Option<EntryState>,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    conglomerates: HashMap<ConglomId, Conglomerate>,
    next_id: u64,
    undo: HashMap<TxId, Vec<Undo>>,
    /// Successful operations left before the fault point fails.
    faults: HashMap<FaultPoint, usize>,
}

impl StoreState {
    fn heap(&self, id: ConglomId) -> Result<&HeapConglomerate, StoreError> {
        match self.conglomerates.get(&id) {
            Some(Conglomerate::Heap(heap)) => Ok(heap),
            Some(Conglomerate::Index(_)) => Err(StoreError::WrongConglomerateKind {
                id,
                expected: "heap",
            }),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    fn heap_mut(&mut self, id: ConglomId) -> Result<&mut HeapConglomerate, StoreError> {
        match self.conglomerates.get_mut(&id) {
            Some(Conglomerate::Heap(heap)) => Ok(heap),
            Some(Conglomerate::Index(_)) => Err(StoreError::WrongConglomerateKind {
                id,
                expected: "heap",
            }),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    fn index(&self, id: ConglomId) -> Result<&IndexConglomerate, StoreError> {
        match self.conglomerates.get(&id) {
            Some(Conglomerate::Index(index)) => Ok(index),
            Some(Conglomerate::Heap(_)) => Err(StoreError::WrongConglomerateKind {
                id,
                expected: "index",
            }),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    fn index_mut(&mut self, id: ConglomId) -> Result<&mut IndexConglomerate, StoreError> {
        match self.conglomerates.get_mut(&id) {
            Some(Conglomerate::Index(index)) => Ok(index),
            Some(Conglomerate::Heap(_)) => Err(StoreError::WrongConglomerateKind {
                id,
                expected: "index",
            }),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    fn record(&mut self, txid: TxId, undo: Undo) {
        self.undo.entry(txid).or_default().push(undo);
    }

    fn trip(&mut self, point: FaultPoint) -> Result<(), StoreError> {
        match self.faults.get_mut(&point) {
            Some(0) => {
                self.faults.remove(&point);
                Err(StoreError::Injected(format!("{:?}", point)))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Heap locations with changes still pending in some transaction other
    /// than `txid`. Their undo records name these locations, so the rows stay put.
    fn pinned_locations(&self, heap: ConglomId, txid: TxId) -> HashSet<RowLocation> {
        self.undo
            .iter()
            .filter(|(owner, _)| **owner != txid)
            .flat_map(|(_, log)| log)
            .filter_map(|undo| match undo {
                Undo::HeapSlot {
                    heap: id, location, ..
                } if *id == heap => Some(*location),
                _ => None,
            })
            .collect()
    }

    fn apply_undo(&mut self, txid: TxId) -> usize {
        let Some(log) = self.undo.remove(&txid) else {
            return 0;
        };
        let count = log.len();
        for undo in log.into_iter().rev() {
            match undo {
                Undo::HeapSlot {
                    heap,
                    location,
                    prior,
                } => {
                    if let Ok(heap) = self.heap_mut(heap) {
                        heap.set_slot(location, prior);
                    }
                }
                Undo::IndexEntry { index, key, prior } => {
                    if let Ok(index) = self.index_mut(index) {
                        index.restore(key, prior);
                    }
                }
            }
        }
        count
    }
}

/// State shared by the store and every transaction and handle it hands out.
#[derive(Debug)]
struct StoreInner {
    config: MemoryStoreConfig,
    tx: TransactionManager,
    state: Mutex<StoreState>,
    open_handles: AtomicUsize,
}

impl StoreInner {
    /// Validates access to a conglomerate and takes its table lock.
    fn admit(&self, txid: TxId, id: ConglomId, options: OpenOptions) -> Result<(), StoreError> {
        if !self.state.lock().conglomerates.contains_key(&id) {
            return Err(StoreError::ConglomerateNotFound(id));
        }
        self.admit_write(txid, options.for_update())?;
        if options.lock == LockMode::Table {
            self.tx.lock_table(txid, id)?;
        }
        Ok(())
    }

    fn admit_write(&self, txid: TxId, for_update: bool) -> Result<(), StoreError> {
        match self.tx.state(txid) {
            Some(TxState::InProgress) => {}
            Some(current) => {
                return Err(TxError::InvalidStateTransition {
                    txid,
                    current,
                    attempted: TxState::InProgress,
                }
                .into());
            }
            None => return Err(TxError::TransactionNotFound(txid).into()),
        }
        if for_update && self.tx.is_read_only(txid) {
            return Err(StoreError::ReadOnly(txid));
        }
        Ok(())
    }

    fn commit(&self, txid: TxId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        self.tx.commit(txid)?;
        state.undo.remove(&txid);
        Ok(())
    }

    fn abort(&self, txid: TxId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        self.tx.abort(txid)?;
        let undone = state.apply_undo(txid);
        debug!(txid = %txid, undone, "transaction aborted");
        Ok(())
    }
}

/// Counts a handle as open for as long as it lives.
#[derive(Debug)]
struct HandleGuard {
    inner: Arc<StoreInner>,
}

impl HandleGuard {
    fn new(inner: &Arc<StoreInner>) -> Self {
        inner.open_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.inner.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory heap and index store.
///
/// Cloning yields another handle to the same store.
///
/// NOTE: `OpenOptions::isolation` is accepted but not enforced, and
/// `LockMode::Row` takes no lock at all. Only `LockMode::Table` isolates
/// transactions from each other here.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::build(MemoryStoreConfig::default())
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: MemoryStoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                tx: TransactionManager::new(),
                state: Mutex::new(StoreState {
                    next_id: 1,
                    ..Default::default()
                }),
                open_handles: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.inner.config
    }

    /// The transaction manager shared by all transactions of this store.
    pub fn tx_manager(&self) -> &TransactionManager {
        &self.inner.tx
    }

    /// Begins a top-level transaction.
    pub fn begin(&self, read_only: bool) -> MemoryTransaction {
        let txid = self.inner.tx.begin(read_only);
        MemoryTransaction::new(Arc::clone(&self.inner), txid)
    }

    fn allocate(&self, make: impl FnOnce(ConglomId) -> Conglomerate) -> ConglomId {
        let mut state = self.inner.state.lock();
        let id = ConglomId::new(state.next_id);
        state.next_id += 1;
        state.conglomerates.insert(id, make(id));
        id
    }

    /// Creates an empty heap with the given column types.
    pub fn create_heap(&self, column_types: Vec<Type>) -> ConglomId {
        let page_size = self.inner.config.page_size as usize;
        self.allocate(|id| Conglomerate::Heap(HeapConglomerate::new(id, column_types, page_size)))
    }

    /// Creates an empty index with `key_width` key columns.
    pub fn create_index(&self, key_width: usize, unique: bool) -> ConglomId {
        let per_page = self.inner.config.index_entries_per_page;
        let page_size = self.inner.config.page_size;
        self.allocate(|id| {
            Conglomerate::Index(IndexConglomerate::new(
                id, key_width, unique, per_page, page_size,
            ))
        })
    }

    /// Removes a conglomerate and everything in it.
    pub fn drop_conglomerate(&self, id: ConglomId) -> Result<(), StoreError> {
        self.inner
            .state
            .lock()
            .conglomerates
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ConglomerateNotFound(id))
    }

    /// Number of conglomerate controllers and scans currently open.
    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Lets `successes` operations at `point` succeed, then fails the next.
    pub fn fail_after(&self, point: FaultPoint, successes: usize) {
        self.inner.state.lock().faults.insert(point, successes);
    }

    pub fn clear_faults(&self) {
        self.inner.state.lock().faults.clear();
    }

    /// Live heap rows with their locations, in storage order.
    pub fn heap_rows(&self, heap: ConglomId) -> Result<Vec<LocatedRow>, StoreError> {
        let state = self.inner.state.lock();
        Ok(state
            .heap(heap)?
            .live_rows()
            .map(|(location, row)| LocatedRow::new(row.clone(), Some(location)))
            .collect())
    }

    /// Live index entries, in key order.
    pub fn index_entries(&self, index: ConglomId) -> Result<Vec<LocatedRow>, StoreError> {
        Ok(self.inner.state.lock().index(index)?.live_entries())
    }

    pub fn space_info(&self, id: ConglomId) -> Result<SpaceInfo, StoreError> {
        let state = self.inner.state.lock();
        match state.conglomerates.get(&id) {
            Some(Conglomerate::Heap(heap)) => Ok(heap.space_info()),
            Some(Conglomerate::Index(index)) => Ok(index.space_info()),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    // Damage helpers. They bypass transactions and indexes entirely.

    /// Overwrites one 0-based column of a live heap row.
    pub fn overwrite_heap_value(
        &self,
        heap: ConglomId,
        location: RowLocation,
        column: usize,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock();
        Ok(state
            .heap_mut(heap)?
            .overwrite_value(location, column, value))
    }

    /// Frees a heap slot without touching any index.
    pub fn erase_heap_row(&self, heap: ConglomId, location: RowLocation) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock();
        let prior = state.heap_mut(heap)?.set_slot(location, Slot::Free);
        Ok(prior != Slot::Free)
    }

    /// Inserts an index entry without shape or uniqueness checks.
    pub fn insert_raw_index_entry(
        &self,
        index: ConglomId,
        entry: LocatedRow,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        state.index_mut(index)?.insert_unchecked(entry);
        Ok(())
    }

    /// Adds bytes to a heap page's recorded usage.
    pub fn skew_page_accounting(
        &self,
        heap: ConglomId,
        page: usize,
        bytes: usize,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock();
        Ok(state.heap_mut(heap)?.skew_accounting(page, bytes))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A transaction against a [`MemoryStore`].
///
/// Used both for top-level transactions and for nested ones started through
/// [`TransactionController::start_nested`]. Dropping an unfinished
/// transaction aborts it.
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<StoreInner>,
    txid: TxId,
    done: bool,
}

impl MemoryTransaction {
    fn new(inner: Arc<StoreInner>, txid: TxId) -> Self {
        Self {
            inner,
            txid,
            done: false,
        }
    }

    /// Commits, discarding the undo log and releasing locks.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.inner.commit(self.txid)?;
        self.done = true;
        Ok(())
    }

    /// Aborts, undoing every change and releasing locks.
    pub fn abort(mut self) -> Result<(), StoreError> {
        self.inner.abort(self.txid)?;
        self.done = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = self.inner.abort(self.txid) {
            warn!(txid = %self.txid, error = %e, "failed to abort dropped transaction");
        }
    }
}

impl TransactionController for MemoryTransaction {
    type Conglomerate = MemoryConglomerate;
    type Scan = MemoryScan;
    type Relocation = MemoryRelocationScan;
    type Nested = MemoryTransaction;

    fn txid(&self) -> TxId {
        self.txid
    }

    fn open_conglomerate(
        &self,
        id: ConglomId,
        options: OpenOptions,
    ) -> Result<MemoryConglomerate, StoreError> {
        self.inner.admit(self.txid, id, options)?;
        Ok(MemoryConglomerate::new(&self.inner, self.txid, id, options))
    }

    fn open_scan(
        &self,
        id: ConglomId,
        options: OpenOptions,
        range: ScanRange,
    ) -> Result<MemoryScan, StoreError> {
        self.inner.admit(self.txid, id, options)?;
        MemoryScan::open(&self.inner, self.txid, id, options, range)
    }

    fn open_relocation_scan(
        &self,
        heap: ConglomId,
        options: OpenOptions,
    ) -> Result<MemoryRelocationScan, StoreError> {
        self.inner.admit(self.txid, heap, options)?;
        if !options.for_update() {
            return Err(StoreError::Unsupported("relocation scan opened read-only"));
        }
        MemoryRelocationScan::open(&self.inner, self.txid, heap)
    }

    fn start_nested(&self, read_only: bool) -> Result<MemoryTransaction, StoreError> {
        let txid = self.inner.tx.begin_nested(self.txid, read_only)?;
        debug!(parent = %self.txid, nested = %txid, "nested transaction started");
        Ok(MemoryTransaction::new(Arc::clone(&self.inner), txid))
    }

    fn purge_conglomerate(&self, id: ConglomId) -> Result<(), StoreError> {
        self.inner
            .admit(self.txid, id, OpenOptions::table(OpenMode::ForUpdate))?;
        let mut state = self.inner.state.lock();
        let is_committed = |txid| self.inner.tx.is_committed(txid);
        let purged = match state.conglomerates.get_mut(&id) {
            Some(Conglomerate::Heap(heap)) => heap.purge(is_committed),
            Some(Conglomerate::Index(index)) => index.purge(is_committed),
            None => return Err(StoreError::ConglomerateNotFound(id)),
        };
        debug!(conglomerate = %id, purged, "purged committed deletes");
        Ok(())
    }

    fn compress_conglomerate(&self, id: ConglomId) -> Result<(), StoreError> {
        self.inner
            .admit(self.txid, id, OpenOptions::table(OpenMode::ForUpdate))?;
        let mut state = self.inner.state.lock();
        let released = match state.conglomerates.get_mut(&id) {
            Some(Conglomerate::Heap(heap)) => heap.truncate() as u64,
            Some(Conglomerate::Index(index)) => index.truncate(),
            None => return Err(StoreError::ConglomerateNotFound(id)),
        };
        debug!(conglomerate = %id, released, "released trailing pages");
        Ok(())
    }

    fn space_info(&self, id: ConglomId) -> Result<SpaceInfo, StoreError> {
        let state = self.inner.state.lock();
        match state.conglomerates.get(&id) {
            Some(Conglomerate::Heap(heap)) => Ok(heap.space_info()),
            Some(Conglomerate::Index(index)) => Ok(index.space_info()),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }
}

impl NestedTransaction for MemoryTransaction {
    fn commit(self) -> Result<(), StoreError> {
        MemoryTransaction::commit(self)
    }

    fn abandon(self) -> Result<(), StoreError> {
        MemoryTransaction::abort(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        ColumnSet, ConglomerateController, Isolation, RelocationScan, ScanController,
    };

    fn update() -> OpenOptions {
        OpenOptions::table(OpenMode::ForUpdate)
    }

    fn setup() -> (MemoryStore, ConglomId, ConglomId) {
        let store = MemoryStore::new();
        let heap = store.create_heap(vec![Type::Int4, Type::Text]);
        let index = store.create_index(1, false);
        (store, heap, index)
    }

    fn insert(tx: &MemoryTransaction, heap: ConglomId, index: ConglomId, id: i32) -> RowLocation {
        let mut h = tx.open_conglomerate(heap, update()).unwrap();
        let loc = h
            .insert_row(vec![Value::Int32(id), Value::Text(format!("row-{:04}", id))])
            .unwrap();
        let mut ix = tx.open_conglomerate(index, update()).unwrap();
        ix.insert(&LocatedRow::new(vec![Value::Int32(id)], Some(loc)))
            .unwrap();
        loc
    }

    #[test]
    fn test_abort_undoes_inserts() {
        let (store, heap, index) = setup();
        let tx = store.begin(false);
        insert(&tx, heap, index, 1);
        assert_eq!(store.heap_rows(heap).unwrap().len(), 1);

        tx.abort().unwrap();
        assert!(store.heap_rows(heap).unwrap().is_empty());
        assert!(store.index_entries(index).unwrap().is_empty());
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn test_dropped_transaction_aborts() {
        let (store, heap, index) = setup();
        {
            let tx = store.begin(false);
            insert(&tx, heap, index, 1);
        }
        assert!(store.heap_rows(heap).unwrap().is_empty());
    }

    #[test]
    fn test_read_only_transaction_rejects_update_open() {
        let (store, heap, _) = setup();
        let tx = store.begin(true);
        let result = tx.open_conglomerate(heap, update());
        assert!(matches!(result, Err(StoreError::ReadOnly(_))));
    }

    #[test]
    fn test_table_lock_conflict_is_retryable() {
        let (store, heap, index) = setup();
        let tx1 = store.begin(false);
        insert(&tx1, heap, index, 1);

        let tx2 = store.begin(false);
        let err = tx2
            .open_scan(heap, OpenOptions::table(OpenMode::ReadOnly), ScanRange::Full)
            .unwrap_err();
        assert!(err.is_retryable());

        tx1.commit().unwrap();
        tx2.open_scan(heap, OpenOptions::table(OpenMode::ReadOnly), ScanRange::Full)
            .unwrap();
    }

    #[test]
    fn test_isolation_level_does_not_relax_table_locks() {
        let (store, heap, index) = setup();
        let writer = store.begin(false);
        insert(&writer, heap, index, 1);

        let reader = store.begin(true);
        let options = OpenOptions {
            isolation: Isolation::ReadCommitted,
            ..OpenOptions::table(OpenMode::ReadOnly)
        };
        assert!(reader.open_scan(heap, options, ScanRange::Full).is_err());
    }

    #[test]
    fn test_nested_commit_survives_parent_abort() {
        let (store, heap, index) = setup();
        let parent = store.begin(false);
        let nested = parent.start_nested(false).unwrap();
        insert(&nested, heap, index, 1);
        NestedTransaction::commit(nested).unwrap();
        parent.abort().unwrap();

        assert_eq!(store.heap_rows(heap).unwrap().len(), 1);
    }

    #[test]
    fn test_nested_abandon_restores_relocated_rows() {
        let store = MemoryStore::with_config(MemoryStoreConfig::default().with_page_size(128))
            .unwrap();
        let heap = store.create_heap(vec![Type::Int4, Type::Text]);
        let index = store.create_index(1, false);
        let tx = store.begin(false);
        let locations: Vec<_> = (0..12).map(|i| insert(&tx, heap, index, i)).collect();
        tx.commit().unwrap();

        let tx = store.begin(false);
        {
            let mut scan = tx.open_scan(heap, update(), ScanRange::Full).unwrap();
            while scan.next().unwrap() {
                let mut row = LocatedRow::template(2);
                scan.fetch(&mut row).unwrap();
                if row.location.is_some_and(|l| l.page() == 0) {
                    assert!(scan.delete().unwrap());
                }
            }
        }
        tx.commit().unwrap();

        let parent = store.begin(false);
        parent.purge_conglomerate(heap).unwrap();
        let before = store.heap_rows(heap).unwrap();

        let nested = parent.start_nested(false).unwrap();
        {
            let mut reloc = nested.open_relocation_scan(heap, update()).unwrap();
            let mut batch = Vec::new();
            assert!(reloc.fetch_next_batch(100, &mut batch).unwrap() > 0);
        }
        assert_ne!(store.heap_rows(heap).unwrap(), before);
        nested.abandon().unwrap();

        assert_eq!(store.heap_rows(heap).unwrap(), before);
        assert_eq!(store.open_handles(), 0);
        assert!(locations.len() > before.len());
    }

    #[test]
    fn test_fault_injection_fires_once() {
        let (store, heap, index) = setup();
        store.fail_after(FaultPoint::IndexInsert, 1);
        let tx = store.begin(false);
        insert(&tx, heap, index, 1);

        let mut ix = tx.open_conglomerate(index, update()).unwrap();
        let entry = LocatedRow::new(vec![Value::Int32(2)], Some(RowLocation::new(0, 9)));
        assert!(matches!(ix.insert(&entry), Err(StoreError::Injected(_))));
        ix.insert(&entry).unwrap();
    }

    #[test]
    fn test_fetch_fills_needed_columns_only() {
        let (store, heap, index) = setup();
        let tx = store.begin(false);
        let loc = insert(&tx, heap, index, 5);

        let h = tx
            .open_conglomerate(heap, OpenOptions::table(OpenMode::ReadOnly))
            .unwrap();
        let mut needed = ColumnSet::new(2);
        needed.insert(0);
        let mut out = vec![Value::Null, Value::Null];
        assert!(h.fetch(loc, &mut out, &needed).unwrap());
        assert_eq!(out, vec![Value::Int32(5), Value::Null]);

        assert!(!h.fetch(RowLocation::new(3, 3), &mut out, &needed).unwrap());
    }

    #[test]
    fn test_space_info_tracks_truncate() {
        let store = MemoryStore::with_config(MemoryStoreConfig::default().with_page_size(128))
            .unwrap();
        let heap = store.create_heap(vec![Type::Int4, Type::Text]);
        let index = store.create_index(1, false);
        let tx = store.begin(false);
        for i in 0..12 {
            insert(&tx, heap, index, i);
        }
        tx.commit().unwrap();
        let pages = store.space_info(heap).unwrap().allocated_pages;
        assert!(pages >= 3);

        let tx = store.begin(false);
        {
            let mut scan = tx.open_scan(heap, update(), ScanRange::Full).unwrap();
            while scan.next().unwrap() {
                scan.delete().unwrap();
            }
        }
        tx.commit().unwrap();

        let tx = store.begin(false);
        tx.purge_conglomerate(heap).unwrap();
        let info = tx.space_info(heap).unwrap();
        assert_eq!(info.free_pages, pages);
        assert_eq!(info.estimated_reclaimable_bytes, (pages - 1) * 128);
        tx.compress_conglomerate(heap).unwrap();
        assert_eq!(tx.space_info(heap).unwrap().allocated_pages, 1);
    }
}
