//! Controllers and scans handed out by [`MemoryTransaction`](super::MemoryTransaction).
//!
//! Every handle holds a [`HandleGuard`] so the store can report how many are
//! still open. Scans work from a snapshot of keys taken when they are opened
//! or repositioned, and re-check each row's liveness as they reach it.

use std::sync::Arc;

use super::heap::{RelocationCursor, Slot};
use super::index::{EntryState, IndexKey};
use super::{Conglomerate, FaultPoint, HandleGuard, StoreInner, StoreState, Undo};
use crate::datum::Value;
use crate::store::{
    ColumnSet, ConglomId, ConglomerateController, LocatedRow, OpenOptions, Relocated,
    RelocationScan, RowLocation, ScanController, ScanRange, StoreError,
};
use crate::tx::TxId;

/// An open heap or index.
pub struct MemoryConglomerate {
    guard: HandleGuard,
    txid: TxId,
    id: ConglomId,
    options: OpenOptions,
}

impl MemoryConglomerate {
    pub(super) fn new(
        inner: &Arc<StoreInner>,
        txid: TxId,
        id: ConglomId,
        options: OpenOptions,
    ) -> Self {
        Self {
            guard: HandleGuard::new(inner),
            txid,
            id,
            options,
        }
    }

    fn require_update(&self) -> Result<(), StoreError> {
        if self.options.for_update() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly(self.txid))
        }
    }

    /// Inserts a row into a heap and returns where it was placed.
    pub fn insert_row(&mut self, row: Vec<Value>) -> Result<RowLocation, StoreError> {
        self.require_update()?;
        let mut state = self.guard.inner.state.lock();
        let heap = state.heap_mut(self.id)?;
        heap.validate_row(&row)?;
        let location = heap.insert(row);
        state.record(
            self.txid,
            Undo::HeapSlot {
                heap: self.id,
                location,
                prior: Slot::Free,
            },
        );
        Ok(location)
    }

    /// Column count of a heap, or key width of an index.
    pub fn width(&self) -> Result<usize, StoreError> {
        let state = self.guard.inner.state.lock();
        match state.conglomerates.get(&self.id) {
            Some(Conglomerate::Heap(heap)) => Ok(heap.width()),
            Some(Conglomerate::Index(index)) => Ok(index.key_width()),
            None => Err(StoreError::ConglomerateNotFound(self.id)),
        }
    }
}

impl ConglomerateController for MemoryConglomerate {
    fn id(&self) -> ConglomId {
        self.id
    }

    fn check_consistency(&self) -> Result<(), StoreError> {
        let state = self.guard.inner.state.lock();
        let result = match state.conglomerates.get(&self.id) {
            Some(Conglomerate::Heap(heap)) => heap.check(),
            Some(Conglomerate::Index(index)) => index.check(),
            None => return Err(StoreError::ConglomerateNotFound(self.id)),
        };
        result.map_err(|detail| StoreError::Corrupted {
            id: self.id,
            detail,
        })
    }

    fn fetch(
        &self,
        location: RowLocation,
        out: &mut [Value],
        needed: &ColumnSet,
    ) -> Result<bool, StoreError> {
        let state = self.guard.inner.state.lock();
        let heap = state.heap(self.id)?;
        let Some(row) = heap.live_row(location) else {
            return Ok(false);
        };
        for offset in needed.iter() {
            let Some(slot) = out.get_mut(offset) else {
                return Err(StoreError::InvalidRow {
                    id: self.id,
                    detail: format!(
                        "fetch buffer has {} columns, column {} requested",
                        out.len(),
                        offset + 1
                    ),
                });
            };
            *slot = row.get(offset).cloned().unwrap_or(Value::Null);
        }
        Ok(true)
    }

    fn insert(&mut self, entry: &LocatedRow) -> Result<(), StoreError> {
        self.require_update()?;
        let mut state = self.guard.inner.state.lock();
        state.trip(FaultPoint::IndexInsert)?;
        let index = state.index_mut(self.id)?;
        index.validate_entry(entry)?;
        let prior = index.insert(entry.clone())?;
        state.record(
            self.txid,
            Undo::IndexEntry {
                index: self.id,
                key: IndexKey(entry.clone()),
                prior,
            },
        );
        Ok(())
    }
}

/// A scan over a heap or index.
#[derive(Debug)]
pub struct MemoryScan {
    guard: HandleGuard,
    txid: TxId,
    id: ConglomId,
    options: OpenOptions,
    is_heap: bool,
    rows: Vec<LocatedRow>,
    next: usize,
    current: Option<usize>,
}

impl MemoryScan {
    pub(super) fn open(
        inner: &Arc<StoreInner>,
        txid: TxId,
        id: ConglomId,
        options: OpenOptions,
        range: ScanRange,
    ) -> Result<Self, StoreError> {
        let (is_heap, rows) = Self::snapshot(&inner.state.lock(), id, &range)?;
        Ok(Self {
            guard: HandleGuard::new(inner),
            txid,
            id,
            options,
            is_heap,
            rows,
            next: 0,
            current: None,
        })
    }

    fn snapshot(
        state: &StoreState,
        id: ConglomId,
        range: &ScanRange,
    ) -> Result<(bool, Vec<LocatedRow>), StoreError> {
        match state.conglomerates.get(&id) {
            Some(Conglomerate::Heap(heap)) => {
                let rows = heap
                    .live_rows()
                    .map(|(location, row)| LocatedRow::new(row.clone(), Some(location)))
                    .filter(|row| range.contains(row))
                    .collect();
                Ok((true, rows))
            }
            Some(Conglomerate::Index(index)) => Ok((false, index.live_in_range(range))),
            None => Err(StoreError::ConglomerateNotFound(id)),
        }
    }

    fn is_live(&self, state: &StoreState, row: &LocatedRow) -> bool {
        if self.is_heap {
            let Some(location) = row.location else {
                return false;
            };
            state
                .heap(self.id)
                .is_ok_and(|heap| heap.live_row(location).is_some())
        } else {
            state.index(self.id).is_ok_and(|index| {
                index.state(&IndexKey(row.clone())) == Some(EntryState::Live)
            })
        }
    }
}

impl ScanController for MemoryScan {
    fn next(&mut self) -> Result<bool, StoreError> {
        let state = self.guard.inner.state.lock();
        while self.next < self.rows.len() {
            let i = self.next;
            self.next += 1;
            if self.is_live(&state, &self.rows[i]) {
                self.current = Some(i);
                return Ok(true);
            }
        }
        self.current = None;
        Ok(false)
    }

    fn fetch(&self, out: &mut LocatedRow) -> Result<(), StoreError> {
        let row = self
            .current
            .and_then(|i| self.rows.get(i))
            .ok_or(StoreError::NoCurrentRow)?;
        out.columns.clear();
        out.location = row.location;
        if self.is_heap {
            let state = self.guard.inner.state.lock();
            let current = row
                .location
                .and_then(|location| state.heap(self.id).ok()?.live_row(location));
            if let Some(values) = current {
                out.columns.extend_from_slice(values);
                return Ok(());
            }
        }
        out.columns.extend_from_slice(&row.columns);
        Ok(())
    }

    fn delete(&mut self) -> Result<bool, StoreError> {
        if !self.options.for_update() {
            return Err(StoreError::ReadOnly(self.txid));
        }
        let row = self
            .current
            .and_then(|i| self.rows.get(i))
            .ok_or(StoreError::NoCurrentRow)?;
        let mut state = self.guard.inner.state.lock();
        state.trip(FaultPoint::ScanDelete)?;
        let undo = if self.is_heap {
            let location = row.location.ok_or(StoreError::NoCurrentRow)?;
            state
                .heap_mut(self.id)?
                .mark_deleted(location, self.txid)
                .map(|prior| Undo::HeapSlot {
                    heap: self.id,
                    location,
                    prior,
                })
        } else {
            let key = IndexKey(row.clone());
            state
                .index_mut(self.id)?
                .mark_deleted(&key, self.txid)
                .map(|prior| Undo::IndexEntry {
                    index: self.id,
                    key,
                    prior: Some(prior),
                })
        };
        match undo {
            Some(undo) => {
                state.record(self.txid, undo);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reopen(&mut self, range: ScanRange) -> Result<(), StoreError> {
        let (is_heap, rows) = Self::snapshot(&self.guard.inner.state.lock(), self.id, &range)?;
        self.is_heap = is_heap;
        self.rows = rows;
        self.next = 0;
        self.current = None;
        Ok(())
    }
}

/// A relocation scan over one heap.
pub struct MemoryRelocationScan {
    guard: HandleGuard,
    txid: TxId,
    heap: ConglomId,
    cursor: RelocationCursor,
}

impl MemoryRelocationScan {
    pub(super) fn open(
        inner: &Arc<StoreInner>,
        txid: TxId,
        heap: ConglomId,
    ) -> Result<Self, StoreError> {
        let cursor = RelocationCursor::new(inner.state.lock().heap(heap)?);
        Ok(Self {
            guard: HandleGuard::new(inner),
            txid,
            heap,
            cursor,
        })
    }
}

impl RelocationScan for MemoryRelocationScan {
    fn fetch_next_batch(
        &mut self,
        max_rows: usize,
        out: &mut Vec<Relocated>,
    ) -> Result<usize, StoreError> {
        out.clear();
        if self.cursor.is_exhausted() {
            return Ok(0);
        }
        let mut state = self.guard.inner.state.lock();
        state.trip(FaultPoint::RelocationBatch)?;
        let pinned = state.pinned_locations(self.heap, self.txid);
        let heap = state.heap_mut(self.heap)?;
        let moves = self.cursor.advance(heap, max_rows, &pinned);
        for (row, old, new) in moves {
            state.record(
                self.txid,
                Undo::HeapSlot {
                    heap: self.heap,
                    location: new,
                    prior: Slot::Free,
                },
            );
            state.record(
                self.txid,
                Undo::HeapSlot {
                    heap: self.heap,
                    location: old,
                    prior: Slot::Live(row.clone()),
                },
            );
            out.push(Relocated { row, old, new });
        }
        Ok(out.len())
    }
}
