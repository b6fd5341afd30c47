//! Slotted-page heap held in memory.
//!
//! Each page tracks the bytes its slot array and rows consume:
//!
//! ```text
//! +--------------------+------------------------------+
//! | header (24 bytes)  | slots: 4 bytes each          |
//! |                    | rows: null bitmap + values   |
//! +--------------------+------------------------------+
//! ```
//!
//! A slot is free, holds a live row, or holds a row deleted by some
//! transaction. Deleted rows keep their bytes until a purge releases them.

use std::collections::HashSet;

use super::super::error::StoreError;
use super::super::location::{ConglomId, RowLocation};
use super::super::traits::SpaceInfo;
use crate::datum::{Type, Value};
use crate::tx::TxId;

/// Bytes reserved at the start of every page.
pub(super) const PAGE_HEADER_SIZE: usize = 24;

/// Bytes one slot array entry occupies.
pub(super) const SLOT_SIZE: usize = 4;

/// Contents of one heap slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Free,
    Live(Vec<Value>),
    Deleted { row: Vec<Value>, by: TxId },
}

impl Slot {
    fn row(&self) -> Option<&Vec<Value>> {
        match self {
            Slot::Free => None,
            Slot::Live(row) | Slot::Deleted { row, .. } => Some(row),
        }
    }

    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// Bytes a stored row occupies, excluding its slot entry.
pub(super) fn row_size(row: &[Value]) -> usize {
    row.len().div_ceil(8) + row.iter().map(Value::serialized_size).sum::<usize>()
}

#[derive(Debug, Default)]
struct HeapPage {
    slots: Vec<Slot>,
    /// Bytes consumed by the slot array and all occupied rows.
    used: usize,
}

impl HeapPage {
    fn computed_used(&self) -> usize {
        self.slots.len() * SLOT_SIZE
            + self
                .slots
                .iter()
                .filter_map(Slot::row)
                .map(|row| row_size(row))
                .sum::<usize>()
    }

    fn has_rows(&self) -> bool {
        self.slots.iter().any(|s| !s.is_free())
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_free)
    }

    /// Slot a row of `size` bytes would go to, if it fits.
    fn room_for(&self, size: usize, capacity: usize) -> Option<usize> {
        match self.first_free_slot() {
            Some(slot) if self.used + size <= capacity => Some(slot),
            Some(_) => None,
            None if self.used + SLOT_SIZE + size <= capacity
                && self.slots.len() < usize::from(u16::MAX) =>
            {
                Some(self.slots.len())
            }
            None => None,
        }
    }

    fn trim_trailing_free(&mut self) {
        while self.slots.last().is_some_and(Slot::is_free) {
            self.slots.pop();
        }
        self.used = self.computed_used();
    }
}

/// An in-memory heap conglomerate.
#[derive(Debug)]
pub(crate) struct HeapConglomerate {
    id: ConglomId,
    column_types: Vec<Type>,
    page_size: usize,
    pages: Vec<HeapPage>,
}

impl HeapConglomerate {
    pub(super) fn new(id: ConglomId, column_types: Vec<Type>, page_size: usize) -> Self {
        Self {
            id,
            column_types,
            page_size,
            pages: vec![HeapPage::default()],
        }
    }

    pub(super) fn width(&self) -> usize {
        self.column_types.len()
    }

    fn capacity(&self) -> usize {
        self.page_size - PAGE_HEADER_SIZE
    }

    pub(super) fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(super) fn slot_count(&self, page: usize) -> usize {
        self.pages.get(page).map_or(0, |p| p.slots.len())
    }

    /// Checks a row against the declared column types.
    pub(super) fn validate_row(&self, row: &[Value]) -> Result<(), StoreError> {
        if row.len() != self.width() {
            return Err(StoreError::InvalidRow {
                id: self.id,
                detail: format!("expected {} columns, got {}", self.width(), row.len()),
            });
        }
        for (i, (ty, value)) in self.column_types.iter().zip(row).enumerate() {
            if !ty.accepts(value) {
                return Err(StoreError::InvalidRow {
                    id: self.id,
                    detail: format!("column {} expects {}, got {}", i + 1, ty, value),
                });
            }
        }
        let required = row_size(row) + SLOT_SIZE;
        if required > self.capacity() {
            return Err(StoreError::RowTooLarge {
                required,
                available: self.capacity(),
            });
        }
        Ok(())
    }

    pub(super) fn slot(&self, location: RowLocation) -> Option<&Slot> {
        self.pages
            .get(location.page() as usize)?
            .slots
            .get(usize::from(location.slot()))
    }

    pub(super) fn live_row(&self, location: RowLocation) -> Option<&Vec<Value>> {
        match self.slot(location)? {
            Slot::Live(row) => Some(row),
            _ => None,
        }
    }

    /// Live rows in storage order.
    pub(super) fn live_rows(&self) -> impl Iterator<Item = (RowLocation, &Vec<Value>)> + '_ {
        self.pages.iter().enumerate().flat_map(|(p, page)| {
            page.slots.iter().enumerate().filter_map(move |(s, slot)| match slot {
                Slot::Live(row) => Some((RowLocation::new(p as u32, s as u16), row)),
                _ => None,
            })
        })
    }

    /// Finds the lowest page below `limit` with room for `row`.
    fn find_room(&self, row: &[Value], limit: usize) -> Option<RowLocation> {
        let size = row_size(row);
        let capacity = self.capacity();
        self.pages
            .iter()
            .take(limit)
            .enumerate()
            .find_map(|(p, page)| {
                page.room_for(size, capacity)
                    .map(|s| RowLocation::new(p as u32, s as u16))
            })
    }

    /// Inserts a validated row into the first page with room.
    pub(super) fn insert(&mut self, row: Vec<Value>) -> RowLocation {
        let location = match self.find_room(&row, self.pages.len()) {
            Some(location) => location,
            None => {
                self.pages.push(HeapPage::default());
                RowLocation::new((self.pages.len() - 1) as u32, 0)
            }
        };
        self.set_slot(location, Slot::Live(row));
        location
    }

    /// Replaces the slot at `location`, growing pages and slot arrays as
    /// needed, and returns what was there before.
    pub(super) fn set_slot(&mut self, location: RowLocation, slot: Slot) -> Slot {
        let page_no = location.page() as usize;
        let slot_no = usize::from(location.slot());
        while self.pages.len() <= page_no {
            self.pages.push(HeapPage::default());
        }
        let page = &mut self.pages[page_no];
        while page.slots.len() <= slot_no {
            page.slots.push(Slot::Free);
        }
        let prior = std::mem::replace(&mut page.slots[slot_no], slot);
        page.trim_trailing_free();
        prior
    }

    /// Marks a live row deleted by `by`. Returns the prior slot, or `None` if
    /// no live row was there.
    pub(super) fn mark_deleted(&mut self, location: RowLocation, by: TxId) -> Option<Slot> {
        let row = self.live_row(location)?.clone();
        Some(self.set_slot(location, Slot::Deleted { row, by }))
    }

    /// Moves the live row at `from` to the lowest earlier page with room.
    ///
    /// Returns the row and its new location, or `None` if the slot holds no
    /// live row or no earlier page can take it.
    pub(super) fn relocate(&mut self, from: RowLocation) -> Option<(Vec<Value>, RowLocation)> {
        let row = self.live_row(from)?.clone();
        let to = self.find_room(&row, from.page() as usize)?;
        self.set_slot(to, Slot::Live(row.clone()));
        self.set_slot(from, Slot::Free);
        Some((row, to))
    }

    /// Frees slots holding rows deleted by committed transactions.
    pub(super) fn purge(&mut self, is_committed: impl Fn(TxId) -> bool) -> usize {
        let mut purged = 0;
        for page in &mut self.pages {
            for slot in &mut page.slots {
                if let Slot::Deleted { by, .. } = slot
                    && is_committed(*by)
                {
                    *slot = Slot::Free;
                    purged += 1;
                }
            }
            page.trim_trailing_free();
        }
        purged
    }

    /// Drops trailing empty pages, always keeping the first page.
    pub(super) fn truncate(&mut self) -> usize {
        let before = self.pages.len();
        while self.pages.len() > 1 && self.pages.last().is_some_and(|p| !p.has_rows()) {
            self.pages.pop();
        }
        before - self.pages.len()
    }

    pub(super) fn trim_page(&mut self, page: usize) {
        if let Some(page) = self.pages.get_mut(page) {
            page.trim_trailing_free();
        }
    }

    pub(super) fn space_info(&self) -> SpaceInfo {
        let free_pages = self.pages.iter().filter(|p| !p.has_rows()).count() as u64;
        let trailing_free = self
            .pages
            .iter()
            .skip(1)
            .rev()
            .take_while(|p| !p.has_rows())
            .count() as u64;
        SpaceInfo {
            allocated_pages: self.pages.len() as u64,
            free_pages,
            page_size: self.page_size as u32,
            estimated_reclaimable_bytes: trailing_free * self.page_size as u64,
        }
    }

    /// Verifies page byte accounting and that every stored row matches the
    /// declared column types.
    pub(super) fn check(&self) -> Result<(), String> {
        for (p, page) in self.pages.iter().enumerate() {
            let computed = page.computed_used();
            if page.used != computed {
                return Err(format!(
                    "page {} records {} used bytes, slots account for {}",
                    p, page.used, computed
                ));
            }
            if page.used > self.capacity() {
                return Err(format!(
                    "page {} uses {} bytes, capacity is {}",
                    p,
                    page.used,
                    self.capacity()
                ));
            }
            for (s, row) in page
                .slots
                .iter()
                .enumerate()
                .filter_map(|(s, slot)| slot.row().map(|r| (s, r)))
            {
                if row.len() != self.width() {
                    return Err(format!(
                        "row ({},{}) has {} columns, expected {}",
                        p,
                        s,
                        row.len(),
                        self.width()
                    ));
                }
                if let Some((i, _)) = self
                    .column_types
                    .iter()
                    .zip(row)
                    .enumerate()
                    .find(|(_, (ty, v))| !ty.accepts(v))
                {
                    return Err(format!("row ({},{}) column {} has wrong type", p, s, i + 1));
                }
            }
        }
        Ok(())
    }

    /// Adds `bytes` to a page's recorded usage without changing its slots.
    pub(super) fn skew_accounting(&mut self, page: usize, bytes: usize) -> bool {
        match self.pages.get_mut(page) {
            Some(page) => {
                page.used += bytes;
                true
            }
            None => false,
        }
    }

    /// Overwrites one column of a live row in place.
    pub(super) fn overwrite_value(
        &mut self,
        location: RowLocation,
        column: usize,
        value: Value,
    ) -> bool {
        let page_no = location.page() as usize;
        let Some(page) = self.pages.get_mut(page_no) else {
            return false;
        };
        let Some(Slot::Live(row)) = page.slots.get_mut(usize::from(location.slot())) else {
            return false;
        };
        let Some(cell) = row.get_mut(column) else {
            return false;
        };
        *cell = value;
        page.used = page.computed_used();
        true
    }
}

/// Progress of a relocation pass over one heap.
///
/// The cursor walks slots from the end of the heap toward page 0. Rows that
/// already moved in this pass are never moved again.
#[derive(Debug)]
pub(super) struct RelocationCursor {
    /// Page being visited and the exclusive upper bound of slots left on it.
    position: Option<(usize, usize)>,
    moved: HashSet<RowLocation>,
}

impl RelocationCursor {
    pub(super) fn new(heap: &HeapConglomerate) -> Self {
        let last = heap.page_count().saturating_sub(1);
        Self {
            position: Some((last, heap.slot_count(last))),
            moved: HashSet::new(),
        }
    }

    pub(super) fn is_exhausted(&self) -> bool {
        self.position.is_none()
    }

    /// Moves up to `max_rows` rows, returning `(row, old, new)` for each.
    /// Rows at `pinned` locations stay where they are.
    pub(super) fn advance(
        &mut self,
        heap: &mut HeapConglomerate,
        max_rows: usize,
        pinned: &HashSet<RowLocation>,
    ) -> Vec<(Vec<Value>, RowLocation, RowLocation)> {
        let mut moved = Vec::new();
        while moved.len() < max_rows {
            let Some((page, end)) = self.position else {
                break;
            };
            // Nothing sits in front of page 0.
            if page == 0 {
                self.position = None;
                break;
            }
            if end == 0 {
                heap.trim_page(page);
                self.position = Some((page - 1, heap.slot_count(page - 1)));
                continue;
            }
            let slot = end - 1;
            self.position = Some((page, slot));
            let from = RowLocation::new(page as u32, slot as u16);
            if self.moved.contains(&from) || pinned.contains(&from) {
                continue;
            }
            if let Some((row, to)) = heap.relocate(from) {
                self.moved.insert(to);
                moved.push((row, from, to));
            }
        }
        moved
    }
}
