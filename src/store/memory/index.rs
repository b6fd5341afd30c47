//! Sorted in-memory index conglomerate.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use super::super::error::StoreError;
use super::super::location::ConglomId;
use super::super::traits::{LocatedRow, ScanRange, SearchOp, SpaceInfo};
use crate::datum::Value;
use crate::tx::TxId;

/// Index entry ordered by key columns, then by row location.
///
/// Column comparison uses [`Value::total_cmp`](crate::datum::Value::total_cmp)
/// so the order is total even for floats. A key that is a prefix of another
/// sorts first, which lets a partial search key seek to the start of its
/// range.
#[derive(Debug, Clone)]
pub(crate) struct IndexKey(pub(crate) LocatedRow);

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.columns.iter().zip(other.0.columns.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        self.0
            .columns
            .len()
            .cmp(&other.0.columns.len())
            .then_with(|| self.0.location.cmp(&other.0.location))
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

/// Visibility of one index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Live,
    Deleted { by: TxId },
}

#[derive(Debug)]
pub(crate) struct IndexConglomerate {
    id: ConglomId,
    key_width: usize,
    unique: bool,
    entries: BTreeMap<IndexKey, EntryState>,
    /// High-water mark; only truncation lowers it.
    allocated_pages: u64,
    entries_per_page: usize,
    page_size: u32,
}

impl IndexConglomerate {
    pub(super) fn new(
        id: ConglomId,
        key_width: usize,
        unique: bool,
        entries_per_page: usize,
        page_size: u32,
    ) -> Self {
        Self {
            id,
            key_width,
            unique,
            entries: BTreeMap::new(),
            allocated_pages: 1,
            entries_per_page,
            page_size,
        }
    }

    pub(super) fn key_width(&self) -> usize {
        self.key_width
    }

    fn needed_pages(&self) -> u64 {
        (self.entries.len().div_ceil(self.entries_per_page) as u64).max(1)
    }

    fn grow(&mut self) {
        self.allocated_pages = self.allocated_pages.max(self.needed_pages());
    }

    /// Checks an entry's shape: key width plus a location.
    pub(super) fn validate_entry(&self, entry: &LocatedRow) -> Result<(), StoreError> {
        if entry.columns.len() != self.key_width {
            return Err(StoreError::InvalidRow {
                id: self.id,
                detail: format!(
                    "expected {} key columns, got {}",
                    self.key_width,
                    entry.columns.len()
                ),
            });
        }
        if entry.location.is_none() {
            return Err(StoreError::InvalidRow {
                id: self.id,
                detail: "index entry has no row location".to_string(),
            });
        }
        Ok(())
    }

    /// Returns true if a live entry other than `except` has the same key
    /// columns. Keys containing NULL never conflict.
    fn has_live_key(&self, columns: &[Value], except: &IndexKey) -> bool {
        if columns.iter().any(|v| v.is_null()) {
            return false;
        }
        let probe = IndexKey(LocatedRow::new(columns.to_vec(), None));
        self.entries
            .range((Bound::Included(&probe), Bound::Unbounded))
            .take_while(|(k, _)| k.0.compare_key(&probe.0) == Ordering::Equal)
            .any(|(k, state)| *state == EntryState::Live && k != except)
    }

    /// Inserts a validated entry and returns the state it replaced.
    pub(super) fn insert(&mut self, entry: LocatedRow) -> Result<Option<EntryState>, StoreError> {
        let key = IndexKey(entry);
        if let (Some(EntryState::Live), Some(location)) = (self.entries.get(&key), key.0.location) {
            return Err(StoreError::DuplicateEntry {
                id: self.id,
                location,
            });
        }
        if self.unique && self.has_live_key(&key.0.columns, &key) {
            return Err(StoreError::DuplicateKey(self.id));
        }
        let prior = self.entries.insert(key, EntryState::Live);
        self.grow();
        Ok(prior)
    }

    /// Inserts an entry without any checks.
    pub(super) fn insert_unchecked(&mut self, entry: LocatedRow) {
        self.entries.insert(IndexKey(entry), EntryState::Live);
        self.grow();
    }

    pub(super) fn state(&self, key: &IndexKey) -> Option<EntryState> {
        self.entries.get(key).copied()
    }

    /// Marks a live entry deleted. Returns the prior state, or `None` if the
    /// entry was not live.
    pub(super) fn mark_deleted(&mut self, key: &IndexKey, by: TxId) -> Option<EntryState> {
        let state = self.entries.get_mut(key)?;
        if *state != EntryState::Live {
            return None;
        }
        Some(std::mem::replace(state, EntryState::Deleted { by }))
    }

    /// Puts an entry back into a previous state (`None` removes it).
    pub(super) fn restore(&mut self, key: IndexKey, prior: Option<EntryState>) {
        match prior {
            Some(state) => {
                self.entries.insert(key, state);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Live entries in `range`, in key order.
    pub(super) fn live_in_range(&self, range: &ScanRange) -> Vec<LocatedRow> {
        let lower = match range {
            ScanRange::Full => Bound::Unbounded,
            ScanRange::Keyed { start, .. } => {
                Bound::Included(IndexKey(LocatedRow::new(start.columns.clone(), None)))
            }
        };
        let mut rows = Vec::new();
        for (key, state) in self.entries.range((lower, Bound::Unbounded)) {
            if let ScanRange::Keyed { stop, stop_op, .. } = range {
                let past_stop = match stop_op {
                    SearchOp::Gt => key.0.compare_key(stop) == Ordering::Greater,
                    SearchOp::Ge => key.0.compare_key(stop) != Ordering::Less,
                };
                if past_stop {
                    break;
                }
            }
            if *state == EntryState::Live && range.contains(&key.0) {
                rows.push(key.0.clone());
            }
        }
        rows
    }

    /// Removes entries deleted by committed transactions.
    pub(super) fn purge(&mut self, is_committed: impl Fn(TxId) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| match state {
            EntryState::Live => true,
            EntryState::Deleted { by } => !is_committed(*by),
        });
        before - self.entries.len()
    }

    /// Shrinks allocation to what the current entries need.
    pub(super) fn truncate(&mut self) -> u64 {
        let needed = self.needed_pages();
        let released = self.allocated_pages.saturating_sub(needed);
        self.allocated_pages = needed;
        released
    }

    pub(super) fn space_info(&self) -> SpaceInfo {
        let free = self.allocated_pages.saturating_sub(self.needed_pages());
        SpaceInfo {
            allocated_pages: self.allocated_pages,
            free_pages: free,
            page_size: self.page_size,
            estimated_reclaimable_bytes: free * u64::from(self.page_size),
        }
    }

    /// Verifies key width, locations, and uniqueness of live keys.
    pub(super) fn check(&self) -> Result<(), String> {
        if self.allocated_pages < self.needed_pages() {
            return Err(format!(
                "{} entries need {} pages, only {} allocated",
                self.entries.len(),
                self.needed_pages(),
                self.allocated_pages
            ));
        }
        let mut previous: Option<&IndexKey> = None;
        for (key, state) in &self.entries {
            if key.0.columns.len() != self.key_width {
                return Err(format!(
                    "entry {} has {} key columns, expected {}",
                    key.0,
                    key.0.columns.len(),
                    self.key_width
                ));
            }
            if key.0.location.is_none() {
                return Err(format!("entry {} has no row location", key.0));
            }
            if self.unique && *state == EntryState::Live && self.has_live_key(&key.0.columns, key)
            {
                return Err(format!("unique key of entry {} appears twice", key.0));
            }
            if previous.is_some_and(|p| p >= key) {
                return Err(format!("entry {} is out of order", key.0));
            }
            previous = Some(key);
        }
        Ok(())
    }

    /// Live entries, in key order.
    pub(super) fn live_entries(&self) -> Vec<LocatedRow> {
        self.live_in_range(&ScanRange::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RowLocation;

    fn index(unique: bool) -> IndexConglomerate {
        IndexConglomerate::new(ConglomId::new(2), 1, unique, 4, 4096)
    }

    fn entry(id: i32, page: u32, slot: u16) -> LocatedRow {
        LocatedRow::new(vec![Value::Int32(id)], Some(RowLocation::new(page, slot)))
    }

    #[test]
    fn test_entries_sorted_by_key_then_location() {
        let mut index = index(false);
        index.insert(entry(3, 0, 0)).unwrap();
        index.insert(entry(1, 0, 5)).unwrap();
        index.insert(entry(1, 0, 2)).unwrap();

        let live = index.live_entries();
        assert_eq!(live, vec![entry(1, 0, 2), entry(1, 0, 5), entry(3, 0, 0)]);
        index.check().unwrap();
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut index = index(false);
        index.insert(entry(1, 0, 0)).unwrap();
        assert!(matches!(
            index.insert(entry(1, 0, 0)),
            Err(StoreError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_unique_ignores_deleted_and_null() {
        let mut index = index(true);
        index.insert(entry(1, 0, 0)).unwrap();
        assert_eq!(
            index.insert(entry(1, 0, 1)),
            Err(StoreError::DuplicateKey(ConglomId::new(2)))
        );

        let key = IndexKey(entry(1, 0, 0));
        index.mark_deleted(&key, TxId::new(1)).unwrap();
        index.insert(entry(1, 0, 1)).unwrap();

        let null = |slot| LocatedRow::new(vec![Value::Null], Some(RowLocation::new(1, slot)));
        index.insert(null(0)).unwrap();
        index.insert(null(1)).unwrap();
        index.check().unwrap();
    }

    #[test]
    fn test_exact_range_finds_single_entry() {
        let mut index = index(false);
        for slot in 0..5 {
            index.insert(entry(7, 0, slot)).unwrap();
        }
        index.insert(entry(8, 0, 2)).unwrap();

        let target = entry(7, 0, 3);
        let found = index.live_in_range(&ScanRange::exact(&target));
        assert_eq!(found, vec![target]);
    }

    #[test]
    fn test_purge_and_truncate_release_pages() {
        let mut index = index(false);
        for i in 0..12 {
            index.insert(entry(i, 0, i as u16)).unwrap();
        }
        assert_eq!(index.space_info().allocated_pages, 3);

        for i in 0..10 {
            index
                .mark_deleted(&IndexKey(entry(i, 0, i as u16)), TxId::new(4))
                .unwrap();
        }
        assert_eq!(index.purge(|_| true), 10);
        assert_eq!(index.space_info().free_pages, 2);
        assert_eq!(index.truncate(), 2);
        assert_eq!(index.space_info().allocated_pages, 1);
        index.check().unwrap();
    }
}
