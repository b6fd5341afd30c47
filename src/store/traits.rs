//! Storage and transaction interfaces consumed by maintenance code.
//!
//! These traits are the narrow surface through which the maintenance layer
//! touches physical structures: open a conglomerate, open a scan, open a
//! relocation scan on a heap, start a nested transaction, and ask for
//! whole-conglomerate purge or truncation.
//!
//! # Design Decisions
//!
//! 1. **Explicit transaction handle**: every open goes through a
//!    [`TransactionController`] value passed in by the caller. There is no
//!    ambient "current transaction".
//!
//! 2. **Handles close on drop**: conglomerate controllers, scans and
//!    relocation scans release their resources when dropped, so every exit
//!    path (including `?` propagation) closes them.
//!
//! 3. **Caller-owned buffers**: `fetch` methods fill buffers provided by the
//!    caller, which lets a long scan reuse one row template.

use std::cmp::Ordering;
use std::fmt;

use super::error::StoreError;
use super::location::{ConglomId, RowLocation};
use crate::datum::Value;
use crate::tx::TxId;

/// Whether a handle may modify the conglomerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ForUpdate,
}

/// Lock granularity requested when opening a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Lock the whole conglomerate for the life of the transaction.
    Table,
    /// Row-level locking; left to the storage implementation.
    Row,
}

/// Isolation level requested when opening a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Committed reads only; locks may be released early.
    ReadCommitted,
    /// Full serializable isolation.
    Serializable,
}

/// Options common to every open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Read or write access.
    pub mode: OpenMode,
    /// Lock granularity.
    pub lock: LockMode,
    /// Isolation level.
    pub isolation: Isolation,
}

impl OpenOptions {
    /// Table-locked, serializable options with the given mode.
    pub const fn table(mode: OpenMode) -> Self {
        Self {
            mode,
            lock: LockMode::Table,
            isolation: Isolation::Serializable,
        }
    }

    /// Returns true if the handle may write.
    pub fn for_update(&self) -> bool {
        self.mode == OpenMode::ForUpdate
    }
}

/// Comparison used when positioning a scan on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    /// Greater than or equal.
    Ge,
    /// Strictly greater than.
    Gt,
}

/// Rows a scan visits.
///
/// For a keyed range, `start_op` selects rows at or after (`Ge`) or strictly
/// after (`Gt`) the start key. `stop_op` ends the scan at the first row
/// greater than (`Gt`) or at least (`Ge`) the stop key. A start key of
/// `Ge` and a stop key of `Gt` on the same full key selects exactly that
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanRange {
    /// Every row, in storage order.
    Full,
    /// Rows between two keys.
    Keyed {
        /// Start key.
        start: LocatedRow,
        /// Start comparison.
        start_op: SearchOp,
        /// Stop key.
        stop: LocatedRow,
        /// Stop comparison.
        stop_op: SearchOp,
    },
}

impl ScanRange {
    /// Range matching exactly one fully-specified index entry.
    pub fn exact(key: &LocatedRow) -> Self {
        ScanRange::Keyed {
            start: key.clone(),
            start_op: SearchOp::Ge,
            stop: key.clone(),
            stop_op: SearchOp::Gt,
        }
    }

    /// Returns true if `row` falls inside this range.
    pub fn contains(&self, row: &LocatedRow) -> bool {
        match self {
            ScanRange::Full => true,
            ScanRange::Keyed {
                start,
                start_op,
                stop,
                stop_op,
            } => {
                let after_start = match start_op {
                    SearchOp::Ge => row.compare_key(start) != Ordering::Less,
                    SearchOp::Gt => row.compare_key(start) == Ordering::Greater,
                };
                let before_stop = match stop_op {
                    SearchOp::Gt => row.compare_key(stop) != Ordering::Greater,
                    SearchOp::Ge => row.compare_key(stop) == Ordering::Less,
                };
                after_start && before_stop
            }
        }
    }
}

/// A row of values paired with a row location.
///
/// For a heap scan this is a base row and the location it lives at. For an
/// index this is an index entry: the key columns followed by the location of
/// the heap row the entry references.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedRow {
    /// Column values.
    pub columns: Vec<Value>,
    /// Row location; `None` in an unfilled template.
    pub location: Option<RowLocation>,
}

impl LocatedRow {
    /// Creates a row.
    pub fn new(columns: Vec<Value>, location: Option<RowLocation>) -> Self {
        Self { columns, location }
    }

    /// Creates a template of `width` NULL columns and an empty location slot.
    pub fn template(width: usize) -> Self {
        Self {
            columns: vec![Value::Null; width],
            location: None,
        }
    }

    /// Compares this row against a (possibly partial) search key.
    ///
    /// Columns are compared pairwise with [`Value::total_cmp`] up to the
    /// shorter length. If all compared columns are equal and both sides
    /// carry a location, the locations break the tie.
    pub fn compare_key(&self, key: &LocatedRow) -> Ordering {
        for (a, b) in self.columns.iter().zip(key.columns.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        match (self.location, key.location) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for LocatedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for value in &self.columns {
            write!(f, "{}, ", value)?;
        }
        match self.location {
            Some(location) => write!(f, "{})", location),
            None => write!(f, "?)"),
        }
    }
}

/// Set of 0-based column offsets a fetch should materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    bits: Vec<bool>,
}

impl ColumnSet {
    /// Creates an empty set over a row of `width` columns.
    pub fn new(width: usize) -> Self {
        Self {
            bits: vec![false; width],
        }
    }

    /// Creates a set containing every column of a `width`-column row.
    pub fn all(width: usize) -> Self {
        Self {
            bits: vec![true; width],
        }
    }

    /// Adds a column. Offsets beyond the row width are ignored.
    pub fn insert(&mut self, offset: usize) {
        if let Some(bit) = self.bits.get_mut(offset) {
            *bit = true;
        }
    }

    /// Returns true if the column is in the set.
    pub fn contains(&self, offset: usize) -> bool {
        self.bits.get(offset).copied().unwrap_or(false)
    }

    /// Width of the row this set describes.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Iterates over the offsets in the set, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .map(|(i, _)| i)
    }
}

/// One row moved by a relocation scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocated {
    /// All column values of the row.
    pub row: Vec<Value>,
    /// Where the row lived before the move.
    pub old: RowLocation,
    /// Where the row lives now.
    pub new: RowLocation,
}

/// Space usage of one conglomerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceInfo {
    /// Pages currently allocated to the conglomerate.
    pub allocated_pages: u64,
    /// Allocated pages holding no rows.
    pub free_pages: u64,
    /// Page size in bytes.
    pub page_size: u32,
    /// Bytes a truncate would return to the operating system right now.
    pub estimated_reclaimable_bytes: u64,
}

/// An open heap or index conglomerate.
pub trait ConglomerateController {
    /// Id of the open conglomerate.
    fn id(&self) -> ConglomId;

    /// Runs the storage layer's structural self-check.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupted` describing the first problem found.
    fn check_consistency(&self) -> Result<(), StoreError>;

    /// Fetches the heap row at `location` into `out`.
    ///
    /// Only columns in `needed` are written; other entries of `out` are left
    /// as they were. Returns `Ok(false)` if no live row is at `location`.
    fn fetch(
        &self,
        location: RowLocation,
        out: &mut [Value],
        needed: &ColumnSet,
    ) -> Result<bool, StoreError>;

    /// Inserts an index entry. The entry's location must be set.
    fn insert(&mut self, entry: &LocatedRow) -> Result<(), StoreError>;
}

/// A positioned scan over a conglomerate.
pub trait ScanController {
    /// Advances to the next row in range. Returns `Ok(false)` when exhausted.
    fn next(&mut self) -> Result<bool, StoreError>;

    /// Copies the current row into `out`.
    ///
    /// `out.columns` must have the conglomerate's row width.
    fn fetch(&self, out: &mut LocatedRow) -> Result<(), StoreError>;

    /// Deletes the current row. Returns `Ok(false)` if it was already gone.
    fn delete(&mut self) -> Result<bool, StoreError>;

    /// Repositions the scan on a new range. The next call to
    /// [`next`](Self::next) returns the first row of the new range.
    fn reopen(&mut self, range: ScanRange) -> Result<(), StoreError>;
}

/// A heap scan that moves rows toward the front of the heap as it goes.
///
/// Which rows move, and where, is decided by the storage layer.
pub trait RelocationScan {
    /// Moves up to `max_rows` rows and reports each move in `out`.
    ///
    /// `out` is cleared first. Returns the number of rows moved; 0 means the
    /// scan is exhausted.
    fn fetch_next_batch(
        &mut self,
        max_rows: usize,
        out: &mut Vec<Relocated>,
    ) -> Result<usize, StoreError>;
}

/// A transaction through which conglomerates are opened.
pub trait TransactionController {
    /// Controller type for opened conglomerates.
    type Conglomerate: ConglomerateController;
    /// Scan type.
    type Scan: ScanController;
    /// Relocation scan type.
    type Relocation: RelocationScan;
    /// Nested transaction type.
    type Nested: NestedTransaction;

    /// Transaction id.
    fn txid(&self) -> TxId;

    /// Opens a heap or index conglomerate.
    fn open_conglomerate(
        &self,
        id: ConglomId,
        options: OpenOptions,
    ) -> Result<Self::Conglomerate, StoreError>;

    /// Opens a scan over `range` of a conglomerate.
    fn open_scan(
        &self,
        id: ConglomId,
        options: OpenOptions,
        range: ScanRange,
    ) -> Result<Self::Scan, StoreError>;

    /// Opens a relocation scan on a heap conglomerate.
    fn open_relocation_scan(
        &self,
        heap: ConglomId,
        options: OpenOptions,
    ) -> Result<Self::Relocation, StoreError>;

    /// Starts a transaction nested under this one.
    fn start_nested(&self, read_only: bool) -> Result<Self::Nested, StoreError>;

    /// Discards committed-deleted rows of a conglomerate.
    fn purge_conglomerate(&self, id: ConglomId) -> Result<(), StoreError>;

    /// Returns trailing free space of a conglomerate to the operating system.
    fn compress_conglomerate(&self, id: ConglomId) -> Result<(), StoreError>;

    /// Reports space usage of a conglomerate.
    fn space_info(&self, id: ConglomId) -> Result<SpaceInfo, StoreError>;
}

/// A transaction nested under (and owned by) another transaction.
///
/// Commit makes the nested transaction's work durable and releases its
/// locks without ending the parent.
pub trait NestedTransaction: TransactionController + Sized {
    /// Commits the nested transaction.
    fn commit(self) -> Result<(), StoreError>;

    /// Undoes all work of the nested transaction and releases its locks.
    fn abandon(self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i32, loc: RowLocation) -> LocatedRow {
        LocatedRow::new(vec![Value::Int32(id)], Some(loc))
    }

    #[test]
    fn test_exact_range_matches_only_full_key() {
        let loc = RowLocation::new(1, 2);
        let key = entry(5, loc);
        let range = ScanRange::exact(&key);

        assert!(range.contains(&key));
        assert!(!range.contains(&entry(5, RowLocation::new(1, 3))));
        assert!(!range.contains(&entry(4, loc)));
        assert!(!range.contains(&entry(6, loc)));
    }

    #[test]
    fn test_partial_key_compares_prefix() {
        let row = LocatedRow::new(
            vec![Value::Int32(1), Value::Text("a".into())],
            Some(RowLocation::new(0, 0)),
        );
        let key = LocatedRow::new(vec![Value::Int32(1)], None);
        assert_eq!(row.compare_key(&key), Ordering::Equal);

        let range = ScanRange::Keyed {
            start: key.clone(),
            start_op: SearchOp::Gt,
            stop: key,
            stop_op: SearchOp::Gt,
        };
        assert!(!range.contains(&row));
    }

    #[test]
    fn test_column_set() {
        let mut set = ColumnSet::new(4);
        set.insert(1);
        set.insert(3);
        set.insert(9);
        assert!(set.contains(1));
        assert!(!set.contains(0));
        assert!(!set.contains(9));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(ColumnSet::all(2).iter().count(), 2);
    }

    #[test]
    fn test_template_display() {
        let mut row = LocatedRow::template(2);
        assert_eq!(row.to_string(), "(NULL, NULL, ?)");
        row.location = Some(RowLocation::new(0, 4));
        assert_eq!(row.to_string(), "(NULL, NULL, (0,4))");
    }
}
