//! Mapping from heap rows to index entries.

use std::fmt;

use super::error::{IntegrityViolation, MaintError};
use crate::catalog::{IndexDescriptor, PhysicalIndex, TableDescriptor};
use crate::datum::Value;
use crate::store::{ColumnSet, LocatedRow, RowLocation};

/// Why an index's key columns cannot be mapped onto the heap row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// The index declares no key columns.
    NoKeyColumns,
    /// A key column refers to a position outside `1..=column_count`.
    PositionOutOfRange {
        /// 0-based key column ordinal.
        ordinal: usize,
        /// The declared 1-based heap position.
        position: u32,
        column_count: usize,
    },
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::NoKeyColumns => write!(f, "index has no key columns"),
            ProjectionError::PositionOutOfRange {
                ordinal,
                position,
                column_count,
            } => write!(
                f,
                "key column {} maps to position {}, row has {} columns",
                ordinal, position, column_count
            ),
        }
    }
}

impl std::error::Error for ProjectionError {}

/// Zero-based projection of a heap row onto an index's key columns.
///
/// Built once per index from its 1-based base-column positions. Key column
/// `i` of an entry is heap column `offsets[i]`, and the entry ends with the
/// heap row's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProjection {
    offsets: Vec<usize>,
    column_count: usize,
}

impl IndexProjection {
    pub fn new(index: &IndexDescriptor, column_count: usize) -> Result<Self, ProjectionError> {
        if index.base_column_positions.is_empty() {
            return Err(ProjectionError::NoKeyColumns);
        }
        let offsets = index
            .base_column_positions
            .iter()
            .enumerate()
            .map(|(ordinal, &position)| {
                let offset = (position as usize).wrapping_sub(1);
                if position == 0 || offset >= column_count {
                    Err(ProjectionError::PositionOutOfRange {
                        ordinal,
                        position,
                        column_count,
                    })
                } else {
                    Ok(offset)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            offsets,
            column_count,
        })
    }

    /// Builds the projection of `index` onto the rows of `table`, reporting
    /// a bad key position as an integrity violation.
    pub fn for_index(table: &TableDescriptor, index: &PhysicalIndex) -> Result<Self, MaintError> {
        Self::new(&index.descriptor, table.column_count()).map_err(|e| {
            let position = match e {
                ProjectionError::PositionOutOfRange { position, .. } => position,
                ProjectionError::NoKeyColumns => 0,
            };
            IntegrityViolation::InvalidColumnPosition {
                table: table.qualified_name(),
                index: index.name.clone(),
                position,
                column_count: table.column_count(),
            }
            .into()
        })
    }

    pub fn key_count(&self) -> usize {
        self.offsets.len()
    }

    /// 0-based heap offset of each key column.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// 1-based heap position of key column `ordinal`.
    pub fn position(&self, ordinal: usize) -> Option<u32> {
        self.offsets.get(ordinal).map(|&o| o as u32 + 1)
    }

    /// Heap columns a fetch must materialize to compare or rebuild an entry.
    pub fn needed_columns(&self) -> ColumnSet {
        let mut set = ColumnSet::new(self.column_count);
        for &offset in &self.offsets {
            set.insert(offset);
        }
        set
    }

    /// An entry buffer: one NULL per key column and an empty location slot.
    pub fn template(&self) -> LocatedRow {
        LocatedRow::template(self.key_count())
    }

    /// Fills `entry` with the key columns of `row` and `location`.
    ///
    /// `entry` must come from [`template`](Self::template).
    pub fn fill_entry(&self, row: &[Value], location: RowLocation, entry: &mut LocatedRow) {
        entry.columns.resize(self.key_count(), Value::Null);
        for (slot, &offset) in entry.columns.iter_mut().zip(&self.offsets) {
            *slot = row.get(offset).cloned().unwrap_or(Value::Null);
        }
        entry.location = Some(location);
    }
}
