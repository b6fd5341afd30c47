//! Maintenance errors.
//!
//! Integrity violations carry enough context (table, index, location, column,
//! values) to name the offending row without re-querying storage.

use std::fmt;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::datum::Value;
use crate::store::{ConglomId, RowLocation, StoreError};
use crate::tx::TxError;

/// A heap/index invariant found broken by the consistency checker.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrityViolation {
    /// A conglomerate's own structural self-check failed.
    StructuralDamage {
        table: String,
        conglomerate: ConglomId,
        detail: String,
    },

    /// An index is flagged as backing a constraint, but no constraint names it.
    MissingConstraint { table: String, index: String },

    /// A constraint names a backing index the table does not have.
    MissingBackingIndex {
        table: String,
        constraint: String,
        index: ConglomId,
    },

    /// An index key column refers to a heap column that does not exist.
    InvalidColumnPosition {
        table: String,
        index: String,
        position: u32,
        column_count: usize,
    },

    /// An index entry points at a location with no heap row.
    InconsistentRowLocation {
        table: String,
        index: String,
        location: RowLocation,
        /// The offending index entry, formatted.
        index_row: String,
    },

    /// An index key column differs from the heap row it points at.
    IndexColumnMismatch {
        table: String,
        index: String,
        location: RowLocation,
        column: String,
        /// 1-based heap column position.
        position: u32,
        index_value: Value,
        heap_value: Value,
    },

    /// An index holds a different number of entries than the heap has rows.
    RowCountMismatch {
        table: String,
        index: String,
        index_rows: u64,
        heap_rows: u64,
    },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityViolation::StructuralDamage {
                table,
                conglomerate,
                detail,
            } => write!(
                f,
                "conglomerate {} of table {} failed its self-check: {}",
                conglomerate, table, detail
            ),
            IntegrityViolation::MissingConstraint { table, index } => write!(
                f,
                "index {} on table {} backs a constraint that does not exist",
                index, table
            ),
            IntegrityViolation::MissingBackingIndex {
                table,
                constraint,
                index,
            } => write!(
                f,
                "constraint {} on table {} refers to missing conglomerate {}",
                constraint, table, index
            ),
            IntegrityViolation::InvalidColumnPosition {
                table,
                index,
                position,
                column_count,
            } => write!(
                f,
                "index {} on table {} uses column position {}, table has {} columns",
                index, table, position, column_count
            ),
            IntegrityViolation::InconsistentRowLocation {
                table,
                index,
                location,
                index_row,
            } => write!(
                f,
                "inconsistent row location {} in index {} on table {}: index row {}",
                location, index, table, index_row
            ),
            IntegrityViolation::IndexColumnMismatch {
                table,
                index,
                location,
                column,
                position,
                index_value,
                heap_value,
            } => write!(
                f,
                "index {} on table {} at row {}: column {} (position {}) is {} in the index but {} in the heap",
                index, table, location, column, position, index_value, heap_value
            ),
            IntegrityViolation::RowCountMismatch {
                table,
                index,
                index_rows,
                heap_rows,
            } => write!(
                f,
                "index {} on table {} has {} rows, heap has {}",
                index, table, index_rows, heap_rows
            ),
        }
    }
}

/// Errors returned by consistency checks and compaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MaintError {
    /// The schema does not exist.
    SchemaNotFound(String),

    /// The table does not exist.
    TableNotFound { schema: String, table: String },

    /// A heap/index invariant is broken.
    Integrity(IntegrityViolation),

    /// The index entry for a row being relocated was not found. The heap and
    /// index had already diverged before maintenance began.
    InternalInconsistency {
        table: String,
        index: String,
        location: RowLocation,
        index_row: String,
    },

    /// Any other catalog failure.
    Catalog(CatalogError),

    /// Storage or transaction failure, propagated unchanged.
    Store(StoreError),

    /// Invalid maintenance configuration.
    Config(ConfigError),
}

impl MaintError {
    /// Returns true if the same request may succeed later.
    ///
    /// Only lock conflicts qualify; integrity errors never clear on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            MaintError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The integrity violation, if this is one.
    pub fn integrity(&self) -> Option<&IntegrityViolation> {
        match self {
            MaintError::Integrity(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for MaintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintError::SchemaNotFound(schema) => write!(f, "schema \"{}\" does not exist", schema),
            MaintError::TableNotFound { schema, table } => {
                write!(f, "table \"{}.{}\" does not exist", schema, table)
            }
            MaintError::Integrity(v) => write!(f, "integrity violation: {}", v),
            MaintError::InternalInconsistency {
                table,
                index,
                location,
                index_row,
            } => write!(
                f,
                "internal inconsistency: index {} on table {} has no entry {} for row {}",
                index, table, index_row, location
            ),
            MaintError::Catalog(e) => write!(f, "catalog error: {}", e),
            MaintError::Store(e) => write!(f, "storage error: {}", e),
            MaintError::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for MaintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaintError::Catalog(e) => Some(e),
            MaintError::Store(e) => Some(e),
            MaintError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for MaintError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::SchemaNotFound(schema) => MaintError::SchemaNotFound(schema),
            CatalogError::TableNotFound { schema, table } => {
                MaintError::TableNotFound { schema, table }
            }
            other => MaintError::Catalog(other),
        }
    }
}

impl From<StoreError> for MaintError {
    fn from(e: StoreError) -> Self {
        MaintError::Store(e)
    }
}

impl From<TxError> for MaintError {
    fn from(e: TxError) -> Self {
        MaintError::Store(StoreError::Tx(e))
    }
}

impl From<ConfigError> for MaintError {
    fn from(e: ConfigError) -> Self {
        MaintError::Config(e)
    }
}

impl From<IntegrityViolation> for MaintError {
    fn from(v: IntegrityViolation) -> Self {
        MaintError::Integrity(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::TxId;

    #[test]
    fn test_not_found_maps_from_catalog() {
        let err: MaintError = CatalogError::TableNotFound {
            schema: "APP".into(),
            table: "T".into(),
        }
        .into();
        assert_eq!(
            err,
            MaintError::TableNotFound {
                schema: "APP".into(),
                table: "T".into(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_lock_timeouts_retry() {
        let timeout: MaintError = TxError::LockTimeout {
            txid: TxId::new(2),
            conglomerate: ConglomId::new(1),
            holder: TxId::new(1),
        }
        .into();
        assert!(timeout.is_retryable());

        let integrity: MaintError = IntegrityViolation::RowCountMismatch {
            table: "APP.T".into(),
            index: "IX".into(),
            index_rows: 1,
            heap_rows: 2,
        }
        .into();
        assert!(!integrity.is_retryable());
        assert!(integrity.integrity().is_some());
    }

    #[test]
    fn test_mismatch_message_names_both_values() {
        let v = IntegrityViolation::IndexColumnMismatch {
            table: "APP.T".into(),
            index: "UX".into(),
            location: RowLocation::new(0, 3),
            column: "name".into(),
            position: 2,
            index_value: Value::Text("old".into()),
            heap_value: Value::Text("new".into()),
        };
        let msg = v.to_string();
        assert!(msg.contains("UX"));
        assert!(msg.contains("name"));
        assert!(msg.contains("old"));
        assert!(msg.contains("new"));
    }
}
