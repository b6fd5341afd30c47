//! Storage layer errors.

use super::location::{ConglomId, RowLocation};
use crate::tx::{TxError, TxId};

/// Storage layer errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No conglomerate with this id exists.
    ConglomerateNotFound(ConglomId),

    /// The operation requires a different kind of conglomerate
    /// (e.g., a relocation scan opened on an index).
    WrongConglomerateKind {
        /// Conglomerate the operation was issued against.
        id: ConglomId,
        /// Kind the operation requires.
        expected: &'static str,
    },

    /// The operation is not supported by this conglomerate or handle.
    Unsupported(&'static str),

    /// A write was attempted through a read-only transaction or handle.
    ReadOnly(TxId),

    /// A row or entry has the wrong shape for the conglomerate.
    InvalidRow {
        /// Target conglomerate.
        id: ConglomId,
        /// What was wrong with it.
        detail: String,
    },

    /// A row does not fit in an empty page.
    RowTooLarge {
        /// Bytes the row needs, including its slot.
        required: usize,
        /// Usable bytes in an empty page.
        available: usize,
    },

    /// An identical index entry is already present.
    DuplicateEntry {
        /// Index conglomerate.
        id: ConglomId,
        /// Location carried by the duplicate entry.
        location: RowLocation,
    },

    /// A unique index already holds a live entry with the same key columns.
    DuplicateKey(ConglomId),

    /// `fetch` or `delete` was called without a current scan position.
    NoCurrentRow,

    /// Structural self-check failed.
    ///
    /// This indicates the conglomerate's internal bookkeeping is damaged.
    Corrupted {
        /// Damaged conglomerate.
        id: ConglomId,
        /// Description of the first problem found.
        detail: String,
    },

    /// Transaction or lock failure.
    Tx(TxError),

    /// A failure injected for testing error paths.
    Injected(String),
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Tx(TxError::LockTimeout { .. }))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConglomerateNotFound(id) => write!(f, "conglomerate {} not found", id),
            StoreError::WrongConglomerateKind { id, expected } => {
                write!(f, "conglomerate {} is not a {}", id, expected)
            }
            StoreError::Unsupported(what) => write!(f, "unsupported operation: {}", what),
            StoreError::ReadOnly(txid) => {
                write!(f, "transaction {} is read-only", txid)
            }
            StoreError::InvalidRow { id, detail } => {
                write!(f, "invalid row for conglomerate {}: {}", id, detail)
            }
            StoreError::RowTooLarge {
                required,
                available,
            } => write!(
                f,
                "row too large: need {} bytes, page holds {}",
                required, available
            ),
            StoreError::DuplicateEntry { id, location } => write!(
                f,
                "index {} already has an entry for location {}",
                id, location
            ),
            StoreError::DuplicateKey(id) => write!(f, "duplicate key in unique index {}", id),
            StoreError::NoCurrentRow => write!(f, "scan is not positioned on a row"),
            StoreError::Corrupted { id, detail } => {
                write!(f, "conglomerate {} is corrupted: {}", id, detail)
            }
            StoreError::Tx(e) => write!(f, "transaction error: {}", e),
            StoreError::Injected(msg) => write!(f, "injected failure: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Tx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TxError> for StoreError {
    fn from(e: TxError) -> Self {
        StoreError::Tx(e)
    }
}
