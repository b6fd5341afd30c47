//! Transaction error types.

use super::types::{TxId, TxState};
use crate::store::ConglomId;

/// Errors that can occur during transaction operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Transaction not found in the transaction manager.
    TransactionNotFound(TxId),
    /// Invalid transaction state transition.
    InvalidStateTransition {
        /// Transaction ID.
        txid: TxId,
        /// Current state.
        current: TxState,
        /// Attempted new state.
        attempted: TxState,
    },
    /// A transaction tried to terminate while a nested transaction it owns
    /// is still in progress.
    ActiveNested {
        /// Transaction that tried to terminate.
        txid: TxId,
        /// The nested transaction still running.
        nested: TxId,
    },
    /// A table-level lock is held by an unrelated transaction.
    LockTimeout {
        /// Requesting transaction.
        txid: TxId,
        /// Conglomerate whose lock was requested.
        conglomerate: ConglomId,
        /// Transaction currently holding the lock.
        holder: TxId,
    },
}

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxError::TransactionNotFound(txid) => {
                write!(f, "Transaction {} not found", txid)
            }
            TxError::InvalidStateTransition {
                txid,
                current,
                attempted,
            } => write!(
                f,
                "Invalid state transition for transaction {}: {} -> {}",
                txid, current, attempted
            ),
            TxError::ActiveNested { txid, nested } => write!(
                f,
                "Transaction {} cannot terminate while nested transaction {} is in progress",
                txid, nested
            ),
            TxError::LockTimeout {
                txid,
                conglomerate,
                holder,
            } => write!(
                f,
                "Transaction {} could not lock conglomerate {}: held by transaction {}",
                txid, conglomerate, holder
            ),
        }
    }
}

impl std::error::Error for TxError {}
