//! Transaction manager.
//!
//! Manages transaction lifecycle: allocation of TxIds, parent/nested
//! relationships, commit/abort state, and table-level locks.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::error::TxError;
use super::{TxId, TxState};
use crate::store::ConglomId;

/// Per-transaction bookkeeping.
#[derive(Debug, Clone, Copy)]
struct TxEntry {
    state: TxState,
    /// Owning transaction for nested transactions.
    parent: Option<TxId>,
    read_only: bool,
}

/// Internal state protected by a single mutex so that termination and lock
/// release are atomic with respect to new lock requests.
#[derive(Debug, Default)]
struct TxManagerState {
    /// Next transaction ID to allocate.
    next_txid: u64,
    /// Every transaction ever started.
    ///
    /// NOTE: Entries are never removed, so this grows with every transaction.
    /// Purge relies on looking up the state of old deleters; pruning would
    /// need a low-water mark of the oldest deleter still referenced.
    txs: HashMap<TxId, TxEntry>,
    /// Table-level locks: conglomerate -> holders.
    locks: HashMap<ConglomId, Vec<TxId>>,
}

impl TxManagerState {
    /// Returns true if `a` is `b`, or one is an ancestor of the other.
    fn related(&self, a: TxId, b: TxId) -> bool {
        self.is_ancestor_or_self(a, b) || self.is_ancestor_or_self(b, a)
    }

    /// Returns true if `ancestor` is `txid` or appears in its parent chain.
    fn is_ancestor_or_self(&self, ancestor: TxId, txid: TxId) -> bool {
        let mut current = Some(txid);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.txs.get(&t).and_then(|e| e.parent);
        }
        false
    }

    fn release_locks(&mut self, txid: TxId) {
        self.locks.retain(|_, holders| {
            holders.retain(|&h| h != txid);
            !holders.is_empty()
        });
    }
}

/// Transaction manager.
///
/// Responsibilities:
/// - Allocate sequential TxIds starting from 1
/// - Track parent/nested relationships
/// - Maintain transaction commit/abort state
/// - Grant table-level locks and release them when the holder terminates
///
/// A nested transaction shares lock compatibility with its parent chain:
/// a lock held by the parent does not block the nested transaction, and
/// vice versa. Locks taken by a nested transaction are released when it
/// terminates, not when the parent does.
///
/// NOTE: Lock requests never wait. A conflicting request fails immediately
/// with [`TxError::LockTimeout`], which callers treat like an expired wait.
#[derive(Debug)]
pub struct TransactionManager {
    state: Mutex<TxManagerState>,
}

impl TransactionManager {
    /// Create a new transaction manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TxManagerState {
                next_txid: 1,
                ..Default::default()
            }),
        }
    }

    /// Begin a new top-level transaction.
    pub fn begin(&self, read_only: bool) -> TxId {
        let mut state = self.state.lock();
        Self::allocate(&mut state, None, read_only)
    }

    /// Begin a transaction nested under `parent`.
    ///
    /// # Errors
    ///
    /// Returns `TxError::TransactionNotFound` if the parent is unknown, or
    /// `TxError::InvalidStateTransition` if it has already terminated.
    pub fn begin_nested(&self, parent: TxId, read_only: bool) -> Result<TxId, TxError> {
        let mut state = self.state.lock();
        let entry = state
            .txs
            .get(&parent)
            .ok_or(TxError::TransactionNotFound(parent))?;
        if entry.state != TxState::InProgress {
            return Err(TxError::InvalidStateTransition {
                txid: parent,
                current: entry.state,
                attempted: TxState::InProgress,
            });
        }
        Ok(Self::allocate(&mut state, Some(parent), read_only))
    }

    fn allocate(state: &mut TxManagerState, parent: Option<TxId>, read_only: bool) -> TxId {
        let txid = TxId::new(state.next_txid);
        state.next_txid += 1;
        state.txs.insert(
            txid,
            TxEntry {
                state: TxState::InProgress,
                parent,
                read_only,
            },
        );
        txid
    }

    /// Commit a transaction and release its locks.
    pub fn commit(&self, txid: TxId) -> Result<(), TxError> {
        self.complete(txid, TxState::Committed)
    }

    /// Abort a transaction and release its locks.
    ///
    /// The caller is responsible for undoing the transaction's changes
    /// before calling this.
    pub fn abort(&self, txid: TxId) -> Result<(), TxError> {
        self.complete(txid, TxState::Aborted)
    }

    /// Marks the transaction as `new_state` and releases its locks.
    fn complete(&self, txid: TxId, new_state: TxState) -> Result<(), TxError> {
        let mut state = self.state.lock();
        let current = state
            .txs
            .get(&txid)
            .map(|e| e.state)
            .ok_or(TxError::TransactionNotFound(txid))?;
        if current != TxState::InProgress {
            return Err(TxError::InvalidStateTransition {
                txid,
                current,
                attempted: new_state,
            });
        }

        let running_child = state
            .txs
            .iter()
            .find(|(_, e)| e.parent == Some(txid) && e.state == TxState::InProgress)
            .map(|(&id, _)| id);
        if let Some(nested) = running_child {
            return Err(TxError::ActiveNested { txid, nested });
        }

        if let Some(entry) = state.txs.get_mut(&txid) {
            entry.state = new_state;
        }
        state.release_locks(txid);
        Ok(())
    }

    /// Get the state of a transaction, or `None` if it was never started.
    pub fn state(&self, txid: TxId) -> Option<TxState> {
        self.state.lock().txs.get(&txid).map(|e| e.state)
    }

    /// Returns true if the transaction has committed.
    pub fn is_committed(&self, txid: TxId) -> bool {
        self.state(txid) == Some(TxState::Committed)
    }

    /// Returns true if the transaction was started read-only.
    pub fn is_read_only(&self, txid: TxId) -> bool {
        self.state
            .lock()
            .txs
            .get(&txid)
            .is_some_and(|e| e.read_only)
    }

    /// Returns the parent of a nested transaction.
    pub fn parent(&self, txid: TxId) -> Option<TxId> {
        self.state.lock().txs.get(&txid).and_then(|e| e.parent)
    }

    /// Acquire a table-level lock on `conglomerate` for `txid`.
    ///
    /// Re-acquiring a held lock is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TxError::LockTimeout` if an unrelated in-progress transaction
    /// holds the lock.
    pub fn lock_table(&self, txid: TxId, conglomerate: ConglomId) -> Result<(), TxError> {
        let mut state = self.state.lock();
        match state.txs.get(&txid).map(|e| e.state) {
            Some(TxState::InProgress) => {}
            Some(current) => {
                return Err(TxError::InvalidStateTransition {
                    txid,
                    current,
                    attempted: TxState::InProgress,
                });
            }
            None => return Err(TxError::TransactionNotFound(txid)),
        }

        let holders = state.locks.get(&conglomerate).cloned().unwrap_or_default();
        if let Some(&holder) = holders.iter().find(|&&h| !state.related(h, txid)) {
            return Err(TxError::LockTimeout {
                txid,
                conglomerate,
                holder,
            });
        }
        if !holders.contains(&txid) {
            state.locks.entry(conglomerate).or_default().push(txid);
        }
        Ok(())
    }

    /// Returns the conglomerates currently locked by `txid`, sorted.
    pub fn locks_held(&self, txid: TxId) -> Vec<ConglomId> {
        let state = self.state.lock();
        let mut held: Vec<ConglomId> = state
            .locks
            .iter()
            .filter(|(_, holders)| holders.contains(&txid))
            .map(|(&id, _)| id)
            .collect();
        held.sort();
        held
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_allocates_sequential_txids() {
        let manager = TransactionManager::new();

        let tx1 = manager.begin(false);
        let tx2 = manager.begin(false);

        assert_eq!(tx1, TxId::new(1));
        assert_eq!(tx2, TxId::new(2));
        assert_eq!(manager.state(tx1), Some(TxState::InProgress));
    }

    #[test]
    fn test_commit_and_abort_transition_state() {
        let manager = TransactionManager::new();
        let tx1 = manager.begin(false);
        let tx2 = manager.begin(true);

        manager.commit(tx1).unwrap();
        manager.abort(tx2).unwrap();

        assert!(manager.is_committed(tx1));
        assert_eq!(manager.state(tx2), Some(TxState::Aborted));
        assert!(manager.is_read_only(tx2));
    }

    #[test]
    fn test_commit_not_found() {
        let manager = TransactionManager::new();
        let result = manager.commit(TxId::new(999));
        assert!(matches!(result, Err(TxError::TransactionNotFound(_))));
    }

    #[test]
    fn test_invalid_state_transition() {
        let manager = TransactionManager::new();
        let txid = manager.begin(false);
        manager.commit(txid).unwrap();

        let result = manager.abort(txid);
        assert!(matches!(
            result,
            Err(TxError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_nested_requires_live_parent() {
        let manager = TransactionManager::new();
        let parent = manager.begin(false);
        let nested = manager.begin_nested(parent, false).unwrap();
        assert_eq!(manager.parent(nested), Some(parent));

        manager.commit(nested).unwrap();
        manager.commit(parent).unwrap();
        assert!(manager.begin_nested(parent, false).is_err());
    }

    #[test]
    fn test_parent_cannot_commit_over_running_nested() {
        let manager = TransactionManager::new();
        let parent = manager.begin(false);
        let nested = manager.begin_nested(parent, false).unwrap();

        let result = manager.commit(parent);
        assert_eq!(result, Err(TxError::ActiveNested { txid: parent, nested }));

        manager.abort(nested).unwrap();
        manager.commit(parent).unwrap();
    }

    #[test]
    fn test_lock_conflict_between_unrelated_transactions() {
        let manager = TransactionManager::new();
        let tx1 = manager.begin(false);
        let tx2 = manager.begin(false);
        let id = ConglomId::new(10);

        manager.lock_table(tx1, id).unwrap();
        manager.lock_table(tx1, id).unwrap();
        let result = manager.lock_table(tx2, id);
        assert_eq!(
            result,
            Err(TxError::LockTimeout {
                txid: tx2,
                conglomerate: id,
                holder: tx1,
            })
        );

        manager.commit(tx1).unwrap();
        manager.lock_table(tx2, id).unwrap();
    }

    #[test]
    fn test_nested_shares_locks_with_parent() {
        let manager = TransactionManager::new();
        let parent = manager.begin(false);
        let nested = manager.begin_nested(parent, false).unwrap();
        let other = manager.begin(false);
        let id = ConglomId::new(4);

        manager.lock_table(parent, id).unwrap();
        manager.lock_table(nested, id).unwrap();
        assert_eq!(manager.locks_held(nested), vec![id]);

        // Nested commit releases only the nested transaction's hold.
        manager.commit(nested).unwrap();
        assert!(manager.locks_held(nested).is_empty());
        assert!(manager.lock_table(other, id).is_err());
    }

    #[test]
    fn test_nested_release_unblocks_others() {
        let manager = TransactionManager::new();
        let parent = manager.begin(false);
        let nested = manager.begin_nested(parent, false).unwrap();
        let other = manager.begin(false);
        let id = ConglomId::new(4);

        manager.lock_table(nested, id).unwrap();
        assert!(manager.lock_table(other, id).is_err());

        manager.abort(nested).unwrap();
        manager.lock_table(other, id).unwrap();
    }

    #[test]
    fn test_terminated_states_stay_queryable() {
        let manager = TransactionManager::new();
        let old = manager.begin(false);
        manager.commit(old).unwrap();
        for _ in 0..100 {
            let tx = manager.begin(false);
            manager.abort(tx).unwrap();
        }
        assert!(manager.is_committed(old));
    }
}
