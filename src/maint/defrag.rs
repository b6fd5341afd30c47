//! Defragment phase.
//!
//! A relocation scan moves heap rows from the tail of the heap into free
//! space near the front, a batch at a time. For every moved row and every
//! index, the entry `(key, old location)` is deleted and `(key, new
//! location)` inserted before the next batch is requested.
//!
//! All of this happens in one nested transaction, committed once after the
//! scan is exhausted. Any failure abandons the nested transaction, which
//! undoes every move and every index change made so far.
//!
//! NOTE: Lock hold time grows with table size because there is a single
//! commit per table. Committing per batch would shorten it, but the
//! projections built at the start would then be stale if a schema change
//! slipped in between batches.

use tracing::{debug, error, info, warn};

use super::compress::{Compactor, Phase, PhaseReport};
use super::error::MaintError;
use super::projection::IndexProjection;
use crate::catalog::{Catalog, PhysicalIndex, PhysicalTable, TableDescriptor};
use crate::config::MissingEntryPolicy;
use crate::store::{
    ConglomerateController, LocatedRow, NestedTransaction, OpenMode, OpenOptions, Relocated,
    RelocationScan, ScanController, ScanRange, StoreError, TransactionController,
};

/// Owns a nested transaction and abandons it on drop unless committed.
pub(super) struct NestedGuard<N: NestedTransaction> {
    tx: Option<N>,
}

impl<N: NestedTransaction> NestedGuard<N> {
    pub(super) fn new(tx: N) -> Self {
        Self { tx: Some(tx) }
    }

    fn transaction(&self) -> Result<&N, StoreError> {
        self.tx
            .as_ref()
            .ok_or(StoreError::Unsupported("nested transaction already finished"))
    }

    pub(super) fn commit(mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Ok(()),
        }
    }
}

impl<N: NestedTransaction> Drop for NestedGuard<N> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let txid = tx.txid();
            warn!(txid = %txid, "abandoning nested transaction");
            if let Err(e) = tx.abandon() {
                error!(txid = %txid, error = %e, "failed to abandon nested transaction");
            }
        }
    }
}

/// Per-index state reused for every relocated row.
struct RelocationTarget<'a, T: TransactionController> {
    index: &'a PhysicalIndex,
    projection: IndexProjection,
    /// Positioned on one exact entry at a time for deletes.
    scan: T::Scan,
    /// Insert handle on the same index.
    controller: T::Conglomerate,
    entry: LocatedRow,
}

impl<'a, T: TransactionController> RelocationTarget<'a, T> {
    fn open(
        tx: &T,
        table: &TableDescriptor,
        index: &'a PhysicalIndex,
        options: OpenOptions,
    ) -> Result<Self, MaintError> {
        let projection = IndexProjection::for_index(table, index)?;
        let scan = tx.open_scan(index.id, options, ScanRange::Full)?;
        let controller = tx.open_conglomerate(index.id, options)?;
        let entry = projection.template();
        Ok(Self {
            index,
            projection,
            scan,
            controller,
            entry,
        })
    }

    /// Repoints this index's entry for `moved` from the old to the new
    /// location.
    fn republish(
        &mut self,
        moved: &Relocated,
        table: &TableDescriptor,
        policy: MissingEntryPolicy,
    ) -> Result<(), MaintError> {
        self.projection
            .fill_entry(&moved.row, moved.old, &mut self.entry);
        self.scan.reopen(ScanRange::exact(&self.entry))?;
        let deleted = self.scan.next()? && self.scan.delete()?;
        if !deleted {
            error!(
                table = %table.qualified_name(),
                index = %self.index.name,
                location = %moved.old,
                entry = %self.entry,
                "index entry for relocated row not found"
            );
            if policy == MissingEntryPolicy::Abort {
                return Err(MaintError::InternalInconsistency {
                    table: table.qualified_name(),
                    index: self.index.name.clone(),
                    location: moved.old,
                    index_row: self.entry.to_string(),
                });
            }
        }

        self.entry.location = Some(moved.new);
        self.controller.insert(&self.entry)?;
        Ok(())
    }
}

impl<C: Catalog + ?Sized> Compactor<'_, C> {
    /// Moves heap rows toward the front of the heap, keeping every index
    /// pointed at each row's current location.
    ///
    /// # Errors
    ///
    /// Any failure abandons the phase's nested transaction, so either every
    /// move of this call is visible or none is. `tx` itself is untouched.
    pub fn defragment<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
    ) -> Result<PhaseReport, MaintError> {
        let (descriptor, physical) = self.resolve(schema, table)?;
        let Some(physical) = physical else {
            debug!(table = %descriptor.qualified_name(), "defragment skipped, no storage");
            return Ok(PhaseReport::skipped(Phase::Defragment));
        };

        info!(
            table = %descriptor.qualified_name(),
            indexes = physical.indexes.len(),
            "defragment started"
        );
        let nested = NestedGuard::new(tx.start_nested(false)?);
        let relocated = self.relocate_rows(nested.transaction()?, &descriptor, &physical)?;
        nested.commit()?;

        info!(table = %descriptor.qualified_name(), relocated, "defragment finished");
        let mut report = PhaseReport::done(Phase::Defragment, 1 + physical.indexes.len());
        report.rows_relocated = relocated;
        Ok(report)
    }

    /// Drives the relocation scan to exhaustion. Every handle opened here is
    /// closed before this returns.
    fn relocate_rows<N: TransactionController>(
        &self,
        tx: &N,
        table: &TableDescriptor,
        physical: &PhysicalTable,
    ) -> Result<u64, MaintError> {
        let options = self.config.open_options(OpenMode::ForUpdate);
        let policy = self.config.missing_entry_policy;
        let batch_size = self.config.relocation_batch_size;

        let mut targets = physical
            .indexes
            .iter()
            .map(|index| RelocationTarget::<N>::open(tx, table, index, options))
            .collect::<Result<Vec<_>, _>>()?;
        let mut scan = tx.open_relocation_scan(physical.heap, options)?;

        let mut batch = Vec::with_capacity(batch_size);
        let mut relocated = 0u64;
        loop {
            let count = scan.fetch_next_batch(batch_size, &mut batch)?;
            if count == 0 {
                break;
            }
            for moved in &batch {
                for target in &mut targets {
                    target.republish(moved, table, policy)?;
                }
            }
            relocated += count as u64;
            debug!(table = %table.qualified_name(), batch = count, relocated, "relocation batch applied");
        }
        Ok(relocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::store::MemoryStore;

    #[test]
    fn test_guard_abandons_on_drop() {
        let store = MemoryStore::new();
        let parent = store.begin(false);
        let nested = parent.start_nested(false).unwrap();
        let nested_id = nested.txid();
        {
            let guard = NestedGuard::new(nested);
            assert!(guard.transaction().is_ok());
        }
        assert_eq!(
            store.tx_manager().state(nested_id),
            Some(crate::tx::TxState::Aborted)
        );
    }

    #[test]
    fn test_guard_commit() {
        let store = MemoryStore::new();
        let heap = store.create_heap(vec![Type::Int4]);
        let parent = store.begin(false);
        let nested = parent.start_nested(false).unwrap();
        let nested_id = nested.txid();
        let guard = NestedGuard::new(nested);
        guard
            .transaction()
            .unwrap()
            .open_conglomerate(heap, OpenOptions::table(OpenMode::ForUpdate))
            .unwrap();
        guard.commit().unwrap();
        assert!(store.tx_manager().is_committed(nested_id));
        assert!(store.tx_manager().locks_held(nested_id).is_empty());
    }
}
