//! Purge phase.

use tracing::{debug, info};

use super::compress::{Compactor, Phase, PhaseReport};
use super::error::MaintError;
use crate::catalog::Catalog;
use crate::store::TransactionController;

impl<C: Catalog + ?Sized> Compactor<'_, C> {
    /// Asks storage to discard committed-deleted rows from the heap and
    /// every index of a table.
    ///
    /// Runs directly in `tx`. Repeating it with no intervening deletes
    /// changes nothing.
    pub fn purge<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
    ) -> Result<PhaseReport, MaintError> {
        let (descriptor, physical) = self.resolve(schema, table)?;
        let Some(physical) = physical else {
            debug!(table = %descriptor.qualified_name(), "purge skipped, no storage");
            return Ok(PhaseReport::skipped(Phase::Purge));
        };

        let mut conglomerates = 0;
        for id in physical.conglomerate_ids() {
            tx.purge_conglomerate(id)?;
            conglomerates += 1;
        }
        info!(table = %descriptor.qualified_name(), conglomerates, "purge finished");
        Ok(PhaseReport::done(Phase::Purge, conglomerates))
    }
}
