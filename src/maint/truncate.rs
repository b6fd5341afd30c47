//! Truncate phase.

use tracing::{debug, info};

use super::compress::{Compactor, Phase, PhaseReport};
use super::error::MaintError;
use crate::catalog::Catalog;
use crate::store::TransactionController;

impl<C: Catalog + ?Sized> Compactor<'_, C> {
    /// Asks storage to release the trailing free space of the heap and every
    /// index of a table. No rows are read.
    pub fn truncate<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
    ) -> Result<PhaseReport, MaintError> {
        let (descriptor, physical) = self.resolve(schema, table)?;
        let Some(physical) = physical else {
            debug!(table = %descriptor.qualified_name(), "truncate skipped, no storage");
            return Ok(PhaseReport::skipped(Phase::Truncate));
        };

        let mut conglomerates = 0;
        for id in physical.conglomerate_ids() {
            tx.compress_conglomerate(id)?;
            conglomerates += 1;
        }
        info!(table = %descriptor.qualified_name(), conglomerates, "truncate finished");
        Ok(PhaseReport::done(Phase::Truncate, conglomerates))
    }
}
