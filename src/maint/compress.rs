//! In-place compaction of a table's heap and indexes.
//!
//! A run is any subset of three phases, always in this order:
//!
//! 1. **Purge**: drop rows and entries whose deleting transaction committed.
//! 2. **Defragment**: move heap rows toward the front of the heap and
//!    repoint every index entry at the new location.
//! 3. **Truncate**: hand trailing free pages back.
//!
//! Each phase resolves the table again, since an earlier phase may have
//! released locks that let a concurrent schema change through.

use std::fmt;

use tracing::info;

use super::error::MaintError;
use crate::catalog::{Catalog, PhysicalTable, TableDescriptor, TableShape};
use crate::config::MaintConfig;
use crate::store::{ConglomId, SpaceInfo, TransactionController};

/// One of the three compaction phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Purge,
    Defragment,
    Truncate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Purge => write!(f, "purge"),
            Phase::Defragment => write!(f, "defragment"),
            Phase::Truncate => write!(f, "truncate"),
        }
    }
}

/// Which phases a compaction run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressPhases {
    pub purge: bool,
    pub defragment: bool,
    pub truncate: bool,
}

impl CompressPhases {
    /// All three phases.
    pub const ALL: Self = Self {
        purge: true,
        defragment: true,
        truncate: true,
    };

    pub const fn new(purge: bool, defragment: bool, truncate: bool) -> Self {
        Self {
            purge,
            defragment,
            truncate,
        }
    }
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// True if the table had no storage and the phase did nothing.
    pub skipped: bool,
    /// Conglomerates the phase acted on.
    pub conglomerates: usize,
    /// Heap rows moved; only the defragment phase moves rows.
    pub rows_relocated: u64,
}

impl PhaseReport {
    pub(super) fn skipped(phase: Phase) -> Self {
        Self {
            phase,
            skipped: true,
            conglomerates: 0,
            rows_relocated: 0,
        }
    }

    pub(super) fn done(phase: Phase, conglomerates: usize) -> Self {
        Self {
            phase,
            skipped: false,
            conglomerates,
            rows_relocated: 0,
        }
    }
}

/// Space usage of one conglomerate at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConglomerateSpace {
    pub id: ConglomId,
    pub name: String,
    pub info: SpaceInfo,
}

/// Result of [`Compactor::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressSummary {
    /// `schema.table`.
    pub table: String,
    /// One report per enabled phase, in execution order.
    pub phases: Vec<PhaseReport>,
    /// Space per conglomerate before the first phase. Empty for views.
    pub space_before: Vec<ConglomerateSpace>,
    /// Space per conglomerate after the last phase. Empty for views.
    pub space_after: Vec<ConglomerateSpace>,
}

impl CompressSummary {
    /// Number of phases that actually touched storage.
    pub fn phases_executed(&self) -> usize {
        self.phases.iter().filter(|p| !p.skipped).count()
    }

    pub fn rows_relocated(&self) -> u64 {
        self.phases.iter().map(|p| p.rows_relocated).sum()
    }

    pub fn pages_before(&self) -> u64 {
        self.space_before.iter().map(|s| s.info.allocated_pages).sum()
    }

    pub fn pages_after(&self) -> u64 {
        self.space_after.iter().map(|s| s.info.allocated_pages).sum()
    }
}

/// Runs purge, defragment, and truncate against tables in a catalog.
///
/// Every operation takes the caller's transaction explicitly. Purge and
/// truncate act directly in it; defragment runs in a nested transaction of
/// its own that is committed or abandoned before the phase returns.
pub struct Compactor<'a, C: ?Sized> {
    pub(super) catalog: &'a C,
    pub(super) config: MaintConfig,
}

impl<'a, C: Catalog + ?Sized> Compactor<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self {
            catalog,
            config: MaintConfig::default(),
        }
    }

    pub fn with_config(catalog: &'a C, config: MaintConfig) -> Result<Self, MaintError> {
        config.validate()?;
        Ok(Self { catalog, config })
    }

    pub fn config(&self) -> &MaintConfig {
        &self.config
    }

    /// Runs the enabled phases in order: purge, defragment, truncate.
    ///
    /// A view or virtual table succeeds with every phase skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first failing phase. Phases already completed stay
    /// completed; a failing defragment leaves no partial relocation behind.
    pub fn compress<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
        phases: CompressPhases,
    ) -> Result<CompressSummary, MaintError> {
        let (descriptor, _) = self.resolve(schema, table)?;
        info!(
            table = %descriptor.qualified_name(),
            purge = phases.purge,
            defragment = phases.defragment,
            truncate = phases.truncate,
            "compress started"
        );
        let space_before = self.space_snapshot(tx, schema, table)?;

        let mut reports = Vec::with_capacity(3);
        if phases.purge {
            reports.push(self.purge(tx, schema, table)?);
        }
        if phases.defragment {
            reports.push(self.defragment(tx, schema, table)?);
        }
        if phases.truncate {
            reports.push(self.truncate(tx, schema, table)?);
        }

        let summary = CompressSummary {
            table: descriptor.qualified_name(),
            phases: reports,
            space_before,
            space_after: self.space_snapshot(tx, schema, table)?,
        };
        info!(
            table = %summary.table,
            phases = summary.phases_executed(),
            rows_relocated = summary.rows_relocated(),
            pages_before = summary.pages_before(),
            pages_after = summary.pages_after(),
            "compress finished"
        );
        Ok(summary)
    }

    /// Resolves a table. The physical part is `None` for views and virtual
    /// tables.
    pub(super) fn resolve(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<(TableDescriptor, Option<PhysicalTable>), MaintError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        let physical = match descriptor.shape()? {
            TableShape::View | TableShape::Virtual => None,
            TableShape::Physical(physical) => Some(physical),
        };
        Ok((descriptor, physical))
    }

    /// Space used by each of the table's conglomerates, heap first.
    pub fn space_snapshot<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ConglomerateSpace>, MaintError> {
        let (descriptor, physical) = self.resolve(schema, table)?;
        let Some(physical) = physical else {
            return Ok(Vec::new());
        };
        physical
            .conglomerate_ids()
            .map(|id| {
                let name = descriptor
                    .conglomerate(id)
                    .map_or_else(|| id.to_string(), |c| c.name.clone());
                Ok(ConglomerateSpace {
                    id,
                    name,
                    info: tx.space_info(id)?,
                })
            })
            .collect()
    }
}
