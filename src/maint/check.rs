//! Heap/index consistency checking.

use tracing::{debug, info};

use super::error::{IntegrityViolation, MaintError};
use super::projection::IndexProjection;
use crate::catalog::{Catalog, PhysicalIndex, PhysicalTable, TableDescriptor, TableShape};
use crate::config::MaintConfig;
use crate::datum::Value;
use crate::store::{
    ConglomId, ConglomerateController, OpenMode, ScanController, ScanRange, StoreError,
    TransactionController,
};

/// Entry count of one checked index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCheck {
    pub name: String,
    pub id: ConglomId,
    pub entries: u64,
}

/// Outcome of a successful table check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// `schema.table`.
    pub table: String,
    /// True for views and virtual tables, which have nothing to check.
    pub skipped: bool,
    /// Heap row count; only counted when the table has at least one index.
    pub heap_rows: Option<u64>,
    pub indexes: Vec<IndexCheck>,
}

impl CheckReport {
    fn skipped(table: String) -> Self {
        Self {
            table,
            skipped: true,
            heap_rows: None,
            indexes: Vec::new(),
        }
    }
}

/// Verifies that a table's heap and indexes agree.
///
/// For each index, every entry must point at a live heap row whose values
/// at the index's key positions equal the entry's key columns (NULL equal to
/// NULL), and the index must hold exactly as many entries as the heap holds
/// rows. Constraint descriptors and backing indexes must reference each
/// other.
///
/// The first violation ends the check. Nothing is repaired.
pub struct ConsistencyChecker<'a, C: ?Sized> {
    catalog: &'a C,
    config: MaintConfig,
}

impl<'a, C: Catalog + ?Sized> ConsistencyChecker<'a, C> {
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

    /// Checks one table.
    ///
    /// Views and virtual tables pass without any storage access.
    ///
    /// # Errors
    ///
    /// - `MaintError::TableNotFound` / `SchemaNotFound` if the name does not resolve.
    /// - `MaintError::Integrity` for the first broken invariant.
    /// - `MaintError::Store` for lock conflicts and other storage failures.
    pub fn check_table<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
        table: &str,
    ) -> Result<CheckReport, MaintError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        let physical = match descriptor.shape()? {
            TableShape::View | TableShape::Virtual => {
                debug!(table = %descriptor.qualified_name(), "no storage to check");
                return Ok(CheckReport::skipped(descriptor.qualified_name()));
            }
            TableShape::Physical(physical) => physical,
        };

        info!(table = %descriptor.qualified_name(), indexes = physical.indexes.len(), "checking table");
        let report = TableCheck {
            tx,
            table: &descriptor,
            physical: &physical,
            config: &self.config,
        }
        .run()?;
        info!(
            table = %report.table,
            heap_rows = ?report.heap_rows,
            "table check passed"
        );
        Ok(report)
    }

    /// Checks every table of a schema in name order, stopping at the first
    /// failure.
    pub fn check_schema<T: TransactionController>(
        &self,
        tx: &T,
        schema: &str,
    ) -> Result<Vec<CheckReport>, MaintError> {
        self.catalog
            .table_names(schema)?
            .iter()
            .map(|table| self.check_table(tx, schema, table))
            .collect()
    }
}

/// State of one table check. Every handle it opens is dropped when `run`
/// returns, on success or failure.
struct TableCheck<'a, T> {
    tx: &'a T,
    table: &'a TableDescriptor,
    physical: &'a PhysicalTable,
    config: &'a MaintConfig,
}

impl<T: TransactionController> TableCheck<'_, T> {
    fn run(&self) -> Result<CheckReport, MaintError> {
        let read = self.config.open_options(OpenMode::ReadOnly);
        let heap = self.tx.open_conglomerate(self.physical.heap, read)?;
        self.self_check(&heap)?;

        let mut heap_rows = None;
        let mut indexes = Vec::with_capacity(self.physical.indexes.len());
        for index in &self.physical.indexes {
            let index_cc = self.tx.open_conglomerate(index.id, read)?;
            self.self_check(&index_cc)?;
            drop(index_cc);

            if index.descriptor.backs_constraint && self.table.constraint_for_index(index.id).is_none()
            {
                return Err(IntegrityViolation::MissingConstraint {
                    table: self.table.qualified_name(),
                    index: index.name.clone(),
                }
                .into());
            }

            let expected = match heap_rows {
                Some(count) => count,
                None => {
                    let count = self.count_heap_rows()?;
                    heap_rows = Some(count);
                    count
                }
            };

            let entries = self.check_index(&heap, index)?;
            if entries != expected {
                return Err(IntegrityViolation::RowCountMismatch {
                    table: self.table.qualified_name(),
                    index: index.name.clone(),
                    index_rows: entries,
                    heap_rows: expected,
                }
                .into());
            }
            debug!(table = %self.table.qualified_name(), index = %index.name, entries, "index consistent");
            indexes.push(IndexCheck {
                name: index.name.clone(),
                id: index.id,
                entries,
            });
        }

        for constraint in &self.table.constraints {
            if let Some(backing) = constraint.backing_index
                && !self.physical.indexes.iter().any(|index| index.id == backing)
            {
                return Err(IntegrityViolation::MissingBackingIndex {
                    table: self.table.qualified_name(),
                    constraint: constraint.name.clone(),
                    index: backing,
                }
                .into());
            }
        }

        Ok(CheckReport {
            table: self.table.qualified_name(),
            skipped: false,
            heap_rows,
            indexes,
        })
    }

    fn self_check<CC: ConglomerateController>(&self, cc: &CC) -> Result<(), MaintError> {
        match cc.check_consistency() {
            Ok(()) => Ok(()),
            Err(StoreError::Corrupted { id, detail }) => Err(IntegrityViolation::StructuralDamage {
                table: self.table.qualified_name(),
                conglomerate: id,
                detail,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    fn count_heap_rows(&self) -> Result<u64, MaintError> {
        let read = self.config.open_options(OpenMode::ReadOnly);
        let mut scan = self.tx.open_scan(self.physical.heap, read, ScanRange::Full)?;
        let mut count = 0;
        while scan.next()? {
            count += 1;
        }
        Ok(count)
    }

    /// Scans one index, checking each entry against the heap. Returns the
    /// number of entries seen.
    fn check_index<CC: ConglomerateController>(
        &self,
        heap: &CC,
        index: &PhysicalIndex,
    ) -> Result<u64, MaintError> {
        let projection = IndexProjection::for_index(self.table, index)?;
        let needed = projection.needed_columns();
        let mut entry = projection.template();
        let mut base_row = vec![Value::Null; self.table.column_count()];

        let read = self.config.open_options(OpenMode::ReadOnly);
        let mut scan = self.tx.open_scan(index.id, read, ScanRange::Full)?;
        let mut entries = 0;
        while scan.next()? {
            scan.fetch(&mut entry)?;
            entries += 1;

            let Some(location) = entry.location else {
                return Err(StoreError::Corrupted {
                    id: index.id,
                    detail: format!("entry {} has no row location", entry),
                }
                .into());
            };
            if !heap.fetch(location, &mut base_row, &needed)? {
                return Err(IntegrityViolation::InconsistentRowLocation {
                    table: self.table.qualified_name(),
                    index: index.name.clone(),
                    location,
                    index_row: entry.to_string(),
                }
                .into());
            }

            for (ordinal, &offset) in projection.offsets().iter().enumerate() {
                let index_value = entry.columns.get(ordinal).unwrap_or(&Value::Null);
                let heap_value = &base_row[offset];
                if !index_value.null_aware_eq(heap_value) {
                    let position = offset as u32 + 1;
                    let column = self
                        .table
                        .column(position)
                        .map_or_else(|| position.to_string(), |c| c.name.clone());
                    return Err(IntegrityViolation::IndexColumnMismatch {
                        table: self.table.qualified_name(),
                        index: index.name.clone(),
                        location,
                        column,
                        position,
                        index_value: index_value.clone(),
                        heap_value: heap_value.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(entries)
    }
}
