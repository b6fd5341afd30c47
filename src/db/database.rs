//! Catalog and store kept in step for DDL and row changes.

use tracing::{debug, info};

use super::error::DatabaseError;
use crate::catalog::{
    Catalog, ColumnDescriptor, ConglomerateDescriptor, ConstraintDescriptor, ConstraintKind,
    IndexDescriptor, MemoryCatalog, PhysicalIndex, PhysicalTable, TableDescriptor, TableKind,
    TableShape,
};
use crate::config::{MaintConfig, MemoryStoreConfig};
use crate::datum::{Type, Value};
use crate::maint::{
    CheckReport, Compactor, CompressPhases, CompressSummary, ConsistencyChecker, IndexProjection,
    MaintError,
};
use crate::store::{
    ConglomId, ConglomerateController, LocatedRow, MemoryStore, MemoryTransaction, OpenMode,
    OpenOptions, RowLocation, ScanController, ScanRange, TransactionController,
};

/// A catalog and a store managed together.
///
/// DDL runs outside any transaction and takes effect immediately. Row
/// changes run in a caller-supplied [`MemoryTransaction`] and are undone if
/// it aborts.
#[derive(Debug)]
pub struct MemoryDatabase {
    catalog: MemoryCatalog,
    store: MemoryStore,
    maint: MaintConfig,
}

impl MemoryDatabase {
    /// Creates an empty database with default configuration.
    pub fn new() -> Self {
        Self {
            catalog: MemoryCatalog::new(),
            store: MemoryStore::new(),
            maint: MaintConfig::default(),
        }
    }

    /// Creates an empty database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Config` if either configuration is invalid.
    pub fn with_config(
        store: MemoryStoreConfig,
        maint: MaintConfig,
    ) -> Result<Self, DatabaseError> {
        maint.validate()?;
        Ok(Self {
            catalog: MemoryCatalog::new(),
            store: MemoryStore::with_config(store)?,
            maint,
        })
    }

    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn maint_config(&self) -> &MaintConfig {
        &self.maint
    }

    /// Begins a top-level transaction.
    pub fn begin(&self, read_only: bool) -> MemoryTransaction {
        self.store.begin(read_only)
    }

    /// A checker over this database's catalog.
    pub fn checker(&self) -> Result<ConsistencyChecker<'_, MemoryCatalog>, MaintError> {
        ConsistencyChecker::with_config(&self.catalog, self.maint.clone())
    }

    /// A compactor over this database's catalog.
    pub fn compactor(&self) -> Result<Compactor<'_, MemoryCatalog>, MaintError> {
        Compactor::with_config(&self.catalog, self.maint.clone())
    }

    /// Checks one table in `tx`.
    pub fn check_table(
        &self,
        tx: &MemoryTransaction,
        schema: &str,
        table: &str,
    ) -> Result<CheckReport, MaintError> {
        self.checker()?.check_table(tx, schema, table)
    }

    /// Compresses one table in `tx`.
    pub fn compress(
        &self,
        tx: &MemoryTransaction,
        schema: &str,
        table: &str,
        phases: CompressPhases,
    ) -> Result<CompressSummary, MaintError> {
        self.compactor()?.compress(tx, schema, table, phases)
    }

    // DDL

    /// Creates a base table and its heap. Columns are nullable and numbered
    /// from 1 in the order given.
    pub fn create_table(
        &self,
        schema: &str,
        name: &str,
        columns: &[(&str, Type)],
    ) -> Result<ConglomId, DatabaseError> {
        let heap = self
            .store
            .create_heap(columns.iter().map(|&(_, ty)| ty).collect());
        let mut table = TableDescriptor::new(schema, name, TableKind::Base);
        table.columns = columns
            .iter()
            .zip(1u32..)
            .map(|(&(column, ty), position)| ColumnDescriptor::new(column, position, ty, true))
            .collect();
        table.conglomerates.push(ConglomerateDescriptor::heap(heap, name));
        if let Err(e) = self.catalog.add_table(table) {
            // The heap was never published; nothing else can refer to it.
            let _ = self.store.drop_conglomerate(heap);
            return Err(e.into());
        }
        info!(table = %format!("{}.{}", schema, name), heap = %heap, "table created");
        Ok(heap)
    }

    /// Registers a view. Views have no storage.
    pub fn create_view(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        self.catalog
            .add_table(TableDescriptor::new(schema, name, TableKind::View))?;
        Ok(())
    }

    /// Registers a virtual table. Virtual tables have no storage.
    pub fn create_virtual_table(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        self.catalog
            .add_table(TableDescriptor::new(schema, name, TableKind::Virtual))?;
        Ok(())
    }

    /// Creates an index on the 1-based column `positions` and backfills it
    /// from the heap's current rows.
    pub fn create_index(
        &self,
        schema: &str,
        table: &str,
        name: &str,
        positions: &[u32],
        unique: bool,
    ) -> Result<ConglomId, DatabaseError> {
        let descriptor = IndexDescriptor::new(positions.to_vec(), unique, false);
        self.add_index(schema, table, name, descriptor, None)
    }

    /// Adds a primary key or unique constraint with its backing index.
    pub fn add_constraint(
        &self,
        schema: &str,
        table: &str,
        name: &str,
        kind: ConstraintKind,
        positions: &[u32],
    ) -> Result<ConglomId, DatabaseError> {
        let unique = matches!(kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique);
        let descriptor = IndexDescriptor::new(positions.to_vec(), unique, true);
        self.add_index(schema, table, name, descriptor, Some(kind))
    }

    fn add_index(
        &self,
        schema: &str,
        table: &str,
        name: &str,
        index: IndexDescriptor,
        constraint: Option<ConstraintKind>,
    ) -> Result<ConglomId, DatabaseError> {
        let mut descriptor = self.catalog.resolve_table(schema, table)?;
        let physical = physical(&descriptor)?;

        let id = self.store.create_index(index.key_count(), index.unique);
        let target = PhysicalIndex {
            id,
            name: name.to_string(),
            descriptor: index.clone(),
        };
        let backfilled = match self.backfill(&descriptor, &physical, &target) {
            Ok(count) => count,
            Err(e) => {
                let _ = self.store.drop_conglomerate(id);
                return Err(e);
            }
        };

        descriptor
            .conglomerates
            .push(ConglomerateDescriptor::index(id, name, index));
        if let Some(kind) = constraint {
            descriptor
                .constraints
                .push(ConstraintDescriptor::new(name, kind, Some(id)));
        }
        self.catalog.replace_table(descriptor)?;
        info!(
            table = %format!("{}.{}", schema, table),
            index = name,
            conglomerate = %id,
            backfilled,
            "index created"
        );
        Ok(id)
    }

    fn backfill(
        &self,
        table: &TableDescriptor,
        physical: &PhysicalTable,
        index: &PhysicalIndex,
    ) -> Result<usize, DatabaseError> {
        let projection = IndexProjection::for_index(table, index)?;
        let mut entry = projection.template();
        let rows = self.store.heap_rows(physical.heap)?;
        for row in &rows {
            let Some(location) = row.location else {
                continue;
            };
            projection.fill_entry(&row.columns, location, &mut entry);
            self.store.insert_raw_index_entry(index.id, entry.clone())?;
        }
        Ok(rows.len())
    }

    // DML

    /// Inserts a row into the heap and an entry into every index.
    pub fn insert(
        &self,
        tx: &MemoryTransaction,
        schema: &str,
        table: &str,
        row: Vec<Value>,
    ) -> Result<RowLocation, DatabaseError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        let physical = physical(&descriptor)?;
        if row.len() != descriptor.column_count() {
            return Err(DatabaseError::ColumnCount {
                table: descriptor.qualified_name(),
                expected: descriptor.column_count(),
                actual: row.len(),
            });
        }

        let options = self.write_options();
        let mut entries = Vec::with_capacity(physical.indexes.len());
        for index in &physical.indexes {
            entries.push((index.id, IndexProjection::for_index(&descriptor, index)?));
        }

        let mut heap = tx.open_conglomerate(physical.heap, options)?;
        let location = heap.insert_row(row.clone())?;
        for (id, projection) in entries {
            let mut entry = projection.template();
            projection.fill_entry(&row, location, &mut entry);
            tx.open_conglomerate(id, options)?.insert(&entry)?;
        }
        Ok(location)
    }

    /// Deletes every row matching `predicate` along with its index entries.
    /// Returns the number of rows deleted.
    pub fn delete_where(
        &self,
        tx: &MemoryTransaction,
        schema: &str,
        table: &str,
        mut predicate: impl FnMut(&[Value]) -> bool,
    ) -> Result<usize, DatabaseError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        let physical = physical(&descriptor)?;
        let options = self.write_options();

        let mut deleted = Vec::new();
        {
            let mut scan = tx.open_scan(physical.heap, options, ScanRange::Full)?;
            let mut row = LocatedRow::template(descriptor.column_count());
            while scan.next()? {
                scan.fetch(&mut row)?;
                if predicate(&row.columns) && scan.delete()? {
                    deleted.push(row.clone());
                }
            }
        }

        for index in &physical.indexes {
            let projection = IndexProjection::for_index(&descriptor, index)?;
            let mut entry = projection.template();
            let mut scan = tx.open_scan(index.id, options, ScanRange::Full)?;
            for row in &deleted {
                let Some(location) = row.location else {
                    continue;
                };
                projection.fill_entry(&row.columns, location, &mut entry);
                scan.reopen(ScanRange::exact(&entry))?;
                if !(scan.next()? && scan.delete()?) {
                    debug!(index = %index.name, location = %location, "no index entry to delete");
                }
            }
        }
        Ok(deleted.len())
    }

    /// Live heap rows of a table, in storage order.
    pub fn rows(&self, schema: &str, table: &str) -> Result<Vec<LocatedRow>, DatabaseError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        Ok(self.store.heap_rows(physical(&descriptor)?.heap)?)
    }

    /// Live entries of a named index, in key order.
    pub fn index_entries(
        &self,
        schema: &str,
        table: &str,
        index: &str,
    ) -> Result<Vec<LocatedRow>, DatabaseError> {
        let id = self.index_id(schema, table, index)?;
        Ok(self.store.index_entries(id)?)
    }

    /// Conglomerate id of the table's heap.
    pub fn heap_id(&self, schema: &str, table: &str) -> Result<ConglomId, DatabaseError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        Ok(physical(&descriptor)?.heap)
    }

    /// Conglomerate id of a named index.
    pub fn index_id(
        &self,
        schema: &str,
        table: &str,
        index: &str,
    ) -> Result<ConglomId, DatabaseError> {
        let descriptor = self.catalog.resolve_table(schema, table)?;
        physical(&descriptor)?
            .indexes
            .iter()
            .find(|i| i.name == index)
            .map(|i| i.id)
            .ok_or_else(|| DatabaseError::IndexNotFound {
                table: descriptor.qualified_name(),
                index: index.to_string(),
            })
    }

    fn write_options(&self) -> OpenOptions {
        self.maint.open_options(OpenMode::ForUpdate)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn physical(descriptor: &TableDescriptor) -> Result<PhysicalTable, DatabaseError> {
    match descriptor.shape()? {
        TableShape::Physical(physical) => Ok(physical),
        TableShape::View | TableShape::Virtual => Err(DatabaseError::NoStorage {
            table: descriptor.qualified_name(),
        }),
    }
}
