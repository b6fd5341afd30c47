//! Catalog of tables, their storage, and their constraints.
//!
//! Maintenance code resolves a table through the [`Catalog`] trait and gets
//! back a [`TableDescriptor`] snapshot. [`TableDescriptor::shape`] turns that
//! into a [`TableShape`], which is the only thing callers branch on.
//!
//! ## Descriptor Types
//!
//! | Rust Type                  | Describes                                 |
//! |----------------------------|-------------------------------------------|
//! | [`TableDescriptor`]        | Table kind, columns, storage, constraints |
//! | [`ColumnDescriptor`]       | Name, 1-based position, type              |
//! | [`ConglomerateDescriptor`] | Heap or index, by conglomerate id         |
//! | [`IndexDescriptor`]        | Key column positions and flags            |
//! | [`ConstraintDescriptor`]   | Constraint and its backing index         |

mod error;
mod memory;
mod types;

pub use error::CatalogError;
pub use memory::MemoryCatalog;
pub use types::{
    ColumnDescriptor, ConglomerateDescriptor, ConglomerateKind, ConstraintDescriptor,
    ConstraintKind, IndexDescriptor, PhysicalIndex, PhysicalTable, TableDescriptor, TableKind,
    TableShape,
};

/// Read access to table metadata.
///
/// Every call returns a fresh snapshot; a descriptor is never updated in
/// place after it has been handed out.
pub trait Catalog {
    /// Resolves `schema.table`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::SchemaNotFound` or `CatalogError::TableNotFound`.
    fn resolve_table(&self, schema: &str, table: &str) -> Result<TableDescriptor, CatalogError>;

    /// Names of every table in `schema`, sorted.
    fn table_names(&self, schema: &str) -> Result<Vec<String>, CatalogError>;
}
