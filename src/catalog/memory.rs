//! In-memory catalog.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::Catalog;
use super::error::CatalogError;
use super::types::TableDescriptor;

/// A catalog held entirely in memory.
///
/// Schemas map to tables keyed by name. Tables within a schema are kept in
/// name order so [`Catalog::table_names`] is deterministic.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    /// schema -> table name -> descriptor
    schemas: RwLock<HashMap<String, BTreeMap<String, TableDescriptor>>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a schema if it does not already exist.
    pub fn create_schema(&self, schema: &str) {
        self.schemas
            .write()
            .entry(schema.to_string())
            .or_default();
    }

    /// Adds a table, creating its schema on first use.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::TableExists` if the name is taken.
    pub fn add_table(&self, table: TableDescriptor) -> Result<(), CatalogError> {
        let mut schemas = self.schemas.write();
        let tables = schemas.entry(table.schema.clone()).or_default();
        if tables.contains_key(&table.name) {
            return Err(CatalogError::TableExists {
                schema: table.schema,
                table: table.name,
            });
        }
        tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Replaces the descriptor of an existing table.
    pub fn replace_table(&self, table: TableDescriptor) -> Result<(), CatalogError> {
        let mut schemas = self.schemas.write();
        let tables = schemas
            .get_mut(&table.schema)
            .ok_or_else(|| CatalogError::SchemaNotFound(table.schema.clone()))?;
        let slot = tables
            .get_mut(&table.name)
            .ok_or_else(|| CatalogError::TableNotFound {
                schema: table.schema.clone(),
                table: table.name.clone(),
            })?;
        *slot = table;
        Ok(())
    }

    /// Removes a table and returns its last descriptor.
    pub fn drop_table(&self, schema: &str, table: &str) -> Result<TableDescriptor, CatalogError> {
        self.schemas
            .write()
            .get_mut(schema)
            .ok_or_else(|| CatalogError::SchemaNotFound(schema.to_string()))?
            .remove(table)
            .ok_or_else(|| CatalogError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }
}

impl Catalog for MemoryCatalog {
    fn resolve_table(&self, schema: &str, table: &str) -> Result<TableDescriptor, CatalogError> {
        let schemas = self.schemas.read();
        let tables = schemas
            .get(schema)
            .ok_or_else(|| CatalogError::SchemaNotFound(schema.to_string()))?;
        tables
            .get(table)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }

    fn table_names(&self, schema: &str) -> Result<Vec<String>, CatalogError> {
        let schemas = self.schemas.read();
        let tables = schemas
            .get(schema)
            .ok_or_else(|| CatalogError::SchemaNotFound(schema.to_string()))?;
        Ok(tables.keys().cloned().collect())
    }
}
