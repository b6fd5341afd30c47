//! Catalog-specific errors.

/// Errors that can occur during catalog lookups and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No schema with this name exists.
    SchemaNotFound(String),

    /// No table with this name exists in the schema.
    TableNotFound { schema: String, table: String },

    /// A table with this name already exists.
    TableExists { schema: String, table: String },

    /// A physical table has no heap conglomerate.
    MissingHeap { table: String },

    /// A table definition is malformed.
    InvalidDefinition { table: String, detail: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::SchemaNotFound(schema) => {
                write!(f, "schema \"{}\" does not exist", schema)
            }
            CatalogError::TableNotFound { schema, table } => {
                write!(f, "table \"{}.{}\" does not exist", schema, table)
            }
            CatalogError::TableExists { schema, table } => {
                write!(f, "table \"{}.{}\" already exists", schema, table)
            }
            CatalogError::MissingHeap { table } => {
                write!(f, "table \"{}\" has no heap conglomerate", table)
            }
            CatalogError::InvalidDefinition { table, detail } => {
                write!(f, "invalid definition of table \"{}\": {}", table, detail)
            }
        }
    }
}

impl std::error::Error for CatalogError {}
