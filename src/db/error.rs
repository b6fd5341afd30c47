//! Database-level errors.

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::maint::MaintError;
use crate::store::StoreError;

/// Errors that can occur during database operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseError {
    /// Catalog error.
    Catalog(CatalogError),
    /// Storage or transaction error.
    Store(StoreError),
    /// Maintenance error.
    Maint(MaintError),
    /// Invalid store or maintenance configuration.
    Config(ConfigError),
    /// Rows were read or written through a view or virtual table.
    NoStorage { table: String },
    /// The named index does not exist on the table.
    IndexNotFound { table: String, index: String },
    /// A row has the wrong number of columns for its table.
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Catalog(e) => write!(f, "catalog error: {}", e),
            DatabaseError::Store(e) => write!(f, "storage error: {}", e),
            DatabaseError::Maint(e) => write!(f, "{}", e),
            DatabaseError::Config(e) => write!(f, "invalid configuration: {}", e),
            DatabaseError::NoStorage { table } => {
                write!(f, "\"{}\" is not a table with storage", table)
            }
            DatabaseError::IndexNotFound { table, index } => {
                write!(f, "index \"{}\" does not exist on table \"{}\"", index, table)
            }
            DatabaseError::ColumnCount {
                table,
                expected,
                actual,
            } => write!(
                f,
                "table \"{}\" has {} columns but {} values were supplied",
                table, expected, actual
            ),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Catalog(e) => Some(e),
            DatabaseError::Store(e) => Some(e),
            DatabaseError::Maint(e) => Some(e),
            DatabaseError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for DatabaseError {
    fn from(e: CatalogError) -> Self {
        DatabaseError::Catalog(e)
    }
}

impl From<StoreError> for DatabaseError {
    fn from(e: StoreError) -> Self {
        DatabaseError::Store(e)
    }
}

impl From<MaintError> for DatabaseError {
    fn from(e: MaintError) -> Self {
        DatabaseError::Maint(e)
    }
}

impl From<ConfigError> for DatabaseError {
    fn from(e: ConfigError) -> Self {
        DatabaseError::Config(e)
    }
}
