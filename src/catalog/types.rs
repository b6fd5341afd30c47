//! Catalog descriptors for tables, conglomerates, and constraints.

use super::error::CatalogError;
use crate::datum::Type;
use crate::store::ConglomId;

/// What a table is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Ordinary user table.
    Base,
    /// System catalog table.
    System,
    /// View; no physical storage.
    View,
    /// Virtual table computed on demand; no physical storage.
    Virtual,
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// 1-based position in the row.
    pub position: u32,
    pub ty: Type,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, position: u32, ty: Type, nullable: bool) -> Self {
        Self {
            name: name.into(),
            position,
            ty,
            nullable,
        }
    }
}

/// Index definition as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// For each key column, the 1-based heap column it is taken from.
    pub base_column_positions: Vec<u32>,
    pub unique: bool,
    /// True if the index exists to enforce a constraint.
    pub backs_constraint: bool,
}

impl IndexDescriptor {
    pub fn new(base_column_positions: Vec<u32>, unique: bool, backs_constraint: bool) -> Self {
        Self {
            base_column_positions,
            unique,
            backs_constraint,
        }
    }

    /// Number of key columns, excluding the trailing row location.
    pub fn key_count(&self) -> usize {
        self.base_column_positions.len()
    }
}

/// Whether a conglomerate is the table's heap or one of its indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConglomerateKind {
    Heap,
    Index(IndexDescriptor),
}

/// A physical structure belonging to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConglomerateDescriptor {
    pub id: ConglomId,
    pub name: String,
    pub kind: ConglomerateKind,
}

impl ConglomerateDescriptor {
    pub fn heap(id: ConglomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ConglomerateKind::Heap,
        }
    }

    pub fn index(id: ConglomId, name: impl Into<String>, index: IndexDescriptor) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ConglomerateKind::Index(index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

/// A declared constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
    /// Index enforcing the constraint; `None` for check constraints.
    pub backing_index: Option<ConglomId>,
}

impl ConstraintDescriptor {
    pub fn new(name: impl Into<String>, kind: ConstraintKind, backing_index: Option<ConglomId>) -> Self {
        Self {
            name: name.into(),
            kind,
            backing_index,
        }
    }
}

/// Everything the catalog knows about one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    /// Columns sorted by position.
    pub columns: Vec<ColumnDescriptor>,
    pub conglomerates: Vec<ConglomerateDescriptor>,
    pub constraints: Vec<ConstraintDescriptor>,
}

impl TableDescriptor {
    /// Creates a table with no columns or storage.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            kind,
            columns: Vec::new(),
            conglomerates: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// `schema.table`, used in log lines and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Looks up a column by 1-based position.
    pub fn column(&self, position: u32) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.position == position)
    }

    pub fn conglomerate(&self, id: ConglomId) -> Option<&ConglomerateDescriptor> {
        self.conglomerates.iter().find(|c| c.id == id)
    }

    /// The constraint enforced by index `id`, if any.
    pub fn constraint_for_index(&self, id: ConglomId) -> Option<&ConstraintDescriptor> {
        self.constraints
            .iter()
            .find(|c| c.backing_index == Some(id))
    }

    /// Classifies the table once so callers never inspect `kind` and the
    /// conglomerate list separately.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::MissingHeap` if a physical table has no heap,
    /// or `CatalogError::InvalidDefinition` if it has more than one.
    pub fn shape(&self) -> Result<TableShape, CatalogError> {
        match self.kind {
            TableKind::View => return Ok(TableShape::View),
            TableKind::Virtual => return Ok(TableShape::Virtual),
            TableKind::Base | TableKind::System => {}
        }

        let mut heap = None;
        let mut indexes = Vec::new();
        for conglomerate in &self.conglomerates {
            match &conglomerate.kind {
                ConglomerateKind::Heap => {
                    if heap.replace(conglomerate.id).is_some() {
                        return Err(CatalogError::InvalidDefinition {
                            table: self.qualified_name(),
                            detail: "more than one heap conglomerate".to_string(),
                        });
                    }
                }
                ConglomerateKind::Index(index) => indexes.push(PhysicalIndex {
                    id: conglomerate.id,
                    name: conglomerate.name.clone(),
                    descriptor: index.clone(),
                }),
            }
        }
        let heap = heap.ok_or_else(|| CatalogError::MissingHeap {
            table: self.qualified_name(),
        })?;
        Ok(TableShape::Physical(PhysicalTable { heap, indexes }))
    }
}

/// A table resolved into what maintenance can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    View,
    Virtual,
    Physical(PhysicalTable),
}

/// The heap and indexes of a physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalTable {
    pub heap: ConglomId,
    pub indexes: Vec<PhysicalIndex>,
}

impl PhysicalTable {
    /// Every conglomerate id, heap first.
    pub fn conglomerate_ids(&self) -> impl Iterator<Item = ConglomId> + '_ {
        std::iter::once(self.heap).chain(self.indexes.iter().map(|i| i.id))
    }
}

/// One index of a physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalIndex {
    pub id: ConglomId,
    pub name: String,
    pub descriptor: IndexDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableDescriptor {
        let mut table = TableDescriptor::new("APP", "T", TableKind::Base);
        table.columns = vec![
            ColumnDescriptor::new("id", 1, Type::Int4, false),
            ColumnDescriptor::new("name", 2, Type::Varchar, true),
        ];
        table.conglomerates = vec![
            ConglomerateDescriptor::heap(ConglomId::new(1), "T"),
            ConglomerateDescriptor::index(
                ConglomId::new(2),
                "IX",
                IndexDescriptor::new(vec![1], false, false),
            ),
        ];
        table
    }

    #[test]
    fn test_shape_of_physical_table() {
        let TableShape::Physical(physical) = table().shape().unwrap() else {
            panic!("expected physical table");
        };
        assert_eq!(physical.heap, ConglomId::new(1));
        assert_eq!(physical.indexes.len(), 1);
        assert_eq!(physical.indexes[0].name, "IX");
        assert_eq!(
            physical.conglomerate_ids().collect::<Vec<_>>(),
            vec![ConglomId::new(1), ConglomId::new(2)]
        );
    }

    #[test]
    fn test_shape_of_view_ignores_storage() {
        let view = TableDescriptor::new("APP", "V", TableKind::View);
        assert_eq!(view.shape().unwrap(), TableShape::View);
        let vti = TableDescriptor::new("APP", "F", TableKind::Virtual);
        assert_eq!(vti.shape().unwrap(), TableShape::Virtual);
    }

    #[test]
    fn test_shape_requires_exactly_one_heap() {
        let mut missing = table();
        missing.conglomerates.remove(0);
        assert!(matches!(
            missing.shape(),
            Err(CatalogError::MissingHeap { .. })
        ));

        let mut doubled = table();
        doubled
            .conglomerates
            .push(ConglomerateDescriptor::heap(ConglomId::new(3), "T2"));
        assert!(matches!(
            doubled.shape(),
            Err(CatalogError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_lookups() {
        let mut table = table();
        table.constraints.push(ConstraintDescriptor::new(
            "PK",
            ConstraintKind::PrimaryKey,
            Some(ConglomId::new(2)),
        ));
        assert_eq!(table.qualified_name(), "APP.T");
        assert_eq!(table.column(2).map(|c| c.name.as_str()), Some("name"));
        assert!(table.column(3).is_none());
        assert_eq!(
            table.constraint_for_index(ConglomId::new(2)).map(|c| c.kind),
            Some(ConstraintKind::PrimaryKey)
        );
        assert!(table.conglomerate(ConglomId::new(9)).is_none());
    }
}
