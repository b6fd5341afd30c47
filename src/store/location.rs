//! Storage identities: conglomerate ids and row locations.

use std::fmt;

/// Stable numeric identifier of a conglomerate (a heap or an index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConglomId(u64);

impl ConglomId {
    /// Creates a conglomerate id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConglomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to the current physical position of one heap row.
///
/// Maintenance code only compares locations for equality and hands them
/// back to the storage layer; it never derives one location from another.
/// Index entries embed the location of the row they reference as their
/// trailing column.
///
/// The ordering exists so storage can keep index entries sorted by
/// (key, location). It carries no meaning outside the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowLocation {
    page: u32,
    slot: u16,
}

impl RowLocation {
    /// Creates a location. Only storage implementations mint locations.
    pub(crate) fn new(page: u32, slot: u16) -> Self {
        Self { page, slot }
    }

    pub(crate) fn page(&self) -> u32 {
        self.page
    }

    pub(crate) fn slot(&self) -> u16 {
        self.slot
    }
}

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.page, self.slot)
    }
}
