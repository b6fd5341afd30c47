//! Storage layer consumed by the maintenance subsystem.
//!
//! The traits in [`traits`] are the only way maintenance code touches
//! physical structures. [`MemoryStore`] implements all of them in memory:
//!
//! | Conglomerate | Layout                                           |
//! |--------------|--------------------------------------------------|
//! | Heap         | Slotted pages with byte accounting per page      |
//! | Index        | Sorted map of `(key columns, RowLocation)` entries |
//!
//! Deletes are logical until a purge runs: a deleted row keeps its slot (and
//! an index entry keeps its place) until the deleting transaction has
//! committed and the conglomerate is purged.

mod error;
mod location;
pub mod memory;
mod traits;

pub use error::StoreError;
pub use location::{ConglomId, RowLocation};
pub use memory::{FaultPoint, MemoryConglomerate, MemoryRelocationScan, MemoryScan, MemoryStore, MemoryTransaction};
pub use traits::{
    ColumnSet, ConglomerateController, Isolation, LocatedRow, LockMode, NestedTransaction,
    OpenMode, OpenOptions, Relocated, RelocationScan, ScanController, ScanRange, SearchOp,
    SpaceInfo, TransactionController,
};
