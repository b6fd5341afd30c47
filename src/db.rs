//! In-memory database wiring a catalog to a store.
//!
//! [`MemoryDatabase`] owns a [`MemoryCatalog`](crate::catalog::MemoryCatalog)
//! and a [`MemoryStore`](crate::store::MemoryStore) and keeps the two in
//! step: creating a table allocates its heap, creating an index allocates the
//! index conglomerate and backfills it, and row inserts and deletes maintain
//! every index of the table.
//!
//! ```text
//! +------------------------------------------------------------+
//! |                      MemoryDatabase                        |
//! |                                                            |
//! |  +----------------+   descriptors   +-------------------+  |
//! |  | MemoryCatalog  |---------------->| ConsistencyChecker|  |
//! |  | (tables, idx,  |                 | Compactor         |  |
//! |  |  constraints)  |                 +---------+---------+  |
//! |  +----------------+                           |            |
//! |                                               | tx         |
//! |  +----------------+                           v            |
//! |  | MemoryStore    |<------------- MemoryTransaction        |
//! |  | (heaps, index) |                                        |
//! |  +----------------+                                        |
//! +------------------------------------------------------------+
//! ```

mod database;
mod error;

pub use database::MemoryDatabase;
pub use error::DatabaseError;
