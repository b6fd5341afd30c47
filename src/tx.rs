//! Transaction bookkeeping for maintenance work.
//!
//! - TxId allocation and lifecycle tracking (in-progress, committed, aborted)
//! - Nested user transactions owned by a parent transaction
//! - Table-level locks scoped to the transaction that acquired them

pub mod error;
pub mod manager;
pub mod types;

pub use error::TxError;
pub use manager::TransactionManager;
pub use types::{TxId, TxState};
