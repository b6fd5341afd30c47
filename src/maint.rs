//! Table maintenance: consistency checking and in-place compaction.
//!
//! Both entry points work against a [`Catalog`](crate::catalog::Catalog)
//! for metadata and a caller-supplied
//! [`TransactionController`](crate::store::TransactionController) for
//! storage access. Neither commits the caller's transaction.
//!
//! | Type                  | Operation                                      |
//! |-----------------------|------------------------------------------------|
//! | [`ConsistencyChecker`]| Verify heap/index agreement of a table         |
//! | [`Compactor`]         | Purge, defragment, truncate a table            |
//!
//! Handles opened by either are closed before the call returns, whether it
//! succeeds or fails.

mod check;
mod compress;
mod defrag;
mod error;
mod projection;
mod purge;
mod truncate;

pub use check::{CheckReport, ConsistencyChecker, IndexCheck};
pub use compress::{
    Compactor, CompressPhases, CompressSummary, ConglomerateSpace, Phase, PhaseReport,
};
pub use error::{IntegrityViolation, MaintError};
pub use projection::{IndexProjection, ProjectionError};
