//! Core transaction types: TxId and TxState.

use std::fmt;

/// Transaction ID (64-bit).
///
/// TxIds are allocated sequentially starting from 1. TxId 0 is reserved as INVALID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(u64);

impl TxId {
    /// Invalid transaction ID (0).
    pub const INVALID: Self = Self(0);

    /// Create a new transaction ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is an invalid transaction ID.
    pub const fn is_invalid(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Started and not yet terminated.
    InProgress,
    /// Committed; its changes are durable and its locks are released.
    Committed,
    /// Aborted (or abandoned, for nested transactions); its changes were undone.
    Aborted,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::InProgress => "in-progress",
            TxState::Committed => "committed",
            TxState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txid_invalid() {
        assert!(TxId::INVALID.is_invalid());
        assert!(!TxId::new(3).is_invalid());
        assert_eq!(TxId::new(3).as_u64(), 3);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TxState::InProgress.to_string(), "in-progress");
        assert_eq!(TxState::Aborted.to_string(), "aborted");
    }
}
