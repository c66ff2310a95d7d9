//! Error types for ledger validation and persistence.

/// First structural fault found by [`crate::model::Ledger::validate`].
///
/// Every fault is recoverable through `Ledger::repair`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainFault {
    /// The chain holds no blocks at all.
    #[error("chain empty")]
    Empty,

    /// Block 0 does not have index 0 and previous hash `"0"`.
    #[error("invalid genesis block")]
    InvalidGenesis,

    /// Stored hash disagrees with the hash recomputed from the block's fields.
    #[error("invalid hash at position {0}")]
    InvalidHash(usize),

    /// `previous_hash` does not match the preceding block's hash.
    #[error("invalid previous-hash link at position {0}")]
    BrokenLink(usize),

    /// Block index differs from its position in the chain.
    #[error("non-sequential index at position {0}")]
    NonSequentialIndex(usize),
}

impl ChainFault {
    /// Chain position the fault refers to, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::InvalidGenesis => Some(0),
            Self::InvalidHash(i) | Self::BrokenLink(i) | Self::NonSequentialIndex(i) => Some(*i),
        }
    }
}

/// Errors raised while saving or loading the ledger file.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The ledger could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
