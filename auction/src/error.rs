/// Domain-specific error types for the auction library.
#[derive(Debug, thiserror::Error)]
pub enum AuctionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Bid of {amount} does not exceed highest bid {highest}")]
    BidTooLow { amount: u64, highest: u64 },

    #[error("Auction is settled: {0}")]
    AuctionSettled(String),

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Swarm operation failed: {0}")]
    Swarm(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuctionError {
    /// The acknowledgement string returned to a remote caller for this error.
    pub const fn wire_message(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "Missing fields",
            Self::NotFound(_) => "Not found",
            Self::AlreadyExists(_) => "Already exists",
            Self::BidTooLow { .. } => "Bid too low",
            Self::AuctionSettled(_) => "Auction settled",
            Self::Serialization(_) => "Malformed request",
            Self::Store(_) | Self::Swarm(_) | Self::Other(_) => "Internal error",
        }
    }

    /// Whether this error reflects a caller mistake rather than a local fault.
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Swarm(_) | Self::Other(_))
    }
}

/// Convenience type alias.
pub type AuctionResult<T> = Result<T, AuctionError>;
