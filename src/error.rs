//! Semantic error taxonomy (spec §7). These are matched by callers that
//! need to branch on a distinguished condition; everything else just
//! flows as an opaque `anyhow::Error` and gets logged at the loop level.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("transient RPC error: {0}")]
    TransientRpc(String),

    #[error("transient subgraph error: {0}")]
    TransientSubgraph(String),

    #[error("oracle query failed: {0}")]
    OracleFailed(String),

    #[error("nonce mismatch, resynced from chain")]
    NonceMismatch,

    #[error("auction not cleared")]
    AuctionNotCleared,

    #[error("swap failed: {0}")]
    SwapFailed(String),
}

impl KeeperError {
    /// True when `err` (or one of its sources) is the distinguished
    /// "auction not cleared" condition that Bond Collector must react to
    /// (spec §4.8 step 5, §7).
    pub fn is_auction_not_cleared(err: &anyhow::Error) -> bool {
        err.downcast_ref::<KeeperError>()
            .map(|e| matches!(e, KeeperError::AuctionNotCleared))
            .unwrap_or(false)
    }
}
