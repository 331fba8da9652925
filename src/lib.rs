//! Autonomous liquidation keeper bot library.
//!
//! See `SPEC_FULL.md` and `DESIGN.md` at the repository root for the
//! module-by-module grounding ledger.

pub mod abi;
pub mod config;
pub mod dex;
pub mod engines;
pub mod error;
pub mod keystore;
pub mod logging;
pub mod metrics;
pub mod nonce;
pub mod oracle;
pub mod pool_registry;
pub mod price;
pub mod reward_queue;
pub mod sdk;
pub mod subgraph;
pub mod supervisor;
pub mod wad;

#[cfg(test)]
pub mod test_support;
