//! Nonce Pipeline (spec §4.11).
//!
//! A single global queue per signing account. Callers submit an async
//! closure that accepts the assigned nonce and is expected to build,
//! sign, submit and await one confirmation of one transaction. The
//! pipeline only releases the next slot once that closure resolves,
//! which keeps exactly one transaction "being submitted" at a time per
//! the data model invariant in spec §3.
//!
//! Modeled as a `tokio::sync::Mutex`-guarded sequential actor, one of
//! the two equivalent shapes spec §9 allows explicitly.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use tokio::sync::Mutex;
use tracing::{info, warn};

struct NonceState {
    next: U256,
}

/// Serializes nonce assignment for a single signing account across all
/// concurrently-running loops (kick, take, bond-collect, lp-collect,
/// reward-queue flush).
pub struct NoncePipeline<M> {
    client: Arc<M>,
    account: Address,
    state: Mutex<NonceState>,
}

impl<M: Middleware + 'static> NoncePipeline<M> {
    /// Seeds the pipeline from the chain's latest transaction count.
    pub async fn new(client: Arc<M>, account: Address) -> Result<Self> {
        let next = client
            .get_transaction_count(account, None)
            .await
            .map_err(|e| anyhow::anyhow!("failed to seed nonce pipeline: {e}"))?;
        Ok(NoncePipeline {
            client,
            account,
            state: Mutex::new(NonceState { next }),
        })
    }

    /// Runs `job` with a freshly assigned, strictly monotonic nonce.
    /// On an observed nonce-gap error the pipeline resyncs from the
    /// chain's transaction count and retries the job exactly once with
    /// the resynced nonce before surfacing the error.
    pub async fn submit<F, Fut, T>(&self, job: F) -> Result<T>
    where
        F: Fn(U256) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = self.state.lock().await;
        let nonce = guard.next;

        match job(nonce).await {
            Ok(value) => {
                guard.next = nonce + 1;
                Ok(value)
            }
            Err(err) if is_nonce_gap_error(&err) => {
                warn!(
                    "nonce gap detected at {}, resyncing from chain and retrying once",
                    nonce
                );
                let resynced = self
                    .client
                    .get_transaction_count(self.account, None)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to resync nonce: {e}"))?;
                guard.next = resynced;
                let retry_nonce = guard.next;
                let result = job(retry_nonce).await;
                match &result {
                    Ok(_) => {
                        guard.next = retry_nonce + 1;
                        info!("nonce resync succeeded at {}", retry_nonce);
                    }
                    Err(e) => {
                        warn!("nonce resync retry failed: {e}");
                    }
                }
                result
            }
            Err(err) => Err(err),
        }
    }
}

fn is_nonce_gap_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("nonce too low") || msg.contains("nonce too high") || msg.contains("nonce gap")
}
