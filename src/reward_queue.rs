//! Reward Action Queue (spec §4.9).
//!
//! Accumulates `{token, action}` keyed WAD amounts from redemptions
//! across pools, then periodically flushes: a `Transfer` sends the
//! native-decimal amount directly, an `Exchange` routes it through the
//! configured DEX provider. A reward action that keeps failing is
//! retried up to 3 times before being dropped and logged, so one bad
//! token pairing never wedges the whole queue.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::Address;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{DexConfig, RewardAction, RewardDexProvider};
use crate::dex;
use crate::nonce::NoncePipeline;
use crate::wad::Wad;

pub const MAX_RETRIES: u32 = 3;

/// The deterministic, order-independent identity of a queued reward
/// action: same token + same action always collapses to one entry
/// regardless of discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RewardKey {
    pub token: String,
    pub action: String,
}

impl RewardKey {
    pub fn new(token: Address, action: &RewardAction) -> Self {
        let action_tag = match action {
            RewardAction::Transfer { to } => format!("transfer:{:?}", to),
            RewardAction::Exchange {
                target_token,
                dex_provider,
                fee_tier,
                ..
            } => format!(
                "exchange:{}:{:?}:{:?}",
                target_token, dex_provider, fee_tier
            ),
        };
        RewardKey {
            token: format!("{:?}", token),
            action: action_tag,
        }
    }
}

pub struct RewardActionQueue {
    entries: HashMap<RewardKey, (Address, RewardAction, Wad)>,
    retries: HashMap<RewardKey, u32>,
}

impl RewardActionQueue {
    pub fn new() -> Self {
        RewardActionQueue {
            entries: HashMap::new(),
            retries: HashMap::new(),
        }
    }

    /// Accumulates `amount` under `token`'s configured `action`. Calling
    /// this twice for the same token/action pair sums the amounts rather
    /// than overwriting, regardless of discovery order (spec §8 property
    /// 2 — key determinism).
    pub fn enqueue(&mut self, token: Address, action: RewardAction, amount: Wad) {
        let key = RewardKey::new(token, &action);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| (token, action, Wad::ZERO));
        entry.2 = entry.2 + amount;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_amount(&self, token: Address, action: &RewardAction) -> Wad {
        self.entries
            .get(&RewardKey::new(token, action))
            .map(|(_, _, amount)| *amount)
            .unwrap_or(Wad::ZERO)
    }

    /// Drains the queue, handling every entry once. An entry whose
    /// handler fails is kept (with its retry counter bumped) unless it
    /// has now exceeded [`MAX_RETRIES`], in which case it's dropped and
    /// logged (spec §8 property 3 / S5 scenario: the retry bound).
    pub async fn handle_all<M, F, Fut>(&mut self, mut handler: F) -> anyhow::Result<()>
    where
        M: Middleware + 'static,
        F: FnMut(Address, RewardAction, Wad) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let keys: Vec<RewardKey> = self.entries.keys().cloned().collect();
        for key in keys {
            let Some((token, action, amount)) = self.entries.get(&key).cloned() else {
                continue;
            };
            match handler(token, action.clone(), amount).await {
                Ok(()) => {
                    self.entries.remove(&key);
                    self.retries.remove(&key);
                }
                Err(e) => {
                    let count = self.retries.entry(key.clone()).or_insert(0);
                    *count += 1;
                    if *count >= MAX_RETRIES {
                        error!(
                            "reward action for token {} dropped after {} failed attempts: {e}",
                            key.token, count
                        );
                        self.entries.remove(&key);
                        self.retries.remove(&key);
                    } else {
                        warn!(
                            "reward action for token {} failed (attempt {}/{}): {e}",
                            key.token, count, MAX_RETRIES
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for RewardActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a single reward action against a real chain client: a
/// `Transfer` converts WAD to the token's native decimals and sends
/// directly; an `Exchange` resolves the target token (falling back to
/// `weth_address` when `target_token` isn't a known symbol), raises
/// allowance for the resolved router if needed, and routes through the
/// configured DEX provider. Each on-chain transaction draws its own
/// nonce from `pipeline` rather than taking a single fixed nonce, since
/// an `Exchange` may need both an approval and a swap transaction.
pub async fn execute_reward_action<M: Middleware + 'static>(
    client: Arc<M>,
    pipeline: &NoncePipeline<M>,
    dex_config: &DexConfig,
    one_inch_router: Option<Address>,
    token_addresses: &HashMap<String, Address>,
    weth_address: Option<Address>,
    sender: Address,
    decimals: u8,
    token: Address,
    action: RewardAction,
    amount: Wad,
) -> anyhow::Result<()> {
    match action {
        RewardAction::Transfer { to } => {
            let client = client.clone();
            pipeline
                .submit(|nonce| {
                    let client = client.clone();
                    async move {
                        let erc20 = crate::abi::IERC20::new(token, client);
                        erc20
                            .transfer(to, amount.to_token_amount(decimals))
                            .nonce(nonce)
                            .send()
                            .await?
                            .await?;
                        Ok(())
                    }
                })
                .await?;
            info!("transferred {} of {:?} to {:?}", amount, token, to);
            Ok(())
        }
        RewardAction::Exchange {
            target_token,
            slippage,
            dex_provider,
            ..
        } => {
            let target = token_addresses
                .get(&target_token)
                .copied()
                .or(weth_address)
                .ok_or_else(|| anyhow::anyhow!("no resolvable target token for {target_token}"))?;

            let router = dex::resolve_reward_provider(client.clone(), dex_config, one_inch_router, dex_provider)
                .ok_or_else(|| anyhow::anyhow!("no DEX router configured for {:?}", dex_provider))?;

            let quoted = router.quote(token, target, amount).await?;
            let min_out = dex::min_out_with_slippage(quoted, slippage);
            let spender = router.spender_for(token, target).await?;

            let client_for_approve = client.clone();
            pipeline
                .submit(|nonce| {
                    let client = client_for_approve.clone();
                    async move {
                        dex::ensure_allowance(client, token, sender, spender, amount.raw(), nonce).await
                    }
                })
                .await?;

            pipeline
                .submit(|nonce| router.swap(token, target, amount, min_out, sender, nonce))
                .await?;
            info!("exchanged {} of {:?} into {:?} via {:?}", amount, token, target, dex_provider);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::addr;

    #[test]
    fn key_is_order_independent_for_same_token_action() {
        let mut queue = RewardActionQueue::new();
        let action = RewardAction::Transfer { to: addr(5) };
        queue.enqueue(addr(1), action.clone(), Wad::from_f64(1.0));
        queue.enqueue(addr(1), action.clone(), Wad::from_f64(2.0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_amount(addr(1), &action), Wad::from_f64(3.0));
    }

    #[test]
    fn distinct_actions_on_same_token_are_distinct_keys() {
        let mut queue = RewardActionQueue::new();
        let transfer = RewardAction::Transfer { to: addr(5) };
        let exchange = RewardAction::Exchange {
            target_token: "WETH".into(),
            slippage: 0.01,
            dex_provider: RewardDexProvider::UniswapV3,
            fee_tier: Some(3000),
        };
        queue.enqueue(addr(1), transfer, Wad::from_f64(1.0));
        queue.enqueue(addr(1), exchange, Wad::from_f64(1.0));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn s5_drops_after_max_retries() {
        let mut queue = RewardActionQueue::new();
        let action = RewardAction::Transfer { to: addr(5) };
        queue.enqueue(addr(1), action, Wad::from_f64(1.0));

        for _ in 0..MAX_RETRIES {
            queue
                .handle_all::<ethers::providers::Provider<ethers::providers::MockProvider>, _, _>(
                    |_token, _action, _amount| async { Err(anyhow::anyhow!("swap failed")) },
                )
                .await
                .unwrap();
        }

        assert!(queue.is_empty(), "entry must be dropped after MAX_RETRIES failures");
    }

    #[tokio::test]
    async fn successful_handler_clears_entry() {
        let mut queue = RewardActionQueue::new();
        let action = RewardAction::Transfer { to: addr(5) };
        queue.enqueue(addr(1), action, Wad::from_f64(1.0));

        queue
            .handle_all::<ethers::providers::Provider<ethers::providers::MockProvider>, _, _>(
                |_token, _action, _amount| async { Ok(()) },
            )
            .await
            .unwrap();

        assert!(queue.is_empty());
    }
}
