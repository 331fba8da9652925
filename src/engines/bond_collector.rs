//! Bond Collector (spec §4.7).
//!
//! Three-way dispatch on the bot's own kicker record for a pool:
//! nothing locked and something claimable -> withdraw it; something
//! still locked -> the bot has an open auction, try the reactive
//! settlement path and re-check; nothing locked and nothing claimable
//! -> no-op.

use std::time::Duration;

use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use tracing::info;

use crate::config::SettlementConfig;
use crate::engines::settlement;
use crate::nonce::NoncePipeline;
use crate::sdk::PoolSdk;
use crate::wad::Wad;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Withdrew,
    SettledThenWithdrew,
    SettledButStillLocked,
    NoOp,
}

pub async fn collect_bond<S, Fut, ST, FutST, SW, FutSW>(
    pool: &dyn PoolSdk,
    settlement_config: &SettlementConfig,
    bot_address: Address,
    recipient: Address,
    now: u64,
    delay_between_actions: u64,
    sleep: S,
    mut submit_settle: ST,
    mut submit_withdraw: SW,
) -> anyhow::Result<CollectOutcome>
where
    S: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
    ST: FnMut(Address, u64) -> FutST,
    FutST: std::future::Future<Output = anyhow::Result<()>>,
    SW: FnMut(Address, Address, Wad) -> FutSW,
    FutSW: std::future::Future<Output = anyhow::Result<()>>,
{
    let kicker = pool.kicker_info(bot_address).await?;

    if kicker.locked.is_zero() && kicker.claimable.is_zero() {
        return Ok(CollectOutcome::NoOp);
    }

    if kicker.locked.is_zero() {
        info!("withdrawing claimable bond {} for {:?}", kicker.claimable, bot_address);
        submit_withdraw(bot_address, recipient, kicker.claimable).await?;
        return Ok(CollectOutcome::Withdrew);
    }

    // bond still locked: the bot has an open auction on this pool. Try
    // to settle it reactively before re-checking.
    info!("bond locked for {:?}, attempting reactive settlement", bot_address);
    settlement::try_reactive_settlement(
        pool,
        settlement_config,
        bot_address,
        bot_address,
        now,
        delay_between_actions,
        sleep,
        &mut submit_settle,
    )
    .await?;

    let refreshed = pool.kicker_info(bot_address).await?;
    if refreshed.locked.is_zero() && !refreshed.claimable.is_zero() {
        submit_withdraw(bot_address, recipient, refreshed.claimable).await?;
        Ok(CollectOutcome::SettledThenWithdrew)
    } else {
        Ok(CollectOutcome::SettledButStillLocked)
    }
}

/// Submits a bond withdrawal through the Nonce Pipeline, or logs it as a
/// would-be transaction under `dry_run`.
pub async fn submit_withdraw_bonds<M: Middleware + 'static>(
    pool: &dyn PoolSdk,
    pipeline: &NoncePipeline<M>,
    bot_address: Address,
    recipient: Address,
    amount: Wad,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        info!("[dry-run] would withdraw bond {} to {:?}", amount, recipient);
        return Ok(());
    }
    pipeline
        .submit(|nonce: U256| async move {
            pool.withdraw_bonds(bot_address, recipient, amount, nonce).await
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::KickerInfo;
    use crate::test_support::{addr, MockPoolSdk};

    fn base_config() -> SettlementConfig {
        SettlementConfig {
            enabled: true,
            min_auction_age: 0,
            max_bucket_depth: 10,
            max_iterations: 3,
            check_bot_incentive: false,
        }
    }

    #[tokio::test]
    async fn s6_withdraws_when_nothing_locked() {
        let pool = MockPoolSdk::new();
        *pool.kicker.lock().unwrap() = KickerInfo {
            locked: Wad::ZERO,
            claimable: Wad::from_f64(1.0),
        };

        let outcome = collect_bond(
            &pool,
            &base_config(),
            addr(1),
            addr(2),
            0,
            0,
            |_| async {},
            |b, d| async move { pool.settle(b, d, U256::zero()).await },
            |bot, recipient, amount| async move { pool.withdraw_bonds(bot, recipient, amount, U256::zero()).await },
        )
        .await
        .unwrap();

        assert_eq!(outcome, CollectOutcome::Withdrew);
        assert_eq!(pool.withdraw_bonds_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_op_when_nothing_locked_or_claimable() {
        let pool = MockPoolSdk::new();
        let outcome = collect_bond(
            &pool,
            &base_config(),
            addr(1),
            addr(2),
            0,
            0,
            |_| async {},
            |b, d| async move { pool.settle(b, d, U256::zero()).await },
            |bot, recipient, amount| async move { pool.withdraw_bonds(bot, recipient, amount, U256::zero()).await },
        )
        .await
        .unwrap();
        assert_eq!(outcome, CollectOutcome::NoOp);
        assert_eq!(pool.withdraw_bonds_calls.lock().unwrap().len(), 0);
    }
}
