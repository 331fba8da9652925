//! Settlement Engine (spec §4.6).
//!
//! Discovers auctions that are done accruing (collateral exhausted, debt
//! remaining) but not yet settled, gates on auction age and optionally
//! on bot incentive, then drives `settle` to completion in bounded
//! iterations. Also exposed as a reactive entry point the Bond Collector
//! and LP Collector call before touching a kicker's locked bond or an
//! auction's LP award.

use std::time::Duration;

use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use tracing::{info, warn};

use crate::config::SettlementConfig;
use crate::nonce::NoncePipeline;
use crate::sdk::PoolSdk;
use crate::subgraph::SubgraphClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementReason {
    Completed,
    MaxIterationsReached,
    NotReady,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub borrower: Address,
    pub success: bool,
    pub completed: bool,
    pub iterations: u64,
    pub reason: SettlementReason,
}

/// True when on-chain state says this auction is a settlement candidate:
/// kicked, collateral exhausted, debt still outstanding, and a static
/// `settle` call succeeds. The subgraph's unsettled-auction list is only
/// a hint (spec §4.6) — this is the authoritative filter.
async fn is_settlement_candidate(
    pool: &dyn PoolSdk,
    borrower: Address,
    max_bucket_depth: u64,
) -> anyhow::Result<bool> {
    let auction = pool.auction_info(borrower).await?;
    if auction.kick_time == 0 {
        return Ok(false);
    }
    if !auction.collateral_remaining.is_zero() {
        return Ok(false);
    }
    if auction.debt_remaining.is_zero() {
        return Ok(false);
    }
    pool.simulate_settle(borrower, max_bucket_depth).await
}

fn auction_age_secs(kick_time: u64, now: u64) -> u64 {
    now.saturating_sub(kick_time)
}

/// Drives `settle` against a single borrower to completion or
/// `max_iterations`, whichever comes first, pausing
/// `delay_between_actions` between iterations (spec §4.6 line 103).
/// `now` and `sleep` are injected so tests can run the loop without real
/// wall-clock waits. `submit_settle` performs the actual nonce-pipelined
/// `settle` transaction, left pluggable for the same reason the Kick and
/// Take Engines take a submit closure.
pub async fn settle_borrower<S, Fut, ST, FutST>(
    pool: &dyn PoolSdk,
    config: &SettlementConfig,
    bot_address: Address,
    borrower: Address,
    now: u64,
    delay_between_actions: u64,
    mut sleep: S,
    mut submit_settle: ST,
) -> anyhow::Result<SettlementOutcome>
where
    S: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
    ST: FnMut(Address, u64) -> FutST,
    FutST: std::future::Future<Output = anyhow::Result<()>>,
{
    if !config.enabled {
        return Ok(SettlementOutcome {
            borrower,
            success: false,
            completed: false,
            iterations: 0,
            reason: SettlementReason::Disabled,
        });
    }

    if !is_settlement_candidate(pool, borrower, config.max_bucket_depth).await? {
        return Ok(SettlementOutcome {
            borrower,
            success: false,
            completed: false,
            iterations: 0,
            reason: SettlementReason::NotReady,
        });
    }

    let first = pool.auction_info(borrower).await?;
    if auction_age_secs(first.kick_time, now) < config.min_auction_age {
        return Ok(SettlementOutcome {
            borrower,
            success: false,
            completed: false,
            iterations: 0,
            reason: SettlementReason::NotReady,
        });
    }

    if config.check_bot_incentive && first.kicker != bot_address {
        return Ok(SettlementOutcome {
            borrower,
            success: false,
            completed: false,
            iterations: 0,
            reason: SettlementReason::NotReady,
        });
    }

    let mut iterations = 0u64;
    loop {
        if iterations >= config.max_iterations {
            return Ok(SettlementOutcome {
                borrower,
                success: iterations > 0,
                completed: false,
                iterations,
                reason: SettlementReason::MaxIterationsReached,
            });
        }

        info!("settling borrower {:?}, iteration {}", borrower, iterations + 1);
        submit_settle(borrower, config.max_bucket_depth).await?;
        iterations += 1;

        let state = pool.auction_info(borrower).await?;
        if state.kick_time == 0 {
            return Ok(SettlementOutcome {
                borrower,
                success: true,
                completed: true,
                iterations,
                reason: SettlementReason::Completed,
            });
        }

        sleep(Duration::from_secs(delay_between_actions)).await;
    }
}

/// Reactive entry point (spec §4.6, §4.7 step 2, §4.8 step 5): checks
/// whether `borrower`'s auction needs settling before the caller
/// proceeds with a bond withdrawal or LP redemption, and settles it if
/// so. Returns `false` immediately when nothing needed settling.
pub async fn try_reactive_settlement<S, Fut, ST, FutST>(
    pool: &dyn PoolSdk,
    config: &SettlementConfig,
    bot_address: Address,
    borrower: Address,
    now: u64,
    delay_between_actions: u64,
    sleep: S,
    submit_settle: ST,
) -> anyhow::Result<bool>
where
    S: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
    ST: FnMut(Address, u64) -> FutST,
    FutST: std::future::Future<Output = anyhow::Result<()>>,
{
    if !config.enabled {
        return Ok(false);
    }
    if !is_settlement_candidate(pool, borrower, config.max_bucket_depth).await? {
        return Ok(false);
    }
    let outcome = settle_borrower(
        pool,
        config,
        bot_address,
        borrower,
        now,
        delay_between_actions,
        sleep,
        submit_settle,
    )
    .await?;
    if !outcome.completed {
        warn!(
            "reactive settlement for {:?} did not complete after {} iterations",
            borrower, outcome.iterations
        );
    }
    Ok(outcome.success)
}

/// Scans the subgraph's unsettled-auction hint list and settles every
/// on-chain-confirmed candidate, used by the periodic settlement sweep
/// (distinct from the reactive entry point callers invoke directly).
pub async fn run_settlement_sweep<S, Fut, ST, FutST>(
    pool: &dyn PoolSdk,
    config: &SettlementConfig,
    bot_address: Address,
    subgraph: &SubgraphClient,
    now: u64,
    delay_between_actions: u64,
    mut sleep: S,
    mut submit_settle: ST,
) -> anyhow::Result<Vec<SettlementOutcome>>
where
    S: FnMut(Duration) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
    ST: FnMut(Address, u64) -> FutST + Clone,
    FutST: std::future::Future<Output = anyhow::Result<()>>,
{
    if !config.enabled {
        return Ok(vec![]);
    }
    let candidates = subgraph.unsettled_auctions(pool.address()).await?;
    let mut outcomes = Vec::new();
    for candidate in candidates {
        match settle_borrower(
            pool,
            config,
            bot_address,
            candidate.borrower,
            now,
            delay_between_actions,
            sleep.clone(),
            submit_settle.clone(),
        )
        .await
        {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("settlement sweep: error settling {:?}: {e}", candidate.borrower),
        }
    }
    Ok(outcomes)
}

/// Submits a `settle` call through the Nonce Pipeline, or logs it as a
/// would-be transaction under `dry_run`.
pub async fn submit_settle<M: Middleware + 'static>(
    pool: &dyn PoolSdk,
    pipeline: &NoncePipeline<M>,
    borrower: Address,
    max_bucket_depth: u64,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        info!("[dry-run] would settle borrower {:?}", borrower);
        return Ok(());
    }
    pipeline
        .submit(|nonce: U256| async move { pool.settle(borrower, max_bucket_depth, nonce).await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::AuctionInfo;
    use crate::test_support::{addr, MockPoolSdk};
    use crate::wad::Wad;

    fn auction(kick_time: u64, debt: f64, collateral: f64) -> AuctionInfo {
        AuctionInfo {
            borrower: addr(1),
            kicker: addr(99),
            kick_time,
            auction_price: Wad::ZERO,
            debt_remaining: Wad::from_f64(debt),
            collateral_remaining: Wad::from_f64(collateral),
            reference_bucket: 0,
        }
    }

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
    async fn s4_completes_in_three_iterations() {
        let pool = MockPoolSdk::new();
        pool.set_simulate_settle(true);
        // 3 successive auction_info reads: kicked with debt, then again,
        // then kick_time == 0 (settled).
        pool.queue_auction_sequence(
            addr(1),
            vec![
                auction(100, 5.0, 0.0),
                auction(100, 2.0, 0.0),
                auction(100, 5.0, 0.0),
                auction(100, 1.0, 0.0),
                auction(0, 0.0, 0.0),
            ],
        );

        let outcome = settle_borrower(&pool, &base_config(), addr(1), addr(1), 1_000_000, 0, |_| async {}, |b, d| async move {
            pool.settle(b, d, U256::zero()).await
        })
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.completed);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(pool.settle_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn not_a_candidate_when_collateral_remains() {
        let pool = MockPoolSdk::new();
        pool.set_simulate_settle(true);
        pool.queue_auction_sequence(addr(1), vec![auction(100, 5.0, 1.0)]);

        let outcome = settle_borrower(&pool, &base_config(), addr(1), addr(1), 1_000_000, 0, |_| async {}, |b, d| async move {
            pool.settle(b, d, U256::zero()).await
        })
            .await
            .unwrap();

        assert_eq!(outcome.reason, SettlementReason::NotReady);
        assert_eq!(outcome.iterations, 0);
    }

    #[tokio::test]
    async fn gates_on_min_auction_age() {
        let pool = MockPoolSdk::new();
        pool.set_simulate_settle(true);
        pool.queue_auction_sequence(addr(1), vec![auction(1_000, 5.0, 0.0)]);

        let mut config = base_config();
        config.min_auction_age = 10_000;

        let outcome = settle_borrower(&pool, &config, addr(1), addr(1), 1_005, 0, |_| async {}, |b, d| async move {
            pool.settle(b, d, U256::zero()).await
        })
            .await
            .unwrap();

        assert_eq!(outcome.reason, SettlementReason::NotReady);
    }

    #[tokio::test]
    async fn stops_at_max_iterations_when_not_yet_settled() {
        let pool = MockPoolSdk::new();
        pool.set_simulate_settle(true);
        pool.queue_auction_sequence(
            addr(1),
            vec![
                auction(100, 5.0, 0.0),
                auction(100, 5.0, 0.0),
                auction(100, 5.0, 0.0),
                auction(100, 5.0, 0.0),
            ],
        );

        let mut config = base_config();
        config.max_iterations = 2;

        let outcome = settle_borrower(&pool, &config, addr(1), addr(1), 1_000_000, 0, |_| async {}, |b, d| async move {
            pool.settle(b, d, U256::zero()).await
        })
            .await
            .unwrap();

        assert_eq!(outcome.reason, SettlementReason::MaxIterationsReached);
        assert!(!outcome.completed);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn disabled_config_short_circuits() {
        let pool = MockPoolSdk::new();
        let mut config = base_config();
        config.enabled = false;

        let outcome = settle_borrower(&pool, &config, addr(1), addr(1), 0, 0, |_| async {}, |b, d| async move {
            pool.settle(b, d, U256::zero()).await
        })
            .await
            .unwrap();

        assert_eq!(outcome.reason, SettlementReason::Disabled);
        assert_eq!(pool.settle_calls.lock().unwrap().len(), 0);
    }
}
