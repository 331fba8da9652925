//! Take Engine (spec §4.5).
//!
//! Two independent take strategies per pool, tried in order: ArbTake
//! (internal-book take against the highest price bucket, when the
//! auction price has fallen enough relative to it) and External Take
//! (spot-routed through a DEX Router and an on-chain helper, when a
//! `liquidity_source`/`market_price_factor` pair is configured).

use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use tracing::{info, warn};

use crate::config::TakeConfig;
use crate::dex::{self, DexRouter};
use crate::nonce::NoncePipeline;
use crate::sdk::PoolSdk;
use crate::subgraph::SubgraphClient;
use crate::wad::Wad;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeMode {
    ArbTake,
    ExternalTake,
}

pub struct TakeOutcome {
    pub borrower: Address,
    pub mode: TakeMode,
}

/// ArbTake eligibility (spec §4.5): the auction price must have fallen
/// below `hpb_price * hpb_price_factor`, and enough collateral must
/// remain to be worth taking.
async fn arb_take_eligible(
    pool: &dyn PoolSdk,
    take_config: &TakeConfig,
    borrower: Address,
) -> anyhow::Result<bool> {
    let Some(hpb_factor) = take_config.hpb_price_factor else {
        return Ok(false);
    };
    let auction = pool.auction_info(borrower).await?;
    if auction.collateral_remaining.to_f64() < take_config.min_collateral {
        return Ok(false);
    }
    let hpb = pool.highest_price_bucket().await?;
    Ok(auction.auction_price.to_f64() < hpb.price.to_f64() * hpb_factor)
}

/// External-take eligibility: the auction price must have fallen below
/// `market_price * market_price_factor`, where `market_price` is a spot
/// quote from the configured DEX Router.
async fn external_take_eligible(
    pool: &dyn PoolSdk,
    take_config: &TakeConfig,
    router: Option<&dyn DexRouter>,
    collateral_token: Address,
    quote_token: Address,
    borrower: Address,
) -> anyhow::Result<bool> {
    let Some(market_factor) = take_config.market_price_factor else {
        return Ok(false);
    };
    let Some(router) = router else {
        return Ok(false);
    };
    let auction = pool.auction_info(borrower).await?;
    if auction.collateral_remaining.is_zero() {
        return Ok(false);
    }
    let quoted = router
        .quote(collateral_token, quote_token, auction.collateral_remaining)
        .await?;
    let market_price = quoted.to_f64() / auction.collateral_remaining.to_f64();
    Ok(auction.auction_price.to_f64() < market_price * market_factor)
}

/// Scans the subgraph's active-auction list for `pool` and takes the
/// first eligible auction under either mode, trying ArbTake first
/// (spec §4.5's tie-break: ArbTake is tried before External Take).
/// `submit_arb_take`/`submit_external_take` perform the actual nonce-
/// pipelined transaction, left pluggable so this function stays testable
/// without a live chain client (mirrors the Kick Engine's `submit`
/// closure shape).
pub async fn run_take_scan<FArb, FutArb, FExt, FutExt>(
    pool: &dyn PoolSdk,
    take_config: &TakeConfig,
    router: Option<&dyn DexRouter>,
    helper: Option<Address>,
    collateral_token: Address,
    quote_token: Address,
    subgraph: &SubgraphClient,
    mut submit_arb_take: FArb,
    mut submit_external_take: FExt,
) -> anyhow::Result<Vec<TakeOutcome>>
where
    FArb: FnMut(Address, u32) -> FutArb,
    FutArb: std::future::Future<Output = anyhow::Result<()>>,
    FExt: FnMut(Address, Wad, Address, Vec<u8>) -> FutExt,
    FutExt: std::future::Future<Output = anyhow::Result<()>>,
{
    let auctions = subgraph.active_auctions(pool.address()).await?;
    let mut outcomes = Vec::new();

    for candidate in auctions {
        match arb_take_eligible(pool, take_config, candidate.borrower).await {
            Ok(true) => {
                let hpb = pool.highest_price_bucket().await?;
                info!("arb-taking borrower {:?} at bucket {}", candidate.borrower, hpb.index);
                submit_arb_take(candidate.borrower, hpb.index).await?;
                outcomes.push(TakeOutcome {
                    borrower: candidate.borrower,
                    mode: TakeMode::ArbTake,
                });
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("take: error checking arb-take eligibility for {:?}: {e}", candidate.borrower);
                continue;
            }
        }

        match external_take_eligible(
            pool,
            take_config,
            router,
            collateral_token,
            quote_token,
            candidate.borrower,
        )
        .await
        {
            Ok(true) => {
                let Some(helper_address) = helper else {
                    warn!(
                        "take: external-take eligible for {:?} but no helper contract configured, skipping",
                        candidate.borrower
                    );
                    continue;
                };
                let router_ref = router.expect("external_take_eligible only returns true when router is Some");
                let auction = pool.auction_info(candidate.borrower).await?;
                let quoted = router_ref
                    .quote(collateral_token, quote_token, auction.collateral_remaining)
                    .await?;
                let tolerance = (1.0 - take_config.market_price_factor.unwrap_or(1.0)).clamp(0.0, 1.0);
                let min_out = dex::min_out_with_slippage(quoted, tolerance);
                let calldata = router_ref
                    .build_swap_calldata(
                        collateral_token,
                        quote_token,
                        auction.collateral_remaining,
                        min_out,
                        helper_address,
                    )
                    .await?;
                info!("external-taking borrower {:?}", candidate.borrower);
                submit_external_take(
                    candidate.borrower,
                    auction.collateral_remaining,
                    helper_address,
                    calldata,
                )
                .await?;
                outcomes.push(TakeOutcome {
                    borrower: candidate.borrower,
                    mode: TakeMode::ExternalTake,
                });
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    "take: error checking external-take eligibility for {:?}: {e}",
                    candidate.borrower
                );
            }
        }
    }

    Ok(outcomes)
}

/// Submits an ArbTake through the Nonce Pipeline, or logs it as a
/// would-be transaction under `dry_run`.
pub async fn submit_arb_take<M: Middleware + 'static>(
    pool: &dyn PoolSdk,
    pipeline: &NoncePipeline<M>,
    borrower: Address,
    bucket_index: u32,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        info!("[dry-run] would arb-take borrower {:?} at bucket {}", borrower, bucket_index);
        return Ok(());
    }
    pipeline
        .submit(|nonce: U256| async move { pool.bucket_take(borrower, bucket_index, true, nonce).await })
        .await
}

/// Submits an External Take through the Nonce Pipeline, or logs it as a
/// would-be transaction under `dry_run`.
pub async fn submit_external_take<M: Middleware + 'static>(
    pool: &dyn PoolSdk,
    pipeline: &NoncePipeline<M>,
    borrower: Address,
    max_amount: Wad,
    helper: Address,
    swap_calldata: Vec<u8>,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        info!("[dry-run] would external-take borrower {:?} via helper {:?}", borrower, helper);
        return Ok(());
    }
    pipeline
        .submit(|nonce: U256| {
            let swap_calldata = swap_calldata.clone();
            async move { pool.external_take(borrower, max_amount, helper, swap_calldata, nonce).await }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{AuctionInfo, BucketInfo};
    use crate::test_support::{addr, MockPoolSdk};

    fn auction(price: f64, collateral: f64) -> AuctionInfo {
        AuctionInfo {
            borrower: addr(1),
            kicker: addr(2),
            kick_time: 1,
            auction_price: Wad::from_f64(price),
            debt_remaining: Wad::from_f64(10.0),
            collateral_remaining: Wad::from_f64(collateral),
            reference_bucket: 0,
        }
    }

    async fn run_with_subgraph(pool: &MockPoolSdk, take_config: &TakeConfig) -> Vec<TakeOutcome> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"data": {{"liquidationAuctions": [{{"borrower": "{:?}", "kickTime": 1}}]}}}}"#,
                addr(1)
            ))
            .create_async()
            .await;
        let subgraph = SubgraphClient::new(server.url());
        let arb_calls = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let arb_calls_clone = arb_calls.clone();
        run_take_scan(
            pool,
            take_config,
            None,
            None,
            addr(10),
            addr(11),
            &subgraph,
            move |borrower, bucket_index| {
                let arb_calls = arb_calls_clone.clone();
                async move {
                    arb_calls.lock().await.push((borrower, bucket_index));
                    Ok(())
                }
            },
            |_, _, _, _| async { Ok(()) },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn s3_arb_take_executes_when_price_below_hpb_factor() {
        let pool = MockPoolSdk::new();
        pool.queue_auction_sequence(addr(1), vec![auction(0.8, 1.0)]);
        *pool.hpb.lock().unwrap() = BucketInfo {
            index: 42,
            price: Wad::from_f64(1.0),
            exchange_rate: Wad::from_f64(1.0),
        };

        let take_config = TakeConfig {
            min_collateral: 0.01,
            hpb_price_factor: Some(0.9), // 0.8 < 1.0 * 0.9
            liquidity_source: None,
            market_price_factor: None,
        };

        let outcomes = run_with_subgraph(&pool, &take_config).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].mode, TakeMode::ArbTake);
    }

    #[tokio::test]
    async fn no_take_when_price_above_hpb_factor() {
        let pool = MockPoolSdk::new();
        pool.queue_auction_sequence(addr(1), vec![auction(1.5, 1.0)]);
        *pool.hpb.lock().unwrap() = BucketInfo {
            index: 42,
            price: Wad::from_f64(1.0),
            exchange_rate: Wad::from_f64(1.0),
        };

        let take_config = TakeConfig {
            min_collateral: 0.01,
            hpb_price_factor: Some(0.9),
            liquidity_source: None,
            market_price_factor: None,
        };

        let outcomes = run_with_subgraph(&pool, &take_config).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn skips_when_collateral_below_minimum() {
        let pool = MockPoolSdk::new();
        pool.queue_auction_sequence(addr(1), vec![auction(0.1, 0.001)]);
        *pool.hpb.lock().unwrap() = BucketInfo {
            index: 42,
            price: Wad::from_f64(1.0),
            exchange_rate: Wad::from_f64(1.0),
        };

        let take_config = TakeConfig {
            min_collateral: 0.01,
            hpb_price_factor: Some(0.9),
            liquidity_source: None,
            market_price_factor: None,
        };

        let outcomes = run_with_subgraph(&pool, &take_config).await;
        assert!(outcomes.is_empty());
    }
}
