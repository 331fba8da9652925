//! DEX Router abstraction (spec §4.10).
//!
//! A uniform quote/swap interface over whichever concrete liquidity
//! source a pool or reward action is configured to use. Allowance is
//! checked and raised before every on-chain swap via an
//! allowance-then-approve call pair, same shape a unit-per-call
//! approval idiom takes in most keeper bots.

pub mod aggregator;
pub mod curve;
pub mod univ3;

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};

use crate::config::{Config, DexConfig, LiquiditySource, RewardDexProvider};
use crate::error::KeeperError;
use crate::wad::Wad;

/// A deployment shape for a DEX integration (spec §4.10): some
/// providers expose one canonical router (`Single`), some are
/// discovered per-pair through a factory (`Factory`), and some are not
/// configured at all for a given chain (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentShape {
    None,
    Single(Address),
    Factory(Address),
}

#[async_trait]
pub trait DexRouter: Send + Sync {
    /// Quote: how much `token_out` would `amount_in` of `token_in` buy,
    /// without submitting a transaction.
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
    ) -> anyhow::Result<Wad>;

    /// Swap `amount_in` of `token_in` for at least `min_out` of
    /// `token_out`, sent to `recipient`. Returns the amount actually
    /// received.
    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        recipient: Address,
        nonce: U256,
    ) -> anyhow::Result<Wad>;

    /// Address that must hold ERC-20 approval over `token_in` before
    /// `swap` is submitted. Resolved per-call (not a fixed field) since
    /// Curve's spender is the specific pool a pair resolves to.
    async fn spender_for(&self, token_in: Address, token_out: Address) -> anyhow::Result<Address>;

    /// Encodes the calldata an on-chain helper would need to perform
    /// this swap itself, for the External Take path (spec §4.5), where
    /// the helper contract — not this bot — executes the swap.
    async fn build_swap_calldata(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        recipient: Address,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Ensures `spender` can move at least `amount` of `token` from this
/// bot's own balance, raising an unlimited approval if not — same
/// allowance-then-approve shape the teacher uses in `approve_tokens`.
pub async fn ensure_allowance<M: Middleware + 'static>(
    client: Arc<M>,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
    nonce: U256,
) -> anyhow::Result<()> {
    let erc20 = crate::abi::IERC20::new(token, client);
    let allowance = erc20.allowance(owner, spender).call().await?;
    if allowance < amount {
        erc20
            .approve(spender, U256::MAX)
            .nonce(nonce)
            .send()
            .await?
            .await?;
    }
    Ok(())
}

/// Dispatches to the concrete router for a Take Engine's external-take
/// quote source, or `None` if that source isn't configured for this
/// deployment (spec §4.10's `{None, Single, Factory}` shapes).
pub fn resolve_liquidity_source<M: Middleware + 'static>(
    client: Arc<M>,
    dex: &DexConfig,
    source: LiquiditySource,
) -> Option<Box<dyn DexRouter>> {
    match source {
        LiquiditySource::OneInch => None, // resolved per-chain via one_inch_routers, not DexConfig
        LiquiditySource::UniswapV3 => dex
            .universal_v3
            .clone()
            .map(|cfg| Box::new(univ3::UniswapV3Router::new(cfg, client)) as Box<dyn DexRouter>),
        LiquiditySource::SushiSwap => dex
            .sushiswap
            .clone()
            .map(|cfg| Box::new(univ3::UniswapV3Router::new(cfg, client)) as Box<dyn DexRouter>),
        LiquiditySource::Curve => dex
            .curve
            .clone()
            .map(|cfg| Box::new(curve::CurveRouter::new(cfg, client)) as Box<dyn DexRouter>),
    }
}

/// Same dispatch for the Reward Action Queue's `Exchange` action
/// (spec §4.9), which names providers with its own enum since reward
/// actions may target a one-inch aggregator the take path does not.
pub fn resolve_reward_provider<M: Middleware + 'static>(
    client: Arc<M>,
    dex: &DexConfig,
    one_inch_router: Option<Address>,
    provider: RewardDexProvider,
) -> Option<Box<dyn DexRouter>> {
    match provider {
        RewardDexProvider::OneInch => one_inch_router
            .map(|r| Box::new(aggregator::OneInchRouter::new(r, client.clone())) as Box<dyn DexRouter>),
        RewardDexProvider::UniswapV3 => dex
            .universal_v3
            .clone()
            .map(|cfg| Box::new(univ3::UniswapV3Router::new(cfg, client)) as Box<dyn DexRouter>),
        RewardDexProvider::SushiSwap => dex
            .sushiswap
            .clone()
            .map(|cfg| Box::new(univ3::UniswapV3Router::new(cfg, client)) as Box<dyn DexRouter>),
        RewardDexProvider::Curve => dex
            .curve
            .clone()
            .map(|cfg| Box::new(curve::CurveRouter::new(cfg, client)) as Box<dyn DexRouter>),
    }
}

/// Resolves the on-chain helper contract for an External Take (spec
/// §4.5): the aggregator DEX is reached through one universal helper
/// per chain (`Single`), while AMM-style DEXes each have their own
/// taker implementation behind a factory (`Factory`), named directly
/// in config rather than discovered through the factory on-chain.
pub fn resolve_take_helper(source: LiquiditySource, config: &Config) -> DeploymentShape {
    match source {
        LiquiditySource::OneInch => config
            .keeper_taker
            .map(DeploymentShape::Single)
            .unwrap_or(DeploymentShape::None),
        LiquiditySource::UniswapV3 => config
            .taker_contracts
            .as_ref()
            .and_then(|t| t.uniswap_v3)
            .map(DeploymentShape::Factory)
            .unwrap_or(DeploymentShape::None),
        LiquiditySource::SushiSwap => config
            .taker_contracts
            .as_ref()
            .and_then(|t| t.sushiswap)
            .map(DeploymentShape::Factory)
            .unwrap_or(DeploymentShape::None),
        LiquiditySource::Curve => config
            .taker_contracts
            .as_ref()
            .and_then(|t| t.curve)
            .map(DeploymentShape::Factory)
            .unwrap_or(DeploymentShape::None),
    }
}

/// Applies a slippage tolerance (e.g. `0.005` for 0.5%) to a quoted
/// amount to derive the minimum acceptable output.
pub fn min_out_with_slippage(quoted: Wad, slippage: f64) -> Wad {
    let factor = (1.0 - slippage).max(0.0);
    Wad::from_f64(quoted.to_f64() * factor)
}

pub fn swap_failed(msg: impl Into<String>) -> anyhow::Error {
    KeeperError::SwapFailed(msg.into()).into()
}
