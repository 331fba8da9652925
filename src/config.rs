//! Boot-time configuration, loaded once from a JSON file path.
//!
//! Mirrors the teacher's `StateCache` load idiom (`serde_json` +
//! `std::fs::File`) rather than reaching for a config-layering crate:
//! the spec's Non-goals explicitly scope "config file loading" out as a
//! place for novel engineering.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolInternalReference {
    Hpb,
    Htp,
    Lup,
    Llb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PriceSource {
    Fixed {
        value: f64,
    },
    Oracle {
        query: String,
    },
    PoolInternal {
        reference: PoolInternalReference,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(flatten)]
    pub source: PriceSource,
    #[serde(default)]
    pub invert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickConfig {
    pub min_debt: f64,
    pub price_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquiditySource {
    OneInch,
    UniswapV3,
    SushiSwap,
    Curve,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TakeConfig {
    #[serde(default)]
    pub min_collateral: f64,
    pub hpb_price_factor: Option<f64>,
    pub liquidity_source: Option<LiquiditySource>,
    pub market_price_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemSide {
    Quote,
    Collateral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardDexProvider {
    OneInch,
    UniswapV3,
    SushiSwap,
    Curve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RewardAction {
    Transfer {
        to: Address,
    },
    Exchange {
        target_token: String,
        slippage: f64,
        dex_provider: RewardDexProvider,
        fee_tier: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectLpRewardConfig {
    pub redeem_first: RedeemSide,
    pub min_amount_quote: f64,
    pub min_amount_collateral: f64,
    pub reward_action_quote: Option<RewardAction>,
    pub reward_action_collateral: Option<RewardAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub enabled: bool,
    pub min_auction_age: u64,
    pub max_bucket_depth: u64,
    pub max_iterations: u64,
    #[serde(default)]
    pub check_bot_incentive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub address: Address,
    pub price: PriceConfig,
    pub kick: Option<KickConfig>,
    pub take: Option<TakeConfig>,
    #[serde(default)]
    pub collect_bond: bool,
    pub collect_lp_reward: Option<CollectLpRewardConfig>,
    pub settlement: Option<SettlementConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V3Config {
    pub router: Address,
    pub factory: Address,
    pub quoter: Address,
    pub permit2: Option<Address>,
    pub default_fee_tier: u32,
    pub default_slippage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvePoolType {
    Stable,
    Crypto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvePoolConfig {
    pub address: Address,
    pub pool_type: CurvePoolType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurveConfig {
    #[serde(default)]
    pub pool_configs: HashMap<String, CurvePoolConfig>,
    pub default_slippage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexConfig {
    pub universal_v3: Option<V3Config>,
    pub sushiswap: Option<V3Config>,
    pub curve: Option<CurveConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TakerContracts {
    #[serde(default)]
    pub uniswap_v3: Option<Address>,
    #[serde(default)]
    pub sushiswap: Option<Address>,
    #[serde(default)]
    pub curve: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    pub subgraph_url: String,
    pub keystore_path: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    pub delay_between_runs: u64,
    pub delay_between_actions: u64,
    pub multicall_address: Option<Address>,
    pub multicall_block: Option<u64>,
    pub oracle_api_key: Option<String>,
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    pub keeper_taker: Option<Address>,
    pub keeper_taker_factory: Option<Address>,
    pub taker_contracts: Option<TakerContracts>,
    #[serde(default)]
    pub one_inch_routers: HashMap<u64, Address>,

    #[serde(default)]
    pub token_addresses: HashMap<String, Address>,
    #[serde(default)]
    pub connector_tokens: Vec<Address>,
    pub weth_address: Option<Address>,

    #[serde(default)]
    pub dex: DexConfig,

    pub erc20_pool_factory: Option<Address>,
    pub pool_utils: Option<Address>,

    pub pools: Vec<PoolConfig>,
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_oracle_url() -> String {
    "https://coins.llama.fi/prices/current".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        reject_legacy_reward_action_shape(&value)?;
        let config: Config = serde_json::from_value(value)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Open Question #2 in spec §9: two reward-action shapes cannot
    /// coexist. We pick the `dex_provider` enum shape as canonical;
    /// the legacy `use_one_inch: bool` shape is rejected by
    /// `reject_legacy_reward_action_shape` before the typed `Config`
    /// is even parsed, since `RewardAction`'s internally-tagged enum
    /// would otherwise just silently drop the unrecognized field.
    fn validate(&self) -> Result<()> {
        for pool in &self.pools {
            if let Some(take) = &pool.take {
                let has_arb = take.hpb_price_factor.is_some();
                let has_external =
                    take.liquidity_source.is_some() || take.market_price_factor.is_some();
                if has_external
                    && (take.liquidity_source.is_none() || take.market_price_factor.is_none())
                {
                    return Err(anyhow!(
                        "pool {}: external take requires both liquidity_source and market_price_factor",
                        pool.name
                    ));
                }
                let _ = has_arb;
            }
            if let Some(settlement) = &pool.settlement {
                if settlement.max_iterations == 0 {
                    return Err(anyhow!(
                        "pool {}: settlement.max_iterations must be > 0",
                        pool.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Walks every pool's `collect_lp_reward.reward_action_{quote,collateral}`
/// as raw JSON and errors loudly if either still uses the legacy
/// `use_one_inch: bool` shape, which the typed `RewardAction` enum would
/// otherwise silently drop as an unrecognized field.
fn reject_legacy_reward_action_shape(value: &serde_json::Value) -> Result<()> {
    let pools = match value.get("pools").and_then(|p| p.as_array()) {
        Some(pools) => pools,
        None => return Ok(()),
    };
    for pool in pools {
        let pool_name = pool.get("name").and_then(|n| n.as_str()).unwrap_or("<unnamed>");
        let Some(reward_config) = pool.get("collect_lp_reward") else {
            continue;
        };
        for field in ["reward_action_quote", "reward_action_collateral"] {
            if let Some(action) = reward_config.get(field) {
                if action.get("use_one_inch").is_some() {
                    return Err(anyhow!(
                        "pool {pool_name}: {field} uses the legacy `use_one_inch` shape, which is no longer supported; use the `dex_provider` enum shape instead"
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json(take_extra: &str) -> String {
        format!(
            r#"{{
                "rpc_url": "http://localhost:8545",
                "subgraph_url": "http://localhost:8000",
                "keystore_path": "/tmp/keystore.json",
                "delay_between_runs": 60,
                "delay_between_actions": 1,
                "pools": [{{
                    "name": "wbtc-usdc",
                    "address": "0x0000000000000000000000000000000000000001",
                    "price": {{"source": "fixed", "value": 1.0}},
                    {take_extra}
                    "collect_bond": false
                }}]
            }}"#
        )
    }

    #[test]
    fn loads_minimal_config() {
        let json = minimal_json("");
        let config: Config = serde_json::from_str(&json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pools.len(), 1);
    }

    #[test]
    fn rejects_partial_external_take_config() {
        let json = minimal_json(
            r#""take": {"liquidity_source": "one_inch"},"#,
        );
        let config: Config = serde_json::from_str(&json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_legacy_use_one_inch_reward_action_shape() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{
                "pools": [{
                    "name": "wbtc-usdc",
                    "collect_lp_reward": {
                        "reward_action_quote": {"use_one_inch": true}
                    }
                }]
            }"#,
        )
        .unwrap();
        assert!(reject_legacy_reward_action_shape(&value).is_err());
    }

    #[test]
    fn accepts_canonical_dex_provider_reward_action_shape() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{
                "pools": [{
                    "name": "wbtc-usdc",
                    "collect_lp_reward": {
                        "reward_action_quote": {
                            "action": "exchange",
                            "target_token": "USDC",
                            "slippage": 0.01,
                            "dex_provider": "one_inch"
                        }
                    }
                }]
            }"#,
        )
        .unwrap();
        assert!(reject_legacy_reward_action_shape(&value).is_ok());
    }
}
