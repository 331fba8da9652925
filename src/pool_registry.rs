//! Pool Registry (spec §4.2).
//!
//! Loads each configured pool by address at startup, verifies it
//! exists, applies any per-chain multicall address override, and caches
//! the handle. Fails loudly at boot on any unresolvable pool; an
//! individual pool failure does not stop loading of the others.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::Address;
use tracing::{error, info};

use crate::config::{Config, PoolConfig};
use crate::sdk::{EthersPoolSdk, PoolSdk};

pub struct RegisteredPool {
    pub config: PoolConfig,
    pub sdk: Arc<dyn PoolSdk>,
}

pub struct PoolRegistry {
    pools: HashMap<Address, RegisteredPool>,
    multicall_address: Option<Address>,
}

impl PoolRegistry {
    /// Loads every pool in `config.pools`. A pool whose handle cannot be
    /// resolved (RPC error, contract not found) is logged loudly and
    /// skipped; the registry still returns successfully as long as at
    /// least the parseable ones loaded.
    pub async fn load<M: Middleware + 'static>(
        client: Arc<M>,
        config: &Config,
    ) -> anyhow::Result<PoolRegistry> {
        let mut pools = HashMap::new();

        for pool_config in &config.pools {
            match Self::load_one(client.clone(), pool_config).await {
                Ok(sdk) => {
                    info!("loaded pool {} at {:?}", pool_config.name, pool_config.address);
                    pools.insert(
                        pool_config.address,
                        RegisteredPool {
                            config: pool_config.clone(),
                            sdk,
                        },
                    );
                }
                Err(e) => {
                    error!(
                        "failed to load pool {} at {:?}: {e}",
                        pool_config.name, pool_config.address
                    );
                }
            }
        }

        if pools.is_empty() && !config.pools.is_empty() {
            anyhow::bail!("no pools could be loaded from config");
        }

        Ok(PoolRegistry {
            pools,
            multicall_address: config.multicall_address,
        })
    }

    /// Per-chain multicall override (spec §4.2); used by engines that
    /// batch reads across many loans in one RPC round trip (mirroring
    /// the teacher's `Multicall` usage in `get_underwater_borrowers`).
    pub fn multicall_address(&self) -> Option<Address> {
        self.multicall_address
    }

    async fn load_one<M: Middleware + 'static>(
        client: Arc<M>,
        pool_config: &PoolConfig,
    ) -> anyhow::Result<Arc<dyn PoolSdk>> {
        // verify the pool exists by checking it has deployed code
        let code = client
            .get_code(pool_config.address, None)
            .await
            .map_err(|e| anyhow::anyhow!("rpc error checking pool code: {e}"))?;
        if code.0.is_empty() {
            anyhow::bail!("no contract code at pool address");
        }

        // token decimals are read once at boot (immutable pool attribute)
        let pool = crate::abi::Pool::new(pool_config.address, client.clone());
        let collateral_token = pool
            .collateral_address()
            .call()
            .await
            .map_err(|e| anyhow::anyhow!("rpc error reading collateral token: {e}"))?;
        let quote_token = pool
            .quote_token_address()
            .call()
            .await
            .map_err(|e| anyhow::anyhow!("rpc error reading quote token: {e}"))?;
        let collateral_decimals = crate::abi::IERC20::new(collateral_token, client.clone())
            .decimals()
            .call()
            .await
            .unwrap_or(18);
        let quote_decimals = crate::abi::IERC20::new(quote_token, client.clone())
            .decimals()
            .call()
            .await
            .unwrap_or(18);

        let sdk = EthersPoolSdk::new(
            client,
            pool_config.address,
            collateral_decimals,
            quote_decimals,
            collateral_token,
            quote_token,
        );
        Ok(Arc::new(sdk))
    }

    pub fn get(&self, address: Address) -> Option<&RegisteredPool> {
        self.pools.get(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPool> {
        self.pools.values()
    }

    pub fn iter_opted_in<'a>(
        &'a self,
        predicate: impl Fn(&PoolConfig) -> bool + 'a,
    ) -> impl Iterator<Item = &'a RegisteredPool> + 'a {
        self.pools.values().filter(move |p| predicate(&p.config))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
