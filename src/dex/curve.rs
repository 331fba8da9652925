//! Curve pool router, supporting both the `stable` and `crypto` pool
//! flavors named in config (spec §4.10). Both expose the same
//! `get_dy`/`exchange` interface on mainnet Curve pools; the
//! `CurvePoolType` distinguishes them only for future pool-specific
//! quirks (e.g. crypto pools' dynamic fee), not the ABI used here.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};

use super::DexRouter;
use crate::config::CurveConfig;
use crate::wad::Wad;

abigen!(
    ICurvePool,
    r#"[
        function get_dy(int128 i, int128 j, uint256 dx) external view returns (uint256)
        function exchange(int128 i, int128 j, uint256 dx, uint256 min_dy) external returns (uint256)
        function coins(uint256 i) external view returns (address)
    ]"#
);

pub struct CurveRouter<M> {
    config: CurveConfig,
    client: Arc<M>,
}

impl<M: Middleware + 'static> CurveRouter<M> {
    pub fn new(config: CurveConfig, client: Arc<M>) -> Self {
        CurveRouter { config, client }
    }

    /// Finds the configured Curve pool whose `coins` include both
    /// `token_in` and `token_out`, along with their pool-local indices.
    async fn find_pool_and_indices(
        &self,
        token_in: Address,
        token_out: Address,
    ) -> anyhow::Result<(Address, i128, i128)> {
        for pool_config in self.config.pool_configs.values() {
            let pool = ICurvePool::new(pool_config.address, self.client.clone());
            let mut index_in = None;
            let mut index_out = None;
            for i in 0..4u64 {
                match pool.coins(U256::from(i)).call().await {
                    Ok(coin) if coin == token_in => index_in = Some(i as i128),
                    Ok(coin) if coin == token_out => index_out = Some(i as i128),
                    _ => {}
                }
            }
            if let (Some(i), Some(j)) = (index_in, index_out) {
                return Ok((pool_config.address, i, j));
            }
        }
        anyhow::bail!("no configured curve pool holds both {token_in:?} and {token_out:?}")
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexRouter for CurveRouter<M> {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
    ) -> anyhow::Result<Wad> {
        let (pool_address, i, j) = self.find_pool_and_indices(token_in, token_out).await?;
        let pool = ICurvePool::new(pool_address, self.client.clone());
        let dy = pool.get_dy(i, j, amount_in.raw()).call().await?;
        Ok(Wad::from_raw(dy))
    }

    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        _recipient: Address,
        nonce: U256,
    ) -> anyhow::Result<Wad> {
        let (pool_address, i, j) = self.find_pool_and_indices(token_in, token_out).await?;
        let pool = ICurvePool::new(pool_address, self.client.clone());
        pool.exchange(i, j, amount_in.raw(), min_out.raw())
            .nonce(nonce)
            .send()
            .await?
            .await?;
        Ok(min_out)
    }

    async fn spender_for(&self, token_in: Address, token_out: Address) -> anyhow::Result<Address> {
        let (pool_address, ..) = self.find_pool_and_indices(token_in, token_out).await?;
        Ok(pool_address)
    }

    async fn build_swap_calldata(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        _recipient: Address,
    ) -> anyhow::Result<Vec<u8>> {
        let (pool_address, i, j) = self.find_pool_and_indices(token_in, token_out).await?;
        let pool = ICurvePool::new(pool_address, self.client.clone());
        let call = pool.exchange(i, j, amount_in.raw(), min_out.raw());
        Ok(call.calldata().map(|b| b.to_vec()).unwrap_or_default())
    }
}
