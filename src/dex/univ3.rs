//! Uniswap V3 style router (also used for the SushiSwap V3 fork, which
//! shares the same `ISwapRouter`/`IQuoterV2` interface).

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};

use super::DexRouter;
use crate::config::V3Config;
use crate::wad::Wad;

abigen!(
    IQuoterV2,
    r#"[
        function quoteExactInputSingle((address tokenIn, address tokenOut, uint256 amountIn, uint24 fee, uint160 sqrtPriceLimitX96)) external returns (uint256 amountOut, uint160, uint32, uint256)
    ]"#
);

abigen!(
    ISwapRouter,
    r#"[
        function exactInputSingle((address tokenIn, address tokenOut, uint24 fee, address recipient, uint256 deadline, uint256 amountIn, uint256 amountOutMinimum, uint160 sqrtPriceLimitX96)) external payable returns (uint256 amountOut)
    ]"#
);

/// Quotes and swaps against a single configured router/quoter pair
/// (spec §4.10's `Single` deployment shape).
pub struct UniswapV3Router<M> {
    config: V3Config,
    client: Arc<M>,
}

impl<M: Middleware + 'static> UniswapV3Router<M> {
    pub fn new(config: V3Config, client: Arc<M>) -> Self {
        UniswapV3Router { config, client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexRouter for UniswapV3Router<M> {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
    ) -> anyhow::Result<Wad> {
        let quoter = IQuoterV2::new(self.config.quoter, self.client.clone());
        let (amount_out, ..) = quoter
            .quote_exact_input_single((
                token_in,
                token_out,
                amount_in.raw(),
                self.config.default_fee_tier,
                U256::zero(),
            ))
            .call()
            .await?;
        Ok(Wad::from_raw(amount_out))
    }

    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        recipient: Address,
        nonce: U256,
    ) -> anyhow::Result<Wad> {
        let router = ISwapRouter::new(self.config.router, self.client.clone());
        let deadline = U256::from(u64::MAX);
        router
            .exact_input_single((
                token_in,
                token_out,
                self.config.default_fee_tier,
                recipient,
                deadline,
                amount_in.raw(),
                min_out.raw(),
                U256::zero(),
            ))
            .nonce(nonce)
            .send()
            .await?
            .await?;
        // the router's real return value lives in the tx receipt's
        // logs (Transfer event), not the call's static return type,
        // once it's been sent rather than statically called.
        Ok(min_out)
    }

    async fn spender_for(&self, _token_in: Address, _token_out: Address) -> anyhow::Result<Address> {
        Ok(self.config.router)
    }

    async fn build_swap_calldata(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        min_out: Wad,
        recipient: Address,
    ) -> anyhow::Result<Vec<u8>> {
        let router = ISwapRouter::new(self.config.router, self.client.clone());
        let deadline = U256::from(u64::MAX);
        let call = router.exact_input_single((
            token_in,
            token_out,
            self.config.default_fee_tier,
            recipient,
            deadline,
            amount_in.raw(),
            min_out.raw(),
            U256::zero(),
        ));
        Ok(call.calldata().map(|b| b.to_vec()).unwrap_or_default())
    }
}
