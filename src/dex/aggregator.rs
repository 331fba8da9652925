//! 1inch aggregator router. Unlike the on-chain `univ3`/`curve` routers,
//! 1inch's router address is only the contract that executes the
//! calldata the off-chain aggregation API returns — quoting and route
//! planning happen over HTTP, the same `reqwest` pattern the Oracle
//! Client in `src/oracle.rs` uses.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::{Address, TransactionRequest, U256};
use serde::Deserialize;

use super::DexRouter;
use crate::wad::Wad;

#[derive(Debug, Deserialize)]
struct OneInchQuoteResponse {
    #[serde(rename = "toAmount")]
    to_amount: String,
}

#[derive(Debug, Deserialize)]
struct OneInchSwapResponse {
    tx: OneInchTx,
    #[serde(rename = "toAmount")]
    to_amount: String,
}

#[derive(Debug, Deserialize)]
struct OneInchTx {
    to: Address,
    data: String,
    value: String,
}

pub struct OneInchRouter<M> {
    router: Address,
    client: Arc<M>,
    http: reqwest::Client,
    api_base: String,
}

impl<M: Middleware + 'static> OneInchRouter<M> {
    pub fn new(router: Address, client: Arc<M>) -> Self {
        OneInchRouter {
            router,
            client,
            http: reqwest::Client::new(),
            api_base: "https://api.1inch.dev/swap/v6.0".to_string(),
        }
    }

    pub fn router_address(&self) -> Address {
        self.router
    }

    async fn fetch_swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        recipient: Address,
    ) -> anyhow::Result<OneInchSwapResponse> {
        let url = format!("{}/swap", self.api_base);
        let resp: OneInchSwapResponse = self
            .http
            .get(&url)
            .query(&[
                ("src", format!("{:?}", token_in)),
                ("dst", format!("{:?}", token_out)),
                ("amount", amount_in.raw().to_string()),
                ("from", format!("{:?}", recipient)),
                ("slippage", "1".to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;
        if resp.tx.to != self.router {
            return Err(super::swap_failed(format!(
                "1inch tx target {:?} does not match configured router {:?}",
                resp.tx.to, self.router
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexRouter for OneInchRouter<M> {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
    ) -> anyhow::Result<Wad> {
        let url = format!("{}/quote", self.api_base);
        let resp: OneInchQuoteResponse = self
            .http
            .get(&url)
            .query(&[
                ("src", format!("{:?}", token_in)),
                ("dst", format!("{:?}", token_out)),
                ("amount", amount_in.raw().to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;
        let raw = U256::from_dec_str(&resp.to_amount)
            .map_err(|e| anyhow::anyhow!("1inch returned non-numeric amount: {e}"))?;
        Ok(Wad::from_raw(raw))
    }

    /// Plans the route against the aggregation API's `/swap` endpoint,
    /// then submits the returned calldata directly to the aggregator's
    /// router contract through the assigned nonce.
    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        _min_out: Wad,
        recipient: Address,
        nonce: U256,
    ) -> anyhow::Result<Wad> {
        let resp = self
            .fetch_swap(token_in, token_out, amount_in, recipient)
            .await?;
        let data = hex::decode(resp.tx.data.trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("1inch returned non-hex calldata: {e}"))?;
        let value = U256::from_dec_str(&resp.tx.value).unwrap_or_default();
        let tx = TransactionRequest::new()
            .to(resp.tx.to)
            .data(data)
            .value(value)
            .nonce(nonce);
        self.client
            .send_transaction(tx, None)
            .await
            .map_err(|e| anyhow::anyhow!("failed to submit 1inch swap tx: {e}"))?
            .await?;
        let raw = U256::from_dec_str(&resp.to_amount)
            .map_err(|e| anyhow::anyhow!("1inch returned non-numeric amount: {e}"))?;
        Ok(Wad::from_raw(raw))
    }

    async fn spender_for(&self, _token_in: Address, _token_out: Address) -> anyhow::Result<Address> {
        Ok(self.router)
    }

    async fn build_swap_calldata(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: Wad,
        _min_out: Wad,
        recipient: Address,
    ) -> anyhow::Result<Vec<u8>> {
        let resp = self
            .fetch_swap(token_in, token_out, amount_in, recipient)
            .await?;
        hex::decode(resp.tx.data.trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("1inch returned non-hex calldata: {e}"))
    }
}
