//! Thin subgraph GraphQL adapter (spec §4.4, §4.5, §4.6).
//!
//! The subgraph is a hint, never authoritative: the Kick Engine uses it
//! to find candidate loans sorted by descending threshold price, the
//! Take Engine uses it to enumerate active auctions, and the Settlement
//! Engine uses it to enumerate unsettled auctions before confirming
//! their state on-chain (spec §4.6's "subgraph alone is not
//! authoritative" note).

use ethers::types::Address;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphLoan {
    pub borrower: Address,
    #[serde(rename = "thresholdPrice")]
    pub threshold_price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphAuction {
    pub borrower: Address,
    #[serde(rename = "kickTime")]
    pub kick_time: u64,
}

pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: String) -> Self {
        SubgraphClient {
            http: reqwest::Client::new(),
            url,
        }
    }

    /// Loans sorted by descending threshold price (Kick Engine's scan
    /// order, spec §4.4).
    pub async fn loans_by_descending_threshold_price(
        &self,
        pool: Address,
    ) -> anyhow::Result<Vec<SubgraphLoan>> {
        let query = r#"
            query Loans($pool: String!) {
                loans(where: { pool: $pool }, orderBy: thresholdPrice, orderDirection: desc) {
                    borrower
                    thresholdPrice
                }
            }
        "#;
        let body = json!({ "query": query, "variables": { "pool": format!("{:?}", pool) } });
        let resp: GraphQlResponse<LoansData> =
            self.http.post(&self.url).json(&body).send().await?.json().await?;
        Ok(resp.data.loans)
    }

    /// Active (kicked, not yet settled) auctions in subgraph return
    /// order (Take Engine tie-break rule, spec §4.5).
    pub async fn active_auctions(&self, pool: Address) -> anyhow::Result<Vec<SubgraphAuction>> {
        let query = r#"
            query Auctions($pool: String!) {
                liquidationAuctions(where: { pool: $pool, settled: false }) {
                    borrower
                    kickTime
                }
            }
        "#;
        let body = json!({ "query": query, "variables": { "pool": format!("{:?}", pool) } });
        let resp: GraphQlResponse<AuctionsData> =
            self.http.post(&self.url).json(&body).send().await?.json().await?;
        Ok(resp.data.liquidation_auctions)
    }

    /// Unsettled auctions to run through the Settlement Engine's
    /// discover step (spec §4.6). Same shape as `active_auctions` — the
    /// subgraph makes no distinction, the authoritative filter happens
    /// on-chain.
    pub async fn unsettled_auctions(&self, pool: Address) -> anyhow::Result<Vec<SubgraphAuction>> {
        self.active_auctions(pool).await
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LoansData {
    loans: Vec<SubgraphLoan>,
}

#[derive(Debug, Deserialize)]
struct AuctionsData {
    #[serde(rename = "liquidationAuctions")]
    liquidation_auctions: Vec<SubgraphAuction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_loans_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": {"loans": [{"borrower": "0x0000000000000000000000000000000000000001", "thresholdPrice": "1.2"}]}}"#,
            )
            .create_async()
            .await;

        let client = SubgraphClient::new(server.url());
        let loans = client
            .loans_by_descending_threshold_price(Address::from_low_u64_be(1))
            .await
            .unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].threshold_price, "1.2");
    }
}
