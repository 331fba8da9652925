//! Thin oracle HTTP adapter (spec §4.3, §6).
//!
//! An HTTP GET against a configured endpoint returning
//! `{coin: {quote: number}}`. Failures return `NaN`; callers must treat
//! `NaN` as "skip this iteration" (spec §4.3).

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct CoinQuote {
    quote: f64,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(flatten)]
    coins: std::collections::HashMap<String, CoinQuote>,
}

pub struct OracleClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OracleClient {
    pub fn new(api_key: Option<String>) -> Self {
        OracleClient {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    /// `query` is the configured oracle query string (a coin identifier,
    /// e.g. `"coingecko:ethereum"`) appended to the base endpoint.
    pub async fn fetch_price(&self, endpoint: &str, query: &str) -> f64 {
        match self.fetch_price_inner(endpoint, query).await {
            Ok(price) => price,
            Err(e) => {
                warn!("oracle query for {query} failed: {e}");
                f64::NAN
            }
        }
    }

    async fn fetch_price_inner(&self, endpoint: &str, query: &str) -> anyhow::Result<f64> {
        let mut url = format!("{endpoint}/{query}");
        if let Some(key) = &self.api_key {
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{sep}api_key={key}");
        }
        let resp: OracleResponse = self.http.get(&url).send().await?.json().await?;
        let quote = resp
            .coins
            .get(query)
            .or_else(|| resp.coins.values().next())
            .ok_or_else(|| anyhow::anyhow!("oracle response missing quote for {query}"))?;
        Ok(quote.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_coin_quote_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/coingecko:ethereum")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"coingecko:ethereum": {"quote": 1850.25}}"#)
            .create_async()
            .await;

        let client = OracleClient::new(None);
        let price = client
            .fetch_price(&server.url(), "coingecko:ethereum")
            .await;
        assert!((price - 1850.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failure_yields_nan() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/coingecko:ethereum")
            .with_status(500)
            .create_async()
            .await;

        let client = OracleClient::new(None);
        let price = client
            .fetch_price(&server.url(), "coingecko:ethereum")
            .await;
        assert!(price.is_nan());
    }
}
