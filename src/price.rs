//! Price Resolver (spec §4.3).
//!
//! Resolves a per-pool reference price (WAD) from one of `Fixed`,
//! `Oracle`, or `PoolInternal`. A boolean `invert` flag returns `1/price`
//! (or zero if the raw price is zero).

use std::sync::Arc;

use crate::config::{PoolInternalReference, PriceConfig, PriceSource};
use crate::oracle::OracleClient;
use crate::sdk::PoolSdk;
use crate::wad::Wad;

pub struct PriceResolver {
    oracle: Arc<OracleClient>,
    oracle_endpoint: String,
}

impl PriceResolver {
    pub fn new(oracle: Arc<OracleClient>, oracle_endpoint: String) -> Self {
        PriceResolver {
            oracle,
            oracle_endpoint,
        }
    }

    /// Resolves the configured reference price for `pool`. Returns
    /// `f64::NAN` wrapped as a sentinel WAD when the oracle failed —
    /// callers must check [`is_nan_price`] and skip the iteration.
    pub async fn resolve(&self, config: &PriceConfig, pool: &dyn PoolSdk) -> f64 {
        let raw = match &config.source {
            PriceSource::Fixed { value } => *value,
            PriceSource::Oracle { query } => {
                self.oracle.fetch_price(&self.oracle_endpoint, query).await
            }
            PriceSource::PoolInternal { reference } => {
                match self.resolve_pool_internal(*reference, pool).await {
                    Ok(wad) => wad.to_f64(),
                    Err(_) => f64::NAN,
                }
            }
        };

        if raw.is_nan() {
            return f64::NAN;
        }

        if config.invert {
            if raw == 0.0 {
                0.0
            } else {
                1.0 / raw
            }
        } else {
            raw
        }
    }

    async fn resolve_pool_internal(
        &self,
        reference: PoolInternalReference,
        pool: &dyn PoolSdk,
    ) -> anyhow::Result<Wad> {
        match reference {
            PoolInternalReference::Hpb => Ok(pool.highest_price_bucket().await?.price),
            PoolInternalReference::Htp => pool.highest_threshold_price().await,
            PoolInternalReference::Lup => pool.lowest_utilized_price().await,
            PoolInternalReference::Llb => Ok(pool.lowest_live_bucket().await?.price),
        }
    }
}

pub fn is_nan_price(price: f64) -> bool {
    price.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::BucketInfo;
    use crate::test_support::MockPoolSdk;

    fn pool_with_internal_prices() -> MockPoolSdk {
        let pool = MockPoolSdk::new();
        *pool.hpb.lock().unwrap() = BucketInfo {
            index: 100,
            price: Wad::from_f64(1.2),
            exchange_rate: Wad::from_f64(1.0),
        };
        *pool.htp.lock().unwrap() = Wad::from_f64(1.1);
        *pool.lup.lock().unwrap() = Wad::from_f64(1.0);
        *pool.llb.lock().unwrap() = BucketInfo {
            index: 50,
            price: Wad::from_f64(0.5),
            exchange_rate: Wad::from_f64(1.0),
        };
        pool
    }

    #[tokio::test]
    async fn fixed_price_passes_through() {
        let resolver = PriceResolver::new(Arc::new(OracleClient::new(None)), "http://x".into());
        let config = PriceConfig {
            source: PriceSource::Fixed { value: 1.23 },
            invert: false,
        };
        let pool = pool_with_internal_prices();
        let price = resolver.resolve(&config, &pool).await;
        assert!((price - 1.23).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invert_flips_nonzero_price() {
        let resolver = PriceResolver::new(Arc::new(OracleClient::new(None)), "http://x".into());
        let config = PriceConfig {
            source: PriceSource::Fixed { value: 4.0 },
            invert: true,
        };
        let pool = pool_with_internal_prices();
        let price = resolver.resolve(&config, &pool).await;
        assert!((price - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invert_of_zero_is_zero() {
        let resolver = PriceResolver::new(Arc::new(OracleClient::new(None)), "http://x".into());
        let config = PriceConfig {
            source: PriceSource::Fixed { value: 0.0 },
            invert: true,
        };
        let pool = pool_with_internal_prices();
        let price = resolver.resolve(&config, &pool).await;
        assert_eq!(price, 0.0);
    }

    #[tokio::test]
    async fn pool_internal_hpb_resolves() {
        let resolver = PriceResolver::new(Arc::new(OracleClient::new(None)), "http://x".into());
        let config = PriceConfig {
            source: PriceSource::PoolInternal {
                reference: PoolInternalReference::Hpb,
            },
            invert: false,
        };
        let pool = pool_with_internal_prices();
        let price = resolver.resolve(&config, &pool).await;
        assert!((price - 1.2).abs() < 1e-9);
    }
}
