//! Dexscreener-backed `PriceSource`: the aggregator-style primary price
//! source consumed by the Price Feed, with `JupiterRouter` (routing-API
//! derived) as the fallback.
//!
//! Grounded on `jupiter_rate_limiter.rs`'s `reqwest::Client` construction
//! (fixed timeout, one shared client per source) rather than building a new
//! HTTP client per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::errors::PriceFeedError;
use crate::price_feed::PriceSource;

const DEXSCREENER_TOKEN_ENDPOINT: &str = "https://api.dexscreener.com/latest/dex/tokens";

#[derive(Debug, Deserialize)]
struct DexscreenerResponse {
    pairs: Option<Vec<DexscreenerPair>>,
}

#[derive(Debug, Deserialize)]
struct DexscreenerPair {
    #[serde(rename = "priceNative")]
    price_native: Option<String>,
}

pub struct DexscreenerPriceSource {
    client: Client,
}

impl DexscreenerPriceSource {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build dexscreener http client"),
        }
    }
}

impl Default for DexscreenerPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for DexscreenerPriceSource {
    /// Returns the SOL-denominated price (`priceNative` is quoted against
    /// whichever side of the pair is the quote token; pairs are overwhelmingly
    /// SOL-quoted for the pools this crate cares about) of the most liquid
    /// pair reported for `mint`.
    async fn fetch_price(&self, mint: &str) -> Result<f64, PriceFeedError> {
        let url = format!("{DEXSCREENER_TOKEN_ENDPOINT}/{mint}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceFeedError::PriceFetchFailed { reason: e.to_string() })?;

        if !response.status().is_success() {
            return Err(PriceFeedError::PriceFetchFailed {
                reason: format!("dexscreener responded {}", response.status()),
            });
        }

        let body: DexscreenerResponse = response
            .json()
            .await
            .map_err(|e| PriceFeedError::PriceFetchFailed { reason: e.to_string() })?;

        let pair = body
            .pairs
            .and_then(|pairs| pairs.into_iter().next())
            .ok_or_else(|| PriceFeedError::PriceFetchFailed {
                reason: "no pairs reported for mint".to_string(),
            })?;

        let price = pair
            .price_native
            .and_then(|p| p.parse::<f64>().ok())
            .ok_or_else(|| PriceFeedError::PriceFetchFailed {
                reason: "missing or unparseable priceNative".to_string(),
            })?;

        if price <= 0.0 {
            warn!(mint, price, "dexscreener reported non-positive price");
            return Err(PriceFeedError::PriceFetchFailed {
                reason: "non-positive price".to_string(),
            });
        }

        Ok(price)
    }
}
