//! Lending-Market Rates Client
//!
//! Fetches the pool list from the lending protocol's public rates API.
//! Lending jars combine these 1-day average rates and emission figures with
//! the strategy's on-chain supplied/borrowed position to produce their APY
//! components. A missing asset or a failed request drops the component,
//! never the jar.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::{Error, Result};

/// Seconds per year as the emission math uses it
const YEAR_SECS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Deserialize)]
pub struct LendingPoolRates {
    #[serde(rename = "underlyingAsset")]
    pub underlying_asset: String,
    #[serde(rename = "avg1DaysLiquidityRate", default)]
    avg_liquidity_rate: String,
    #[serde(rename = "avg1DaysVariableBorrowRate", default)]
    avg_borrow_rate: String,
    #[serde(rename = "aEmissionPerSecond", default)]
    a_emission_per_second: String,
    #[serde(rename = "vEmissionPerSecond", default)]
    v_emission_per_second: String,
    #[serde(rename = "totalLiquidity", default)]
    total_liquidity: String,
    #[serde(rename = "totalDebt", default)]
    total_debt: String,
    #[serde(rename = "referenceItem", default)]
    reference_item: Value,
}

fn num(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

impl LendingPoolRates {
    /// 1-day average supply rate, fractional
    pub fn supply_rate(&self) -> f64 {
        num(&self.avg_liquidity_rate)
    }

    /// 1-day average variable borrow rate, fractional
    pub fn borrow_rate(&self) -> f64 {
        num(&self.avg_borrow_rate)
    }

    fn reference_price_usd(&self) -> f64 {
        match self.reference_item.get("priceInUsd") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => num(s),
            _ => 0.0,
        }
    }

    /// Annualized emission APR on the supply side, fractional. Raw emission
    /// and liquidity figures are both in base units, so the scaling cancels.
    pub fn supply_emission_apr(&self, reward_price_usd: f64) -> f64 {
        let liquidity = num(&self.total_liquidity);
        let reference = self.reference_price_usd();
        if liquidity == 0.0 || reference == 0.0 {
            return 0.0;
        }
        num(&self.a_emission_per_second) * YEAR_SECS * reward_price_usd / liquidity / reference
    }

    /// Annualized emission APR on the borrow side, fractional.
    pub fn borrow_emission_apr(&self, reward_price_usd: f64) -> f64 {
        let debt = num(&self.total_debt);
        let reference = self.reference_price_usd();
        if debt == 0.0 || reference == 0.0 {
            return 0.0;
        }
        num(&self.v_emission_per_second) * YEAR_SECS * reward_price_usd / debt / reference
    }
}

/// Whole-response snapshot of the lending market's pools.
#[derive(Debug, Clone, Default)]
pub struct LendingRates {
    pools: Vec<LendingPoolRates>,
}

impl LendingRates {
    pub fn from_pools(pools: Vec<LendingPoolRates>) -> Self {
        Self { pools }
    }

    /// Look up a pool by underlying asset address (case-insensitive).
    pub fn find(&self, asset: &str) -> Option<&LendingPoolRates> {
        self.pools.iter().find(|p| p.underlying_asset.eq_ignore_ascii_case(asset))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

pub struct LendingRatesClient {
    http_client: Client,
    url: String,
}

impl LendingRatesClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client, url: url.to_string() }
    }

    pub async fn fetch(&self) -> Result<LendingRates> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ExternalFetch(format!("lending API unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ExternalFetch(format!(
                "lending API returned {}",
                response.status()
            )));
        }

        let pools: Vec<LendingPoolRates> = response
            .json()
            .await
            .map_err(|e| Error::ExternalFetch(format!("malformed lending response: {e}")))?;

        debug!("Fetched rates for {} lending pools", pools.len());
        Ok(LendingRates::from_pools(pools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> LendingPoolRates {
        serde_json::from_str(
            r#"{
                "underlyingAsset": "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063",
                "avg1DaysLiquidityRate": "0.025",
                "avg1DaysVariableBorrowRate": "0.04",
                "aEmissionPerSecond": "1000000000000000",
                "vEmissionPerSecond": "500000000000000",
                "totalLiquidity": "2000000000000000000000000",
                "totalDebt": "800000000000000000000000",
                "referenceItem": { "priceInUsd": 1.0 }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rate_parsing() {
        let pool = sample_pool();
        assert!((pool.supply_rate() - 0.025).abs() < 1e-12);
        assert!((pool.borrow_rate() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_emission_apr() {
        let pool = sample_pool();
        // 1e15 * 31_536_000 * 0.5 / 2e24 / 1.0
        let expected = 1e15 * YEAR_SECS * 0.5 / 2e24;
        assert!((pool.supply_emission_apr(0.5) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let rates = LendingRates::from_pools(vec![sample_pool()]);
        assert!(rates.find("0x8f3cf7ad23cd3cadbd9735aff958023239c6a063").is_some());
        assert!(rates.find("0xdead000000000000000000000000000000000000").is_none());
    }

    #[test]
    fn test_zero_liquidity_gives_zero_apr() {
        let mut pool = sample_pool();
        pool.total_liquidity = "0".to_string();
        assert_eq!(pool.supply_emission_apr(0.5), 0.0);
    }
}
