//! Price Oracle - external USD price API
//!
//! Fetches unit prices for every asset the jar/farm set touches from a
//! CoinGecko-compatible simple/price endpoint. The table is refreshed as a
//! whole (full-value replace, never a partial edit) and read-only for the
//! metrics pipeline. Missing keys mean "price unknown" and degrade the
//! dependent metric, never the whole fetch.

use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{Error, Result};

/// Internal asset id -> price API coin id
const PRICE_IDS: &[(&str, &str)] = &[
    ("weth", "ethereum"),
    ("dai", "dai"),
    ("usdc", "usd-coin"),
    ("usdt", "tether"),
    ("matic", "matic-network"),
    ("must", "must"),
    ("mai", "mimatic"),
    ("pickle", "pickle-finance"),
];

/// Cache duration (avoid hammering the free tier)
const CACHE_DURATION_SECS: u64 = 30;

// ============================================
// PRICE TABLE
// ============================================

/// Mapping from internal asset id to USD unit price. Refreshed by the
/// oracle, read by the metrics pipeline, never mutated by it.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<String, f64>,
}

impl PriceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from literal pairs (tests and fixtures).
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let prices = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self { prices }
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.prices.get(id).copied()
    }

    pub fn insert(&mut self, id: &str, price: f64) {
        self.prices.insert(id.to_string(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

// ============================================
// PRICE ORACLE
// ============================================

struct CachedPrices {
    table: PriceTable,
    fetched_at: Instant,
}

pub struct PriceOracle {
    http_client: Client,
    base_url: String,
    cache: Arc<RwLock<Option<CachedPrices>>>,
}

impl PriceOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the current price table, serving the cached copy while fresh.
    pub async fn get_prices(&self) -> Result<PriceTable> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed() < Duration::from_secs(CACHE_DURATION_SECS) {
                    return Ok(cached.table.clone());
                }
            }
        }

        let table = self.fetch().await?;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedPrices { table: table.clone(), fetched_at: Instant::now() });
        }

        Ok(table)
    }

    /// Fetch a fresh table. Non-200 responses and transport errors are
    /// ExternalFetch failures; individual missing coins are tolerated.
    pub async fn fetch(&self) -> Result<PriceTable> {
        let coin_ids: Vec<&str> = PRICE_IDS.iter().map(|(_, cg)| *cg).collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url,
            coin_ids.join(",")
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ExternalFetch(format!("price API unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ExternalFetch(format!(
                "price API returned {}",
                response.status()
            )));
        }

        let body: HashMap<String, HashMap<String, Value>> = response
            .json()
            .await
            .map_err(|e| Error::ExternalFetch(format!("malformed price response: {e}")))?;

        let mut table = PriceTable::empty();
        for (internal, coingecko) in PRICE_IDS {
            match body.get(*coingecko).and_then(|q| q.get("usd")).and_then(Value::as_f64) {
                Some(price) => table.insert(internal, price),
                None => warn!("No price for {} ({})", internal, coingecko),
            }
        }

        debug!("Fetched {} prices", table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let table = PriceTable::from_pairs(&[("dai", 1.0), ("weth", 3500.0)]);
        assert_eq!(table.get("dai"), Some(1.0));
        assert_eq!(table.get("weth"), Some(3500.0));
        assert_eq!(table.get("must"), None);
    }

    #[test]
    fn test_empty_table() {
        let table = PriceTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.get("dai"), None);
    }

    #[test]
    fn test_all_price_ids_distinct() {
        let mut seen = std::collections::HashSet::new();
        for (internal, _) in PRICE_IDS {
            assert!(seen.insert(*internal), "duplicate price id: {internal}");
        }
    }
}
