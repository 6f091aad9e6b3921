//! Pair-Day Statistics Client
//!
//! Pulls the latest day of volume/reserve figures for constant-product
//! pairs from a subgraph endpoint. The trading-fee ("lp") APY component is
//! derived from these. Pairs missing from the response simply have no lp
//! component; a failed request degrades every lp component, never the
//! pipeline.

use alloy_primitives::Address;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::errors::{Error, Result};

/// Latest day of statistics for one pair.
#[derive(Debug, Clone, Copy)]
pub struct PairDayStats {
    pub daily_volume_usd: f64,
    pub reserve_usd: f64,
}

#[derive(Deserialize)]
struct GraphResponse {
    data: Option<GraphData>,
}

#[derive(Deserialize)]
struct GraphData {
    #[serde(rename = "pairDayDatas")]
    pair_day_datas: Vec<PairDayDatum>,
}

#[derive(Deserialize)]
struct PairDayDatum {
    #[serde(rename = "pairAddress")]
    pair_address: String,
    #[serde(rename = "dailyVolumeUSD")]
    daily_volume_usd: String,
    #[serde(rename = "reserveUSD")]
    reserve_usd: String,
}

pub struct SubgraphClient {
    http_client: Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client, url: url.to_string() }
    }

    /// Fetch the latest pair-day entry for each requested pair. Entries come
    /// back date-descending, so the first row per pair is the freshest.
    pub async fn pair_day_stats(
        &self,
        pairs: &[Address],
    ) -> Result<HashMap<Address, PairDayStats>> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let addresses: Vec<String> =
            pairs.iter().map(|a| format!("\"{:?}\"", a).to_lowercase()).collect();
        let query = format!(
            "{{ pairDayDatas(first: {}, orderBy: date, orderDirection: desc, \
             where: {{ pairAddress_in: [{}] }}) \
             {{ pairAddress dailyVolumeUSD reserveUSD }} }}",
            pairs.len() * 3,
            addresses.join(",")
        );

        let body = serde_json::json!({ "query": query });

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ExternalFetch(format!("subgraph unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ExternalFetch(format!(
                "subgraph returned {}",
                response.status()
            )));
        }

        let parsed: GraphResponse = response
            .json()
            .await
            .map_err(|e| Error::ExternalFetch(format!("malformed subgraph response: {e}")))?;

        let mut stats = HashMap::new();
        if let Some(data) = parsed.data {
            for datum in data.pair_day_datas {
                let Ok(address) = Address::from_str(&datum.pair_address) else { continue };
                // first row per pair is the latest day
                if stats.contains_key(&address) {
                    continue;
                }
                let (Ok(volume), Ok(reserve)) =
                    (datum.daily_volume_usd.parse::<f64>(), datum.reserve_usd.parse::<f64>())
                else {
                    continue;
                };
                stats.insert(
                    address,
                    PairDayStats { daily_volume_usd: volume, reserve_usd: reserve },
                );
            }
        }

        debug!("Fetched pair-day stats for {} of {} pairs", stats.len(), pairs.len());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_row_wins() {
        // simulate the parse loop on a date-descending payload
        let payload = r#"{
            "data": { "pairDayDatas": [
                { "pairAddress": "0x1edb2d8f791d2a51d56979bf3a25673d6e783232",
                  "dailyVolumeUSD": "125000.5", "reserveUSD": "2000000" },
                { "pairAddress": "0x1edb2d8f791d2a51d56979bf3a25673d6e783232",
                  "dailyVolumeUSD": "90000", "reserveUSD": "1900000" }
            ] }
        }"#;
        let parsed: GraphResponse = serde_json::from_str(payload).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.pair_day_datas.len(), 2);
        assert_eq!(data.pair_day_datas[0].daily_volume_usd, "125000.5");
    }

    #[test]
    fn test_tolerates_missing_data_key() {
        let parsed: GraphResponse = serde_json::from_str(r#"{"errors": []}"#).unwrap();
        assert!(parsed.data.is_none());
    }
}
