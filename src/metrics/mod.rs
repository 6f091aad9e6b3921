//! Derived-Metrics Pipeline
//!
//! For each jar/farm: batch the on-chain reads (one Multicall3 round trip),
//! combine them with the price table and external stats, and reduce to a
//! per-vault record of APY components, aggregate APY, TVL, and USD per
//! share. Computation is a pure function of the fetched inputs - identical
//! inputs give identical records, and a failure in one vault's inputs only
//! nulls that vault's fields.

pub mod apy;
pub mod fetcher;
pub mod tvl;

pub use apy::{compounding_apy, ApyComponent};
pub use fetcher::{ChainFetcher, RawFarmReadings, RawJarReadings};

use std::collections::HashMap;

use alloy_primitives::Address;
use serde::Serialize;
use tracing::debug;

use crate::farms::{FarmInfo, FarmMetrics};
use crate::jars::JarInfo;
use crate::lending::LendingRates;
use crate::prices::PriceTable;
use crate::subgraph::PairDayStats;

/// Everything the pure computation step reads. Constructed per recompute
/// and passed by reference - no module-level state.
pub struct MetricsContext<'a> {
    pub prices: &'a PriceTable,
    pub pair_stats: &'a HashMap<Address, PairDayStats>,
    pub lending: &'a LendingRates,
}

/// Computed, ephemeral annotation for one jar. Recomputed on every trigger;
/// safe to discard at any time.
#[derive(Debug, Clone, Serialize)]
pub struct JarMetrics {
    pub name: String,
    pub kind: String,
    /// Named APY components (reward emissions, trading fees, ...)
    pub components: Vec<ApyComponent>,
    /// Sum of the simple reward APRs, percent
    pub apr_pct: f64,
    /// Compounded aggregate, percent
    pub total_apy_pct: f64,
    pub tvl_usd: Option<f64>,
    pub usd_per_ptoken: Option<f64>,
    /// Underlying per share; parity when the jar's getRatio reverted
    pub ratio: f64,
}

/// Compute metrics for every jar. Pure and idempotent: no network access,
/// no mutation of inputs.
pub fn compute_all(
    ctx: &MetricsContext<'_>,
    jars: &[JarInfo],
    raw: &[RawJarReadings],
) -> Vec<JarMetrics> {
    jars.iter()
        .zip(raw.iter())
        .map(|(jar, readings)| compute_one(ctx, jar, readings))
        .collect()
}

fn compute_one(ctx: &MetricsContext<'_>, jar: &JarInfo, raw: &RawJarReadings) -> JarMetrics {
    let figures = tvl::measure(jar, raw, ctx.prices);
    let components = apy::components_for(ctx, jar, raw);
    let (apr_pct, total_apy_pct) = apy::aggregate(&components);

    debug!(
        "{}: tvl={:?} apy={:.2}% ({} components)",
        jar.name,
        figures.tvl_usd,
        total_apy_pct,
        components.len()
    );

    JarMetrics {
        name: jar.name.to_string(),
        kind: jar.kind.to_string(),
        components,
        apr_pct,
        total_apy_pct,
        tvl_usd: figures.tvl_usd,
        usd_per_ptoken: figures.usd_per_ptoken,
        ratio: figures.ratio,
    }
}

/// Compute metrics for every farm. The staking token of a farm is a jar
/// share token, so its unit price is that jar's computed usd-per-share;
/// without it the farm's USD figures stay null.
pub fn compute_farms(
    ctx: &MetricsContext<'_>,
    farms: &[FarmInfo],
    raw: &[RawFarmReadings],
    jar_index: &HashMap<String, &JarMetrics>,
) -> Vec<FarmMetrics> {
    farms
        .iter()
        .zip(raw.iter())
        .map(|(farm, readings)| {
            let share_price = jar_index
                .get(&farm.staking_token.to_lowercase())
                .and_then(|m| m.usd_per_ptoken);
            compute_farm(ctx, farm, readings, share_price)
        })
        .collect()
}

fn compute_farm(
    ctx: &MetricsContext<'_>,
    farm: &FarmInfo,
    raw: &RawFarmReadings,
    share_price: Option<f64>,
) -> FarmMetrics {
    let tvl_usd = match (share_price, raw.total_staked) {
        (Some(price), Some(staked)) => Some(staked * price),
        _ => None,
    };

    let reward_price = ctx.prices.get(farm.reward_price_id);
    let reward_apr = apy::staking_reward_apr(
        raw.rewards_duration,
        raw.reward_for_duration,
        raw.total_staked,
        share_price,
        reward_price,
    );

    let (reward_apr_pct, total_apy_pct) = match reward_apr {
        Some(apr) => (Some(apr * 100.0), Some(compounding_apy(apr))),
        None => (None, None),
    };

    FarmMetrics {
        name: farm.name.to_string(),
        reward_apr_pct,
        total_apy_pct,
        tvl_usd,
        user_staked: raw.user_staked,
        user_earned: raw.user_earned,
    }
}

/// Build the staking-token -> jar-metrics index used by `compute_farms`.
pub fn index_by_contract<'a>(
    jars: &[JarInfo],
    metrics: &'a [JarMetrics],
) -> HashMap<String, &'a JarMetrics> {
    jars.iter()
        .zip(metrics.iter())
        .map(|(jar, m)| (jar.contract.to_lowercase(), m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jars::StrategyKind;
    use crate::prices::PriceTable;

    fn plain_jar() -> JarInfo {
        JarInfo {
            name: "pTEST",
            contract: "0x1A602E5f4403ea0A5C06d3DbD22B75d3a2D299D5",
            deposit_token: "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619",
            price_id: "weth",
            kind: StrategyKind::PlainToken,
            pool: None,
            rewards: None,
            reward_price_id: None,
            strategy: None,
        }
    }

    fn ctx_with<'a>(
        prices: &'a PriceTable,
        pair_stats: &'a HashMap<Address, PairDayStats>,
        lending: &'a LendingRates,
    ) -> MetricsContext<'a> {
        MetricsContext { prices, pair_stats, lending }
    }

    #[test]
    fn test_plain_token_tvl_and_share_price() {
        // supply 1000, balance 500, price 2.0 => tvl 1000, usd/share 1.0
        let prices = PriceTable::from_pairs(&[("weth", 2.0)]);
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let raw = RawJarReadings {
            total_supply: Some(1000.0),
            balance: Some(500.0),
            ratio: Some(1.0),
            ..Default::default()
        };

        let metrics = compute_all(&ctx, &[plain_jar()], &[raw]);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].tvl_usd, Some(1000.0));
        assert_eq!(metrics[0].usd_per_ptoken, Some(1.0));
    }

    #[test]
    fn test_missing_price_nulls_fields_without_panicking() {
        let prices = PriceTable::empty();
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let raw = RawJarReadings {
            total_supply: Some(1000.0),
            balance: Some(500.0),
            ratio: Some(1.0),
            ..Default::default()
        };

        let metrics = compute_all(&ctx, &[plain_jar()], &[raw]);
        assert_eq!(metrics[0].tvl_usd, None);
        assert_eq!(metrics[0].usd_per_ptoken, None);
    }

    #[test]
    fn test_partial_failure_isolation() {
        // first jar has no readings at all, second is healthy: the second
        // must still come back fully computed
        let prices = PriceTable::from_pairs(&[("weth", 2.0)]);
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let broken = RawJarReadings::default();
        let healthy = RawJarReadings {
            total_supply: Some(1000.0),
            balance: Some(500.0),
            ratio: Some(1.0),
            ..Default::default()
        };

        let metrics = compute_all(&ctx, &[plain_jar(), plain_jar()], &[broken, healthy]);
        assert_eq!(metrics[0].tvl_usd, None);
        assert_eq!(metrics[1].tvl_usd, Some(1000.0));
        assert_eq!(metrics[1].usd_per_ptoken, Some(1.0));
    }

    #[test]
    fn test_idempotence() {
        let prices = PriceTable::from_pairs(&[("weth", 1234.5)]);
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let raw = RawJarReadings {
            total_supply: Some(42.0),
            balance: Some(21.0),
            ratio: Some(1.05),
            ..Default::default()
        };

        let first = compute_all(&ctx, &[plain_jar()], &[raw.clone()]);
        let second = compute_all(&ctx, &[plain_jar()], &[raw]);
        assert_eq!(first[0].tvl_usd, second[0].tvl_usd);
        assert_eq!(first[0].usd_per_ptoken, second[0].usd_per_ptoken);
        assert_eq!(first[0].total_apy_pct, second[0].total_apy_pct);
    }

    #[test]
    fn test_ratio_revert_falls_back_to_parity() {
        let prices = PriceTable::from_pairs(&[("weth", 2.0)]);
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let raw = RawJarReadings {
            total_supply: Some(1000.0),
            balance: Some(500.0),
            ratio: None, // reverted on chain
            ..Default::default()
        };

        let metrics = compute_all(&ctx, &[plain_jar()], &[raw]);
        assert_eq!(metrics[0].ratio, 1.0);
        // the vault is not failed
        assert_eq!(metrics[0].tvl_usd, Some(1000.0));
    }

    #[test]
    fn test_farm_without_share_price_stays_null() {
        let prices = PriceTable::from_pairs(&[("pickle", 2.5)]);
        let pair_stats = HashMap::new();
        let lending = LendingRates::default();
        let ctx = ctx_with(&prices, &pair_stats, &lending);

        let farm = crate::farms::FarmInfo {
            name: "test-farm",
            gauge: "0x8dF71F2a3Ba42eDBcD68cF4a818fa25318cF2E62",
            staking_token: "0x9eD7e3590F2fB9EEE382dfC55c71F9d3DF12556c",
            reward_price_id: "pickle",
        };
        let raw = RawFarmReadings {
            rewards_duration: Some(604800.0),
            reward_for_duration: Some(1000.0),
            total_staked: Some(5000.0),
            user_staked: None,
            user_earned: None,
        };

        let jar_index = HashMap::new(); // no jar metrics -> no share price
        let farms = compute_farms(&ctx, &[farm], &[raw], &jar_index);
        assert_eq!(farms[0].tvl_usd, None);
        assert_eq!(farms[0].reward_apr_pct, None);
        assert_eq!(farms[0].total_apy_pct, None);
    }
}
