//! APY Components and Aggregation
//!
//! Each jar carries a list of named yield components. Reward emissions are
//! auto-compounded by the strategy, trading fees accrue linearly; the
//! aggregate therefore compounds the former and adds the latter on top.
//! Any component whose inputs are missing is dropped, the rest still count.

use serde::Serialize;
use std::str::FromStr;

use alloy_primitives::Address;

use super::fetcher::{RawJarReadings, RawStakingReadings};
use super::tvl;
use super::MetricsContext;
use crate::jars::{JarInfo, StrategyKind};

/// Fraction of gross rewards kept after the performance fee
const PERFORMANCE_FEE_KEEP: f64 = 0.8;

/// Reward periods are annualized over a 360-day year
const STAKING_YEAR_SECS: f64 = 360.0 * 24.0 * 3600.0;

/// LP share of the swap fee, per unit of volume
const LP_FEE_SHARE: f64 = 0.0025;

/// One named slice of a jar's yield.
#[derive(Debug, Clone, Serialize)]
pub struct ApyComponent {
    pub name: String,
    /// Simple annual rate, percent
    pub pct: f64,
    /// Whether the strategy auto-compounds this component
    pub compounds: bool,
}

impl ApyComponent {
    fn compounding(name: &str, pct: f64) -> Self {
        Self { name: name.to_string(), pct, compounds: true }
    }

    fn simple(name: &str, pct: f64) -> Self {
        Self { name: name.to_string(), pct, compounds: false }
    }
}

/// Daily-compounded APY (percent) for a fractional APR.
pub fn compounding_apy(apr: f64) -> f64 {
    100.0 * ((1.0 + apr / 365.0).powf(365.0) - 1.0)
}

/// Reduce components to (simple APR %, compounded total APY %).
pub fn aggregate(components: &[ApyComponent]) -> (f64, f64) {
    let apr_pct: f64 = components.iter().map(|c| c.pct).sum();
    let compoundable: f64 =
        components.iter().filter(|c| c.compounds).map(|c| c.pct).sum();
    let simple: f64 = components.iter().filter(|c| !c.compounds).map(|c| c.pct).sum();
    (apr_pct, compounding_apy(compoundable / 100.0) + simple)
}

/// Fractional APR a staking-rewards contract pays, net of the performance
/// fee. None when any input is missing or nothing is staked.
pub fn staking_reward_apr(
    rewards_duration_secs: Option<f64>,
    reward_for_duration: Option<f64>,
    total_staked: Option<f64>,
    staked_token_price: Option<f64>,
    reward_price: Option<f64>,
) -> Option<f64> {
    let duration = rewards_duration_secs?;
    let reward = reward_for_duration?;
    let staked = total_staked?;
    let staked_price = staked_token_price?;
    let reward_price = reward_price?;

    if duration <= 0.0 {
        return None;
    }
    let staked_value = staked * staked_price;
    if staked_value <= 0.0 {
        return None;
    }

    let rewards_per_year = reward * (STAKING_YEAR_SECS / duration);
    Some(PERFORMANCE_FEE_KEEP * rewards_per_year * reward_price / staked_value)
}

/// Trading-fee APY (percent) from one day of pair volume.
pub fn trading_fee_apy(daily_volume_usd: f64, reserve_usd: f64) -> f64 {
    if reserve_usd <= 0.0 {
        return 0.0;
    }
    daily_volume_usd * LP_FEE_SHARE / reserve_usd * 365.0 * 100.0
}

/// Net fractional APR of a lending position: interest earned on the
/// supplied side minus interest paid on the borrowed side, over the jar's
/// balance in the strategy.
pub fn lending_base_apr(
    supply_rate: f64,
    borrow_rate: f64,
    supplied: f64,
    borrowed: f64,
    balance: f64,
) -> Option<f64> {
    if balance <= 0.0 {
        return None;
    }
    Some((supply_rate * supplied - borrow_rate * borrowed) / balance)
}

/// Fractional APR of the lending market's reward emissions on both sides of
/// the position, net of the performance fee.
pub fn lending_emission_apr(
    supply_emission_apr: f64,
    borrow_emission_apr: f64,
    supplied: f64,
    borrowed: f64,
    balance: f64,
) -> Option<f64> {
    if balance <= 0.0 {
        return None;
    }
    Some(
        PERFORMANCE_FEE_KEEP
            * (supply_emission_apr * supplied + borrow_emission_apr * borrowed)
            / balance,
    )
}

/// Derive the component list for one jar from its raw readings. Purely a
/// function of the inputs.
pub fn components_for(
    ctx: &MetricsContext<'_>,
    jar: &JarInfo,
    raw: &RawJarReadings,
) -> Vec<ApyComponent> {
    let mut components = Vec::new();

    match jar.kind {
        StrategyKind::ConstantProductLp => {
            if let Some(stats) = Address::from_str(jar.deposit_token)
                .ok()
                .and_then(|pair| ctx.pair_stats.get(&pair))
            {
                components.push(ApyComponent::simple(
                    "lp",
                    trading_fee_apy(stats.daily_volume_usd, stats.reserve_usd),
                ));
            }

            if let Some(staking) = &raw.staking {
                let lp_price = raw.pair.as_ref().and_then(|p| tvl::lp_unit_price(p, ctx.prices));
                push_reward_component(&mut components, jar, staking, lp_price, ctx);
            }
        }

        StrategyKind::StakingWrapper => {
            if let Some(staking) = &raw.staking {
                let deposit_price = ctx.prices.get(jar.price_id);
                push_reward_component(&mut components, jar, staking, deposit_price, ctx);
            }
        }

        StrategyKind::LendingMarket => {
            if let (Some(pool), Some(lending)) =
                (ctx.lending.find(jar.deposit_token), &raw.lending)
            {
                if let (Some(supplied), Some(borrowed), Some(balance)) =
                    (lending.supplied, lending.borrowed, lending.pool_balance)
                {
                    if let Some(apr) = lending_base_apr(
                        pool.supply_rate(),
                        pool.borrow_rate(),
                        supplied,
                        borrowed,
                        balance,
                    ) {
                        components.push(ApyComponent::compounding("lend", apr * 100.0));
                    }

                    let reward_price = jar
                        .reward_price_id
                        .and_then(|id| ctx.prices.get(id))
                        .unwrap_or(0.0);
                    if reward_price > 0.0 {
                        if let Some(apr) = lending_emission_apr(
                            pool.supply_emission_apr(reward_price),
                            pool.borrow_emission_apr(reward_price),
                            supplied,
                            borrowed,
                            balance,
                        ) {
                            let name = jar.reward_price_id.unwrap_or("emission");
                            components.push(ApyComponent::compounding(name, apr * 100.0));
                        }
                    }
                }
            }
        }

        StrategyKind::PlainToken | StrategyKind::StablePoolLp => {}
    }

    components
}

fn push_reward_component(
    components: &mut Vec<ApyComponent>,
    jar: &JarInfo,
    staking: &RawStakingReadings,
    staked_token_price: Option<f64>,
    ctx: &MetricsContext<'_>,
) {
    let reward_price = jar.reward_price_id.and_then(|id| ctx.prices.get(id));
    if let Some(apr) = staking_reward_apr(
        staking.rewards_duration,
        staking.reward_for_duration,
        staking.total_staked,
        staked_token_price,
        reward_price,
    ) {
        let name = jar.reward_price_id.unwrap_or("reward");
        components.push(ApyComponent::compounding(name, apr * 100.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compounding_apy_ten_percent() {
        // daily compounding of 10% APR lands at ~10.5156%
        let apy = compounding_apy(0.10);
        assert!((apy - 10.515578161623251).abs() < 1e-9, "got {apy}");
    }

    #[test]
    fn test_compounding_apy_zero() {
        assert_eq!(compounding_apy(0.0), 0.0);
    }

    #[test]
    fn test_aggregate_compounds_rewards_adds_fees() {
        let components = vec![
            ApyComponent::compounding("must", 10.0),
            ApyComponent::simple("lp", 5.0),
        ];
        let (apr, total) = aggregate(&components);
        assert_eq!(apr, 15.0);
        assert!((total - (compounding_apy(0.10) + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty() {
        let (apr, total) = aggregate(&[]);
        assert_eq!(apr, 0.0);
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_staking_reward_apr() {
        // reward period exactly one 360-day year: 1000 reward tokens at $2
        // against $10_000 staked => gross 20%, net 16% after the fee
        let apr = staking_reward_apr(
            Some(STAKING_YEAR_SECS),
            Some(1000.0),
            Some(1000.0),
            Some(10.0),
            Some(2.0),
        )
        .unwrap();
        assert!((apr - 0.16).abs() < 1e-12);
    }

    #[test]
    fn test_staking_reward_apr_missing_input() {
        assert!(staking_reward_apr(None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)).is_none());
        assert!(
            staking_reward_apr(Some(1.0), Some(1.0), Some(0.0), Some(1.0), Some(1.0)).is_none()
        );
    }

    #[test]
    fn test_trading_fee_apy() {
        // $1M daily volume over $10M reserves
        let apy = trading_fee_apy(1_000_000.0, 10_000_000.0);
        assert!((apy - 9.125).abs() < 1e-9);
        assert_eq!(trading_fee_apy(1_000_000.0, 0.0), 0.0);
    }

    #[test]
    fn test_lending_base_apr() {
        // supplied 2000 at 2.5%, borrowed 800 at 4%, balance 1200
        let apr = lending_base_apr(0.025, 0.04, 2000.0, 800.0, 1200.0).unwrap();
        assert!((apr - (0.025 * 2000.0 - 0.04 * 800.0) / 1200.0).abs() < 1e-12);
        assert!(lending_base_apr(0.025, 0.04, 2000.0, 800.0, 0.0).is_none());
    }

    #[test]
    fn test_lending_emission_apr_applies_fee() {
        let apr = lending_emission_apr(0.10, 0.05, 1000.0, 0.0, 1000.0).unwrap();
        assert!((apr - 0.08).abs() < 1e-12);
    }
}
