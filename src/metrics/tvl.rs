//! TVL Measurements
//!
//! USD value locked per jar, dispatched on the strategy kind. All inputs
//! are already decimal-adjusted; anything missing nulls the figure instead
//! of failing the jar.

use super::fetcher::{RawJarReadings, RawPairReadings};
use crate::jars::{JarInfo, StrategyKind};
use crate::prices::PriceTable;

/// USD figures for one jar.
#[derive(Debug, Clone, Copy)]
pub struct TvlFigures {
    pub tvl_usd: Option<f64>,
    /// TVL over share supply
    pub usd_per_ptoken: Option<f64>,
    /// Underlying per share; parity when getRatio reverted
    pub ratio: f64,
}

/// USD price of one constant-product LP token: double the priced leg's
/// reserve over the LP supply. token1 is the fallback leg when token0 has
/// no known price.
pub fn lp_unit_price(pair: &RawPairReadings, prices: &PriceTable) -> Option<f64> {
    let supply = pair.pair_supply.filter(|s| *s > 0.0)?;

    let leg = |reserve: Option<f64>, price_id: Option<&str>| -> Option<f64> {
        let reserve = reserve?;
        let price = price_id.and_then(|id| prices.get(id))?;
        Some(2.0 * reserve * price / supply)
    };

    leg(pair.reserve0, pair.token0_price_id)
        .or_else(|| leg(pair.reserve1, pair.token1_price_id))
}

/// Measure one jar's USD figures from its raw readings.
pub fn measure(jar: &JarInfo, raw: &RawJarReadings, prices: &PriceTable) -> TvlFigures {
    let ratio = raw.ratio.unwrap_or(1.0);

    let tvl_usd = match jar.kind {
        // balance is the deposit token itself, priced directly
        StrategyKind::PlainToken | StrategyKind::LendingMarket | StrategyKind::StakingWrapper => {
            match (raw.balance, prices.get(jar.price_id)) {
                (Some(balance), Some(price)) => Some(balance * price),
                _ => None,
            }
        }

        StrategyKind::ConstantProductLp => {
            let unit = raw.pair.as_ref().and_then(|p| lp_unit_price(p, prices));
            match (raw.balance, unit) {
                (Some(balance), Some(unit)) => Some(balance * unit),
                _ => None,
            }
        }

        // LP balance times the pool's virtual price, in underlying units
        StrategyKind::StablePoolLp => {
            match (raw.balance, raw.virtual_price, prices.get(jar.price_id)) {
                (Some(balance), Some(vp), Some(price)) => Some(balance * vp * price),
                _ => None,
            }
        }
    };

    let usd_per_ptoken = match (tvl_usd, raw.total_supply) {
        (Some(tvl), Some(supply)) if supply > 0.0 => Some(tvl / supply),
        _ => None,
    };

    TvlFigures { tvl_usd, usd_per_ptoken, ratio }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(kind: StrategyKind) -> JarInfo {
        JarInfo {
            name: "pTEST",
            contract: "0x1A602E5f4403ea0A5C06d3DbD22B75d3a2D299D5",
            deposit_token: "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619",
            price_id: "weth",
            kind,
            pool: None,
            rewards: None,
            reward_price_id: None,
            strategy: None,
        }
    }

    #[test]
    fn test_plain_token_tvl() {
        let prices = PriceTable::from_pairs(&[("weth", 2.0)]);
        let raw = RawJarReadings {
            total_supply: Some(1000.0),
            balance: Some(500.0),
            ratio: Some(1.0),
            ..Default::default()
        };
        let figures = measure(&jar(StrategyKind::PlainToken), &raw, &prices);
        assert_eq!(figures.tvl_usd, Some(1000.0));
        assert_eq!(figures.usd_per_ptoken, Some(1.0));
    }

    #[test]
    fn test_cp_lp_tvl_uses_token0_leg() {
        let prices = PriceTable::from_pairs(&[("usdc", 1.0)]);
        let raw = RawJarReadings {
            total_supply: Some(100.0),
            balance: Some(50.0), // jar holds half the LP supply
            ratio: Some(1.0),
            pair: Some(RawPairReadings {
                reserve0: Some(1_000_000.0),
                reserve1: Some(500.0),
                pair_supply: Some(100.0),
                token0_price_id: Some("usdc"),
                token1_price_id: Some("weth"), // weth price unknown
            }),
            ..Default::default()
        };
        // unit price = 2 * 1M * $1 / 100 = $20_000; tvl = 50 * 20_000
        let figures = measure(&jar(StrategyKind::ConstantProductLp), &raw, &prices);
        assert_eq!(figures.tvl_usd, Some(1_000_000.0));
    }

    #[test]
    fn test_cp_lp_falls_back_to_token1_leg() {
        let prices = PriceTable::from_pairs(&[("weth", 2000.0)]);
        let pair = RawPairReadings {
            reserve0: Some(1_000_000.0),
            reserve1: Some(500.0),
            pair_supply: Some(100.0),
            token0_price_id: None, // token0 unpriceable
            token1_price_id: Some("weth"),
        };
        let unit = lp_unit_price(&pair, &prices).unwrap();
        assert_eq!(unit, 2.0 * 500.0 * 2000.0 / 100.0);
    }

    #[test]
    fn test_cp_lp_no_priceable_leg() {
        let prices = PriceTable::empty();
        let pair = RawPairReadings {
            reserve0: Some(1.0),
            reserve1: Some(1.0),
            pair_supply: Some(1.0),
            token0_price_id: Some("usdc"),
            token1_price_id: Some("weth"),
        };
        assert!(lp_unit_price(&pair, &prices).is_none());
    }

    #[test]
    fn test_stable_lp_uses_virtual_price() {
        let prices = PriceTable::from_pairs(&[("dai", 1.0)]);
        let mut j = jar(StrategyKind::StablePoolLp);
        j.price_id = "dai";
        let raw = RawJarReadings {
            total_supply: Some(100.0),
            balance: Some(100.0),
            ratio: Some(1.0),
            virtual_price: Some(1.02),
            ..Default::default()
        };
        let figures = measure(&j, &raw, &prices);
        assert_eq!(figures.tvl_usd, Some(102.0));
        assert!((figures.usd_per_ptoken.unwrap() - 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_zero_supply_nulls_unit_price() {
        let prices = PriceTable::from_pairs(&[("weth", 2.0)]);
        let raw = RawJarReadings {
            total_supply: Some(0.0),
            balance: Some(10.0),
            ratio: Some(1.0),
            ..Default::default()
        };
        let figures = measure(&jar(StrategyKind::PlainToken), &raw, &prices);
        assert_eq!(figures.tvl_usd, Some(20.0));
        assert_eq!(figures.usd_per_ptoken, None);
    }

    #[test]
    fn test_missing_ratio_is_parity() {
        let prices = PriceTable::empty();
        let raw = RawJarReadings::default();
        let figures = measure(&jar(StrategyKind::PlainToken), &raw, &prices);
        assert_eq!(figures.ratio, 1.0);
        assert_eq!(figures.tvl_usd, None);
    }
}
