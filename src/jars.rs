//! Jar Definitions
//!
//! The static jar (yield vault) list plus the closed set of strategy kinds
//! that drives metric dispatch. Jars are created from this configuration,
//! mutated only by re-fetching on-chain reads, and never deleted at runtime.

use alloy_primitives::Address;

// ============================================
// STRATEGY KINDS
// ============================================

/// Closed set of strategy tags. Each tag selects which TVL/APY
/// sub-calculation runs for a jar - explicit match dispatch, no string or
/// address comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Deposit token is a single asset priced directly
    PlainToken,
    /// Deposit token is a constant-product (UniV2-style) LP token
    ConstantProductLp,
    /// Deposit token is a stable-pool LP token with a virtual price
    StablePoolLp,
    /// Funds are supplied/borrowed in a lending market
    LendingMarket,
    /// Deposit token sits in an external staking-rewards contract
    StakingWrapper,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::PlainToken => write!(f, "plain"),
            StrategyKind::ConstantProductLp => write!(f, "cp-lp"),
            StrategyKind::StablePoolLp => write!(f, "stable-lp"),
            StrategyKind::LendingMarket => write!(f, "lending"),
            StrategyKind::StakingWrapper => write!(f, "staking"),
        }
    }
}

// ============================================
// JAR LIST
// ============================================

#[derive(Debug, Clone)]
pub struct JarInfo {
    pub name: &'static str,
    /// Jar contract (shares token)
    pub contract: &'static str,
    /// Token users deposit into the jar
    pub deposit_token: &'static str,
    /// Price-table key for the deposit token (or its underlying for
    /// stable-pool LPs)
    pub price_id: &'static str,
    pub kind: StrategyKind,
    /// Stable pool behind the LP token (StablePoolLp only)
    pub pool: Option<&'static str>,
    /// Staking-rewards contract earning the reward component, if any
    pub rewards: Option<&'static str>,
    /// Price-table key for the reward token paid by `rewards`
    pub reward_price_id: Option<&'static str>,
    /// Lending strategy contract (LendingMarket only)
    pub strategy: Option<&'static str>,
}

pub fn all_jars() -> Vec<JarInfo> {
    vec![
        JarInfo {
            name: "pCLP USDC/WETH",
            contract: "0x9eD7e3590F2fB9EEE382dfC55c71F9d3DF12556c",
            deposit_token: "0x1Edb2D8f791D2a51D56979bf3A25673D6E783232",
            price_id: "usdc",
            kind: StrategyKind::ConstantProductLp,
            pool: None,
            rewards: Some("0x2328c83431a29613b1780706E0Af3679E3D04afd"),
            reward_price_id: Some("must"),
            strategy: None,
        },
        JarInfo {
            name: "pAaveDAI",
            contract: "0x0519848e57Ba0469AA5275283ec0712c91e20D8E",
            deposit_token: "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063",
            price_id: "dai",
            kind: StrategyKind::LendingMarket,
            pool: None,
            rewards: None,
            reward_price_id: Some("matic"),
            strategy: Some("0x0b198b5EE26aE0B8b0B6F3601CAe94381b4E39a5"),
        },
        JarInfo {
            name: "am3CRV",
            contract: "0x261b5619d85B710f1c2570b65ee945975E2cC221",
            deposit_token: "0xE7a24EF0C5e95Ffb0f6684b813A78F2a3AD7D171",
            price_id: "dai",
            kind: StrategyKind::StablePoolLp,
            pool: Some("0x445FE580eF8d70FF569aB36e80c647af338db351"),
            rewards: None,
            reward_price_id: None,
            strategy: None,
        },
        JarInfo {
            name: "pSLP ETH/USDT",
            contract: "0x80aB65b1525816Ffe4222607EDa73F86D211AC95",
            deposit_token: "0xc2755915a85C6f6c1C0F3a86ac8C058F11Caa9C9",
            price_id: "weth",
            kind: StrategyKind::ConstantProductLp,
            pool: None,
            rewards: None,
            reward_price_id: None,
            strategy: None,
        },
        JarInfo {
            name: "pQLP MAI",
            contract: "0x74dC9cdCa9a96Fd0B7900e6eb953d1EA8567c3Ce",
            deposit_token: "0x160532D2536175d65C03B97b0630A9802c274daD",
            price_id: "usdc",
            kind: StrategyKind::ConstantProductLp,
            pool: None,
            rewards: None,
            reward_price_id: None,
            strategy: None,
        },
        JarInfo {
            name: "pWETH",
            contract: "0x1A602E5f4403ea0A5C06d3DbD22B75d3a2D299D5",
            deposit_token: "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619",
            price_id: "weth",
            kind: StrategyKind::PlainToken,
            pool: None,
            rewards: None,
            reward_price_id: None,
            strategy: None,
        },
        JarInfo {
            name: "pMUST",
            contract: "0x91bcc0BBC2ecA760e3b8A79903CbA53483A7012C",
            deposit_token: "0x9C78EE466D6Cb57A4d01Fd887D2b5dFb2D46288f",
            price_id: "must",
            kind: StrategyKind::StakingWrapper,
            pool: None,
            rewards: Some("0x2Df5a4Cd23eCd6c9B3b9e4F34c5b5AAe5c9F201a"),
            reward_price_id: Some("must"),
            strategy: None,
        },
    ]
}

// ============================================
// TOKEN DECIMALS
// ============================================

/// Decimal places for the tokens the jar set touches (Polygon). Anything
/// unknown is assumed to be a standard 18-decimal token.
pub fn get_token_decimals(address: &Address) -> u8 {
    let a = format!("{:?}", address).to_lowercase();

    // 6 decimals (stablecoins)
    if a.contains("2791bca1f2de4661ed88a30c99a7a9449aa84174") // USDC
        || a.contains("c2132d05d31c914a87c6611c10748aeb04b58e8f") // USDT
    {
        return 6;
    }

    // 8 decimals
    if a.contains("1bfd67037b42cf73acf2047067bd4f2c47d9bfd6") {
        // WBTC
        return 8;
    }

    18
}

/// Price-table key for the tokens the jar set touches (Polygon). Pair legs
/// resolve their unit price through this; an unknown token has no price and
/// degrades the dependent metric.
pub fn price_id_for_token(address: &Address) -> Option<&'static str> {
    let a = format!("{:?}", address).to_lowercase();

    const IDS: &[(&str, &str)] = &[
        ("2791bca1f2de4661ed88a30c99a7a9449aa84174", "usdc"),
        ("7ceb23fd6bc0add59e62ac25578270cff1b9f619", "weth"),
        ("c2132d05d31c914a87c6611c10748aeb04b58e8f", "usdt"),
        ("8f3cf7ad23cd3cadbd9735aff958023239c6a063", "dai"),
        ("a3fa99a148fa48d14ed51d610c367c61876997f1", "mai"),
        ("9c78ee466d6cb57a4d01fd887d2b5dfb2d46288f", "must"),
        ("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270", "matic"),
    ];

    IDS.iter().find(|(frag, _)| a.contains(frag)).map(|(_, id)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_jar_list_addresses_parse() {
        for jar in all_jars() {
            assert!(Address::from_str(jar.contract).is_ok(), "bad jar address: {}", jar.name);
            assert!(
                Address::from_str(jar.deposit_token).is_ok(),
                "bad deposit token: {}",
                jar.name
            );
            if let Some(pool) = jar.pool {
                assert!(Address::from_str(pool).is_ok(), "bad pool: {}", jar.name);
            }
            if let Some(rewards) = jar.rewards {
                assert!(Address::from_str(rewards).is_ok(), "bad rewards: {}", jar.name);
            }
            if let Some(strategy) = jar.strategy {
                assert!(Address::from_str(strategy).is_ok(), "bad strategy: {}", jar.name);
            }
        }
    }

    #[test]
    fn test_stable_pool_jars_carry_pool() {
        for jar in all_jars() {
            if jar.kind == StrategyKind::StablePoolLp {
                assert!(jar.pool.is_some(), "{} needs a pool address", jar.name);
            }
        }
    }

    #[test]
    fn test_decimals_lookup() {
        let usdc = Address::from_str("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174").unwrap();
        let weth = Address::from_str("0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619").unwrap();
        assert_eq!(get_token_decimals(&usdc), 6);
        assert_eq!(get_token_decimals(&weth), 18);
    }

    #[test]
    fn test_price_id_lookup() {
        let usdc = Address::from_str("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174").unwrap();
        let unknown = Address::from_str("0x000000000000000000000000000000000000dEaD").unwrap();
        assert_eq!(price_id_for_token(&usdc), Some("usdc"));
        assert_eq!(price_id_for_token(&unknown), None);
    }
}
