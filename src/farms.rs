//! Farm Definitions
//!
//! Farms (gauges) are staking-rewards contracts distributing the protocol
//! token to jar-share stakers. The staking token of every farm is a jar
//! share token, so a farm's USD figures are priced off the jar's computed
//! usd-per-share. Same lifecycle as jars: static list, re-fetched state,
//! never deleted at runtime.

#[derive(Debug, Clone)]
pub struct FarmInfo {
    pub name: &'static str,
    /// Staking-rewards (gauge) contract
    pub gauge: &'static str,
    /// Jar share token staked in this farm; must match a JarInfo.contract
    pub staking_token: &'static str,
    /// Price-table key for the reward token this gauge pays out
    pub reward_price_id: &'static str,
}

pub fn all_farms() -> Vec<FarmInfo> {
    vec![
        FarmInfo {
            name: "pCLP USDC/WETH",
            gauge: "0x8dF71F2a3Ba42eDBcD68cF4a818fa25318cF2E62",
            staking_token: "0x9eD7e3590F2fB9EEE382dfC55c71F9d3DF12556c",
            reward_price_id: "pickle",
        },
        FarmInfo {
            name: "pAaveDAI",
            gauge: "0x75fE7cAE1d8Fd73dD2cEAC27Ba4FC6fCeF873a24",
            staking_token: "0x0519848e57Ba0469AA5275283ec0712c91e20D8E",
            reward_price_id: "pickle",
        },
        FarmInfo {
            name: "am3CRV",
            gauge: "0xDE21F80e2Ee1e41a3971dB0f629Eb1b6c26bB671",
            staking_token: "0x261b5619d85B710f1c2570b65ee945975E2cC221",
            reward_price_id: "pickle",
        },
        FarmInfo {
            name: "pSLP ETH/USDT",
            gauge: "0x45E061496aB1E37B2cB71c32Cc8b28d6a33Fb2a5",
            staking_token: "0x80aB65b1525816Ffe4222607EDa73F86D211AC95",
            reward_price_id: "pickle",
        },
    ]
}

/// Everything the dashboard shows for one farm. User fields are None when
/// no wallet is connected; USD fields are None when the backing jar's
/// usd-per-share is unknown.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FarmMetrics {
    pub name: String,
    /// Simple annual reward rate, percent
    pub reward_apr_pct: Option<f64>,
    /// Compounded reward APY, percent
    pub total_apy_pct: Option<f64>,
    pub tvl_usd: Option<f64>,
    pub user_staked: Option<f64>,
    pub user_earned: Option<f64>,
}
