//! On-Chain Reading Fetcher - Multicall3 Edition
//!
//! Batches every jar/farm read into one Multicall3 round trip instead of
//! dozens of individual eth_calls. Each inner call is marked allowFailure,
//! so a reverting contract nulls its own reading and never fails the batch.
//! If the Multicall3 transport itself fails, the batch is replayed as
//! individual calls with identical per-call semantics.

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::farms::FarmInfo;
use crate::jars::{get_token_decimals, price_id_for_token, JarInfo, StrategyKind};
use crate::registry::{
    ICurvePool, IJar, ILendingStrategy, IMulticall3, IStakingRewards, IUniswapV2Pair, MULTICALL3,
};

/// Maximum calls per batch (to avoid gas limits)
const MAX_CALLS_PER_BATCH: usize = 100;

// ============================================
// RAW READING TYPES
// ============================================

/// Raw, decimal-adjusted on-chain readings for one jar. Every field is
/// optional: a reverted or missed call leaves its reading None and the
/// downstream metric degrades instead of failing.
#[derive(Debug, Clone, Default)]
pub struct RawJarReadings {
    /// Jar share supply
    pub total_supply: Option<f64>,
    /// Deposit tokens the jar controls
    pub balance: Option<f64>,
    /// Underlying per share; None when getRatio reverted
    pub ratio: Option<f64>,
    /// Stable-pool virtual price (StablePoolLp only)
    pub virtual_price: Option<f64>,
    pub pair: Option<RawPairReadings>,
    pub staking: Option<RawStakingReadings>,
    pub lending: Option<RawLendingReadings>,
}

/// Constant-product pair state behind a cp-lp jar.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPairReadings {
    pub reserve0: Option<f64>,
    pub reserve1: Option<f64>,
    pub pair_supply: Option<f64>,
    pub token0_price_id: Option<&'static str>,
    pub token1_price_id: Option<&'static str>,
}

/// Staking-rewards contract state (reward component of a jar, or a farm).
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStakingReadings {
    /// Reward period length, seconds
    pub rewards_duration: Option<f64>,
    /// Reward tokens paid over one period
    pub reward_for_duration: Option<f64>,
    /// Tokens staked in the contract
    pub total_staked: Option<f64>,
}

/// Lending strategy position.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLendingReadings {
    pub supplied: Option<f64>,
    pub borrowed: Option<f64>,
    pub pool_balance: Option<f64>,
}

/// Raw readings for one farm/gauge. User fields stay None when no wallet
/// address was supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFarmReadings {
    pub rewards_duration: Option<f64>,
    pub reward_for_duration: Option<f64>,
    pub total_staked: Option<f64>,
    pub user_staked: Option<f64>,
    pub user_earned: Option<f64>,
}

// ============================================
// UNIT HELPERS
// ============================================

/// Convert a raw integer amount to decimal token units.
pub fn format_units(value: U256, decimals: u8) -> f64 {
    let raw = match u128::try_from(value) {
        Ok(v) => v as f64,
        // over u128: go through the decimal string (loses precision, never panics)
        Err(_) => value.to_string().parse().unwrap_or(f64::MAX),
    };
    raw / 10f64.powi(decimals as i32)
}

/// Convert a raw 18-decimal amount to decimal token units.
pub fn format_ether(value: U256) -> f64 {
    format_units(value, 18)
}

// ============================================
// CALL LAYOUT
// ============================================

/// Where one jar's calls landed inside the batch, and which optional
/// sections follow the common three.
struct JarPlan {
    start: usize,
    deposit_token: Option<Address>,
    pair: Option<Address>,
    pool: Option<Address>,
    rewards: Option<Address>,
    strategy: Option<Address>,
}

impl JarPlan {
    fn call_count(&self) -> usize {
        let mut n = 3; // totalSupply, balance, getRatio
        if self.pair.is_some() {
            n += 2; // getReserves, pair totalSupply
        }
        if self.pool.is_some() {
            n += 1; // get_virtual_price
        }
        if self.rewards.is_some() {
            n += 3; // rewardsDuration, getRewardForDuration, totalSupply
        }
        if self.strategy.is_some() {
            n += 3; // getSuppliedView, getBorrowedView, balanceOfPool
        }
        n
    }
}

// ============================================
// FETCHER
// ============================================

pub struct ChainFetcher {
    rpc_url: String,
    multicall: Address,
    /// token0/token1 never change for a pair, fetched once per process
    pair_cache: RwLock<HashMap<Address, (Address, Address)>>,
}

impl ChainFetcher {
    pub fn new(connection: &Connection) -> Result<Self> {
        let multicall = Address::from_str(MULTICALL3)
            .map_err(|e| Error::ContractCall(format!("bad multicall address: {e}")))?;
        Ok(Self {
            rpc_url: connection.rpc_url().to_string(),
            multicall,
            pair_cache: RwLock::new(HashMap::new()),
        })
    }

    // ----- batch execution -----

    /// Execute a Multicall3 batch.
    async fn execute_multicall(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new().connect_http(
            self.rpc_url
                .parse()
                .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
        );

        let mut results = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(MAX_CALLS_PER_BATCH) {
            let calldata = IMulticall3::aggregate3Call { calls: chunk.to_vec() }.abi_encode();

            let tx = TransactionRequest::default()
                .to(self.multicall)
                .input(calldata.into());

            let raw = provider
                .call(tx)
                .await
                .map_err(|e| Error::ContractCall(format!("Multicall3 failed: {e}")))?;

            let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&raw)
                .map_err(|e| Error::ContractCall(format!("bad multicall response: {e}")))?;
            results.extend(decoded);
        }

        Ok(results)
    }

    /// Replay a batch as individual eth_calls. Same result shape as the
    /// multicall path: a failed call comes back success=false, empty data.
    async fn execute_individually(
        &self,
        calls: &[IMulticall3::Call3],
    ) -> Result<Vec<IMulticall3::Result>> {
        let provider = ProviderBuilder::new().connect_http(
            self.rpc_url
                .parse()
                .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
        );

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let tx = TransactionRequest::default()
                .to(call.target)
                .input(call.callData.clone().into());

            match provider.call(tx).await {
                Ok(data) => {
                    results.push(IMulticall3::Result { success: true, returnData: data })
                }
                Err(e) => {
                    trace!("Individual call to {:?} failed: {}", call.target, e);
                    results.push(IMulticall3::Result {
                        success: false,
                        returnData: Bytes::new(),
                    });
                }
            }
        }

        Ok(results)
    }

    /// One batched round trip, falling back to individual calls when the
    /// multicall transport fails.
    async fn execute_batch(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Vec<IMulticall3::Result>> {
        match self.execute_multicall(calls.clone()).await {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!("Multicall3 unavailable, replaying individually: {}", e);
                self.execute_individually(&calls).await
            }
        }
    }

    // ----- pair static data -----

    /// Resolve token0/token1 for uncached pairs with one batch.
    async fn ensure_pair_cache(&self, pairs: &[Address]) -> Result<()> {
        let uncached: Vec<Address> = {
            let cache = self.pair_cache.read().await;
            pairs.iter().copied().filter(|p| !cache.contains_key(p)).collect()
        };
        if uncached.is_empty() {
            return Ok(());
        }

        let mut calls = Vec::with_capacity(uncached.len() * 2);
        for pair in &uncached {
            calls.push(IMulticall3::Call3 {
                target: *pair,
                allowFailure: true,
                callData: IUniswapV2Pair::token0Call {}.abi_encode().into(),
            });
            calls.push(IMulticall3::Call3 {
                target: *pair,
                allowFailure: true,
                callData: IUniswapV2Pair::token1Call {}.abi_encode().into(),
            });
        }

        let results = self.execute_batch(calls).await?;

        let mut cache = self.pair_cache.write().await;
        for (i, pair) in uncached.iter().enumerate() {
            let offset = i * 2;
            let token0 = decode_success(&results[offset])
                .and_then(|d| IUniswapV2Pair::token0Call::abi_decode_returns(d).ok());
            let token1 = decode_success(&results[offset + 1])
                .and_then(|d| IUniswapV2Pair::token1Call::abi_decode_returns(d).ok());
            if let (Some(t0), Some(t1)) = (token0, token1) {
                cache.insert(*pair, (t0, t1));
            } else {
                warn!("Could not resolve pair tokens for {:?}", pair);
            }
        }

        Ok(())
    }

    // ----- jar readings -----

    /// Fetch raw readings for every jar in one batched round trip.
    pub async fn fetch_jars(&self, jars: &[JarInfo]) -> Result<Vec<RawJarReadings>> {
        let started = Instant::now();

        let pair_addresses: Vec<Address> = jars
            .iter()
            .filter(|j| j.kind == StrategyKind::ConstantProductLp)
            .filter_map(|j| Address::from_str(j.deposit_token).ok())
            .collect();
        self.ensure_pair_cache(&pair_addresses).await?;

        let mut calls: Vec<IMulticall3::Call3> = Vec::new();
        let mut plans: Vec<Option<JarPlan>> = Vec::with_capacity(jars.len());

        for jar in jars {
            let Ok(contract) = Address::from_str(jar.contract) else {
                warn!("Skipping {}: bad contract address", jar.name);
                plans.push(None);
                continue;
            };
            let deposit_token = Address::from_str(jar.deposit_token).ok();

            let plan = JarPlan {
                start: calls.len(),
                deposit_token,
                pair: (jar.kind == StrategyKind::ConstantProductLp)
                    .then_some(deposit_token)
                    .flatten(),
                pool: jar.pool.and_then(|p| Address::from_str(p).ok()),
                rewards: jar.rewards.and_then(|r| Address::from_str(r).ok()),
                strategy: jar.strategy.and_then(|s| Address::from_str(s).ok()),
            };

            for data in [
                IJar::totalSupplyCall {}.abi_encode(),
                IJar::balanceCall {}.abi_encode(),
                IJar::getRatioCall {}.abi_encode(),
            ] {
                calls.push(IMulticall3::Call3 {
                    target: contract,
                    allowFailure: true,
                    callData: data.into(),
                });
            }

            if let Some(pair) = plan.pair {
                calls.push(IMulticall3::Call3 {
                    target: pair,
                    allowFailure: true,
                    callData: IUniswapV2Pair::getReservesCall {}.abi_encode().into(),
                });
                calls.push(IMulticall3::Call3 {
                    target: pair,
                    allowFailure: true,
                    callData: IUniswapV2Pair::totalSupplyCall {}.abi_encode().into(),
                });
            }

            if let Some(pool) = plan.pool {
                calls.push(IMulticall3::Call3 {
                    target: pool,
                    allowFailure: true,
                    callData: ICurvePool::get_virtual_priceCall {}.abi_encode().into(),
                });
            }

            if let Some(rewards) = plan.rewards {
                for data in [
                    IStakingRewards::rewardsDurationCall {}.abi_encode(),
                    IStakingRewards::getRewardForDurationCall {}.abi_encode(),
                    IStakingRewards::totalSupplyCall {}.abi_encode(),
                ] {
                    calls.push(IMulticall3::Call3 {
                        target: rewards,
                        allowFailure: true,
                        callData: data.into(),
                    });
                }
            }

            if let Some(strategy) = plan.strategy {
                for data in [
                    ILendingStrategy::getSuppliedViewCall {}.abi_encode(),
                    ILendingStrategy::getBorrowedViewCall {}.abi_encode(),
                    ILendingStrategy::balanceOfPoolCall {}.abi_encode(),
                ] {
                    calls.push(IMulticall3::Call3 {
                        target: strategy,
                        allowFailure: true,
                        callData: data.into(),
                    });
                }
            }

            debug_assert_eq!(calls.len() - plan.start, plan.call_count());
            plans.push(Some(plan));
        }

        let total_calls = calls.len();
        let results = self.execute_batch(calls).await?;
        if results.len() != total_calls {
            return Err(Error::ContractCall(format!(
                "multicall returned {} results for {} calls",
                results.len(),
                total_calls
            )));
        }

        let pair_cache = self.pair_cache.read().await;
        let readings: Vec<RawJarReadings> = plans
            .iter()
            .map(|plan| match plan {
                Some(plan) => decode_jar(plan, &results, &pair_cache),
                None => RawJarReadings::default(),
            })
            .collect();

        debug!(
            "Fetched {} jars ({} calls) in {:?}",
            jars.len(),
            total_calls,
            started.elapsed()
        );
        Ok(readings)
    }

    // ----- farm readings -----

    /// Fetch raw readings for every farm. With a wallet address, the user's
    /// staked balance and earned rewards ride along in the same batch.
    pub async fn fetch_farms(
        &self,
        farms: &[FarmInfo],
        user: Option<Address>,
    ) -> Result<Vec<RawFarmReadings>> {
        let stride = if user.is_some() { 5 } else { 3 };

        let mut calls: Vec<IMulticall3::Call3> = Vec::new();
        let mut gauges: Vec<Option<Address>> = Vec::with_capacity(farms.len());

        for farm in farms {
            let Ok(gauge) = Address::from_str(farm.gauge) else {
                warn!("Skipping {}: bad gauge address", farm.name);
                gauges.push(None);
                // placeholders keep the fixed stride
                for _ in 0..stride {
                    calls.push(IMulticall3::Call3 {
                        target: self.multicall,
                        allowFailure: true,
                        callData: Bytes::new(),
                    });
                }
                continue;
            };
            gauges.push(Some(gauge));

            let mut encoded = vec![
                IStakingRewards::rewardsDurationCall {}.abi_encode(),
                IStakingRewards::getRewardForDurationCall {}.abi_encode(),
                IStakingRewards::totalSupplyCall {}.abi_encode(),
            ];
            if let Some(account) = user {
                encoded.push(IStakingRewards::balanceOfCall { account }.abi_encode());
                encoded.push(IStakingRewards::earnedCall { account }.abi_encode());
            }
            for data in encoded {
                calls.push(IMulticall3::Call3 {
                    target: gauge,
                    allowFailure: true,
                    callData: data.into(),
                });
            }
        }

        let results = self.execute_batch(calls).await?;
        if results.len() != farms.len() * stride {
            return Err(Error::ContractCall(format!(
                "multicall returned {} results for {} calls",
                results.len(),
                farms.len() * stride
            )));
        }

        let readings = gauges
            .iter()
            .enumerate()
            .map(|(i, gauge)| {
                if gauge.is_none() {
                    return RawFarmReadings::default();
                }
                let offset = i * stride;
                RawFarmReadings {
                    rewards_duration: decode_u256::<IStakingRewards::rewardsDurationCall>(
                        &results[offset],
                    )
                    .map(|v| format_units(v, 0)),
                    reward_for_duration: decode_u256::<
                        IStakingRewards::getRewardForDurationCall,
                    >(&results[offset + 1])
                    .map(format_ether),
                    total_staked: decode_u256::<IStakingRewards::totalSupplyCall>(
                        &results[offset + 2],
                    )
                    .map(format_ether),
                    user_staked: user.and_then(|_| {
                        decode_u256::<IStakingRewards::balanceOfCall>(&results[offset + 3])
                            .map(format_ether)
                    }),
                    user_earned: user.and_then(|_| {
                        decode_u256::<IStakingRewards::earnedCall>(&results[offset + 4])
                            .map(format_ether)
                    }),
                }
            })
            .collect();

        Ok(readings)
    }
}

// ============================================
// DECODING
// ============================================

fn decode_success(res: &IMulticall3::Result) -> Option<&[u8]> {
    res.success.then_some(res.returnData.as_ref())
}

fn decode_u256<C: SolCall<Return = U256>>(res: &IMulticall3::Result) -> Option<U256> {
    decode_success(res).and_then(|d| C::abi_decode_returns(d).ok())
}

fn decode_jar(
    plan: &JarPlan,
    results: &[IMulticall3::Result],
    pair_cache: &HashMap<Address, (Address, Address)>,
) -> RawJarReadings {
    let deposit_decimals =
        plan.deposit_token.as_ref().map(get_token_decimals).unwrap_or(18);

    let mut cursor = plan.start;
    let total_supply =
        decode_u256::<IJar::totalSupplyCall>(&results[cursor]).map(format_ether);
    let balance = decode_u256::<IJar::balanceCall>(&results[cursor + 1])
        .map(|v| format_units(v, deposit_decimals));
    let ratio = decode_u256::<IJar::getRatioCall>(&results[cursor + 2]).map(format_ether);
    cursor += 3;

    let pair = plan.pair.map(|pair_address| {
        let tokens = pair_cache.get(&pair_address);
        let reserves = decode_success(&results[cursor])
            .and_then(|d| IUniswapV2Pair::getReservesCall::abi_decode_returns(d).ok());
        let pair_supply = decode_u256::<IUniswapV2Pair::totalSupplyCall>(&results[cursor + 1])
            .map(format_ether);
        cursor += 2;

        let (reserve0, reserve1) = match (reserves, tokens) {
            (Some(r), Some((t0, t1))) => (
                Some(format_units(U256::from(r.reserve0.to::<u128>()), get_token_decimals(t0))),
                Some(format_units(U256::from(r.reserve1.to::<u128>()), get_token_decimals(t1))),
            ),
            _ => (None, None),
        };

        RawPairReadings {
            reserve0,
            reserve1,
            pair_supply,
            token0_price_id: tokens.and_then(|(t0, _)| price_id_for_token(t0)),
            token1_price_id: tokens.and_then(|(_, t1)| price_id_for_token(t1)),
        }
    });

    let virtual_price = plan.pool.map(|_| {
        let vp = decode_u256::<ICurvePool::get_virtual_priceCall>(&results[cursor])
            .map(format_ether);
        cursor += 1;
        vp
    });

    let staking = plan.rewards.map(|_| {
        let readings = RawStakingReadings {
            rewards_duration: decode_u256::<IStakingRewards::rewardsDurationCall>(
                &results[cursor],
            )
            .map(|v| format_units(v, 0)),
            reward_for_duration: decode_u256::<IStakingRewards::getRewardForDurationCall>(
                &results[cursor + 1],
            )
            .map(format_ether),
            total_staked: decode_u256::<IStakingRewards::totalSupplyCall>(&results[cursor + 2])
                .map(format_ether),
        };
        cursor += 3;
        readings
    });

    let lending = plan.strategy.map(|_| {
        let readings = RawLendingReadings {
            supplied: decode_u256::<ILendingStrategy::getSuppliedViewCall>(&results[cursor])
                .map(|v| format_units(v, deposit_decimals)),
            borrowed: decode_u256::<ILendingStrategy::getBorrowedViewCall>(
                &results[cursor + 1],
            )
            .map(|v| format_units(v, deposit_decimals)),
            pool_balance: decode_u256::<ILendingStrategy::balanceOfPoolCall>(
                &results[cursor + 2],
            )
            .map(|v| format_units(v, deposit_decimals)),
        };
        cursor += 3;
        readings
    });

    let _ = cursor;
    RawJarReadings {
        total_supply,
        balance,
        ratio,
        virtual_price: virtual_price.flatten(),
        pair,
        staking,
        lending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolValue;

    fn ok_result(data: Vec<u8>) -> IMulticall3::Result {
        IMulticall3::Result { success: true, returnData: data.into() }
    }

    fn failed_result() -> IMulticall3::Result {
        IMulticall3::Result { success: false, returnData: Bytes::new() }
    }

    fn encoded_u256(v: u64) -> Vec<u8> {
        U256::from(v).abi_encode()
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_ether(U256::from(1_500_000_000_000_000_000u128)), 1.5);
        assert_eq!(format_units(U256::from(2_500_000u64), 6), 2.5);
        assert_eq!(format_units(U256::from(604800u64), 0), 604800.0);
    }

    #[test]
    fn test_format_units_beyond_u128() {
        // 2^130, far past u128: must not panic and must stay finite
        let huge = U256::from(1u8) << 130;
        let value = format_ether(huge);
        assert!(value.is_finite());
        assert!(value > 1e20);
    }

    #[test]
    fn test_decode_u256_ignores_failed_calls() {
        assert_eq!(
            decode_u256::<IJar::totalSupplyCall>(&ok_result(encoded_u256(42))),
            Some(U256::from(42))
        );
        assert_eq!(decode_u256::<IJar::totalSupplyCall>(&failed_result()), None);
    }

    #[test]
    fn test_decode_jar_with_reverted_ratio() {
        let plan = JarPlan {
            start: 0,
            deposit_token: None,
            pair: None,
            pool: None,
            rewards: None,
            strategy: None,
        };
        let results = vec![
            ok_result(U256::from(10u8).pow(U256::from(21u8)).abi_encode()), // 1000e18
            ok_result((U256::from(10u8).pow(U256::from(20u8)) * U256::from(5u8)).abi_encode()), // 500e18
            failed_result(), // getRatio reverted
        ];

        let readings = decode_jar(&plan, &results, &HashMap::new());
        assert_eq!(readings.total_supply, Some(1000.0));
        assert_eq!(readings.balance, Some(500.0));
        assert_eq!(readings.ratio, None);
        assert!(readings.pair.is_none());
    }

    #[test]
    fn test_jar_plan_call_counts() {
        let base = JarPlan {
            start: 0,
            deposit_token: None,
            pair: None,
            pool: None,
            rewards: None,
            strategy: None,
        };
        assert_eq!(base.call_count(), 3);

        let lp = JarPlan { pair: Some(Address::ZERO), ..base };
        assert_eq!(lp.call_count(), 5);
    }
}
