//! Contract Registry
//!
//! Static mapping from logical contract names to deployed addresses, plus
//! the `sol!` interfaces every typed call in the codebase encodes against.
//! Handles are thin (name, address) pairs; the actual calls go through the
//! metrics fetcher or the wallet. No retries here - callers re-resolve on
//! the next trigger or connection change.

use alloy_primitives::Address;
use alloy_sol_types::sol;
use std::collections::HashMap;
use std::str::FromStr;

use crate::connection::Connection;
use crate::errors::{Error, Result};

// ============================================
// CONTRACT INTERFACES
// ============================================

sol! {
    /// Multicall3 - deployed at the same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }

    /// A yield jar: users deposit the token, receive proportional shares
    interface IJar {
        function totalSupply() external view returns (uint256);
        function balance() external view returns (uint256);
        function getRatio() external view returns (uint256);
        function deposit(uint256 amount) external;
        function withdraw(uint256 shares) external;
    }

    /// Synthetix-style staking rewards contract backing farms/gauges
    interface IStakingRewards {
        function rewardsDuration() external view returns (uint256);
        function getRewardForDuration() external view returns (uint256);
        function stakingToken() external view returns (address);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function earned(address account) external view returns (uint256);
        function stake(uint256 amount) external;
    }

    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
        function totalSupply() external view returns (uint256);
    }

    interface ICurvePool {
        function get_virtual_price() external view returns (uint256);
    }

    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Lending-market strategy exposing its supplied/borrowed position
    interface ILendingStrategy {
        function getSuppliedView() external view returns (uint256);
        function getBorrowedView() external view returns (uint256);
        function balanceOfPool() external view returns (uint256);
    }

    /// Vote-escrow locker (lock the governance token for voting weight)
    interface IVoteEscrow {
        function locked(address account) external view returns (int128 amount, uint256 end);
        function balanceOf(address account) external view returns (uint256);
    }
}

// ============================================
// DEPLOYED ADDRESSES
// ============================================

/// Multicall3 address (same on all EVM chains)
pub const MULTICALL3: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

pub const CONTROLLER_ADDR: &str = "0x83074F0aB8EDD2c1508D3F657CeB5F27f6092d09";
pub const MINICHEF_ADDR: &str = "0x20B2a3fc7B13cA0cCf7AF81A68a14CB3116E8749";
pub const VOTE_ESCROW_ADDR: &str = "0xbBCf169eE191A1Ba7371F30A1C344bFC498b29Cf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractName {
    Controller,
    MiniChef,
    VoteEscrow,
    Multicall,
}

impl std::fmt::Display for ContractName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractName::Controller => write!(f, "controller"),
            ContractName::MiniChef => write!(f, "minichef"),
            ContractName::VoteEscrow => write!(f, "vote-escrow"),
            ContractName::Multicall => write!(f, "multicall3"),
        }
    }
}

/// A resolved call target.
#[derive(Debug, Clone, Copy)]
pub struct ContractHandle {
    pub name: ContractName,
    pub address: Address,
}

// ============================================
// REGISTRY
// ============================================

pub struct ContractRegistry {
    connection: Option<Connection>,
    entries: HashMap<ContractName, Address>,
}

impl ContractRegistry {
    /// Build the registry without a connection. `resolve` fails with
    /// NotConnected until `attach` is called.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        for (name, addr) in [
            (ContractName::Controller, CONTROLLER_ADDR),
            (ContractName::MiniChef, MINICHEF_ADDR),
            (ContractName::VoteEscrow, VOTE_ESCROW_ADDR),
            (ContractName::Multicall, MULTICALL3),
        ] {
            if let Ok(address) = Address::from_str(addr) {
                entries.insert(name, address);
            }
        }
        Self { connection: None, entries }
    }

    pub fn attach(&mut self, connection: Connection) {
        self.connection = Some(connection);
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::NotConnected)
    }

    /// Resolve a logical name to a call target. Fails with NotConnected
    /// before a connection exists; callers re-invoke on the next trigger.
    pub fn resolve(&self, name: ContractName) -> Result<ContractHandle> {
        if self.connection.is_none() {
            return Err(Error::NotConnected);
        }
        let address = self
            .entries
            .get(&name)
            .copied()
            .ok_or_else(|| Error::ContractCall(format!("no deployment for {name}")))?;
        Ok(ContractHandle { name, address })
    }
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_connection() {
        let registry = ContractRegistry::new();
        assert!(matches!(
            registry.resolve(ContractName::Controller),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_known_addresses_parse() {
        for addr in [MULTICALL3, CONTROLLER_ADDR, MINICHEF_ADDR, VOTE_ESCROW_ADDR] {
            assert!(Address::from_str(addr).is_ok(), "bad address constant: {addr}");
        }
    }
}
