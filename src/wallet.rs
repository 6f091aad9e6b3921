//! Wallet Actions
//!
//! Write-side operations: deposit into a jar, withdraw shares, stake jar
//! shares into a farm. Every write goes through a wallet-filled provider
//! built from the connection's signer and waits for inclusion before
//! returning the hash. Token spends approve first.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use std::str::FromStr;
use tracing::info;

use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::farms::FarmInfo;
use crate::jars::{get_token_decimals, JarInfo};
use crate::registry::{IERC20, IJar, IStakingRewards};

/// Convert a human-readable token amount to base units.
pub fn to_token_units(amount: f64, decimals: u8) -> U256 {
    U256::from((amount * 10f64.powi(decimals as i32)).round() as u128)
}

pub struct WalletActions<'a> {
    connection: &'a Connection,
}

impl<'a> WalletActions<'a> {
    /// Fails with NotConnected when the connection carries no signer.
    pub fn new(connection: &'a Connection) -> Result<Self> {
        connection.signer()?;
        Ok(Self { connection })
    }

    fn write_provider(&self) -> Result<impl Provider> {
        let wallet = EthereumWallet::from(self.connection.signer()?.clone());
        Ok(ProviderBuilder::new().wallet(wallet).connect_http(
            self.connection
                .rpc_url()
                .parse()
                .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
        ))
    }

    async fn send(&self, to: Address, calldata: Vec<u8>) -> Result<TxHash> {
        let provider = self.write_provider()?;
        let tx = TransactionRequest::default().to(to).input(calldata.into());

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| Error::ContractCall(format!("transaction rejected: {e}")))?;

        pending
            .watch()
            .await
            .map_err(|e| Error::ContractCall(format!("transaction not confirmed: {e}")))
    }

    /// Deposit `amount` of the deposit token (human units) into a jar.
    pub async fn deposit(&self, jar: &JarInfo, amount: f64) -> Result<TxHash> {
        let jar_address = parse_address(jar.contract)?;
        let token = parse_address(jar.deposit_token)?;
        let units = to_token_units(amount, get_token_decimals(&token));

        let approval = self
            .send(token, IERC20::approveCall { spender: jar_address, amount: units }.abi_encode())
            .await?;
        info!("Approved {} for {}: {:?}", amount, jar.name, approval);

        let hash = self.send(jar_address, IJar::depositCall { amount: units }.abi_encode()).await?;
        info!("Deposited {} into {}: {:?}", amount, jar.name, hash);
        Ok(hash)
    }

    /// Withdraw `shares` (human units, jar shares are 18-decimal) from a jar.
    pub async fn withdraw(&self, jar: &JarInfo, shares: f64) -> Result<TxHash> {
        let jar_address = parse_address(jar.contract)?;
        let units = to_token_units(shares, 18);

        let hash = self.send(jar_address, IJar::withdrawCall { shares: units }.abi_encode()).await?;
        info!("Withdrew {} shares from {}: {:?}", shares, jar.name, hash);
        Ok(hash)
    }

    /// Stake jar shares (human units) into a farm's gauge.
    pub async fn stake(&self, farm: &FarmInfo, amount: f64) -> Result<TxHash> {
        let gauge = parse_address(farm.gauge)?;
        let token = parse_address(farm.staking_token)?;
        let units = to_token_units(amount, 18);

        let approval = self
            .send(token, IERC20::approveCall { spender: gauge, amount: units }.abi_encode())
            .await?;
        info!("Approved {} for {}: {:?}", amount, farm.name, approval);

        let hash =
            self.send(gauge, IStakingRewards::stakeCall { amount: units }.abi_encode()).await?;
        info!("Staked {} into {}: {:?}", amount, farm.name, hash);
        Ok(hash)
    }
}

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).map_err(|e| Error::ContractCall(format!("bad address {s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_token_units() {
        assert_eq!(to_token_units(1.5, 18), U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(to_token_units(2.5, 6), U256::from(2_500_000u64));
        assert_eq!(to_token_units(0.0, 18), U256::ZERO);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174").is_ok());
    }
}
