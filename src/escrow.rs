//! Vote-Escrow Position
//!
//! Reads the connected wallet's lock in the vote-escrow contract: how much
//! of the governance token is locked, until when, and the resulting voting
//! balance. Only two calls, so they go straight over the provider.

use alloy_provider::Provider;
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use alloy_primitives::Address;

use crate::errors::{Error, Result};
use crate::metrics::fetcher::format_ether;
use crate::registry::{ContractName, ContractRegistry, IVoteEscrow};

/// One wallet's lock in the vote-escrow contract.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EscrowPosition {
    /// Governance tokens locked
    pub locked_amount: f64,
    /// When the lock expires; None when nothing is locked
    pub lock_end: Option<DateTime<Utc>>,
    /// Decaying voting balance derived from the lock
    pub voting_balance: f64,
}

impl EscrowPosition {
    pub fn is_active(&self) -> bool {
        self.locked_amount > 0.0
    }
}

/// Fetch the escrow position for one account. Requires an attached
/// connection; fails with NotConnected otherwise.
pub async fn fetch_position(
    registry: &ContractRegistry,
    account: Address,
) -> Result<EscrowPosition> {
    let handle = registry.resolve(ContractName::VoteEscrow)?;
    let provider = registry.connection()?.provider()?;

    let locked_raw = eth_call(
        &provider,
        handle.address,
        IVoteEscrow::lockedCall { account }.abi_encode(),
    )
    .await?;
    let locked = IVoteEscrow::lockedCall::abi_decode_returns(&locked_raw)
        .map_err(|e| Error::ContractCall(format!("bad locked() response: {e}")))?;

    let balance_raw = eth_call(
        &provider,
        handle.address,
        IVoteEscrow::balanceOfCall { account }.abi_encode(),
    )
    .await?;
    let voting_balance = IVoteEscrow::balanceOfCall::abi_decode_returns(&balance_raw)
        .map(format_ether)
        .map_err(|e| Error::ContractCall(format!("bad balanceOf() response: {e}")))?;

    let locked_amount = i128::try_from(locked.amount).unwrap_or(0).max(0) as f64 / 1e18;
    let end_secs = u64::try_from(locked.end).unwrap_or(0);
    let lock_end = if end_secs > 0 {
        Utc.timestamp_opt(end_secs as i64, 0).single()
    } else {
        None
    };

    debug!(
        "{} position for {:?}: locked={} until {:?}",
        handle.name, account, locked_amount, lock_end
    );

    Ok(EscrowPosition { locked_amount, lock_end, voting_balance })
}

async fn eth_call<P: Provider>(
    provider: &P,
    target: Address,
    calldata: Vec<u8>,
) -> Result<Vec<u8>> {
    let tx = TransactionRequest::default().to(target).input(calldata.into());
    provider
        .call(tx)
        .await
        .map(|b| b.to_vec())
        .map_err(|e| Error::ContractCall(format!("escrow call failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_position() {
        let active = EscrowPosition {
            locked_amount: 10.0,
            lock_end: Utc.timestamp_opt(1_900_000_000, 0).single(),
            voting_balance: 7.5,
        };
        let empty = EscrowPosition { locked_amount: 0.0, lock_end: None, voting_balance: 0.0 };
        assert!(active.is_active());
        assert!(!empty.is_active());
    }
}
