//! Connection Provider
//!
//! Holds the active network connection: RPC endpoint, verified chain id,
//! optional local signer, and a block watcher publishing a monotonically
//! increasing block number. The block watcher is a pure notification
//! mechanism - consumers only learn "a new head exists" and decide for
//! themselves whether to recompute.

use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{Error, Result};

pub struct Connection {
    rpc_url: String,
    chain_id: u64,
    signer: Option<PrivateKeySigner>,
}

impl Connection {
    /// Establish a connection: verify the node reports the configured chain
    /// id and attach the local signer if one is configured.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let provider = ProviderBuilder::new().connect_http(
            cfg.rpc_url
                .parse()
                .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
        );

        let reported = provider
            .get_chain_id()
            .await
            .map_err(|e| Error::Connection(format!("chain id query failed: {e}")))?;

        if reported != cfg.chain_id {
            return Err(Error::Connection(format!(
                "unsupported network: expected chain {}, node reports {}",
                cfg.chain_id, reported
            )));
        }

        let signer = match &cfg.wallet_key {
            Some(key) => {
                let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
                    .map_err(|e| Error::Connection(format!("invalid wallet key: {e}")))?;
                info!("✓ Wallet connected: {:?}", signer.address());
                Some(signer)
            }
            None => None,
        };

        info!("✓ Connected to chain {} via {}", reported, cfg.rpc_url);

        Ok(Self { rpc_url: cfg.rpc_url.clone(), chain_id: reported, signer })
    }

    /// Drop the signer and connected address; read paths keep working.
    pub fn disconnect(&mut self) {
        if self.signer.take().is_some() {
            info!("Wallet disconnected");
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Address of the connected wallet, if any.
    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn signer(&self) -> Result<&PrivateKeySigner> {
        self.signer.as_ref().ok_or(Error::NotConnected)
    }

    /// Build a fresh read provider. Providers are cheap handles over the
    /// shared HTTP client, so building per call site keeps ownership simple.
    pub fn provider(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().connect_http(
            self.rpc_url
                .parse()
                .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
        ))
    }

    /// Current head block number.
    pub async fn block_number(&self) -> Result<u64> {
        block_number(&self.rpc_url).await
    }

    /// Start the block watcher: polls the head and publishes a monotonically
    /// increasing block number over a watch channel.
    pub fn spawn_block_watcher(&self, poll_interval: Duration) -> watch::Receiver<u64> {
        let (tx, rx) = watch::channel(0u64);
        let rpc_url = self.rpc_url.clone();

        tokio::spawn(async move {
            let mut last_seen = 0u64;
            loop {
                match block_number(&rpc_url).await {
                    Ok(head) if head > last_seen => {
                        last_seen = head;
                        debug!("New block: {}", head);
                        if tx.send(head).is_err() {
                            // all receivers dropped, stop polling
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Block poll failed: {}", e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        rx
    }
}

async fn block_number(rpc_url: &str) -> Result<u64> {
    let provider = ProviderBuilder::new().connect_http(
        rpc_url
            .parse()
            .map_err(|e| Error::Connection(format!("invalid RPC URL: {e}")))?,
    );
    provider
        .get_block_number()
        .await
        .map_err(|e| Error::ContractCall(format!("block number query failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection(with_signer: bool) -> Connection {
        let signer = if with_signer {
            // well-known test key, never funded
            Some(
                PrivateKeySigner::from_str(
                    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
                )
                .unwrap(),
            )
        } else {
            None
        };
        Connection { rpc_url: "http://localhost:8545".to_string(), chain_id: 137, signer }
    }

    #[test]
    fn test_signer_requires_connection() {
        let conn = test_connection(false);
        assert!(matches!(conn.signer(), Err(Error::NotConnected)));
        assert!(conn.address().is_none());
    }

    #[test]
    fn test_disconnect_clears_signer() {
        let mut conn = test_connection(true);
        assert!(conn.address().is_some());
        conn.disconnect();
        assert!(conn.address().is_none());
        assert!(matches!(conn.signer(), Err(Error::NotConnected)));
    }
}
