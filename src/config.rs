//! Configuration for the jarboard dashboard
//!
//! Everything is loadable from environment variables (with a .env file) or
//! from a TOML file. Defaults target Polygon, where the tracked jar set
//! lives.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint for the chain the jars are deployed on
    pub rpc_url: String,

    /// Expected chain id; connecting to a node reporting anything else is a
    /// ConnectionError (137 = Polygon)
    pub chain_id: u64,

    // ========== External APIs ==========
    /// Price API base URL (CoinGecko-compatible simple/price endpoint)
    pub price_api_url: String,

    /// Pair-day statistics endpoint (subgraph) used for trading-fee APY
    pub subgraph_url: String,

    /// Lending-market rates endpoint used for lending APY
    pub lending_api_url: String,

    /// Timeout applied to every external HTTP call, in seconds
    pub http_timeout_secs: u64,

    // ========== Refresh Cadence ==========
    /// How often the block watcher polls for a new head
    pub block_poll_secs: u64,

    /// How often the price table is refreshed
    pub price_refresh_secs: u64,

    // ========== Wallet Settings ==========
    /// Private key for deposit/withdraw/stake signing (optional; read-only
    /// dashboards never need it)
    pub wallet_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://polygon-rpc.com".to_string()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "137".to_string())
                .parse()
                .unwrap_or(137),
            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            subgraph_url: env::var("SUBGRAPH_URL").unwrap_or_else(|_| {
                "https://api.thegraph.com/subgraphs/name/cometh-game/comethswap".to_string()
            }),
            lending_api_url: env::var("LENDING_API_URL").unwrap_or_else(|_| {
                "https://aave-api-v2.aave.com/data/liquidity/v2?poolId=0xd05e3E715d945B59290df0ae8eF85c1BdB684744"
                    .to_string()
            }),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            block_poll_secs: env::var("BLOCK_POLL_SECS")
                .unwrap_or_else(|_| "4".to_string()) // ~2 Polygon blocks
                .parse()
                .unwrap_or(4),
            price_refresh_secs: env::var("PRICE_REFRESH_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            wallet_key: env::var("WALLET_KEY").ok(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid RPC endpoint"));
        }
        if self.block_poll_secs == 0 {
            return Err(eyre::eyre!("BLOCK_POLL_SECS must be at least 1"));
        }
        if self.price_refresh_secs == 0 {
            return Err(eyre::eyre!("PRICE_REFRESH_SECS must be at least 1"));
        }
        if let Some(key) = &self.wallet_key {
            let stripped = key.trim_start_matches("0x");
            if stripped.len() != 64 {
                return Err(eyre::eyre!("WALLET_KEY must be a 32-byte hex private key"));
            }
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                 JARBOARD - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Block poll:        {:>37}s   ║", self.block_poll_secs);
        println!("║ Price refresh:     {:>37}s   ║", self.price_refresh_secs);
        println!("║ HTTP timeout:      {:>37}s   ║", self.http_timeout_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!(
            "║ Wallet:            {:^40} ║",
            if self.wallet_key.is_some() { "✓ Configured" } else { "✗ Read-only" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://polygon-rpc.com".to_string(),
            chain_id: 137,
            price_api_url: "https://api.coingecko.com/api/v3".to_string(),
            subgraph_url: "https://api.thegraph.com/subgraphs/name/cometh-game/comethswap"
                .to_string(),
            lending_api_url:
                "https://aave-api-v2.aave.com/data/liquidity/v2?poolId=0xd05e3E715d945B59290df0ae8eF85c1BdB684744"
                    .to_string(),
            http_timeout_secs: 10,
            block_poll_secs: 4,
            price_refresh_secs: 60,
            wallet_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain_id, 137);
        assert!(config.wallet_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_cadence() {
        let config = Config { block_poll_secs: 0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_wallet_key() {
        let config = Config { wallet_key: Some("0xdeadbeef".to_string()), ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config {
            wallet_key: Some(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
            ),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.rpc_url, config.rpc_url);
        assert_eq!(parsed.chain_id, config.chain_id);
    }
}
