//! Recompute Dispatcher
//!
//! Listens for triggers (new block, price tick, vault-list change), runs
//! the pipeline, and replaces the snapshot wholesale. Snapshots are
//! immutable once published; last writer wins. A contained failure keeps
//! the previous snapshot in place, only fatal connection errors stop the
//! loop.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::errors::Result;
use crate::escrow::{self, EscrowPosition};
use crate::farms::{all_farms, FarmInfo, FarmMetrics};
use crate::jars::{all_jars, JarInfo, StrategyKind};
use crate::lending::{LendingRates, LendingRatesClient};
use crate::metrics::{
    compute_all, compute_farms, index_by_contract, ChainFetcher, JarMetrics, MetricsContext,
};
use crate::prices::{PriceOracle, PriceTable};
use crate::registry::ContractRegistry;
use crate::subgraph::SubgraphClient;

// ============================================
// TRIGGERS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    NewBlock(u64),
    PriceTick,
    VaultListChanged,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::NewBlock(n) => write!(f, "block {n}"),
            Trigger::PriceTick => write!(f, "price tick"),
            Trigger::VaultListChanged => write!(f, "vault-list change"),
        }
    }
}

// ============================================
// SNAPSHOT
// ============================================

/// One complete, self-consistent output of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub block: u64,
    pub taken_at: DateTime<Utc>,
    pub jars: Vec<JarMetrics>,
    pub farms: Vec<FarmMetrics>,
    pub escrow: Option<EscrowPosition>,
}

/// Holder of the latest snapshot. Replace-only: readers always see either
/// the previous complete snapshot or the new one, never a mix.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, snapshot: Snapshot) {
        let mut guard = self.inner.write().await;
        *guard = Some(snapshot);
    }

    pub async fn latest(&self) -> Option<Snapshot> {
        self.inner.read().await.clone()
    }
}

// ============================================
// PIPELINE
// ============================================

/// Owns the fetch clients and the static jar/farm lists. External inputs
/// degrade to empty on failure; on-chain batch errors bubble up to the
/// dispatcher, which keeps the previous snapshot.
pub struct Pipeline {
    fetcher: ChainFetcher,
    prices: PriceOracle,
    subgraph: SubgraphClient,
    lending: LendingRatesClient,
    jars: Vec<JarInfo>,
    farms: Vec<FarmInfo>,
    user: Option<Address>,
}

impl Pipeline {
    pub fn new(cfg: &Config, connection: &Connection) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.http_timeout_secs);
        Ok(Self {
            fetcher: ChainFetcher::new(connection)?,
            prices: PriceOracle::new(&cfg.price_api_url, timeout),
            subgraph: SubgraphClient::new(&cfg.subgraph_url, timeout),
            lending: LendingRatesClient::new(&cfg.lending_api_url, timeout),
            jars: all_jars(),
            farms: all_farms(),
            user: connection.address(),
        })
    }

    /// Run one full recompute and build a fresh snapshot.
    pub async fn run_once(
        &self,
        registry: &ContractRegistry,
        block: u64,
    ) -> Result<Snapshot> {
        let pair_addresses: Vec<Address> = self
            .jars
            .iter()
            .filter(|j| j.kind == StrategyKind::ConstantProductLp)
            .filter_map(|j| Address::from_str(j.deposit_token).ok())
            .collect();

        // external inputs fetched concurrently: a failure empties that
        // input and the dependent components degrade, the pipeline keeps
        // going
        let (price_result, stats_result, lending_result) = futures::join!(
            self.prices.get_prices(),
            self.subgraph.pair_day_stats(&pair_addresses),
            self.lending.fetch(),
        );

        let price_table = price_result.unwrap_or_else(|e| {
            warn!("Price fetch failed, computing without prices: {}", e);
            PriceTable::empty()
        });
        let pair_stats = stats_result.unwrap_or_else(|e| {
            warn!("Subgraph fetch failed, lp components degrade: {}", e);
            HashMap::new()
        });
        let lending = lending_result.unwrap_or_else(|e| {
            warn!("Lending rates fetch failed, lending components degrade: {}", e);
            LendingRates::default()
        });

        // on-chain reads: both batch paths failing is a contract-call error
        // the dispatcher contains
        let raw_jars = self.fetcher.fetch_jars(&self.jars).await?;
        let raw_farms = self.fetcher.fetch_farms(&self.farms, self.user).await?;

        let ctx = MetricsContext {
            prices: &price_table,
            pair_stats: &pair_stats,
            lending: &lending,
        };
        let jar_metrics = compute_all(&ctx, &self.jars, &raw_jars);
        let jar_index = index_by_contract(&self.jars, &jar_metrics);
        let farm_metrics = compute_farms(&ctx, &self.farms, &raw_farms, &jar_index);

        let escrow = match self.user {
            Some(account) => match escrow::fetch_position(registry, account).await {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("Escrow fetch failed: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Snapshot {
            block,
            taken_at: Utc::now(),
            jars: jar_metrics,
            farms: farm_metrics,
            escrow,
        })
    }
}

// ============================================
// DISPATCHER
// ============================================

pub struct Dispatcher {
    pipeline: Pipeline,
    store: SnapshotStore,
    list_changed: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(pipeline: Pipeline, store: SnapshotStore) -> Self {
        Self { pipeline, store, list_changed: Arc::new(Notify::new()) }
    }

    /// Handle for signalling that the jar/farm list changed; the next loop
    /// iteration recomputes everything.
    pub fn list_change_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.list_changed)
    }

    pub fn store(&self) -> SnapshotStore {
        self.store.clone()
    }

    /// Event loop: coalesce triggers, recompute, publish. Returns only on a
    /// fatal connection error or when the block watcher ends.
    pub async fn run(
        &self,
        registry: &ContractRegistry,
        connection: &Connection,
        cfg: &Config,
    ) -> Result<()> {
        let mut blocks =
            connection.spawn_block_watcher(Duration::from_secs(cfg.block_poll_secs));
        let mut price_tick =
            tokio::time::interval(Duration::from_secs(cfg.price_refresh_secs));
        price_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first interval tick fires immediately and seeds the snapshot
        let mut last_block = 0u64;

        loop {
            let trigger = tokio::select! {
                changed = blocks.changed() => {
                    if changed.is_err() {
                        info!("Block watcher stopped");
                        return Ok(());
                    }
                    last_block = *blocks.borrow();
                    Trigger::NewBlock(last_block)
                }
                _ = price_tick.tick() => Trigger::PriceTick,
                _ = self.list_changed.notified() => Trigger::VaultListChanged,
            };

            self.recompute(registry, trigger, last_block).await?;
        }
    }

    /// One recompute pass. Contained failures keep the previous snapshot;
    /// fatal errors propagate and stop the loop.
    pub async fn recompute(
        &self,
        registry: &ContractRegistry,
        trigger: Trigger,
        block: u64,
    ) -> Result<()> {
        debug!("Recompute: {}", trigger);

        match self.pipeline.run_once(registry, block).await {
            Ok(snapshot) => {
                info!(
                    "Snapshot at block {}: {} jars, {} farms ({})",
                    snapshot.block,
                    snapshot.jars.len(),
                    snapshot.farms.len(),
                    trigger
                );
                self.store.replace(snapshot).await;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Recompute failed, keeping last snapshot: {}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(block: u64) -> Snapshot {
        Snapshot {
            block,
            taken_at: Utc::now(),
            jars: Vec::new(),
            farms: Vec::new(),
            escrow: None,
        }
    }

    #[tokio::test]
    async fn test_store_starts_empty() {
        let store = SnapshotStore::new();
        assert!(store.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_store_last_writer_wins() {
        let store = SnapshotStore::new();
        store.replace(snapshot(100)).await;
        store.replace(snapshot(101)).await;
        assert_eq!(store.latest().await.unwrap().block, 101);
    }

    #[tokio::test]
    async fn test_store_clones_share_state() {
        let store = SnapshotStore::new();
        let reader = store.clone();
        store.replace(snapshot(7)).await;
        assert_eq!(reader.latest().await.unwrap().block, 7);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::NewBlock(42).to_string(), "block 42");
        assert_eq!(Trigger::PriceTick.to_string(), "price tick");
        assert_eq!(Trigger::VaultListChanged.to_string(), "vault-list change");
    }
}
