//! Jarboard - Yield Jar Dashboard
//!
//! Run with: cargo run -- once
//!
//! Tracks a static set of yield jars and farms on Polygon, batches their
//! on-chain state through Multicall3, blends in external price/volume/rate
//! feeds, and prints (or serves as JSON) the derived APY/TVL snapshot.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod connection;
mod dispatcher;
mod errors;
mod escrow;
mod farms;
mod jars;
mod lending;
mod metrics;
mod prices;
mod registry;
mod subgraph;
mod wallet;

use config::Config;
use connection::Connection;
use dispatcher::{Dispatcher, Pipeline, Snapshot, SnapshotStore, Trigger};
use farms::{all_farms, FarmInfo};
use jars::{all_jars, JarInfo};
use registry::ContractRegistry;
use wallet::WalletActions;

#[derive(Parser)]
#[command(name = "jarboard", about = "Yield jar dashboard", version)]
struct Cli {
    /// Load configuration from a TOML file instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute one snapshot and print it
    Once {
        /// Emit the snapshot as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Keep recomputing on new blocks and price ticks
    Watch,
    /// Deposit into a jar (requires WALLET_KEY)
    Deposit {
        /// Jar name, e.g. "pWETH"
        jar: String,
        /// Amount in deposit-token units
        amount: f64,
    },
    /// Withdraw shares from a jar (requires WALLET_KEY)
    Withdraw {
        jar: String,
        /// Shares to burn
        shares: f64,
    },
    /// Stake jar shares into a farm (requires WALLET_KEY)
    Stake {
        /// Farm name, e.g. "pCLP USDC/WETH"
        farm: String,
        amount: f64,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🫙 JARBOARD - Yield Jar Dashboard").cyan().bold());
    println!(
        "{}",
        style("    Jars | Farms | Multicall3 batched | Polygon").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn fmt_usd(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= 1_000_000.0 => format!("${:.2}M", v / 1_000_000.0),
        Some(v) if v >= 1_000.0 => format!("${:.1}K", v / 1_000.0),
        Some(v) => format!("${:.2}", v),
        None => "-".to_string(),
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "-".to_string(),
    }
}

fn render_snapshot(snapshot: &Snapshot) {
    println!();
    println!(
        "{}",
        style(format!(
            "═══ JARS @ block {} ({}) ═══",
            snapshot.block,
            snapshot.taken_at.format("%H:%M:%S UTC")
        ))
        .blue()
        .bold()
    );
    println!(
        "{:<18} {:>10} {:>8} {:>9} {:>10} {:>11} {:>10}",
        "NAME", "KIND", "RATIO", "APR", "APY", "TVL", "$/TOKEN"
    );
    for jar in &snapshot.jars {
        println!(
            "{:<18} {:>10} {:>8.4} {:>9} {:>10} {:>11} {:>10}",
            jar.name,
            jar.kind,
            jar.ratio,
            fmt_pct(Some(jar.apr_pct)),
            style(fmt_pct(Some(jar.total_apy_pct))).green(),
            fmt_usd(jar.tvl_usd),
            fmt_usd(jar.usd_per_ptoken),
        );
    }

    println!();
    println!("{}", style("═══ FARMS ═══").blue().bold());
    println!(
        "{:<18} {:>9} {:>10} {:>11} {:>11} {:>11}",
        "NAME", "APR", "APY", "TVL", "STAKED", "EARNED"
    );
    for farm in &snapshot.farms {
        println!(
            "{:<18} {:>9} {:>10} {:>11} {:>11} {:>11}",
            farm.name,
            fmt_pct(farm.reward_apr_pct),
            style(fmt_pct(farm.total_apy_pct)).green(),
            fmt_usd(farm.tvl_usd),
            farm.user_staked.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".into()),
            farm.user_earned.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".into()),
        );
    }

    if let Some(escrow) = snapshot.escrow.as_ref().filter(|e| e.is_active()) {
        println!();
        println!("{}", style("═══ VOTE ESCROW ═══").blue().bold());
        println!(
            "Locked: {:.4}  Voting balance: {:.4}  Until: {}",
            escrow.locked_amount,
            escrow.voting_balance,
            escrow
                .lock_end
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".into()),
        );
    }
    println!();
}

fn find_jar(name: &str) -> Result<JarInfo> {
    all_jars()
        .into_iter()
        .find(|j| j.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<&str> = all_jars().iter().map(|j| j.name).collect();
            eyre!("unknown jar '{}' (known: {})", name, known.join(", "))
        })
}

fn find_farm(name: &str) -> Result<FarmInfo> {
    all_farms()
        .into_iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<&str> = all_farms().iter().map(|f| f.name).collect();
            eyre!("unknown farm '{}' (known: {})", name, known.join(", "))
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jarboard=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    config.print_summary();
    println!();

    let connection = Connection::connect(&config).await?;
    let mut registry = ContractRegistry::new();
    registry.attach(connection);
    let connection = registry.connection()?;

    match cli.command {
        Command::Once { json } => {
            let pipeline = Pipeline::new(&config, connection)?;
            let block = connection.block_number().await.unwrap_or(0);
            let snapshot = pipeline.run_once(&registry, block).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                render_snapshot(&snapshot);
            }
        }

        Command::Watch => {
            let pipeline = Pipeline::new(&config, connection)?;
            let dispatcher = Dispatcher::new(pipeline, SnapshotStore::new());

            // seed a first snapshot so the terminal shows state immediately
            let block = connection.block_number().await.unwrap_or(0);
            dispatcher.recompute(&registry, Trigger::VaultListChanged, block).await?;
            if let Some(snapshot) = dispatcher.store().latest().await {
                render_snapshot(&snapshot);
            }

            println!("{}", style("Watching for new blocks... (Ctrl-C to stop)").dim());
            dispatcher.run(&registry, connection, &config).await?;
        }

        Command::Deposit { jar, amount } => {
            let jar = find_jar(&jar)?;
            let actions = WalletActions::new(connection)?;
            let hash = actions.deposit(&jar, amount).await?;
            println!("{} Deposit confirmed: {:?}", style("✓").green(), hash);
        }

        Command::Withdraw { jar, shares } => {
            let jar = find_jar(&jar)?;
            let actions = WalletActions::new(connection)?;
            let hash = actions.withdraw(&jar, shares).await?;
            println!("{} Withdrawal confirmed: {:?}", style("✓").green(), hash);
        }

        Command::Stake { farm, amount } => {
            let farm = find_farm(&farm)?;
            let actions = WalletActions::new(connection)?;
            let hash = actions.stake(&farm, amount).await?;
            println!("{} Stake confirmed: {:?}", style("✓").green(), hash);
        }
    }

    Ok(())
}
