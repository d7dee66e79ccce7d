//! signal-desk – scan for picks, get execution advice and review fills.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use signal_desk::config::Config;
use signal_desk::execution::Fill;
use signal_desk::utils::logging::init_logging;
use signal_desk::utils::types::{DayMode, SwingStrategy, TradingKind};
use signal_desk::SignalDesk;

#[derive(Debug, Parser)]
#[command(name = "signal-desk", author, version, about = "Equity signal desk", long_about = None)]
struct Args {
    /// Path to the configuration file (TOML); defaults apply when missing
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print the default configuration to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Print Prometheus metrics after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan for day-trading picks
    Day {
        /// safe | aggressive
        #[arg(long, default_value = "safe")]
        mode: DayMode,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Skip dynamic discovery and scan the curated list
        #[arg(long = "static")]
        static_universe: bool,
    },
    /// Scan for swing-trading picks
    Swing {
        /// momentum | breakout | mean-reversion
        #[arg(long, default_value = "momentum")]
        strategy: SwingStrategy,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Reuse the movers scan when discovery allows it
        #[arg(long)]
        dynamic: bool,
    },
    /// Execution suggestion (and entry timing with --price) for a stored signal
    Advise {
        #[arg(long)]
        signal_id: Uuid,
        /// Current price, for entry timing
        #[arg(long)]
        price: Option<f64>,
        /// Override the signal's own trading kind
        #[arg(long)]
        kind: Option<TradingKind>,
    },
    /// Record a fill against a stored signal
    Fill {
        #[arg(long)]
        signal_id: Uuid,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        size: f64,
        #[arg(long)]
        user: String,
    },
    /// A user's execution-quality statistics
    Stats {
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: Option<TradingKind>,
        #[arg(long)]
        days: Option<i64>,
    },
    /// Refresh symbol profiles, signal outcomes and performance snapshots
    Maintenance,
}

fn load_config(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("loading {path}"))?
    } else {
        Config::default()
    };
    Ok(config.with_env_overrides())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if args.print_default_config {
        println!("{}", Config::default_toml()?);
        return Ok(());
    }

    let config = load_config(&args.config)?;
    init_logging(&config.app.log_level);
    if args.metrics {
        signal_desk::metrics::init().map_err(|e| anyhow::anyhow!("metrics init: {e}"))?;
    }

    let Some(command) = args.command else {
        anyhow::bail!("no command given; see --help");
    };
    let desk = SignalDesk::from_config(config).await.context("building signal desk")?;

    match command {
        | Command::Day { mode, limit, static_universe } => {
            print_json(&desk.get_day_trading_picks(mode, !static_universe, limit).await)?;
        }
        | Command::Swing { strategy, limit, dynamic } => {
            print_json(&desk.get_swing_trading_picks(strategy, dynamic, limit).await)?;
        }
        | Command::Advise { signal_id, price, kind } => {
            let signal = desk.signal(signal_id).await?;
            let suggestion = desk.get_execution_suggestion(&signal, kind).await;
            let timing = price.map(|p| desk.get_entry_timing(&signal, p)).transpose()?;
            print_json(&json!({ "signal_id": signal.id, "suggestion": suggestion, "entry_timing": timing }))?;
        }
        | Command::Fill { signal_id, price, size, user } => {
            let signal = desk.signal(signal_id).await?;
            let record = desk.record_fill(&user, &signal, Fill { price, size, time: Utc::now() }).await?;
            print_json(&record)?;
        }
        | Command::Stats { user, kind, days } => {
            print_json(&desk.get_execution_quality_stats(&user, kind, days).await?)?;
        }
        | Command::Maintenance => match desk.maintenance().spawn() {
            | Some(handle) => print_json(&handle.await??)?,
            | None => print_json(&json!({ "skipped": true, "last_run": desk.maintenance().last_run() }))?,
        },
    }

    if args.metrics {
        if let Some(text) = signal_desk::metrics::render() {
            print!("{text}");
        }
    }
    Ok(())
}
