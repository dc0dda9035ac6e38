use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use paper_trade_core::traits::{EventSink, MarketData};
use paper_trade_core::ConfigLoader;
use paper_trade_exchange_delta::{DeltaClient, DeltaMarketData};
use paper_trade_monitor::{MonitoringScheduler, TradeLogSink};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paper-trade")]
#[command(about = "EMA/ATR trend-following paper trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paper trading engine until Ctrl-C
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the resolved configuration and exit
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::ShowConfig { config } => show_config(&config),
    }
}

async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("failed to load configuration")?;
    tracing::info!(
        symbol = %config.exchange.symbol,
        resolution = %config.exchange.resolution,
        version = ?config.strategy.strategy_version,
        capital = %config.risk.initial_capital,
        "starting paper trading engine"
    );

    let client = DeltaClient::new(
        config.exchange.api_url.clone(),
        Duration::from_secs(config.monitor.fetch_timeout_secs),
    )?;
    let market_data: Arc<dyn MarketData> = Arc::new(DeltaMarketData::new(
        client,
        config.exchange.symbol.clone(),
        config.exchange.resolution.clone(),
    ));

    let report_dir = Path::new(&config.monitor.report_dir);
    std::fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create report dir {}", report_dir.display()))?;
    let sink: Box<dyn EventSink> = Box::new(TradeLogSink::create(report_dir, Utc::now())?);

    let handle = MonitoringScheduler::spawn(&config, market_data, sink);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");

    if let Ok(status) = handle.status().await {
        tracing::info!(
            cash = %status.portfolio.cash_balance,
            realized = %status.portfolio.realized_pnl_total,
            trades = status.closed_trades,
            open_position = status.position.is_some(),
            "final account state"
        );
    }
    handle.shutdown().await?;
    Ok(())
}

fn show_config(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("failed to load configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
