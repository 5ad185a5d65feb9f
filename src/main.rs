use clap::Parser;
use trendbot::config::BotConfig;
use trendbot::control::BotSupervisor;
use trendbot::logs::StreamItem;
use trendbot::Result;

/// Supertrend auto-trader
///
/// Configuration comes from the environment (`.env` supported); flags
/// override it for one-off runs.
#[derive(Parser)]
#[command(name = "trendbot", version)]
struct Cli {
    /// Exchange-native symbol (e.g. BTCUSD)
    #[arg(long)]
    symbol: Option<String>,

    /// Candle timeframe (e.g. 15m, 1h)
    #[arg(long)]
    timeframe: Option<String>,

    /// Hold position tracking when an order is rejected instead of
    /// advancing it
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut config = BotConfig::from_env()?;
    if let Some(symbol) = cli.symbol {
        config.api_symbol = symbol.clone();
        config.data_symbol = symbol;
    }
    if let Some(timeframe) = cli.timeframe {
        config.timeframe = timeframe;
    }
    config.strict |= cli.strict;

    tracing::info!("🚀 Trendbot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Exchange: {}", config.credentials.base_url);
    tracing::info!(
        "  Symbol: {} (data: {}) @ {}",
        config.api_symbol,
        config.data_symbol,
        config.timeframe
    );
    tracing::info!("  Order size: {}", config.order_size);
    tracing::info!("  Leverage: {}x", config.leverage);
    tracing::info!("  Poll interval: {:?}", config.poll_interval);
    if config.strict {
        tracing::info!("  Strict mode: position tracking holds on rejected orders");
    }

    let supervisor = BotSupervisor::new();
    supervisor.start(config)?;

    // Events are mirrored to tracing by the sink; this consumer stands in
    // for the web UI and keeps the channel from backing up
    let mut stream = supervisor.stream_logs()?;
    let drain = tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            if let StreamItem::Event(_event) = item {
                // presentation layer hook
            }
        }
    });

    tracing::info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("⚠️ Received Ctrl+C, shutting down...");

    supervisor.stop()?;
    supervisor.join().await?;
    drain.await?;

    tracing::info!("👋 Trendbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info")),
        )
        .init();
}
