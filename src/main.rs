//! DEX arbitrage detection engine entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dex_arb_engine::alerts::{AlertConfig, AlertDispatcher};
use dex_arb_engine::api::{create_router, AppState};
use dex_arb_engine::cache::{CacheConfig, OpportunityCache};
use dex_arb_engine::config::Config;
use dex_arb_engine::engine::{
    BroadcastPublisher, ChannelExecutionSink, ExecutionDescriptor, FanoutPublisher, LogPublisher,
    OrchestratorConfig, RefreshOrchestrator, WebhookPublisher,
};
use dex_arb_engine::feed::{
    FilePriceFeed, FixedGasFeed, GasPriceFeed, HttpPriceFeed, JsonRpcGasFeed, PriceFeed,
};
use dex_arb_engine::metrics;
use dex_arb_engine::utils::shutdown_signal;

/// Broadcast buffer between the orchestrator and the API state.
const EVENT_BUFFER: usize = 256;

/// Execution descriptors buffered before hand-offs are dropped.
const EXECUTION_BUFFER: usize = 64;

/// Cross-venue DEX arbitrage detection engine.
#[derive(Parser, Debug)]
#[command(name = "dex-arb-engine")]
#[command(about = "Detects, validates and alerts on DEX arbitrage opportunities")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the refresh loop and query API (default).
    Run {
        /// HTTP server port for the query API.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single tick and print the result bundle as JSON.
    ScanOnce {
        /// Read the price snapshot from this file instead of the configured feed.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("dex_arb_engine=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let json_layer = args.json.then(|| fmt::layer().json());
    let text_layer = (!args.json).then(|| fmt::layer());
    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::ScanOnce { file }) => cmd_scan_once(file).await,
        Some(Command::Run { port }) => cmd_run(port).await,
        None => cmd_run(None).await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

fn build_price_feed(config: &Config, file: Option<PathBuf>) -> anyhow::Result<Arc<dyn PriceFeed>> {
    if let Some(path) = file {
        return Ok(Arc::new(FilePriceFeed::new(path)));
    }
    match (&config.price_feed_url, &config.price_feed_file) {
        (Some(url), _) => Ok(Arc::new(HttpPriceFeed::new(url.clone(), config.fetch_timeout())?)),
        (None, Some(path)) => Ok(Arc::new(FilePriceFeed::new(path))),
        (None, None) => Err(anyhow::anyhow!(
            "no price feed configured: set PRICE_FEED_URL or PRICE_FEED_FILE"
        )),
    }
}

fn build_gas_feed(config: &Config) -> anyhow::Result<Arc<dyn GasPriceFeed>> {
    match &config.gas_rpc_url {
        Some(url) => Ok(Arc::new(JsonRpcGasFeed::new(url.clone(), config.fetch_timeout())?)),
        None => Ok(Arc::new(FixedGasFeed::from_gwei(config.fallback_gas_price_gwei))),
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DEX ARB ENGINE - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Check collaborators
    print!("Checking price feed... ");
    match build_price_feed(&config, None) {
        Ok(feed) => println!("OK ({})", feed.name()),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Price feed misconfigured"));
        }
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Refresh Interval: {}s", config.refresh_interval_secs);
    println!("  Fetch Timeout: {}s", config.fetch_timeout_secs);
    println!(
        "  Gas Price: {}",
        match &config.gas_rpc_url {
            Some(url) => format!("eth_gasPrice via {}", url),
            None => format!("fixed {} gwei", config.fallback_gas_price_gwei),
        }
    );
    println!("  Cycle Strategy: {}", config.cycle_strategy);
    println!("  Max Cycle Depth: {}", config.max_cycle_depth);
    println!("  Base Tokens: {}", config.base_tokens_upper().join(","));
    println!(
        "  Spread Window: {}% - {}%",
        config.min_spread_threshold_pct, config.max_realistic_spread_pct
    );
    println!(
        "  Profit Window: {}% - {}%",
        config.min_profit_pct, config.max_realistic_profit_pct
    );
    println!("  Min Net Profit: {}%", config.min_net_profit_pct);
    println!("  Alert Cooldown: {}s", config.alert_cooldown_secs);
    println!(
        "  Webhook: {}",
        match &config.webhook_url {
            Some(url) if config.webhook_bundles => format!("{} (alerts + bundles)", url),
            Some(url) => format!("{} (alerts only)", url),
            None => "Disabled".to_string(),
        }
    );
    println!(
        "  Execution Hand-off: {}",
        if config.execution_enabled { "Enabled" } else { "Disabled" }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run one tick and print the bundle.
async fn cmd_scan_once(file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config()?;
    metrics::init_metrics();

    let price_feed = build_price_feed(&config, file)?;
    let gas_feed = build_gas_feed(&config)?;
    let cache = Arc::new(OpportunityCache::new(CacheConfig::from(&config)));

    let mut orchestrator = RefreshOrchestrator::new(
        OrchestratorConfig::from(&config),
        price_feed,
        gas_feed,
        cache,
        AlertDispatcher::new(AlertConfig::from(&config)),
    );

    let bundle = orchestrator.tick().await;
    println!("{}", serde_json::to_string_pretty(&*bundle)?);

    if !bundle.is_live() {
        warn!(
            reason = bundle.degraded_reason.as_deref().unwrap_or("unknown"),
            "Scan ran degraded"
        );
    }
    Ok(())
}

/// Run the refresh loop and query API until shutdown.
async fn cmd_run(port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let mut config = load_config()?;
    if let Some(port) = port_override {
        config.port = port;
    }

    // Install the Prometheus recorder before any metric is touched
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::init_metrics();

    info!("Configuration loaded successfully");
    info!("Refresh interval: {}s", config.refresh_interval_secs);
    info!("Cycle strategy: {}", config.cycle_strategy);
    info!("Base tokens: {}", config.base_tokens_upper().join(","));

    let price_feed = build_price_feed(&config, None)?;
    let gas_feed = build_gas_feed(&config)?;

    // Shared cache and its sweeper
    let cache = Arc::new(OpportunityCache::new(CacheConfig::from(&config)));
    let sweeper = Arc::clone(&cache).spawn_sweeper();

    // API state follows the broadcast channel
    let broadcast = BroadcastPublisher::new(EVENT_BUFFER);
    let app_state = AppState::new(Arc::clone(&cache)).with_metrics(prometheus);
    let updater = app_state.spawn_updater(broadcast.subscribe());

    let mut publisher = FanoutPublisher::new()
        .with(Arc::new(LogPublisher))
        .with(Arc::new(broadcast));
    if let Some(webhook) = WebhookPublisher::from_config(&config)? {
        info!(
            url = config.webhook_url.as_deref().unwrap_or_default(),
            bundles = webhook.sends_bundles(),
            "Webhook publishing enabled"
        );
        publisher = publisher.with(Arc::new(webhook));
    }

    let mut orchestrator = RefreshOrchestrator::new(
        OrchestratorConfig::from(&config),
        price_feed,
        gas_feed,
        Arc::clone(&cache),
        AlertDispatcher::new(AlertConfig::from(&config)),
    )
    .with_publisher(Arc::new(publisher));

    let executor = if config.execution_enabled {
        let (sink, rx) = ChannelExecutionSink::new(EXECUTION_BUFFER);
        orchestrator = orchestrator.with_execution_sink(Arc::new(sink));
        info!("Execution hand-off enabled");
        Some(tokio::spawn(drain_execution(rx)))
    } else {
        None
    };

    // Start HTTP server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = create_router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("HTTP server listening on {}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            error!("HTTP server error: {}", e);
        }
    });

    // Refresh loop
    let refresh = tokio::spawn(orchestrator.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("Waiting for the in-flight tick to finish...");
    if let Err(e) = refresh.await {
        error!("Refresh loop panicked: {}", e);
    }
    if let Err(e) = server.await {
        error!("HTTP server task failed: {}", e);
    }

    sweeper.abort();
    updater.abort();
    if let Some(executor) = executor {
        executor.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Stand-in consumer for the execution collaborator: logs each descriptor.
async fn drain_execution(mut rx: mpsc::Receiver<ExecutionDescriptor>) {
    while let Some(desc) = rx.recv().await {
        info!(
            opportunity = %desc.opportunity_id,
            kind = %desc.kind,
            path = %desc.token_path.join(" -> "),
            venues = %desc.venue_path.join(","),
            net_profit_pct = desc.net_profit_pct,
            "Execution descriptor handed off"
        );
    }
}
