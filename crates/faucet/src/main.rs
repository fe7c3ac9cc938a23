//! Faucet service binary

use clap::{Parser, ValueEnum};
use drip_faucet::api::router;
use drip_faucet::{FaucetConfig, FaucetService, SledTransactionStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Payout per request (in wei)
    #[arg(long)]
    payout_amount: Option<String>,

    /// Cooldown between payouts to one wallet (seconds)
    #[arg(long)]
    funding_cooldown: Option<u64>,

    /// Database path
    #[arg(long)]
    db_path: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Flags win over file and environment values.
    fn apply_overrides(&self, config: &mut FaucetConfig) {
        if let Some(addr) = &self.server_addr {
            config.server_addr = addr.clone();
        }
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(amount) = &self.payout_amount {
            config.payout_amount = amount.clone();
        }
        if let Some(cooldown) = self.funding_cooldown {
            config.funding_cooldown_secs = cooldown;
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
    }
}

fn init_tracing(args: &Args) {
    let env_filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match args.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("Starting Drip Faucet v{}", env!("CARGO_PKG_VERSION"));

    let mut config = FaucetConfig::load(args.config.as_deref())?;

    args.apply_overrides(&mut config);

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  RPC URL: {}", config.rpc_url);
    info!("  Payout amount: {} wei", config.payout_amount);
    info!("  Funding cooldown: {}s", config.funding_cooldown_secs);
    info!("  Chain timeout: {}s", config.chain_timeout_secs);

    let store = SledTransactionStore::open(&config.db_path)?;
    info!("Database initialized at: {}", config.db_path);
    info!("  Recorded attempts: {}", store.total_records());

    let service = Arc::new(FaucetService::from_config(&config, Arc::new(store))?);
    info!("Faucet service initialized");

    let app = router(service, config.cors_enabled, config.metrics_enabled);

    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C"),
            _ = terminate.recv() => info!("Received terminate signal"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
