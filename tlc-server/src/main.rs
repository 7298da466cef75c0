// tlc-server - token endpoint for the avatar onboarding experience

use clap::Parser;
use std::sync::Arc;
use tlc_core::{AppConfig, Secrets, ServerConfig};
use tlc_server::{create_router, ApiState, TokenExchange};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tlc-server", version, about = "Gated token exchange for interactive avatar sessions")]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Issue credentials without a bot check
    #[arg(long)]
    ungated: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    // Secrets are read once here and never change afterwards
    let secrets = Secrets::from_env();
    if secrets.streaming_api_key.is_none() {
        warn!("⚠️  HEYGEN_API_KEY is not set; token requests will fail until it is provided");
    }
    if config.require_verification && secrets.uses_test_secret() {
        warn!("⚠️  TURNSTILE_SECRET_KEY is not set; using the public test secret");
    }
    if !config.require_verification {
        warn!("⚠️  Running ungated: credentials are issued without a bot check");
    }

    let exchange = TokenExchange::from_config(&config, &secrets)?;
    let state = ApiState {
        exchange: Arc::new(exchange),
        site_key: secrets.site_key.clone(),
    };

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("🌐 Token endpoint ready on http://{}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("👋 tlc-server stopped");
    Ok(())
}

/// Only the `[server]` section matters here; `[client]` is left unvalidated.
fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("📋 Loading configuration from {}", path);
            AppConfig::from_file(path)?.server
        }
        None => ServerConfig::default(),
    }
    .with_env_overrides();

    if let Some(bind) = &args.bind {
        config.bind_address = bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.ungated {
        config.require_verification = false;
    }

    config.validate()?;
    Ok(config)
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}
