//! Privytar Daemon - privacy-preserving avatar proxy

mod config;
mod duration;
mod error;
mod handler;
mod middleware;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use privycache::AvatarCache;
use privytar::{meta, AvatarService, FetchClient};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::config::Config;
use crate::handler::AppState;
use crate::middleware::Policy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Bind address, overrides server.address
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.address = bind;
    }

    if args.check {
        println!("configuration OK: {}", args.config.display());
        return Ok(());
    }

    if args.health {
        match TcpStream::connect(&config.server.address).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting {} v{}", config.service.name, meta::VERSION);
    info!(
        capacity = config.server.cache_capacity,
        ttl = ?config.server.cache_ttl,
        upstream = %config.server.upstream,
        "cache configured"
    );

    let cache = Arc::new(
        AvatarCache::new(config.server.cache_capacity, config.server.cache_ttl)
            .context("invalid cache settings")?,
    );
    let client = FetchClient::new(&config.service.name, &config.service.contact)
        .context("failed to create upstream client")?;
    let avatars = Arc::new(AvatarService::new(
        &config.service.homepage,
        &config.server.upstream,
        Arc::new(client),
        cache,
    ));

    let policy = Policy::new(
        &config.service.privacy_policy,
        &config.service.terms_of_service,
    )
    .context("policy links must be valid header values")?;
    let app = handler::router(AppState { avatars }, &policy, config.server.log_requests);

    let listener = TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.address))?;
    info!("Server listening on {}", config.server.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
