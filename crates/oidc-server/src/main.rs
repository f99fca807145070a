//! OpenID Connect token service
//!
//! Seeds the demo clients, then serves the token endpoint until Ctrl+C or
//! SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oidc_server::config::{Config, ConfigSource};
use oidc_server::AppState;

#[derive(Parser, Debug)]
#[command(name = "oidc-server")]
#[command(about = "Minimal OpenID Connect token issuance service")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 5000, env = "OIDC_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "OIDC_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "./config", env = "OIDC_CONFIG_PATH")]
    config_path: String,

    /// Public URL for this service (token issuer unless configured)
    #[arg(long, default_value = "http://localhost:5000", env = "OIDC_PUBLIC_URL")]
    public_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration first; it carries the default log filter
    let (config, source) = Config::load(&cli.config_path)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &source {
        ConfigSource::File(path) => tracing::info!("Loaded configuration from {:?}", path),
        ConfigSource::DefaultsWritten(path) => {
            tracing::info!("No config file found, wrote defaults to {:?}", path)
        }
    }

    // Seeding must finish before the listener is bound
    let state = Arc::new(AppState::from_config(config, &cli.public_url)?);
    tracing::info!(
        "Registry ready: {} clients, {} users",
        state.clients.len(),
        state.users.len()
    );

    let app = oidc_server::router(Arc::clone(&state));

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting oidc-server on {}", addr);
    tracing::info!("Issuer: {}", state.dispatcher.issuer().issuer());
    tracing::info!(
        "Access token lifetime: {}s",
        state.dispatcher.issuer().lifetime_secs()
    );
    tracing::info!("Token endpoint: {}", state.config.endpoint.token_path());

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("oidc-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
