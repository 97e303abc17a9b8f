use anyhow::{Context, Result};
use connection_manager::api::{create_router, ApiState};
use connection_manager::{
    AdapterCatalog, AdapterSettings, ConnectionRegistry, LogStatusPublisher, NatsStatusPublisher, RetryLimits,
    StatusPublisher, TokenRefreshScheduler, WebLoginState,
};
use std::sync::Arc;
use std::time::Duration;
use sysgate::auth::CallerDirectory;
use sysgate::config::{apply_env_overrides, load_config, GatewayConfig};
use sysgate::nats::{MessagePublisher, NatsClient};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connection_manager=info,sysgate=info".into()),
        )
        .init();

    info!("Connection manager starting...");

    // Configuration: optional TOML file, then environment overrides
    let mut config = match std::env::var("SYSGATE_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config);

    info!(
        bind_addr = %config.server.bind_addr,
        public_url = %config.server.public_url,
        nats_enabled = config.nats.enabled,
        auth_enabled = config.auth.enabled,
        refresh_interval_secs = config.refresh.interval_seconds,
        "Configuration loaded"
    );

    // Status change broadcast
    let publisher: Arc<dyn StatusPublisher> = if config.nats.enabled {
        let nats = NatsClient::connect(config.nats.clone())
            .await
            .context("Failed to initialize NATS")?;
        info!("NATS connected");
        Arc::new(NatsStatusPublisher::new(MessagePublisher::new(nats.jetstream().clone())))
    } else {
        info!("NATS disabled, status changes are only logged");
        Arc::new(LogStatusPublisher)
    };

    let catalog = AdapterCatalog::builtin(&AdapterSettings::from(&config.connections));
    let registry = Arc::new(ConnectionRegistry::new(
        catalog,
        publisher,
        RetryLimits::from_config(&config.refresh, &config.connections),
        &config.server.public_url,
    ));

    let scheduler = TokenRefreshScheduler::new(
        Arc::clone(&registry),
        Duration::from_secs(config.refresh.interval_seconds),
    );
    let scheduler_handle = scheduler.start();

    // Start HTTP API server
    let api_state = ApiState {
        registry: Arc::clone(&registry),
        callers: Arc::new(CallerDirectory::new(&config.auth)),
    };
    let weblogin_state = WebLoginState::new(Arc::clone(&registry), &config.weblogin)?;
    let router = create_router(api_state, weblogin_state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Gateway API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Gateway API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    scheduler_handle.abort();
    info!("Connection manager stopped");

    Ok(())
}
