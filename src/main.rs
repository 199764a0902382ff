use anyhow::{Context, Result};
use std::sync::Arc;

use netatmo_away::{
    auth::{self, RotationCallback, TokenManager},
    cache::AwayModeCache,
    config::{self, Config, LogFormat},
    http_client::{self, NetatmoHttpClient},
    middleware, routes,
    switch::AwaySwitch,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Check if interactive setup is needed (no .env and missing required values)
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables from interactive config so Config::load() can use them
        std::env::set_var("NETATMO_CLIENT_ID", &interactive_config.client_id);
        std::env::set_var("NETATMO_CLIENT_SECRET", &interactive_config.client_secret);
        std::env::set_var("NETATMO_REFRESH_TOKEN", &interactive_config.refresh_token);
        std::env::set_var("NETATMO_HOME_ID", &interactive_config.home_id);
        std::env::set_var("BRIDGE_API_KEY", &interactive_config.bridge_api_key);
        std::env::set_var("SERVER_PORT", &interactive_config.server_port);
    }

    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }

    tracing::info!("Netatmo Away bridge starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let http = http_client::build_client(config.http_connect_timeout, config.http_request_timeout)?;

    let tokens = Arc::new(
        TokenManager::new(
            http.clone(),
            &config.api_url,
            config.credentials.clone(),
            Some(rotation_callback(&config)),
        )
        .context("Failed to initialize token manager")?,
    );

    let client = Arc::new(NetatmoHttpClient::new(
        http,
        tokens,
        config.api_url.clone(),
        config.home_id.clone(),
    ));
    tracing::info!("HTTP client initialized for home {}", config.home_id);

    let switch = AwaySwitch::new(client, AwayModeCache::new(config.away_cache_ttl));

    // Warm the cache; failures are not fatal, reads will retry in the background
    match switch.refresh().await {
        Ok(away) => tracing::info!("Initial away mode: `{}`", away),
        Err(e) => {
            tracing::error!("Initial Netatmo request failed: {}", e);
            tracing::warn!("Server will start but the switch reports `not away` until Netatmo answers");
        }
    }

    let app_state = routes::AppState {
        bridge_api_key: config.bridge_api_key.clone(),
        switch,
    };

    let app = build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    print_startup_banner(&config);

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Report rotated refresh tokens; persist them when a token file is configured
fn rotation_callback(config: &Config) -> RotationCallback {
    match config.token_file.clone() {
        Some(path) => auth::persist_rotations(path),
        None => Arc::new(|_: &str| {
            tracing::warn!(
                "Netatmo rotated the refresh token but NETATMO_TOKEN_FILE is not set; \
                 it will be lost on restart"
            );
        }),
    }
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::away_routes(state))
        .layer(middleware::cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    println!();
    println!("  Netatmo Away bridge");
    println!();
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Netatmo API: {}", config.api_url);
    println!("  Home:        {}", config.home_id);
    println!("  Cache TTL:   {}s", config.away_cache_ttl);
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
