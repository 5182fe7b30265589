use std::sync::Arc;

use chatbridge::config::{load_config, AppConfig};
use chatbridge::observability::init_tracing;
use chatbridge::routing::dispatch::{normalize_base_path, router};
use chatbridge::state::AppState;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async move {
        run(config).await;
    });
}

async fn run(config: AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;
    let base_path = normalize_base_path(&config.server.base_path);

    let state = match AppState::from_config(config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            eprintln!("Failed to initialize application state: {err}");
            std::process::exit(1);
        }
    };

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    let shutdown = state.shutdown_token().clone();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutdown signal received");
                    shutdown.cancel();
                }
                Err(err) => tracing::warn!("failed to listen for shutdown signal: {err}"),
            }
        }
    });

    tracing::info!(
        "chatbridge-rs starting on {}:{} with base_path='{}' ({} upstreams)",
        host,
        port,
        base_path,
        state.upstreams().len()
    );

    let app = router(Arc::clone(&state));
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
