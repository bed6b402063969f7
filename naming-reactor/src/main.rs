use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use naming_reactor::api;
use naming_reactor::cache::db::CacheDb;
use naming_reactor::cache_manager::CacheHandle;
use naming_reactor::config::Config;
use naming_reactor::proxy::HttpNamingProxy;
use naming_reactor::push::receiver::PushReceiver;
use naming_reactor::reactor::HostReactor;
use naming_reactor::subscriber::Subscribers;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("naming_reactor=info,naming_reactord=info"))
        )
        .init();

    tracing::info!("Starting naming-reactord");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/naming-reactor/reactor.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Disk fallback lives on its own thread
    let db = CacheDb::open_dir(&config.reactor.cache_dir)?;
    tracing::info!("Opened disk cache in {:?}", config.reactor.cache_dir);
    let cache_handle = CacheHandle::spawn(db);

    let push_receiver = PushReceiver::bind(&config.push.listen).await?;
    let push_port = push_receiver.port();

    let proxy = HttpNamingProxy::new(&config.server)?;
    let subscribers = Arc::new(Subscribers::new());

    let reactor = HostReactor::open(
        config.reactor.clone(),
        Arc::new(proxy),
        Arc::new(cache_handle.clone()),
        subscribers,
        push_port,
    )
    .await;

    let cancel = CancellationToken::new();

    // Push listener -> reactor
    let (push_tx, push_rx) = mpsc::channel(256);
    let receiver_cancel = cancel.clone();
    let receiver_handle = tokio::spawn(async move {
        if let Err(e) = push_receiver.run(push_tx, receiver_cancel).await {
            tracing::error!("Push listener error: {}", e);
        }
    });

    let ingest_cancel = cancel.clone();
    let ingest_reactor = Arc::clone(&reactor);
    let ingest_handle = tokio::spawn(async move {
        if let Err(e) = ingest_reactor.run_push_ingest(push_rx, ingest_cancel).await {
            tracing::error!("Push ingest error: {}", e);
        }
    });

    let scheduler_handle = reactor.start_scheduler(cancel.clone());

    let app = api::routes::router(api::routes::AppState {
        reactor: Arc::clone(&reactor),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(receiver_handle, ingest_handle, scheduler_handle, server_handle);

    if let Err(e) = cache_handle.shutdown().await {
        tracing::error!("Failed to shutdown cache: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
