use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use wishd::config::{Cli, Config};
use wishd::enrichment::{EnrichmentQueue, EnrichmentWorker, HttpMetadataFetcher};
use wishd::state::AppState;
use wishd::{db, routes, search};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    {
        let conn = pool.get()?;
        if let Some(indexed) = search::rebuild_if_stale(&conn)? {
            tracing::info!("Search index rebuilt: {} wishes", indexed);
        }
    }

    let mut state = AppState::new(pool, config.clone(), None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the enrichment worker when a metadata service is configured
    let worker = match &config.enrichment.meta_fetch_url {
        Some(url) => {
            let fetcher = HttpMetadataFetcher::new(
                url,
                Duration::from_secs(config.enrichment.timeout_secs),
            )?;
            let (queue, receiver) = EnrichmentQueue::new(config.enrichment.queue_capacity);
            state.enrichment = Some(queue);

            let worker = EnrichmentWorker::new(state.wishes.clone(), Arc::new(fetcher));
            tracing::info!("Metadata enrichment via {}", url);
            Some(tokio::spawn(worker.run(receiver, shutdown_rx)))
        }
        None => {
            tracing::info!("No metadata service configured, enrichment disabled");
            None
        }
    };

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Queued enrichment jobs are dropped, only the worker task is awaited
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            tracing::error!("Enrichment worker panicked: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown requested");
    }
}
