//! Listing ingest service: binary entrypoint.
//! Loads config and the source catalog, starts the ingestion scheduler and
//! serves the read API.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listing_ingest::ingest::config::IngestConfig;
use listing_ingest::ingest::scheduler::Scheduler;
use listing_ingest::ingest::sources::SourceCatalog;
use listing_ingest::metrics::Metrics;

/// Compact logs by default, JSON when INGEST_LOG_JSON=1. RUST_LOG wins
/// over the `info` default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("INGEST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default()?;
    let catalog = SourceCatalog::load_default()?;
    tracing::info!(
        target: "ingest",
        job_sources = catalog.jobs.len(),
        course_sources = catalog.courses.len(),
        disabled = ?cfg.disabled_sources,
        "configuration loaded"
    );

    let metrics = Metrics::init()?;
    let service = listing_ingest::build_service(&cfg, &catalog).await?;

    let (scheduler, stop) = Scheduler::for_ingestor(service.ingestor.clone(), &cfg.schedule).spawn();

    let app = listing_ingest::router(service.state).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("binding {}", cfg.server.addr))?;
    tracing::info!(target: "api", addr = %cfg.server.addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    stop.stop();
    let _ = scheduler.await;
    Ok(())
}
