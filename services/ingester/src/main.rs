//! Storm PSA ingester service.
//!
//! Consumes ingest units from the Redis queue, turns each into clipped
//! contour polygons and point samples, and loads them into PostGIS. The
//! same binary enqueues PSA manifests and can run a PSA in-process.

mod config;
mod worker;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use config::WorkerConfig;
use ingestion::{DatasetProcessor, PsaManifest};
use netcdf_parser::{silence_hdf5_errors, NetCdfOpener};
use storage::{IngestJob, IngestQueue, PgStore};
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Storm PSA ingester: contours, clips and loads simulation output")]
struct Args {
    /// Consumer name within the ingest group
    #[arg(short, long, env = "WORKER_NAME")]
    consumer: Option<String>,

    /// Drain the queue once and exit (vs continuous consumption)
    #[arg(long)]
    once: bool,

    /// Enqueue every unit and dataset metadata job of a PSA manifest (JSON) and exit
    #[arg(long, value_name = "MANIFEST")]
    enqueue: Option<String>,

    /// Ingest a PSA manifest in-process, without the queue, and exit
    #[arg(long, value_name = "MANIFEST")]
    run: Option<String>,

    /// Print units that exhausted their retries and exit
    #[arg(long)]
    failed: bool,

    /// Apply the database schema before starting
    #[arg(long)]
    migrate: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    silence_hdf5_errors();

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter initialized");
    }

    let config = WorkerConfig::from_env()?;
    info!(
        concurrency = config.concurrency,
        band_count = config.ingest.band_count,
        max_retries = config.ingest.retry.max_retries,
        "Loaded configuration"
    );

    if args.failed {
        return print_failed(&config).await;
    }
    if let Some(path) = &args.enqueue {
        return enqueue_manifest(&config, Path::new(path)).await;
    }

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    if args.migrate {
        store.migrate().await?;
        info!("Database schema applied");
    }

    let processor = Arc::new(DatasetProcessor::new(
        store,
        Arc::new(NetCdfOpener),
        Arc::new(config.catalog()?),
        config.ingest.clone(),
    ));

    if let Some(path) = &args.run {
        let manifest = load_manifest(&config, Path::new(path))?;
        let outcome = processor.run_psa(&manifest, config.concurrency).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if !outcome.success() {
            anyhow::bail!("PSA ingestion failed: {}", outcome.validation.exceptions());
        }
        return Ok(());
    }

    let base_name = args
        .consumer
        .unwrap_or_else(|| format!("ingester-{}", Uuid::new_v4()));
    info!(name = %base_name, "Starting storm PSA ingester");

    let mut handles = Vec::with_capacity(config.concurrency);
    for i in 0..config.concurrency.max(1) {
        let queue = IngestQueue::connect(&config.redis_url).await?;
        let mut worker = Worker::new(
            format!("{}-{}", base_name, i),
            queue,
            Arc::clone(&processor),
            config.block_ms,
            config.stale_after_ms,
        );
        let once = args.once;
        handles.push(tokio::spawn(async move {
            if once {
                worker.drain().await.map(|handled| {
                    info!(handled, "Queue drained");
                })
            } else {
                worker.run_forever().await
            }
        }));
    }

    for handle in handles {
        handle.await??;
    }
    Ok(())
}

/// Read a manifest and resolve its dataset paths against the data root.
fn load_manifest(config: &WorkerConfig, path: &Path) -> Result<PsaManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let mut manifest = PsaManifest::from_json(&json)?;
    for dataset in &mut manifest.datasets {
        dataset.path = config.data_root.join(&dataset.path);
    }
    Ok(manifest)
}

async fn enqueue_manifest(config: &WorkerConfig, path: &Path) -> Result<()> {
    let manifest = load_manifest(config, path)?;
    let units = manifest.units(&config.catalog()?)?;

    let mut queue = IngestQueue::connect(&config.redis_url).await?;
    for dataset in &manifest.datasets {
        let job = IngestJob::metadata(dataset.clone(), manifest.storm.clone());
        queue.enqueue(&job).await?;
        queue.record_state(&job.key(), "pending").await?;
    }
    for unit in units.iter() {
        let job = IngestJob::new(unit.clone(), manifest.storm.clone());
        queue.enqueue(&job).await?;
        queue.record_state(&unit.key(), "pending").await?;
    }

    info!(
        storm = %manifest.storm.name,
        datasets = manifest.datasets.len(),
        units = units.len(),
        "Enqueued PSA"
    );
    Ok(())
}

async fn print_failed(config: &WorkerConfig) -> Result<()> {
    let mut queue = IngestQueue::connect(&config.redis_url).await?;
    let failed = queue.failed_units().await?;
    if failed.is_empty() {
        info!("No failed units");
    }
    println!("{}", serde_json::to_string_pretty(&failed)?);
    Ok(())
}
