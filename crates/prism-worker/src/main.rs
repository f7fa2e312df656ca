use std::sync::Arc;

use anyhow::Context;
use prism_core::Config;
use prism_db::{connect, run_migrations, PgImageRepository, PgVariantRepository};
use prism_processing::ImageTransformer;
use prism_queue::PgJobQueue;
use prism_services::{PipelineMetrics, VariantPipeline};
use prism_storage::create_storage;
use prism_worker::{init_tracing, TransformWorker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_json());
    config.validate()?;

    tracing::info!(
        environment = %config.environment(),
        queue = %config.queue().name,
        storage_backend = ?config.storage_backend(),
        "Starting prism-worker"
    );

    let pool = connect(&config).await?;
    run_migrations(&pool).await?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    let pipeline = VariantPipeline::new(
        Arc::new(PgImageRepository::new(pool.clone())),
        Arc::new(PgVariantRepository::new(pool.clone())),
        storage,
        Arc::new(ImageTransformer::new(config.limits().clone())),
        PipelineMetrics::from_global(),
    );
    let queue = Arc::new(PgJobQueue::new(pool.clone(), config.queue()));

    let metrics = pipeline.metrics().clone();
    let worker = TransformWorker::new(
        queue,
        pipeline,
        WorkerConfig::from(config.queue()),
        metrics,
    )
    .with_listener(pool.clone());

    let signals = worker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing in-flight jobs (Ctrl-C again to cancel them)");
            signals.shutdown();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancelling in-flight jobs");
            signals.abort();
        }
    });

    worker.run().await;
    pool.close().await;
    Ok(())
}
