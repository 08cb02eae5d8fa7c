//! Tootbox media worker entry point.

use std::sync::Arc;

use apalis::prelude::*;
use tokio::signal;
use tootbox_common::{Config, LocalStorage};
use tootbox_core::{MediaAttachmentService, MediaService};
use tootbox_db::repositories::MediaAttachmentRepository;
use tootbox_queue::workers::{MediaWorkerContext, process_media_worker};
use tootbox_queue::{ProcessMediaJob, RedisMediaQueue, SchedulerConfig, run_scheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tootbox=debug".into()),
        )
        .init();

    info!("Starting tootbox media worker...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(tootbox_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    tootbox_db::migrate(&db).await?;
    info!("Migrations completed");

    // Connect to Redis and initialize job queue
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let redis_storage = apalis_redis::RedisStorage::<ProcessMediaJob>::new(redis_conn);
    info!("Connected to Redis job queue");

    // Initialize services
    let storage = Arc::new(LocalStorage::new(
        config.storage.base_path.clone(),
        config.storage.base_url.clone(),
    ));
    let media = MediaService::new(config.media.clone());
    let store = Arc::new(MediaAttachmentRepository::new(Arc::clone(&db)));

    let mut attachments = MediaAttachmentService::new(store, storage, media);
    attachments.set_queue(Arc::new(RedisMediaQueue::new(redis_storage.clone())));

    // Periodic sweeps for stuck and failed uploads
    let scheduler_config = SchedulerConfig::from(&config.scheduler);
    run_scheduler(scheduler_config, Arc::new(attachments.clone())).await;
    info!("Media scheduler started");

    // Start media processing worker
    let worker_ctx = MediaWorkerContext::new(attachments);
    let monitor = Monitor::new().register({
        WorkerBuilder::new("process-media")
            .data(worker_ctx)
            .backend(redis_storage)
            .build_fn(process_media_worker)
    });
    info!(host = %config.instance.host, "Media worker started");

    monitor
        .run_with_signal(async {
            shutdown_signal().await;
            Ok(())
        })
        .await?;

    info!("Media worker shutdown complete");
    Ok(())
}
