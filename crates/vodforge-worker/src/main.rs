//! Transcoding worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vodforge_queue::TaskQueue;
use vodforge_storage::StorageClient;
use vodforge_worker::{TaskExecutor, VideoProcessor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS endpoints)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("vodforge=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vodforge-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let storage = match StorageClient::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    // Store connectivity problems at startup are process-level faults
    let bucket = storage.bucket().to_string();
    if let Err(e) = storage.ensure_bucket(&bucket).await {
        error!("Object store unreachable: {}", e);
        std::process::exit(1);
    }

    let queue = match TaskQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create task queue: {}", e);
            std::process::exit(1);
        }
    };

    let processor = VideoProcessor::new(storage, config.clone());
    let executor = Arc::new(TaskExecutor::new(config, queue, processor));

    // Finish the in-flight task, then stop
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
