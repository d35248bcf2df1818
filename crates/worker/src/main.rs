//! `trikot-worker` -- queue-driven ComfyUI render worker.
//!
//! Starts a local ComfyUI, optionally runs a warm-up job, then consumes
//! render jobs from SQS until SIGINT/SIGTERM. The signal handler is
//! installed first, so a signal at any point stops ComfyUI before the
//! process exits. See [`WorkerConfig::from_env`] for the environment
//! variables.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trikot_cloud::http::HttpFetcher;
use trikot_cloud::s3::S3Store;
use trikot_cloud::CloudTransfer;
use trikot_comfyui::reconnect::ReconnectConfig;
use trikot_comfyui::ComfyUIEngine;
use trikot_queue::SqsQueue;
use trikot_worker::config::LogFormat;
use trikot_worker::startup::launch_engine;
use trikot_worker::warmup::run_warmup;
use trikot_worker::{run_loop, JobProcessor, LocalWorkspace, LoopConfig, WorkerConfig};

/// Default `RUST_LOG` filter.
const DEFAULT_LOG_FILTER: &str =
    "trikot_worker=info,trikot_comfyui=info,trikot_cloud=info,trikot_queue=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );
    let config = config.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        queue_url = %config.queue_url,
        region = %config.aws_region,
        comfyui_dir = %config.comfyui_dir.display(),
        "Starting trikot-worker",
    );

    // --- Shutdown signal ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Collaborators ---
    let engine_config = config.engine_config();
    let engine = ComfyUIEngine::new(&engine_config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to set up the ComfyUI client");
        std::process::exit(1);
    });
    let http = HttpFetcher::new(config.http_connect_timeout, config.http_read_timeout)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to set up the HTTP client");
            std::process::exit(1);
        });
    let endpoint = config.aws_endpoint_url.as_deref();
    let s3 = S3Store::from_env(&config.aws_region, endpoint).await;
    let transfer = Arc::new(CloudTransfer::new(s3, http));
    let queue = SqsQueue::from_env(
        &config.aws_region,
        endpoint,
        config.queue_url.clone(),
        config.visibility_timeout,
    )
    .await;
    let workspace = Arc::new(LocalWorkspace::new(
        config.input_dir.clone(),
        config.output_dir.clone(),
        config.comfyui_temp_dir.clone(),
    ));

    // --- ComfyUI process ---
    let launched = launch_engine(
        &engine_config,
        engine.api(),
        &ReconnectConfig::default(),
        &cancel,
    )
    .await;
    let server = match launched {
        Ok(Some(server)) => server,
        Ok(None) => {
            tracing::info!("Shutdown complete");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start ComfyUI");
            std::process::exit(1);
        }
    };

    let processor = JobProcessor::new(
        Arc::new(engine),
        transfer.clone(),
        workspace,
        config.prepare_options(),
    );

    // --- Warm-up ---
    if let Some(source) = &config.warmup_job {
        let warmup_dir = std::env::temp_dir();
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown requested during warm-up");
            }
            _ = run_warmup(source, transfer.as_ref(), &processor, &warmup_dir) => {}
        }
    }

    // --- Consumption loop ---
    let loop_config = LoopConfig {
        wait_time: config.queue_wait_time,
        error_backoff: config.loop_error_backoff,
    };
    let stats = run_loop(&queue, &processor, loop_config, &cancel).await;

    server.shutdown(engine_config.shutdown_grace).await;
    tracing::info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        transport_errors = stats.transport_errors,
        "Shutdown complete",
    );
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received SIGINT (Ctrl-C), finishing current job and shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing current job and shutting down");
        }
    }
}
