//! vshard binary: coordinator plus an in-process worker pool.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vshard_coordinator::membership::{local_pool_events, spawn_membership_listener};
use vshard_coordinator::{Coordinator, CoordinatorConfig, RoundRobinRouter};
use vshard_media::{check_ffmpeg, FfmpegSplitMerge, FfmpegTranscoder, MediaConfig};
use vshard_models::{EncodeAttributes, JobEvent, MemberEvent, SubmitRequest};
use vshard_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;
    info!("Starting vshard");

    if let Ok(addr) = std::env::var("VSHARD_METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("invalid VSHARD_METRICS_ADDR")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Serving metrics on {}", addr);
    }

    let media_config = MediaConfig::from_env();
    if let Err(e) = check_ffmpeg(&media_config.ffmpeg_path) {
        warn!("{}; split, transcode and merge will fail", e);
    }

    let mut coordinator_config = CoordinatorConfig::from_env();
    coordinator_config.scratch_root = media_config.scratch_root.clone();
    let worker_config = WorkerConfig::from_env();
    info!("Coordinator config: {:?}", coordinator_config);
    info!("Worker config: {:?}", worker_config);

    let local_workers: usize = std::env::var("VSHARD_LOCAL_WORKERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2);

    let transcoder = Arc::new(FfmpegTranscoder::new(&media_config));
    let workers: Vec<_> = (0..local_workers)
        .map(|i| Worker::spawn(format!("local-{}", i), worker_config.clone(), transcoder.clone()))
        .collect();
    let pool_events = local_pool_events(&workers);

    let coordinator = Coordinator::spawn(
        coordinator_config,
        Arc::new(FfmpegSplitMerge::new(&media_config)),
        Arc::new(RoundRobinRouter::new(workers.clone())),
    );
    let (members_tx, members_rx) = mpsc::unbounded_channel();
    let membership = spawn_membership_listener(members_rx, coordinator.clone());
    for event in pool_events {
        members_tx.send(event)?;
    }

    if let Ok(source) = std::env::var("VSHARD_SUBMIT_SOURCE") {
        let output_format =
            std::env::var("VSHARD_SUBMIT_FORMAT").unwrap_or_else(|_| "mkv".to_string());
        let input_format = std::path::Path::new(&source)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(vshard_models::attributes::DEFAULT_INPUT_FORMAT)
            .to_string();

        let request = SubmitRequest::new(
            &source,
            EncodeAttributes::new(input_format, output_format),
        );
        let mut job = coordinator.submit(request).await?;
        info!(job_id = %job.job_id, "Submitted {}", source);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
            event = job.wait() => match event {
                Some(JobEvent::Complete { artifact_path, .. }) => {
                    info!("Job complete: {}", artifact_path.display());
                }
                Some(JobEvent::Failed { reason, .. }) => error!("Job failed: {}", reason),
                _ => warn!("Job event stream closed"),
            },
        }
    } else {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    }

    for worker in &workers {
        worker.shutdown();
        members_tx.send(MemberEvent::Removed {
            node: worker.id().to_string(),
        })?;
    }
    drop(members_tx);
    membership.await.context("membership listener failed")?;

    let status = coordinator.status().await?;
    info!("Final status: {}", serde_json::to_string(&status)?);
    info!("vshard shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vshard=info".parse()?);

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
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
