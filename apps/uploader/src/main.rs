//! tuskit uploader entry point.
//!
//! Reads the job file named by `TUSKIT_JOB` (default `tuskit-job.toml`),
//! uploads it and prints the server's finish token as JSON.

mod job;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tuskit_client::{ProgressCounter, ProgressSnapshot, ReqwestTransport, UploadSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting tuskit uploader"
    );

    let path = job::job_path();
    let job = job::UploadJob::load(&path)
        .with_context(|| format!("failed to load job {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        endpoint = %job.endpoint,
        files = job.files.len(),
        "job loaded"
    );

    let descriptor = job.descriptor().await.context("failed to read job files")?;
    let transport = ReqwestTransport::new(&job.upload)?;
    let session = UploadSession::new(&transport, job.upload.clone());

    // Ctrl-C stops the upload between requests; the server keeps what it has.
    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    let progress = ProgressCounter::new();
    progress.on_progress(Box::new(|snapshot: &ProgressSnapshot| {
        tracing::debug!(
            transferred = snapshot.transferred_bytes,
            total = snapshot.total_bytes,
            bytes_per_second = snapshot.bytes_per_second,
            "upload progress"
        );
    }));

    let token = if job.single_file {
        session.upload_file(&descriptor, &job.fields, &progress).await?
    } else {
        session.upload(&descriptor, &job.fields, &progress).await?
    };

    println!("{}", serde_json::to_string_pretty(token.as_value())?);
    Ok(())
}
