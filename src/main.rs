use anyhow::Context;
use clap::Parser;

use build_silver_providers::{args::Args, pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let manifest = pipeline::run(&args)
        .await
        .with_context(|| format!("job {} failed", args.job_name))?;
    tracing::info!(
        "Run {} complete: ingested={} written={} duplicates_dropped={} incomplete_dropped={} invalid_npi_dropped={}",
        manifest.run_id,
        manifest.counts.ingested,
        manifest.counts.written,
        manifest.counts.duplicates_dropped,
        manifest.counts.incomplete_dropped,
        manifest.counts.invalid_npi_dropped
    );
    for artifact in &manifest.artifacts {
        tracing::info!("artifact {artifact}");
    }
    Ok(())
}
