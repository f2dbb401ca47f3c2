use anyhow::{Context, Result, bail};
use std::{path::PathBuf, time::Instant};

use crate::args::Args;
use crate::constants::{SILVER_PART_FILE, WORK_DIR_NAME};
use crate::dedup::dedup_and_filter;
use crate::enrich::enrich;
use crate::ingest::ingest_files;
use crate::job::{Job, RunManifest, StageCounts};
use crate::normalize::normalize;
use crate::parquet_writer::write_silver_parquet;
use crate::reports::{
    ReportArtifact, write_aggregate_reports, write_quarantine, write_report_summary,
};
use crate::schema::{EnrichedProvider, RawProvider};
use crate::storage::{Location, S3Options, Storage};
use crate::validate::{FieldPatterns, ValidationReport, filter_valid_npi, validate};

/// Result of the in-memory stages: the silver rows plus the diagnostic splits.
pub struct Transformed {
    /// Every enriched row before the NPI filter; feeds the grouped reports.
    pub enriched: Vec<EnrichedProvider>,
    pub silver: Vec<EnrichedProvider>,
    pub validation: ValidationReport,
    pub counts: StageCounts,
}

/// Dedup/filter, normalize, validate, enrich and NPI filter, in that order.
pub fn transform(rows: Vec<RawProvider>, patterns: &FieldPatterns) -> Transformed {
    let mut counts = StageCounts::default();

    let (complete, dedup_summary) = dedup_and_filter(rows);
    counts.record_dedup(dedup_summary);
    tracing::info!(
        "Dedup/filter: {} in, {} duplicates dropped, {} incomplete dropped",
        dedup_summary.input_rows,
        dedup_summary.duplicates_dropped,
        dedup_summary.incomplete_dropped
    );

    let normalized = normalize(complete);

    let validation = validate(&normalized, patterns);
    counts.invalid_email = validation.email.invalid.len();
    counts.invalid_phone = validation.phone.invalid.len();
    counts.invalid_zip = validation.zip.invalid.len();
    tracing::info!(
        "Validation: invalid_email={} invalid_phone={} invalid_zip={} fully_valid={}",
        counts.invalid_email,
        counts.invalid_phone,
        counts.invalid_zip,
        validation.fully_valid().len()
    );

    let enriched = enrich(normalized);

    let (silver, invalid_npi) = filter_valid_npi(&enriched, patterns);
    counts.invalid_npi_dropped = invalid_npi;
    if invalid_npi > 0 {
        tracing::warn!("Dropped {invalid_npi} rows with a malformed npi_number");
    }
    counts.written = silver.len();

    Transformed {
        enriched,
        silver,
        validation,
        counts,
    }
}

fn elapsed(t: Instant) -> f64 {
    t.elapsed().as_secs_f64()
}

fn resolve_work_dir(args: &Args) -> PathBuf {
    args.work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(WORK_DIR_NAME))
}

/// Runs the whole job: ingest, transform, stage outputs locally, publish them,
/// then commit. Any error before the commit leaves no commit marker.
pub async fn run(args: &Args) -> Result<RunManifest> {
    let input = Location::parse(&args.input_path).context("Invalid --input-path")?;
    let output = Location::parse(&args.output_path).context("Invalid --output-path")?;
    if let Location::Http(url) = &output {
        bail!("--output-path must be an S3 prefix or local directory, got {url}");
    }
    let reports = if args.skip_reports {
        None
    } else {
        Some(match &args.reports_path {
            Some(raw) => Location::parse(raw).context("Invalid --reports-path")?,
            None => output.reports_sibling()?,
        })
    };
    if let Some(reports) = &reports
        && reports.overlaps(&output)
    {
        bail!("--reports-path {reports} overlaps --output-path {output}; publishing one would clear the other");
    }
    let work_dir = resolve_work_dir(args);

    let job = Job::init(&args.job_name, &work_dir)?;
    tracing::info!("input={input}");
    tracing::info!("output={output}");
    if let Some(reports) = &reports {
        tracing::info!("reports={reports}");
    }

    let mut locations = vec![&input, &output];
    locations.extend(reports.as_ref());
    let storage = Storage::for_locations(&locations, &S3Options::from(args)).await?;
    let patterns = FieldPatterns::compile()?;

    tracing::info!("Step 1/5: ingest");
    let t0 = Instant::now();
    let download_dir = job.staging_dir().join("input");
    let files = storage.fetch_inputs(&input, &download_dir).await?;
    let raw = ingest_files(&files)?;
    tracing::info!("Ingest done in {:.1}s", elapsed(t0));

    tracing::info!("Step 2/5: dedup, normalize, validate, enrich");
    let t1 = Instant::now();
    let transformed = transform(raw, &patterns);
    tracing::info!(
        "Transform done in {:.1}s: {} silver rows",
        elapsed(t1),
        transformed.silver.len()
    );

    tracing::info!("Step 3/5: stage silver parquet");
    let silver_path = job.staging_dir().join("silver").join(SILVER_PART_FILE);
    write_silver_parquet(&silver_path, &transformed.silver)?;

    let mut staged_reports: Vec<ReportArtifact> = Vec::new();
    if reports.is_some() {
        tracing::info!("Step 4/5: stage reports");
        let reports_dir = job.staging_dir().join("reports");
        staged_reports.extend(write_aggregate_reports(
            &transformed.enriched,
            &transformed.silver,
            &reports_dir,
        )?);
        staged_reports.extend(write_quarantine(&transformed.validation, &reports_dir)?);
        let summary = write_report_summary(job.run_id(), &staged_reports, &reports_dir)?;
        staged_reports.push(summary);
    } else {
        tracing::info!("Step 4/5: reports skipped");
    }

    tracing::info!("Step 5/5: publish + commit");
    let removed = storage.clear(&output).await?;
    if removed > 0 {
        tracing::info!("Overwrite: removed {removed} existing entries under {output}");
    }
    let silver_target = output.child(SILVER_PART_FILE)?;
    storage.put_file(&silver_path, &silver_target).await?;
    tracing::info!("Wrote silver table {silver_target}");

    let mut artifacts = vec![silver_target.to_string()];
    if let Some(reports) = &reports {
        storage.clear(reports).await?;
        for artifact in &staged_reports {
            let target = reports.child(&artifact.file_name)?;
            storage.put_file(&artifact.path, &target).await?;
            artifacts.push(target.to_string());
        }
        tracing::info!("Published {} report artifacts to {reports}", staged_reports.len());
    }

    let manifest = RunManifest {
        job_name: job.job_name().to_string(),
        run_id: job.run_id().to_string(),
        started_at_unix: job.started_at_unix(),
        committed_at_unix: 0,
        input_location: input.to_string(),
        output_location: output.to_string(),
        reports_location: reports.as_ref().map(ToString::to_string),
        counts: transformed.counts,
        artifacts,
    };
    job.commit(&storage, &output, manifest).await
}
