use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::common::{new_run_id, now_unix_seconds, write_atomic};
use crate::constants::COMMIT_MARKER_FILE;
use crate::dedup::DedupSummary;
use crate::storage::{Location, Storage};

/// Row counts recorded at each stage boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub ingested: usize,
    pub duplicates_dropped: usize,
    pub incomplete_dropped: usize,
    pub invalid_email: usize,
    pub invalid_phone: usize,
    pub invalid_zip: usize,
    pub invalid_npi_dropped: usize,
    pub written: usize,
}

impl StageCounts {
    pub fn record_dedup(&mut self, summary: DedupSummary) {
        self.ingested = summary.input_rows;
        self.duplicates_dropped = summary.duplicates_dropped;
        self.incomplete_dropped = summary.incomplete_dropped;
    }
}

/// Contents of the `_SUCCESS` commit marker.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub job_name: String,
    pub run_id: String,
    pub started_at_unix: i64,
    pub committed_at_unix: i64,
    pub input_location: String,
    pub output_location: String,
    pub reports_location: Option<String>,
    pub counts: StageCounts,
    pub artifacts: Vec<String>,
}

/// One run of the job. Work is staged under a per-run directory that is removed
/// when the value is dropped; the run only counts once `commit` has written the
/// commit marker to the output location.
pub struct Job {
    job_name: String,
    run_id: String,
    started_at_unix: i64,
    staging_dir: PathBuf,
    committed: bool,
}

impl Job {
    pub fn init(job_name: &str, work_dir: &Path) -> Result<Self> {
        let run_id = new_run_id(job_name);
        let staging_dir = work_dir.join(&run_id);
        fs::create_dir_all(&staging_dir)
            .with_context(|| format!("Failed creating staging dir {}", staging_dir.display()))?;
        tracing::info!("Job {job_name} initialized (run_id={run_id})");
        tracing::info!("staging_dir={}", staging_dir.display());
        Ok(Self {
            job_name: job_name.to_string(),
            run_id,
            started_at_unix: now_unix_seconds(),
            staging_dir,
            committed: false,
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at_unix(&self) -> i64 {
        self.started_at_unix
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Publishes the commit marker. Call only after every output has been published.
    pub async fn commit(
        mut self,
        storage: &Storage,
        output: &Location,
        mut manifest: RunManifest,
    ) -> Result<RunManifest> {
        manifest.committed_at_unix = now_unix_seconds();
        let json =
            serde_json::to_string_pretty(&manifest).context("Failed serializing run manifest")?;
        let marker_path = self.staging_dir.join(COMMIT_MARKER_FILE);
        write_atomic(&marker_path, &json)?;
        storage
            .put_file(&marker_path, &output.child(COMMIT_MARKER_FILE)?)
            .await
            .context("Failed publishing commit marker")?;
        self.committed = true;
        tracing::info!("Job {} committed (run_id={})", self.job_name, self.run_id);
        Ok(manifest)
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if !self.committed {
            tracing::warn!(
                "Job {} (run_id={}) ended without commit; no commit marker written",
                self.job_name,
                self.run_id
            );
        }
        if let Err(err) = fs::remove_dir_all(&self.staging_dir) {
            tracing::debug!(
                "Failed removing staging dir {}: {err}",
                self.staging_dir.display()
            );
        }
    }
}
