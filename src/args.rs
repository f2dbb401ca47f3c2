use clap::Parser;

use crate::constants::{DEFAULT_INPUT_PATH, DEFAULT_OUTPUT_PATH, DEFAULT_S3_REGION};

#[derive(Debug, Clone, Parser)]
#[command(name = "build_silver_providers")]
#[command(about = "Clean, validate and enrich the bronze provider feed into the silver provider dataset")]
pub struct Args {
    /// Job name supplied by the job runner. Used as the run id prefix and in the commit marker.
    #[arg(long = "job-name", alias = "JOB_NAME", env = "JOB_NAME")]
    pub job_name: String,

    /// Bronze source location: s3://bucket/prefix, http(s) URL, or a local file/directory.
    ///
    /// Directories and prefixes are scanned for .json, .jsonl and .ndjson files
    /// (one JSON object per line).
    #[arg(long, default_value = DEFAULT_INPUT_PATH)]
    pub input_path: String,

    /// Silver destination location: s3://bucket/prefix or a local directory.
    ///
    /// Existing contents are replaced; the table is written as a single parquet file.
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    pub output_path: String,

    /// Destination for report artifacts (aggregates + quarantined rows).
    /// Defaults to a `<output>_reports` sibling of the output location.
    #[arg(long)]
    pub reports_path: Option<String>,

    /// Local staging directory for downloads and files written before publishing.
    /// Defaults to build_silver_providers under the system temp directory.
    #[arg(long)]
    pub work_dir: Option<std::path::PathBuf>,

    /// Custom S3 endpoint URL (e.g. MinIO or LocalStack).
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Region used for the S3 client when none is configured in the environment.
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_S3_REGION)]
    pub s3_region: String,

    /// Use path-style S3 addressing (required by most S3-compatible stores).
    #[arg(long, default_value_t = false)]
    pub s3_force_path_style: bool,

    /// Write only the silver table, skip aggregate and quarantine reports.
    #[arg(long, default_value_t = false)]
    pub skip_reports: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_glue_style_job_name_flag() {
        let args = Args::parse_from(["build_silver_providers", "--JOB_NAME", "providers-silver"]);
        assert_eq!(args.job_name, "providers-silver");
        assert_eq!(args.input_path, DEFAULT_INPUT_PATH);
        assert_eq!(args.output_path, DEFAULT_OUTPUT_PATH);
        assert!(args.reports_path.is_none());
        assert!(!args.skip_reports);
    }

    #[test]
    fn overrides_locations() {
        let args = Args::parse_from([
            "build_silver_providers",
            "--job-name",
            "local",
            "--input-path",
            "/tmp/bronze",
            "--output-path",
            "/tmp/silver",
            "--reports-path",
            "/tmp/reports",
            "--skip-reports",
        ]);
        assert_eq!(args.input_path, "/tmp/bronze");
        assert_eq!(args.output_path, "/tmp/silver");
        assert_eq!(args.reports_path.as_deref(), Some("/tmp/reports"));
        assert!(args.skip_reports);
    }
}
