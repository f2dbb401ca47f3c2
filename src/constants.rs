pub const DEFAULT_INPUT_PATH: &str = "s3://healthcare-capstone-project/new_datasets/bronze/providers/";
pub const DEFAULT_OUTPUT_PATH: &str =
    "s3://healthcare-capstone-project/new_datasets/silver/providers/";
pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub const SILVER_PART_FILE: &str = "part-00000.snappy.parquet";
pub const COMMIT_MARKER_FILE: &str = "_SUCCESS";
pub const INPUT_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

pub const DEFAULT_EMAIL: &str = "unknown@example.com";
pub const DEFAULT_PHONE: &str = "0000000000";
pub const MASKED_EMAIL_DOMAIN: &str = "@*****.com";

// ASCII classes: `\w` / `\d` in the regex crate are Unicode-aware.
pub const EMAIL_PATTERN: &str = r"^[A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+\.[A-Za-z0-9_]+$";
pub const PHONE_PATTERN: &str = r"^\+?[0-9]{10,15}$";
pub const ZIP_PATTERN: &str = r"^[0-9]{6}$";
pub const NPI_PATTERN: &str = r"^[0-9]{10}$";

pub const SENIOR_YEARS_THRESHOLD: i64 = 25;
pub const HIGH_RISK_YEARS_THRESHOLD: i64 = 40;
pub const OUTLIER_YEARS_THRESHOLD: i64 = 60;

pub const PARQUET_BATCH_SIZE: usize = 8192;
pub const DOWNLOAD_CONCURRENCY: usize = 8;

/// Staging directory name under the system temp dir when `--work-dir` is unset.
pub const WORK_DIR_NAME: &str = "build_silver_providers";
