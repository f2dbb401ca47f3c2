use arrow::array::{Array, BooleanArray, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs, path::Path};

use build_silver_providers::{args::Args, pipeline};

const BRONZE: &str = r#"{"provider_id":"P1","npi_number":"1234567890","name":"john smith","years_of_experience":45,"specialty":"surgery","license_state":"ca","state":"CA","email":"","phone_number":"5551234567","zip_code":"900001","accepting_new_patients":true}
{"provider_id":"P1","npi_number":"1234567890","name":"john smith duplicate","years_of_experience":45}
{"provider_id":"P2","npi_number":"0987654321","name":"  jane DOE ","years_of_experience":7,"specialty":"CARDIOLOGY","license_state":"ny","state":"nj","email":"jane.doe@example.com","phone_number":"555","zip_code":"10001","accepting_new_patients":"Yes","organization":"mercy west"}
{"provider_id":"P3","npi_number":"12345","name":"bad npi","email":"x@y.com"}
{"provider_id":null,"npi_number":"1111111111","name":"no id"}
"#;

fn args(input: &Path, output: &Path, work: &Path) -> Args {
    Args::parse_from([
        "build_silver_providers",
        "--job-name",
        "providers-silver-test",
        "--input-path",
        input.to_str().unwrap(),
        "--output-path",
        output.to_str().unwrap(),
        "--work-dir",
        work.to_str().unwrap(),
    ])
}

fn read_batches(path: &Path) -> Vec<RecordBatch> {
    let file = fs::File::open(path).unwrap();
    ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .map(|b| b.unwrap())
        .collect()
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
}

#[tokio::test]
async fn local_run_writes_silver_reports_and_commit_marker() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bronze");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("providers.jsonl"), BRONZE).unwrap();
    let output = dir.path().join("silver");
    let work = dir.path().join("work");

    let manifest = pipeline::run(&args(&input, &output, &work)).await.unwrap();
    assert_eq!(manifest.counts.ingested, 5);
    assert_eq!(manifest.counts.duplicates_dropped, 1);
    assert_eq!(manifest.counts.incomplete_dropped, 1);
    assert_eq!(manifest.counts.invalid_npi_dropped, 1);
    assert_eq!(manifest.counts.written, 2);

    let part = output.join("part-00000.snappy.parquet");
    let batches = read_batches(&part);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);

    let ids = strings(batch, "provider_id");
    assert_eq!(ids.value(0), "P1");
    assert_eq!(ids.value(1), "P2");
    assert_eq!(strings(batch, "name").value(0), "John Smith");
    assert_eq!(strings(batch, "name").value(1), "Jane Doe");
    assert_eq!(strings(batch, "email").value(0), "unknown@example.com");
    assert_eq!(strings(batch, "masked_email").value(1), "jane.doe@*****.com");
    assert_eq!(strings(batch, "experience_level").value(1), "Mid");
    assert_eq!(strings(batch, "organization").value(1), "Mercy West");

    let risk = batch
        .column_by_name("risk_score")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(risk.value(0), 0.9);
    assert_eq!(risk.value(1), 0.3);

    let accepting = batch
        .column_by_name("accepting_new_patients")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(accepting.value(0));
    assert!(accepting.value(1));

    let state_match = batch
        .column_by_name("license_state_match")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(state_match.value(0));
    assert!(!state_match.value(1));

    let marker: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("_SUCCESS")).unwrap()).unwrap();
    assert_eq!(marker["job_name"], "providers-silver-test");
    assert_eq!(marker["counts"]["written"], 2);

    let reports = dir.path().join("silver_reports");
    for name in [
        "specialty_counts.csv",
        "organization_counts.csv",
        "specialty_rank.csv",
        "duplicate_license.csv",
        "duplicate_phone.csv",
        "experience_outliers.csv",
        "missing_license_state.csv",
        "invalid_email.parquet",
        "invalid_phone.parquet",
        "invalid_zip.parquet",
        "quarantine_index.csv",
        "report_summary.json",
    ] {
        assert!(reports.join(name).exists(), "missing report {name}");
    }
    // Grouped counts still see P3, which the NPI filter kept out of silver.
    let mut specialty_counts = csv::Reader::from_path(reports.join("specialty_counts.csv")).unwrap();
    let counted: u64 = specialty_counts
        .records()
        .map(|r| r.unwrap()[1].parse::<u64>().unwrap())
        .sum();
    assert_eq!(counted, 3);

    let invalid_phone = read_batches(&reports.join("invalid_phone.parquet"));
    let quarantined: usize = invalid_phone.iter().map(|b| b.num_rows()).sum();
    assert_eq!(quarantined, 1);

    // Staging is cleaned up after commit.
    assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
}

#[tokio::test]
async fn rerun_overwrites_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bronze.jsonl");
    fs::write(&input, BRONZE).unwrap();
    let output = dir.path().join("silver");
    let work = dir.path().join("work");
    fs::create_dir_all(&output).unwrap();
    fs::write(output.join("part-00099.snappy.parquet"), "stale").unwrap();

    pipeline::run(&args(&input, &output, &work)).await.unwrap();

    let mut names: Vec<String> = fs::read_dir(&output)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["_SUCCESS", "part-00000.snappy.parquet"]);
}

#[tokio::test]
async fn failed_run_leaves_no_commit_marker() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bronze.jsonl");
    fs::write(&input, "{\"provider_id\":\"P1\"}\nnot json\n").unwrap();
    let output = dir.path().join("silver");
    let work = dir.path().join("work");

    let err = pipeline::run(&args(&input, &output, &work)).await.unwrap_err();
    assert!(format!("{err:#}").contains("line 2"));
    assert!(!output.join("_SUCCESS").exists());
    assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
}

#[tokio::test]
async fn reports_inside_output_is_rejected_before_clearing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bronze.jsonl");
    fs::write(&input, BRONZE).unwrap();
    let output = dir.path().join("silver");
    let work = dir.path().join("work");
    fs::create_dir_all(&output).unwrap();
    fs::write(output.join("part-00000.snappy.parquet"), "previous").unwrap();

    let mut args = args(&input, &output, &work);
    args.reports_path = Some(output.join("reports").to_string_lossy().to_string());

    let err = pipeline::run(&args).await.unwrap_err();
    assert!(format!("{err:#}").contains("overlaps"));
    assert_eq!(
        fs::read_to_string(output.join("part-00000.snappy.parquet")).unwrap(),
        "previous"
    );
}
