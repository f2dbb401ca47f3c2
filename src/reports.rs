//! Reporting side outputs. Aggregates run as DuckDB SQL and are exported with
//! `COPY ... TO` as CSV. Grouped counts and the specialty ranking read every
//! enriched row (`enriched`, before the NPI filter); the duplicate, outlier and
//! missing-license reports read the final silver rows (`silver`).
//! rows that failed the contact checks are
//! quarantined as Parquet plus a flat CSV index.

use anyhow::{Context, Result};
use csv::Writer;
use duckdb::{Connection, params};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::common::{sql_escape_path, tmp_sibling, write_atomic};
use crate::constants::OUTLIER_YEARS_THRESHOLD;
use crate::parquet_writer::write_provider_parquet;
use crate::schema::EnrichedProvider;
use crate::validate::{Check, ValidationReport};

#[derive(Debug, Clone, Serialize)]
pub struct ReportArtifact {
    pub file_name: String,
    pub rows: usize,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
struct ReportSummary<'a> {
    run_id: &'a str,
    artifacts: &'a [ReportArtifact],
}

const ENRICHED_TABLE: &str = "enriched";
const SILVER_TABLE: &str = "silver";

const PROVIDER_TABLE_COLUMNS: &str = "(
    accepting_new_patients BOOLEAN,
    address VARCHAR,
    city VARCHAR,
    email VARCHAR,
    license_number VARCHAR,
    license_state VARCHAR,
    name VARCHAR,
    npi_number VARCHAR,
    organization VARCHAR,
    phone_number VARCHAR,
    provider_id VARCHAR,
    specialty VARCHAR,
    state VARCHAR,
    years_of_experience BIGINT,
    zip_code VARCHAR,
    senior_providers BOOLEAN,
    is_cardiologist INTEGER,
    experience_level VARCHAR,
    risk_score DOUBLE,
    license_state_match BOOLEAN,
    masked_email VARCHAR
)";

fn aggregate_queries() -> Vec<(&'static str, String)> {
    vec![
        (
            "specialty_counts.csv",
            "SELECT specialty, COUNT(provider_id) AS num_providers
             FROM enriched
             GROUP BY specialty
             ORDER BY num_providers DESC, specialty NULLS LAST"
                .to_string(),
        ),
        (
            "organization_counts.csv",
            "SELECT organization, COUNT(provider_id) AS providers_count
             FROM enriched
             GROUP BY organization
             ORDER BY providers_count DESC, organization NULLS LAST"
                .to_string(),
        ),
        (
            "specialty_rank.csv",
            "SELECT specialty, \"count\", DENSE_RANK() OVER (ORDER BY \"count\" DESC) AS \"rank\"
             FROM (SELECT specialty, COUNT(*) AS \"count\" FROM enriched GROUP BY specialty)
             ORDER BY \"rank\", specialty NULLS LAST"
                .to_string(),
        ),
        (
            "duplicate_license.csv",
            "SELECT license_number, COUNT(*) AS \"count\"
             FROM silver
             GROUP BY license_number
             HAVING COUNT(*) > 1
             ORDER BY \"count\" DESC, license_number NULLS LAST"
                .to_string(),
        ),
        (
            "duplicate_phone.csv",
            "SELECT phone_number, COUNT(*) AS \"count\"
             FROM silver
             GROUP BY phone_number
             HAVING COUNT(*) > 1
             ORDER BY \"count\" DESC, phone_number NULLS LAST"
                .to_string(),
        ),
        (
            "experience_outliers.csv",
            format!(
                "SELECT * FROM silver
                 WHERE years_of_experience > {OUTLIER_YEARS_THRESHOLD}
                 ORDER BY provider_id, npi_number"
            ),
        ),
        (
            "missing_license_state.csv",
            "SELECT * FROM silver
             WHERE license_state IS NULL
             ORDER BY provider_id, npi_number"
                .to_string(),
        ),
    ]
}

fn load_provider_table(conn: &Connection, table: &str, rows: &[EnrichedProvider]) -> Result<()> {
    conn.execute_batch(&format!("CREATE TABLE {table} {PROVIDER_TABLE_COLUMNS}"))
        .with_context(|| format!("Failed creating DuckDB table {table}"))?;
    let mut appender = conn
        .appender(table)
        .with_context(|| format!("Failed opening DuckDB appender for {table}"))?;
    for row in rows {
        let r = &row.record;
        appender
            .append_row(params![
                r.accepts_new_patients(),
                r.address.as_deref(),
                r.city.as_deref(),
                r.email.as_deref(),
                r.license_number.as_deref(),
                r.license_state.as_deref(),
                r.name.as_str(),
                r.npi_number.as_str(),
                r.organization.as_deref(),
                r.phone_number.as_deref(),
                r.provider_id.as_str(),
                r.specialty.as_deref(),
                r.state.as_deref(),
                r.years_of_experience,
                r.zip_code.as_deref(),
                row.senior_providers,
                row.is_cardiologist,
                row.experience_level.as_str(),
                row.risk_score,
                row.license_state_match,
                row.masked_email.as_deref(),
            ])
            .with_context(|| format!("Failed appending provider {} to {table}", r.provider_id))?;
    }
    appender
        .flush()
        .with_context(|| format!("Failed flushing DuckDB appender for {table}"))?;
    Ok(())
}

fn export_query_csv(conn: &Connection, select_sql: &str, output_path: &Path) -> Result<usize> {
    let rows: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM ({select_sql})"), [], |row| {
            row.get(0)
        })
        .with_context(|| format!("Failed counting rows for {}", output_path.display()))?;

    let tmp_path = tmp_sibling(output_path, "report.csv");
    let tmp_sql = sql_escape_path(&tmp_path);
    conn.execute_batch(&format!(
        "COPY ({select_sql}) TO '{tmp_sql}' (FORMAT CSV, HEADER)"
    ))
    .with_context(|| format!("Failed writing report {}", output_path.display()))?;
    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving report {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(rows as usize)
}

/// Grouped counts, specialty ranking, duplicate license/phone detection,
/// experience outliers and missing license state, one CSV each.
///
/// `enriched` holds every row before the NPI filter; `silver` is the final table.
pub fn write_aggregate_reports(
    enriched: &[EnrichedProvider],
    silver: &[EnrichedProvider],
    reports_dir: &Path,
) -> Result<Vec<ReportArtifact>> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("Failed creating {}", reports_dir.display()))?;

    let conn = Connection::open_in_memory().context("Failed opening DuckDB for reports")?;
    load_provider_table(&conn, ENRICHED_TABLE, enriched)?;
    load_provider_table(&conn, SILVER_TABLE, silver)?;

    let mut artifacts = Vec::new();
    for (file_name, sql) in aggregate_queries() {
        let path = reports_dir.join(file_name);
        let rows = export_query_csv(&conn, &sql, &path)?;
        tracing::info!("Report {file_name}: {rows} rows");
        artifacts.push(ReportArtifact {
            file_name: file_name.to_string(),
            rows,
            path,
        });
    }
    Ok(artifacts)
}

const QUARANTINE_CHECKS: [(Check, &str); 3] = [
    (Check::Email, "invalid_email.parquet"),
    (Check::Phone, "invalid_phone.parquet"),
    (Check::Zip, "invalid_zip.parquet"),
];

fn write_quarantine_index(validation: &ValidationReport, output_path: &Path) -> Result<usize> {
    let tmp_path = tmp_sibling(output_path, "quarantine_index.csv");
    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating quarantine index {}", tmp_path.display()))?;
    writer
        .write_record(["check", "provider_id", "npi_number", "value"])
        .context("Failed writing quarantine index header")?;

    let mut rows = 0usize;
    for (check, _) in QUARANTINE_CHECKS {
        for record in validation.invalid(check) {
            writer
                .write_record([
                    check.as_str(),
                    record.provider_id.as_str(),
                    record.npi_number.as_str(),
                    check.value(record).unwrap_or(""),
                ])
                .context("Failed writing quarantine index record")?;
            rows += 1;
        }
    }
    writer
        .flush()
        .context("Failed flushing quarantine index writer")?;
    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving quarantine index {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(rows)
}

/// Exports the invalid side of each contact check so nothing is dropped silently.
pub fn write_quarantine(
    validation: &ValidationReport,
    reports_dir: &Path,
) -> Result<Vec<ReportArtifact>> {
    let mut artifacts = Vec::new();
    for (check, file_name) in QUARANTINE_CHECKS {
        let path = reports_dir.join(file_name);
        let rows = write_provider_parquet(&path, validation.invalid(check))?;
        if rows > 0 {
            tracing::warn!("Quarantined {rows} rows failing the {} check", check.as_str());
        }
        artifacts.push(ReportArtifact {
            file_name: file_name.to_string(),
            rows,
            path,
        });
    }

    let index_path = reports_dir.join("quarantine_index.csv");
    let rows = write_quarantine_index(validation, &index_path)?;
    artifacts.push(ReportArtifact {
        file_name: "quarantine_index.csv".to_string(),
        rows,
        path: index_path,
    });
    Ok(artifacts)
}

/// Writes `report_summary.json` listing every artifact and its row count.
pub fn write_report_summary(
    run_id: &str,
    artifacts: &[ReportArtifact],
    reports_dir: &Path,
) -> Result<ReportArtifact> {
    let path = reports_dir.join("report_summary.json");
    let summary = ReportSummary { run_id, artifacts };
    let json =
        serde_json::to_string_pretty(&summary).context("Failed serializing report summary")?;
    write_atomic(&path, &json)?;
    Ok(ReportArtifact {
        file_name: "report_summary.json".to_string(),
        rows: artifacts.len(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::enrich_record;
    use crate::schema::ProviderRecord;
    use crate::validate::{FieldPatterns, validate};

    fn provider(id: &str, specialty: &str, license: Option<&str>, years: i64) -> EnrichedProvider {
        enrich_record(ProviderRecord {
            ordinal: 0,
            accepting_new_patients: None,
            address: None,
            city: None,
            email: Some(format!("{id}@example.com")),
            license_number: Some(format!("LIC-{id}")),
            license_state: license.map(str::to_string),
            name: format!("Provider {id}"),
            npi_number: "1234567890".into(),
            organization: Some("Acme".into()),
            phone_number: Some("5551234567".into()),
            provider_id: id.to_string(),
            specialty: Some(specialty.to_string()),
            state: Some("CA".into()),
            years_of_experience: Some(years),
            zip_code: Some("900001".into()),
        })
    }

    fn read_csv(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn aggregates_rank_and_detect_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = vec![
            provider("P1", "Surgery", Some("CA"), 10),
            provider("P2", "Surgery", Some("CA"), 61),
            provider("P3", "Cardiology", None, 20),
            provider("P4", "Cardiology", Some("CA"), 30),
            provider("P5", "Pediatrics", Some("CA"), 2),
        ];
        rows[1].record.license_number = Some("LIC-P1".into());

        let artifacts = write_aggregate_reports(&rows, &rows, dir.path()).unwrap();
        assert_eq!(artifacts.len(), 7);

        let rank = read_csv(&dir.path().join("specialty_rank.csv"));
        assert_eq!(
            rank,
            vec![
                vec!["Cardiology", "2", "1"],
                vec!["Surgery", "2", "1"],
                vec!["Pediatrics", "1", "2"],
            ]
        );

        let counts = read_csv(&dir.path().join("organization_counts.csv"));
        assert_eq!(counts, vec![vec!["Acme", "5"]]);

        let duplicate_license = read_csv(&dir.path().join("duplicate_license.csv"));
        assert_eq!(duplicate_license, vec![vec!["LIC-P1", "2"]]);

        let duplicate_phone = read_csv(&dir.path().join("duplicate_phone.csv"));
        assert_eq!(duplicate_phone, vec![vec!["5551234567", "5"]]);

        let outliers = artifacts
            .iter()
            .find(|a| a.file_name == "experience_outliers.csv")
            .unwrap();
        assert_eq!(outliers.rows, 1);
        let missing = artifacts
            .iter()
            .find(|a| a.file_name == "missing_license_state.csv")
            .unwrap();
        assert_eq!(missing.rows, 1);
    }

    #[test]
    fn grouped_counts_include_rows_dropped_by_npi_filter() {
        let dir = tempfile::tempdir().unwrap();
        let good = provider("P1", "Surgery", Some("CA"), 70);
        let mut bad_npi = provider("P2", "Surgery", None, 70);
        bad_npi.record.npi_number = "12345".into();
        let enriched = vec![good.clone(), bad_npi];
        let silver = vec![good];

        let artifacts = write_aggregate_reports(&enriched, &silver, dir.path()).unwrap();

        assert_eq!(
            read_csv(&dir.path().join("specialty_counts.csv")),
            vec![vec!["Surgery", "2"]]
        );
        assert_eq!(
            read_csv(&dir.path().join("organization_counts.csv")),
            vec![vec!["Acme", "2"]]
        );
        assert_eq!(
            read_csv(&dir.path().join("specialty_rank.csv")),
            vec![vec!["Surgery", "2", "1"]]
        );

        let rows_of = |name: &str| artifacts.iter().find(|a| a.file_name == name).unwrap().rows;
        assert_eq!(rows_of("experience_outliers.csv"), 1);
        assert_eq!(rows_of("missing_license_state.csv"), 0);
        assert_eq!(rows_of("duplicate_phone.csv"), 0);
    }

    #[test]
    fn quarantine_exports_every_invalid_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad_email = provider("P1", "Surgery", Some("CA"), 1).record;
        bad_email.email = Some("not-an-email".into());
        let mut bad_zip = provider("P2", "Surgery", Some("CA"), 1).record;
        bad_zip.zip_code = Some("123".into());
        let good = provider("P3", "Surgery", Some("CA"), 1).record;

        let patterns = FieldPatterns::compile().unwrap();
        let validation = validate(&[bad_email, bad_zip, good], &patterns);
        let artifacts = write_quarantine(&validation, dir.path()).unwrap();

        let rows: Vec<(String, usize)> = artifacts
            .iter()
            .map(|a| (a.file_name.clone(), a.rows))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("invalid_email.parquet".to_string(), 1),
                ("invalid_phone.parquet".to_string(), 0),
                ("invalid_zip.parquet".to_string(), 1),
                ("quarantine_index.csv".to_string(), 2),
            ]
        );

        let index = read_csv(&dir.path().join("quarantine_index.csv"));
        assert_eq!(index[0], vec!["email", "P1", "1234567890", "not-an-email"]);
        assert_eq!(index[1], vec!["zip_code", "P2", "1234567890", "123"]);

        let summary = write_report_summary("run-1", &artifacts, dir.path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary.path).unwrap()).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["artifacts"][0]["file_name"], "invalid_email.parquet");
    }
}
