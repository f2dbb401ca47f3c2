use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::schema::RawProvider;

fn apply_ingest_progress_style(progress: &ProgressBar) {
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:32.cyan/blue}] \
{pos}/{len} files {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
}

/// Decodes one newline-delimited JSON file, numbering rows from `first_ordinal`.
pub fn read_json_lines(path: &Path, first_ordinal: u64) -> Result<Vec<RawProvider>> {
    let file = File::open(path).with_context(|| format!("Failed opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    let mut ordinal = first_ordinal;
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line =
            line.with_context(|| format!("Failed reading {} line {line_no}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut row: RawProvider = serde_json::from_str(trimmed).with_context(|| {
            format!(
                "Malformed provider record in {} line {line_no}",
                path.display()
            )
        })?;
        row.ordinal = ordinal;
        ordinal += 1;
        rows.push(row);
    }
    Ok(rows)
}

/// Loads every input file in order. Ordinals run across files so that the
/// earliest file and line always has the lowest ordinal.
pub fn ingest_files(files: &[PathBuf]) -> Result<Vec<RawProvider>> {
    if files.is_empty() {
        bail!("No input files found (expected .json, .jsonl or .ndjson)");
    }

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_prefix("INGEST");
    apply_ingest_progress_style(&progress);
    progress.enable_steady_tick(Duration::from_millis(250));

    let mut rows: Vec<RawProvider> = Vec::new();
    for path in files {
        progress.set_message(
            path.file_name()
                .map(|x| x.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        let file_rows = read_json_lines(path, rows.len() as u64)?;
        tracing::debug!("Read {} rows from {}", file_rows.len(), path.display());
        rows.extend(file_rows);
        progress.inc(1);
    }
    progress.finish_and_clear();

    tracing::info!("Ingested {} rows from {} files", rows.len(), files.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_rows_across_files_with_running_ordinals() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        fs::write(
            &a,
            "{\"provider_id\":\"P1\",\"years_of_experience\":3}\n\n{\"provider_id\":\"P2\"}\n",
        )
        .unwrap();
        fs::write(&b, "{\"provider_id\":\"P3\",\"unexpected\":[1,2]}").unwrap();

        let rows = ingest_files(&[a, b]).unwrap();
        let ids: Vec<(u64, Option<&str>)> = rows
            .iter()
            .map(|r| (r.ordinal, r.provider_id.as_deref()))
            .collect();
        assert_eq!(ids, [(0, Some("P1")), (1, Some("P2")), (2, Some("P3"))]);
        assert_eq!(rows[0].years_of_experience, Some(3));
    }

    #[test]
    fn malformed_line_is_fatal_with_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"provider_id\":\"P1\"}\n{\"years_of_experience\":\"ten\"}\n").unwrap();

        let err = ingest_files(&[path]).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("line 2"), "{message}");
    }

    #[test]
    fn numeric_identifiers_are_read_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(
            &path,
            "{\"provider_id\":\"P1\",\"npi_number\":1234567890,\"name\":\"a\",\"zip_code\":900001}\n",
        )
        .unwrap();

        let rows = ingest_files(&[path]).unwrap();
        assert_eq!(rows[0].npi_number.as_deref(), Some("1234567890"));
        assert_eq!(rows[0].zip_code.as_deref(), Some("900001"));
    }

    #[test]
    fn nested_value_in_text_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        fs::write(&path, "{\"provider_id\":\"P1\",\"npi_number\":{\"v\":1}}\n").unwrap();

        let message = format!("{:#}", ingest_files(&[path]).unwrap_err());
        assert!(message.contains("line 1"), "{message}");
    }

    #[test]
    fn no_files_is_an_error() {
        assert!(ingest_files(&[]).is_err());
    }
}
