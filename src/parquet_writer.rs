use anyhow::{Context, Result};
use arrow::{array::ArrayRef, datatypes::Schema, record_batch::RecordBatch};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::{basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::common::{ensure_parent_dir, tmp_sibling};
use crate::constants::PARQUET_BATCH_SIZE;
use crate::schema::{
    EnrichedProvider, ProviderRecord, provider_columns, provider_schema, silver_columns,
    silver_schema,
};

/// Single-file Parquet writer. Batches go to a `.tmp` sibling which only replaces
/// the target path on `finish`.
pub struct ParquetFileWriter {
    output_path: PathBuf,
    tmp_path: PathBuf,
    schema: Arc<Schema>,
    writer: ArrowWriter<File>,
    rows_written: usize,
}

impl ParquetFileWriter {
    pub fn try_new(output_path: &Path, schema: Arc<Schema>) -> Result<Self> {
        ensure_parent_dir(output_path)?;
        let tmp_path = tmp_sibling(output_path, "output.parquet");

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed creating {}", tmp_path.display()))?;
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))
            .context("Failed creating Parquet ArrowWriter")?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            tmp_path,
            schema,
            writer,
            rows_written: 0,
        })
    }

    pub fn write_columns(&mut self, columns: Vec<ArrayRef>) -> Result<()> {
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), columns)
            .context("Failed creating RecordBatch for Parquet write")?;
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer
            .write(&batch)
            .context("Failed writing Parquet RecordBatch")?;
        self.rows_written += batch.num_rows();
        Ok(())
    }

    pub fn finish(self) -> Result<usize> {
        self.writer
            .close()
            .context("Failed closing Parquet writer")?;
        fs::rename(&self.tmp_path, &self.output_path).with_context(|| {
            format!(
                "Failed moving temp parquet {} to {}",
                self.tmp_path.display(),
                self.output_path.display()
            )
        })?;
        Ok(self.rows_written)
    }

    pub fn abort(self) {
        // Best-effort cleanup: never leave a partial file in place of the target.
        let _ = self.writer.close();
        let _ = fs::remove_file(&self.tmp_path);
    }
}

fn write_in_batches<T>(
    output_path: &Path,
    schema: Arc<Schema>,
    rows: &[T],
    to_columns: impl Fn(&[T]) -> Vec<ArrayRef>,
) -> Result<usize> {
    let mut writer = ParquetFileWriter::try_new(output_path, schema)?;
    for chunk in rows.chunks(PARQUET_BATCH_SIZE) {
        if let Err(err) = writer.write_columns(to_columns(chunk)) {
            writer.abort();
            return Err(err);
        }
    }
    writer.finish()
}

/// Writes the silver table as one Parquet file. An empty table still produces a
/// valid file carrying the schema.
pub fn write_silver_parquet(output_path: &Path, rows: &[EnrichedProvider]) -> Result<usize> {
    write_in_batches(output_path, silver_schema(), rows, silver_columns)
}

pub fn write_provider_parquet(output_path: &Path, rows: &[ProviderRecord]) -> Result<usize> {
    write_in_batches(output_path, provider_schema(), rows, |chunk| {
        let refs: Vec<&ProviderRecord> = chunk.iter().collect();
        provider_columns(&refs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use crate::enrich::enrich_record;

    fn record(id: &str) -> ProviderRecord {
        ProviderRecord {
            ordinal: 0,
            accepting_new_patients: None,
            address: None,
            city: Some("Austin".into()),
            email: Some("a@b.com".into()),
            license_number: None,
            license_state: None,
            name: "Name".into(),
            npi_number: "1234567890".into(),
            organization: None,
            phone_number: None,
            provider_id: id.to_string(),
            specialty: None,
            state: None,
            years_of_experience: Some(3),
            zip_code: None,
        }
    }

    #[test]
    fn silver_file_round_trips_through_arrow_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silver").join("part.parquet");
        let rows = vec![enrich_record(record("P1")), enrich_record(record("P2"))];

        let written = write_silver_parquet(&path, &rows).unwrap();
        assert_eq!(written, 2);
        assert!(!tmp_sibling(&path, "x").exists());

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let batch = &batches[0];
        assert_eq!(batch.num_columns(), silver_schema().fields().len());

        let masked = batch
            .column_by_name("masked_email")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(masked.value(0), "a@*****.com");
        assert_eq!(masked.len(), 2);
    }

    #[test]
    fn empty_table_still_writes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        assert_eq!(write_provider_parquet(&path, &[]).unwrap(), 0);

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.schema().fields().len(), 15);
    }
}
