use crate::constants::{BRONZE_LAYER, FILE_TIME_FORMAT, RETRIEVAL_DATE_FORMAT};
use crate::error::Result;
use crate::types::OutputFormat;
use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveTime};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Create `path` (and parents) if it does not exist yet. Errors are logged, not returned.
pub fn create_directory(path: &Path) {
    if path.is_dir() {
        debug!("Directory already exists: {}", path.display());
        return;
    }
    match fs::create_dir_all(path) {
        Ok(()) => info!("Created directory: {}", path.display()),
        Err(e) => error!("Error creating directory {}: {}", path.display(), e),
    }
}

/// Best-effort clear of `path`: removes files, symlinks and empty subdirectories.
///
/// Non-empty subdirectories are left in place. Returns how many entries were removed.
pub fn empty_directory(path: &Path) -> usize {
    if !path.exists() {
        warn!("Directory does not exist: {}", path.display());
        return 0;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Error emptying directory {}: {}", path.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading entry in {}: {}", path.display(), e);
                continue;
            }
        };
        let entry_path = entry.path();
        // symlink_metadata so a link to a directory is unlinked, not followed
        let result = match fs::symlink_metadata(&entry_path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir(&entry_path).map(|_| "subdirectory"),
            Ok(_) => fs::remove_file(&entry_path).map(|_| "file"),
            Err(e) => Err(e),
        };
        match result {
            Ok(kind) => {
                debug!("Deleted {}: {}", kind, entry_path.display());
                removed += 1;
            }
            Err(e) => warn!("Error removing {}: {}", entry_path.display(), e),
        }
    }

    info!("Emptied directory: {}", path.display());
    removed
}

/// `{data_root}/bronze/{source}/{table}/{YYYYMMDD}`
pub fn output_dir(data_root: &Path, source: &str, table_name: &str, retrieval_date: NaiveDate) -> PathBuf {
    data_root
        .join(BRONZE_LAYER)
        .join(source)
        .join(table_name)
        .join(retrieval_date.format(RETRIEVAL_DATE_FORMAT).to_string())
}

/// `{table}_{HHMMSS}.{ext}`
pub fn output_file_name(table_name: &str, written_at: NaiveTime, format: OutputFormat) -> String {
    format!(
        "{}_{}.{}",
        table_name,
        written_at.format(FILE_TIME_FORMAT),
        format.extension()
    )
}

/// Serialize a dataset to `path` in the given format
pub fn write_dataset(batch: &RecordBatch, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path)?;
    match format {
        OutputFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::ZSTD(ZstdLevel::default()))
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(batch)?;
            writer.close()?;
        }
        OutputFormat::Csv => {
            let mut writer = WriterBuilder::new().with_header(true).build(file);
            writer.write(batch)?;
        }
    }
    Ok(())
}
