use crate::dataset::{add_metadata_columns, filter_rows, has_column, is_annotated, records_to_batch};
use crate::error::{IngestError, Result};
use crate::source::TableSource;
use crate::storage::{create_directory, empty_directory, output_dir, output_file_name, write_dataset};
use crate::types::{OutputFormat, TableDescriptor, TableOutcome};
use chrono::{Local, NaiveDate};
use ::metrics::{counter, histogram};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs one table through fetch → filter → annotate → persist
pub struct TableProcessor {
    source: Arc<dyn TableSource>,
    data_root: PathBuf,
    format: String,
    retrieval_date: NaiveDate,
}

impl TableProcessor {
    /// `format` is resolved per table so an unsupported value fails each table, not the run
    pub fn new(source: Arc<dyn TableSource>, data_root: PathBuf, format: &str, retrieval_date: NaiveDate) -> Self {
        Self {
            source,
            data_root,
            format: format.to_string(),
            retrieval_date,
        }
    }

    /// Process one descriptor. Never returns an error: failures become `TableOutcome::Failed`.
    #[instrument(skip(self, descriptor), fields(table = descriptor.name().unwrap_or("<missing>")))]
    pub async fn process(&self, descriptor: &TableDescriptor) -> TableOutcome {
        let Some(table_name) = descriptor.name() else {
            warn!("Skipping entry with missing table_name: {:?}", descriptor);
            counter!("cbs_tables_total", "outcome" => "skipped").increment(1);
            return TableOutcome::Skipped {
                reason: format!("missing table_name: {:?}", descriptor),
            };
        };

        let outcome = match self.try_process(table_name, descriptor).await {
            Ok((path, rows)) => {
                info!("💾 Saved {} rows to {}", rows, path.display());
                TableOutcome::Written {
                    table: table_name.to_string(),
                    path,
                    rows,
                }
            }
            Err(e) => {
                error!("Error processing table '{}': {}", table_name, e);
                TableOutcome::Failed {
                    table: table_name.to_string(),
                    error: e.to_string(),
                }
            }
        };
        counter!("cbs_tables_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn try_process(&self, table_name: &str, descriptor: &TableDescriptor) -> Result<(PathBuf, usize)> {
        let format: OutputFormat = self.format.parse()?;

        // Step 1: fetch
        info!("📡 Downloading: {}", table_name);
        let t_fetch = std::time::Instant::now();
        let records = self.source.fetch_table(table_name).await?;
        histogram!("cbs_fetch_duration_seconds").record(t_fetch.elapsed().as_secs_f64());
        let mut batch = records_to_batch(&records)?;
        drop(records);

        // Step 2: optional filter
        match descriptor.filter() {
            Some((column, targets)) if has_column(&batch, column) => {
                batch = filter_rows(&batch, column, &targets);
                info!(
                    "Filtered {} on column '{}' with value '{}'",
                    table_name,
                    column,
                    descriptor.filter_value.as_ref().map(|v| v.to_string()).unwrap_or_default()
                );
            }
            Some((column, _)) => {
                warn!(
                    "Filter column '{}' not found in table '{}'. Skipping filtering.",
                    column, table_name
                );
            }
            None => info!("No filtering applied for {}", table_name),
        }

        // Step 3: provenance
        let batch = add_metadata_columns(&batch, table_name, Local::now().naive_local());
        if !is_annotated(&batch) {
            return Err(IngestError::Dataset(format!(
                "provenance columns missing for '{}'",
                table_name
            )));
        }

        // Step 4: persist
        let dir = output_dir(&self.data_root, self.source.source_name(), table_name, self.retrieval_date);
        create_directory(&dir);
        empty_directory(&dir);

        let file_path = dir.join(output_file_name(table_name, Local::now().time(), format));
        write_dataset(&batch, &file_path, format)?;

        let rows = batch.num_rows();
        histogram!("cbs_rows_written").record(rows as f64);
        Ok((file_path, rows))
    }
}
