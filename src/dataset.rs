//! In-memory tabular datasets.
//!
//! Remote tables arrive as JSON records and are turned into a single Arrow
//! [`RecordBatch`]. The row filter and the provenance annotator operate on
//! that batch and never fail outward: on error they log and hand back a
//! fallback (an empty batch for the filter, the input for the annotator).

use crate::constants::{LOAD_DATE_COLUMN, SRC_TABLE_COLUMN};
use crate::error::{IngestError, Result};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, StringArray, TimestampMicrosecondArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::json::ReaderBuilder;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Build a dataset from JSON object records.
///
/// Columns keep first-seen order. Columns that are null in every record are
/// typed as nullable text so both output formats can carry them.
pub fn records_to_batch(records: &[Value]) -> Result<RecordBatch> {
    let inferred = infer_json_schema_from_iterator(records.iter().map(Ok::<_, arrow::error::ArrowError>))?;
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Null => Field::new(f.name(), DataType::Utf8, true),
            _ => f.as_ref().clone(),
        })
        .collect();
    let schema: SchemaRef = Arc::new(Schema::new(fields));

    if schema.fields().is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
        return Ok(RecordBatch::try_new_with_options(schema, vec![], &options)?);
    }
    if records.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(records.len())
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(records)?;
    let batch = decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema));
    Ok(batch)
}

pub fn has_column(batch: &RecordBatch, column: &str) -> bool {
    batch.schema().index_of(column).is_ok()
}

/// Keep the rows whose trimmed string value in `column` is one of `values`.
///
/// The column itself is rewritten to its trimmed string form. Nulls never
/// match. On failure an empty dataset with the input schema is returned.
pub fn filter_rows(batch: &RecordBatch, column: &str, values: &BTreeSet<String>) -> RecordBatch {
    match try_filter_rows(batch, column, values) {
        Ok(filtered) => {
            debug!(
                "Filtering complete: {} rows matched in column '{}'.",
                filtered.num_rows(),
                column
            );
            filtered
        }
        Err(e) => {
            error!("Error filtering dataset on column '{}': {}", column, e);
            RecordBatch::new_empty(batch.schema())
        }
    }
}

fn try_filter_rows(batch: &RecordBatch, column: &str, values: &BTreeSet<String>) -> Result<RecordBatch> {
    let schema = batch.schema();
    let index = schema.index_of(column).map_err(|_| {
        IngestError::Dataset(format!("Column '{}' not found in dataset.", column))
    })?;

    let as_text = cast(batch.column(index), &DataType::Utf8)?;
    let trimmed: StringArray = as_text
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::trim))
        .collect();
    let mask: BooleanArray = trimmed
        .iter()
        .map(|v| Some(v.is_some_and(|s| values.contains(s))))
        .collect();

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[index] = Field::new(column, DataType::Utf8, true);
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[index] = Arc::new(trimmed);

    let normalized = RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )?;
    Ok(filter_record_batch(&normalized, &mask)?)
}

/// Append `src_table` and `load_date` provenance columns.
///
/// Existing columns with those names are replaced in place, so the result
/// always has the original column names plus exactly these two.
pub fn add_metadata_columns(batch: &RecordBatch, table_name: &str, loaded_at: NaiveDateTime) -> RecordBatch {
    match try_add_metadata_columns(batch, table_name, loaded_at) {
        Ok(annotated) => {
            info!(
                "Metadata columns added: '{}' = '{}', '{}' = '{}'",
                SRC_TABLE_COLUMN, table_name, LOAD_DATE_COLUMN, loaded_at
            );
            annotated
        }
        Err(e) => {
            error!("Error adding metadata columns: {}", e);
            batch.clone()
        }
    }
}

fn try_add_metadata_columns(
    batch: &RecordBatch,
    table_name: &str,
    loaded_at: NaiveDateTime,
) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let micros = loaded_at.and_utc().timestamp_micros();

    let src_table: ArrayRef = Arc::new(StringArray::from_iter_values(
        std::iter::repeat(table_name).take(rows),
    ));
    let load_date: ArrayRef = Arc::new(TimestampMicrosecondArray::from(vec![micros; rows]));

    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    let additions = [
        (Field::new(SRC_TABLE_COLUMN, DataType::Utf8, false), src_table),
        (
            Field::new(
                LOAD_DATE_COLUMN,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            load_date,
        ),
    ];
    for (field, array) in additions {
        match fields.iter().position(|f| f.name() == field.name()) {
            Some(i) => {
                fields[i] = field;
                columns[i] = array;
            }
            None => {
                fields.push(field);
                columns.push(array);
            }
        }
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
        &options,
    )?)
}

/// True when both provenance columns are present
pub fn is_annotated(batch: &RecordBatch) -> bool {
    has_column(batch, SRC_TABLE_COLUMN) && has_column(batch, LOAD_DATE_COLUMN)
}
