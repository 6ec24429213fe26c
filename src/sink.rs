//! Output writers for finished batches and the run report.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::constants::columns::{
    HELPFUL_VOTES, HELPFUL_VOTES_CAPPED, MARKETPLACE, PRODUCT_CATEGORY, PRODUCT_ID, REVIEW_DATE,
    REVIEW_ID, REVIEW_LENGTH, REVIEW_LENGTH_BIN, REVIEW_LENGTH_CAPPED, REVIEW_MONTH, REVIEW_YEAR,
    SOURCE_FILE, STAR_RATING, TOTAL_VOTES, VERIFIED_PURCHASE, VINE,
};
use crate::data::{FinishedBatch, TextValues};
use crate::errors::CleanError;
use crate::metrics::RunReport;
use crate::types::ColumnName;

/// Destination for finished batches.
pub trait ReviewSink {
    /// Append one batch.
    fn write_batch(&mut self, batch: &FinishedBatch) -> Result<(), CleanError>;
    /// Flush and close; no batch may be written afterwards.
    fn finish(&mut self) -> Result<(), CleanError>;
}

/// Sink collecting batches in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<FinishedBatch>,
}

impl MemorySink {
    /// Batches written so far.
    pub fn batches(&self) -> &[FinishedBatch] {
        &self.batches
    }

    /// Consume the sink, returning its batches.
    pub fn into_batches(self) -> Vec<FinishedBatch> {
        self.batches
    }
}

impl ReviewSink for MemorySink {
    fn write_batch(&mut self, batch: &FinishedBatch) -> Result<(), CleanError> {
        self.batches.push(batch.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CleanError> {
        Ok(())
    }
}

/// Snappy-compressed parquet file sink.
pub struct ParquetReviewSink {
    path: PathBuf,
    schema: SchemaRef,
    text_columns: Vec<ColumnName>,
    writer: Option<ArrowWriter<File>>,
    rows_written: u64,
}

impl ParquetReviewSink {
    /// Create (or truncate) `path`, laying out the given normalized text columns
    /// after the pass-through columns.
    pub fn create(path: impl Into<PathBuf>, text_columns: &[ColumnName]) -> Result<Self, CleanError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let schema = output_schema(text_columns);
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let file = File::create(&path)?;
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        Ok(Self {
            path,
            schema,
            text_columns: text_columns.to_vec(),
            writer: Some(writer),
            rows_written: 0,
        })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl ReviewSink for ParquetReviewSink {
    fn write_batch(&mut self, batch: &FinishedBatch) -> Result<(), CleanError> {
        if batch.is_empty() {
            return Ok(());
        }
        let record_batch = to_record_batch(batch, &self.schema, &self.text_columns)?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            CleanError::Configuration(format!("sink {} is already closed", self.path.display()))
        })?;
        writer.write(&record_batch)?;
        self.rows_written += batch.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CleanError> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
            info!(
                path = %self.path.display(),
                rows = self.rows_written,
                "wrote cleaned reviews"
            );
        }
        Ok(())
    }
}

/// Arrow schema of the cleaned output.
pub fn output_schema(text_columns: &[ColumnName]) -> SchemaRef {
    let mut fields = vec![
        Field::new(SOURCE_FILE, DataType::Utf8, false),
        Field::new(REVIEW_DATE, DataType::Date32, false),
        Field::new(REVIEW_YEAR, DataType::Int32, false),
        Field::new(REVIEW_MONTH, DataType::Int32, false),
        Field::new(MARKETPLACE, DataType::Utf8, true),
        Field::new(REVIEW_ID, DataType::Utf8, true),
        Field::new(PRODUCT_ID, DataType::Utf8, true),
        Field::new(PRODUCT_CATEGORY, DataType::Utf8, true),
        Field::new(STAR_RATING, DataType::Int64, true),
        Field::new(HELPFUL_VOTES, DataType::Int64, true),
        Field::new(TOTAL_VOTES, DataType::Int64, true),
        Field::new(VINE, DataType::Boolean, true),
        Field::new(VERIFIED_PURCHASE, DataType::Boolean, true),
    ];
    fields.extend(
        text_columns
            .iter()
            .map(|name| Field::new(name.as_str(), DataType::Utf8, true)),
    );
    fields.extend([
        Field::new(REVIEW_LENGTH, DataType::UInt64, false),
        Field::new(REVIEW_LENGTH_CAPPED, DataType::Float64, false),
        Field::new(REVIEW_LENGTH_BIN, DataType::UInt32, false),
        Field::new(HELPFUL_VOTES_CAPPED, DataType::Float64, true),
    ]);
    Arc::new(Schema::new(fields))
}

fn to_record_batch(
    finished: &FinishedBatch,
    schema: &SchemaRef,
    text_columns: &[ColumnName],
) -> Result<RecordBatch, CleanError> {
    let batch = &finished.batch;
    let columns = &batch.columns;
    let rows = batch.len();

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![batch.source.as_str(); rows])),
        Arc::new(Date32Array::from(
            batch
                .review_date
                .iter()
                .map(|date| Date32Type::from_naive_date(date.date()))
                .collect::<Vec<i32>>(),
        )),
        Arc::new(Int32Array::from(
            batch.review_date.iter().map(|date| date.year()).collect::<Vec<i32>>(),
        )),
        Arc::new(Int32Array::from(
            batch
                .review_date
                .iter()
                .map(|date| date.month() as i32)
                .collect::<Vec<i32>>(),
        )),
        Arc::new(StringArray::from(columns.marketplace.clone())),
        Arc::new(StringArray::from(columns.review_id.clone())),
        Arc::new(StringArray::from(columns.product_id.clone())),
        Arc::new(StringArray::from(columns.product_category.clone())),
        Arc::new(Int64Array::from(columns.star_rating.clone())),
        Arc::new(Int64Array::from(columns.helpful_votes.clone())),
        Arc::new(Int64Array::from(columns.total_votes.clone())),
        Arc::new(BooleanArray::from(columns.vine.clone())),
        Arc::new(BooleanArray::from(columns.verified_purchase.clone())),
    ];

    for name in text_columns {
        let column = columns.text_column(name).ok_or_else(|| {
            CleanError::Configuration(format!("batch has no text column '{name}'"))
        })?;
        match &column.values {
            TextValues::Normalized(values) => {
                arrays.push(Arc::new(StringArray::from(values.clone())));
            }
            _ => {
                return Err(CleanError::PreconditionViolation {
                    column: column.name.clone(),
                    state: column.state(),
                    operation: "write",
                });
            }
        }
    }

    arrays.push(Arc::new(UInt64Array::from(finished.review_length.clone())));
    arrays.push(Arc::new(Float64Array::from(
        finished.review_length_capped.clone(),
    )));
    arrays.push(Arc::new(UInt32Array::from(finished.review_length_bin.clone())));
    arrays.push(Arc::new(Float64Array::from(
        finished.helpful_votes_capped.clone(),
    )));

    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}

/// Default report location: `<output>.report.json`.
pub fn report_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(crate::constants::files::REPORT_SUFFIX);
    PathBuf::from(name)
}

/// Write `report` as pretty JSON to `path`.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<(), CleanError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report.to_json()?)?;
    info!(path = %path.display(), "wrote run report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::columns::REVIEW_BODY;

    #[test]
    fn schema_places_text_between_passthrough_and_derived_columns() {
        let schema = output_schema(&[REVIEW_BODY.to_string()]);
        let names: Vec<&str> = schema
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect();
        assert_eq!(names.first(), Some(&SOURCE_FILE));
        assert_eq!(names[13], REVIEW_BODY);
        assert_eq!(names.last(), Some(&HELPFUL_VOTES_CAPPED));
        assert_eq!(schema.field(1).data_type(), &DataType::Date32);
    }

    #[test]
    fn report_path_appends_suffix() {
        assert_eq!(
            report_path_for(Path::new("out/merged_clean.parquet")),
            PathBuf::from("out/merged_clean.parquet.report.json")
        );
    }
}
