//! Loader for a directory of review parquet shards.
//!
//! String annotations are stripped from the parquet schema before the reader
//! is built, so string columns arrive as binary and a value with invalid UTF-8
//! does not fail the read. Decoding is left to the text repairer. Binary
//! columns (`review_body_blob`) are passed through as they are.

use std::collections::BinaryHeap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, LargeBinaryArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReader,
    ParquetRecordBatchReaderBuilder,
};
use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::file::metadata::{FileMetaData, ParquetMetaData};
use parquet::schema::types::{SchemaDescriptor, Type, TypePtr};
use tracing::{debug, info, warn};

use crate::config::{DateEncoding, ParquetSourceConfig};
use crate::constants::columns::{
    BLOB_SUFFIX, HELPFUL_VOTES, REVIEW_DATE, REVIEW_ID, STAR_RATING, TOTAL_VOTES,
    VERIFIED_PURCHASE, VINE,
};
use crate::data::{LabelColumn, RawReviewBatch, ReviewColumns, TextColumn, UndecodedValue};
use crate::errors::CleanError;
use crate::hash::{stable_hash_row, stable_hash_str};
use crate::source::{BatchIter, ReviewSource};
use crate::transport::fs::discover_parquet_files;
use crate::types::{ColumnName, RawText, SourceId};

/// Source reading every matching shard under a data directory, file by file.
pub struct ParquetReviewSource {
    id: SourceId,
    config: ParquetSourceConfig,
    files: Vec<PathBuf>,
}

impl ParquetReviewSource {
    /// Discover the shards selected by `config`.
    ///
    /// Fails with `SourceUnavailable` when the directory is missing or holds no
    /// matching parquet file.
    pub fn open(config: ParquetSourceConfig) -> Result<Self, CleanError> {
        if config.batch_size == 0 {
            return Err(CleanError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if config.rows_per_file == Some(0) {
            return Err(CleanError::Configuration(
                "rows_per_file must be at least 1".to_string(),
            ));
        }
        let files = discover_parquet_files(&config.data_dir, &config.file_prefix, &config.years)?;
        if files.is_empty() {
            return Err(CleanError::SourceUnavailable {
                source_id: config.data_dir.display().to_string(),
                reason: format!(
                    "no parquet files starting with '{}' matched",
                    config.file_prefix
                ),
            });
        }
        info!(
            data_dir = %config.data_dir.display(),
            files = files.len(),
            "discovered review shards"
        );
        Ok(Self {
            id: config.data_dir.display().to_string(),
            config,
            files,
        })
    }

    /// Shards read by this source, in read order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl ReviewSource for ParquetReviewSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn inputs(&self) -> Vec<SourceId> {
        self.files.iter().map(|path| file_label(path)).collect()
    }

    fn batches(&self) -> Result<BatchIter<'_>, CleanError> {
        Ok(Box::new(ShardBatches {
            source: self,
            next_file: 0,
            current: None,
        }))
    }
}

struct ShardBatches<'a> {
    source: &'a ParquetReviewSource,
    next_file: usize,
    current: Option<OpenShard>,
}

impl Iterator for ShardBatches<'_> {
    type Item = Result<RawReviewBatch, CleanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.source.files.get(self.next_file)?;
                self.next_file += 1;
                match OpenShard::open(path, &self.source.config) {
                    Ok(shard) => self.current = Some(shard),
                    Err(err) => return Some(Err(err)),
                }
            }
            let shard = self.current.as_mut()?;
            match shard.next_batch() {
                Some(Ok(batch)) if batch.is_empty() => continue,
                Some(result) => return Some(result),
                None => self.current = None,
            }
        }
    }
}

struct OpenShard {
    name: SourceId,
    reader: ParquetRecordBatchReader,
    date_encoding: Option<DateEncoding>,
    text_columns: Vec<ColumnName>,
    sampled: Option<Vec<bool>>,
    next_row: usize,
}

impl OpenShard {
    fn open(path: &Path, config: &ParquetSourceConfig) -> Result<Self, CleanError> {
        let name = file_label(path);
        let file = open_file(path)?;
        let stored = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new())?;
        let metadata = binary_text_metadata(stored.metadata())?;

        let date_encoding = match metadata.schema().field_with_name(REVIEW_DATE) {
            Ok(field) => storage_date_encoding(field.data_type()),
            Err(_) => {
                return Err(CleanError::SourceUnavailable {
                    source_id: name,
                    reason: format!("column '{REVIEW_DATE}' is missing"),
                });
            }
        };

        let sampled = match config.rows_per_file {
            Some(limit) => sample_rows(path, &metadata, limit, config)?,
            None => None,
        };

        let total_rows = metadata.metadata().file_metadata().num_rows();
        info!(
            file = %name,
            rows = total_rows,
            sampled = sampled
                .as_ref()
                .map(|keep| keep.iter().filter(|kept| **kept).count()),
            "reading review shard"
        );

        let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(file, metadata)
            .with_batch_size(config.batch_size)
            .build()?;
        Ok(Self {
            name,
            reader,
            date_encoding,
            text_columns: config.text_columns.clone(),
            sampled,
            next_row: 0,
        })
    }

    fn next_batch(&mut self) -> Option<Result<RawReviewBatch, CleanError>> {
        let record_batch = match self.reader.next()? {
            Ok(batch) => batch,
            Err(err) => return Some(Err(err.into())),
        };
        let rows = record_batch.num_rows();
        let mut raw = match convert_record_batch(&record_batch, &self.name, &self.text_columns) {
            Ok(raw) => raw,
            Err(err) => return Some(Err(err)),
        };
        raw.date_encoding = self.date_encoding;
        if let Some(keep) = &self.sampled {
            let end = (self.next_row + rows).min(keep.len());
            let start = self.next_row.min(end);
            raw.retain_rows(&keep[start..end]);
        }
        self.next_row += rows;
        Some(Ok(raw))
    }
}

fn open_file(path: &Path) -> Result<File, CleanError> {
    File::open(path).map_err(|err| CleanError::SourceUnavailable {
        source_id: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn file_label(path: &Path) -> SourceId {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reader metadata with every string annotation removed, so UTF8 columns
/// decode as `Binary` without UTF-8 validation.
///
/// The embedded arrow schema is skipped as well; it would retype the columns
/// back to strings.
fn binary_text_metadata(metadata: &ParquetMetaData) -> Result<ArrowReaderMetadata, CleanError> {
    let file = metadata.file_metadata();
    let root = without_string_annotations(&file.schema_descr().root_schema_ptr())?;
    let file_metadata = FileMetaData::new(
        file.version(),
        file.num_rows(),
        file.created_by().map(str::to_string),
        file.key_value_metadata().cloned(),
        Arc::new(SchemaDescriptor::new(root)),
        file.column_orders().cloned(),
    );
    let stripped = ParquetMetaData::new(file_metadata, metadata.row_groups().to_vec());
    let options = ArrowReaderOptions::new().with_skip_arrow_metadata(true);
    Ok(ArrowReaderMetadata::try_new(Arc::new(stripped), options)?)
}

fn without_string_annotations(ty: &TypePtr) -> Result<TypePtr, CleanError> {
    match ty.as_ref() {
        Type::PrimitiveType {
            basic_info,
            physical_type: PhysicalType::BYTE_ARRAY,
            ..
        } if is_string_annotated(basic_info.logical_type(), basic_info.converted_type()) => {
            let mut builder =
                Type::primitive_type_builder(basic_info.name(), PhysicalType::BYTE_ARRAY);
            if basic_info.has_repetition() {
                builder = builder.with_repetition(basic_info.repetition());
            }
            if basic_info.has_id() {
                builder = builder.with_id(Some(basic_info.id()));
            }
            Ok(Arc::new(builder.build()?))
        }
        Type::GroupType { basic_info, fields } => {
            let fields = fields
                .iter()
                .map(without_string_annotations)
                .collect::<Result<Vec<_>, _>>()?;
            let mut builder = Type::group_type_builder(basic_info.name())
                .with_fields(fields)
                .with_logical_type(basic_info.logical_type())
                .with_converted_type(basic_info.converted_type());
            if basic_info.has_repetition() {
                builder = builder.with_repetition(basic_info.repetition());
            }
            if basic_info.has_id() {
                builder = builder.with_id(Some(basic_info.id()));
            }
            Ok(Arc::new(builder.build()?))
        }
        Type::PrimitiveType { .. } => Ok(ty.clone()),
    }
}

fn is_string_annotated(logical: Option<LogicalType>, converted: ConvertedType) -> bool {
    matches!(
        logical,
        Some(LogicalType::String | LogicalType::Json | LogicalType::Enum)
    ) || matches!(
        converted,
        ConvertedType::UTF8 | ConvertedType::JSON | ConvertedType::ENUM
    )
}

/// Encoding implied by a date column's storage type, if any.
fn storage_date_encoding(data_type: &DataType) -> Option<DateEncoding> {
    match data_type {
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            Some(DateEncoding::DaysSinceEpoch)
        }
        _ => None,
    }
}

/// Keep mask selecting the `limit` rows with the smallest seeded `review_id` hash.
///
/// Returns `None` when the shard has no more than `limit` rows.
fn sample_rows(
    path: &Path,
    metadata: &ArrowReaderMetadata,
    limit: usize,
    config: &ParquetSourceConfig,
) -> Result<Option<Vec<bool>>, CleanError> {
    let total = usize::try_from(metadata.metadata().file_metadata().num_rows()).unwrap_or(0);
    if total <= limit {
        return Ok(None);
    }

    let seed = config.sample_seed;
    let mut heap: BinaryHeap<(u64, usize)> = BinaryHeap::with_capacity(limit + 1);
    match metadata.schema().index_of(REVIEW_ID) {
        Ok(idx) => {
            let builder =
                ParquetRecordBatchReaderBuilder::new_with_metadata(open_file(path)?, metadata.clone());
            let mask = ProjectionMask::roots(builder.parquet_schema(), [idx]);
            let reader = builder
                .with_projection(mask)
                .with_batch_size(config.batch_size)
                .build()?;
            let mut row = 0usize;
            for batch in reader {
                let batch = batch?;
                for id in binary_values(batch.column(0), REVIEW_ID)? {
                    let key = match id {
                        Some(bytes) => stable_hash_str(seed, &String::from_utf8_lossy(&bytes)),
                        None => stable_hash_row(seed, row),
                    };
                    offer(&mut heap, limit, key, row);
                    row += 1;
                }
            }
        }
        Err(_) => {
            warn!(file = %path.display(), "no review_id column; sampling by row position");
            for row in 0..total {
                offer(&mut heap, limit, stable_hash_row(seed, row), row);
            }
        }
    }

    let mut keep = vec![false; total];
    for (_, row) in heap {
        if let Some(slot) = keep.get_mut(row) {
            *slot = true;
        }
    }
    debug!(file = %path.display(), total, limit, "built per-file sample");
    Ok(Some(keep))
}

fn offer(heap: &mut BinaryHeap<(u64, usize)>, limit: usize, key: u64, row: usize) {
    heap.push((key, row));
    if heap.len() > limit {
        heap.pop();
    }
}

/// Convert one arrow batch into loader columns. Missing optional columns read
/// as nulls; text columns accept a `<name>_blob` alias.
pub(crate) fn convert_record_batch(
    batch: &RecordBatch,
    source: &str,
    text_columns: &[ColumnName],
) -> Result<RawReviewBatch, CleanError> {
    let rows = batch.num_rows();
    let review_date = match find_column(batch, REVIEW_DATE) {
        Some(array) => int_values(array, REVIEW_DATE)?,
        None => {
            return Err(CleanError::SourceUnavailable {
                source_id: source.to_string(),
                reason: format!("column '{REVIEW_DATE}' is missing"),
            });
        }
    };

    let mut text = Vec::with_capacity(text_columns.len());
    for name in text_columns {
        let values = match find_column(batch, name) {
            Some(array) => binary_values(array, name)?,
            None => {
                debug!(source, column = %name, "text column missing; reading nulls");
                vec![None; rows]
            }
        };
        text.push(TextColumn::raw(name.clone(), values));
    }

    let mut columns = ReviewColumns::with_nulls(rows, text);
    for label in LabelColumn::ALL {
        if let Some(array) = find_column(batch, label.name()) {
            read_labels(array, label, &mut columns)?;
        }
    }
    columns.star_rating = optional(batch, STAR_RATING, rows, int_values)?;
    columns.helpful_votes = optional(batch, HELPFUL_VOTES, rows, int_values)?;
    columns.total_votes = optional(batch, TOTAL_VOTES, rows, int_values)?;
    columns.vine = optional(batch, VINE, rows, bool_values)?;
    columns.verified_purchase = optional(batch, VERIFIED_PURCHASE, rows, bool_values)?;

    Ok(RawReviewBatch {
        source: source.to_string(),
        review_date,
        date_encoding: None,
        columns,
    })
}

fn find_column<'b>(batch: &'b RecordBatch, name: &str) -> Option<&'b ArrayRef> {
    batch
        .column_by_name(name)
        .or_else(|| batch.column_by_name(&format!("{name}{BLOB_SUFFIX}")))
}

fn optional<T: Clone>(
    batch: &RecordBatch,
    name: &str,
    rows: usize,
    read: fn(&ArrayRef, &str) -> Result<Vec<Option<T>>, CleanError>,
) -> Result<Vec<Option<T>>, CleanError> {
    match find_column(batch, name) {
        Some(array) => read(array, name),
        None => Ok(vec![None; rows]),
    }
}

fn wrong_type(name: &str, array: &ArrayRef) -> CleanError {
    CleanError::Configuration(format!(
        "column '{name}' has unsupported type {}",
        array.data_type()
    ))
}

fn int_values(array: &ArrayRef, name: &str) -> Result<Vec<Option<i64>>, CleanError> {
    let ints = match array.data_type() {
        DataType::Date32 => cast(&cast(array, &DataType::Int32)?, &DataType::Int64)?,
        DataType::Date64 | DataType::Timestamp(_, _) => {
            let days = cast(array, &DataType::Date32)?;
            cast(&cast(&days, &DataType::Int32)?, &DataType::Int64)?
        }
        _ => cast(array, &DataType::Int64)?,
    };
    let ints = ints
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| wrong_type(name, array))?;
    Ok(ints.iter().collect())
}

fn binary_values(array: &ArrayRef, name: &str) -> Result<Vec<Option<RawText>>, CleanError> {
    let binary = cast(array, &DataType::LargeBinary)?;
    let binary = binary
        .as_any()
        .downcast_ref::<LargeBinaryArray>()
        .ok_or_else(|| wrong_type(name, array))?;
    Ok(binary.iter().map(|value| value.map(<[u8]>::to_vec)).collect())
}

/// Strictly decode a label column. Invalid values stay null and are queued on
/// `columns.undecoded` for the text repairer.
fn read_labels(
    array: &ArrayRef,
    label: LabelColumn,
    columns: &mut ReviewColumns,
) -> Result<(), CleanError> {
    let mut undecoded = Vec::new();
    let cells = columns.label_mut(label);
    for (row, value) in binary_values(array, label.name())?.into_iter().enumerate() {
        let Some(bytes) = value else { continue };
        match String::from_utf8(bytes) {
            Ok(text) => {
                if let Some(cell) = cells.get_mut(row) {
                    *cell = Some(text);
                }
            }
            Err(err) => undecoded.push(UndecodedValue {
                row,
                column: label,
                bytes: err.into_bytes(),
            }),
        }
    }
    columns.undecoded.extend(undecoded);
    Ok(())
}

fn bool_values(array: &ArrayRef, name: &str) -> Result<Vec<Option<bool>>, CleanError> {
    match array.data_type() {
        DataType::Boolean => {}
        DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Utf8View => {
            return Ok(binary_values(array, name)?
                .into_iter()
                .map(|value| value.and_then(|bytes| parse_flag(&bytes)))
                .collect());
        }
        _ => {}
    }
    let flags = cast(array, &DataType::Boolean)?;
    let flags = flags
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| wrong_type(name, array))?;
    Ok(flags.iter().collect())
}

/// `Y`/`N` style flags as stored by the tab-separated releases of the dataset.
fn parse_flag(bytes: &[u8]) -> Option<bool> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if ["y", "yes", "true", "1"]
        .iter()
        .any(|flag| text.eq_ignore_ascii_case(flag))
    {
        Some(true)
    } else if ["n", "no", "false", "0"]
        .iter()
        .any(|flag| text.eq_ignore_ascii_case(flag))
    {
        Some(false)
    } else {
        None
    }
}
