use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::constants::columns::{REVIEW_BODY, REVIEW_HEADLINE};
use crate::constants::files::{DEFAULT_BATCH_SIZE, DEFAULT_SAMPLE_SEED, INPUT_FILE_PREFIX};
use crate::constants::outliers::{
    DEFAULT_BIN_COUNT, DEFAULT_CAP_PERCENTILE, DEFAULT_RESERVOIR_CAPACITY, DEFAULT_RESERVOIR_SEED,
};
use crate::constants::text::DEFAULT_REPLACEMENT_MARKER;
use crate::errors::CleanError;
use crate::types::ColumnName;

/// How the integer `review_date` column encodes a calendar date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateEncoding {
    /// Days since 1970-01-01 (the dataset's native encoding).
    #[default]
    DaysSinceEpoch,
    /// Decimal `YYYYMMDD`, e.g. `20230115`.
    YyyyMmDd,
    /// Seconds since the Unix epoch, UTC.
    UnixSeconds,
}

impl fmt::Display for DateEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DateEncoding::DaysSinceEpoch => "days-since-epoch",
            DateEncoding::YyyyMmDd => "YYYYMMDD",
            DateEncoding::UnixSeconds => "unix-seconds",
        };
        f.write_str(label)
    }
}

/// What to do with a text value whose bytes are not valid UTF-8.
///
/// The same policy applies to every text column and record in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidTextPolicy {
    /// Replace each invalid byte sequence with `marker` and keep the record.
    Substitute { marker: String },
    /// Drop the whole record.
    Drop,
}

impl Default for InvalidTextPolicy {
    fn default() -> Self {
        Self::Substitute {
            marker: DEFAULT_REPLACEMENT_MARKER.to_string(),
        }
    }
}

/// Bin layout for exploratory aggregation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningStrategy {
    /// Bins of equal value range between min and max.
    EqualWidth,
    /// Bins holding (roughly) the same number of values.
    #[default]
    EqualFrequency,
}

/// How percentile thresholds are estimated across chunks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMode {
    /// Keep every value; exact percentiles.
    #[default]
    Exact,
    /// Seeded reservoir sample of at most `capacity` values; approximate.
    Reservoir { capacity: usize, seed: u64 },
}

impl QuantileMode {
    /// Reservoir mode with the default capacity and seed.
    pub fn reservoir() -> Self {
        Self::Reservoir {
            capacity: DEFAULT_RESERVOIR_CAPACITY,
            seed: DEFAULT_RESERVOIR_SEED,
        }
    }
}

/// Row-level consistency rules applied after text normalization.
#[derive(Clone, Debug, Serialize)]
pub struct RowFilters {
    /// Exclude rows where `helpful_votes > total_votes`.
    pub require_vote_consistency: bool,
    /// Exclude rows whose `star_rating` is outside `1..=5` (nulls pass).
    pub require_rating_range: bool,
    /// Exclude rows whose normalized body is missing or empty.
    pub drop_blank_body: bool,
    /// Exclude rows whose product category is missing or blank.
    pub drop_blank_category: bool,
}

impl Default for RowFilters {
    fn default() -> Self {
        Self {
            require_vote_consistency: true,
            require_rating_range: true,
            drop_blank_body: false,
            drop_blank_category: false,
        }
    }
}

/// Settings for the cleaning stages.
#[derive(Clone, Debug, Serialize)]
pub struct CleanConfig {
    /// Encoding of the integer `review_date` column.
    pub date_encoding: DateEncoding,
    /// Policy for invalid text bytes.
    pub text_policy: InvalidTextPolicy,
    /// Text column whose normalized character count is the length statistic.
    pub length_column: ColumnName,
    /// Percentile (0-100] used as the capping threshold.
    pub cap_percentile: f64,
    /// Threshold estimation mode.
    pub quantile_mode: QuantileMode,
    /// Bin layout for length bins.
    pub binning: BinningStrategy,
    /// Requested number of length bins.
    pub bin_count: usize,
    /// Row-level consistency rules.
    pub filters: RowFilters,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            date_encoding: DateEncoding::default(),
            text_policy: InvalidTextPolicy::default(),
            length_column: REVIEW_BODY.to_string(),
            cap_percentile: DEFAULT_CAP_PERCENTILE,
            quantile_mode: QuantileMode::default(),
            binning: BinningStrategy::default(),
            bin_count: DEFAULT_BIN_COUNT,
            filters: RowFilters::default(),
        }
    }
}

impl CleanConfig {
    /// Reject settings the stages cannot honor.
    pub fn validate(&self) -> Result<(), CleanError> {
        if !(self.cap_percentile > 0.0 && self.cap_percentile <= 100.0) {
            return Err(CleanError::Configuration(format!(
                "cap_percentile must be in (0, 100], got {}",
                self.cap_percentile
            )));
        }
        if self.bin_count == 0 {
            return Err(CleanError::Configuration(
                "bin_count must be at least 1".to_string(),
            ));
        }
        if self.length_column.trim().is_empty() {
            return Err(CleanError::Configuration(
                "length column name is empty".to_string(),
            ));
        }
        if let QuantileMode::Reservoir { capacity: 0, .. } = self.quantile_mode {
            return Err(CleanError::Configuration(
                "reservoir capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for reading parquet inputs from a directory.
#[derive(Clone, Debug)]
pub struct ParquetSourceConfig {
    /// Directory scanned (recursively) for parquet files.
    pub data_dir: PathBuf,
    /// Only files whose name starts with this prefix are read; empty reads all.
    pub file_prefix: String,
    /// Columns read as raw text bytes; `<name>_blob` is accepted as an alias.
    pub text_columns: Vec<ColumnName>,
    /// Rows per record batch.
    pub batch_size: usize,
    /// Keep only the files whose name carries one of these years; empty keeps all.
    pub years: Vec<i32>,
    /// Keep at most this many rows per file, chosen by seeded `review_id` hash.
    pub rows_per_file: Option<usize>,
    /// Seed for the per-file sample.
    pub sample_seed: u64,
}

impl ParquetSourceConfig {
    /// Config reading every dataset shard under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_prefix: INPUT_FILE_PREFIX.to_string(),
            text_columns: vec![REVIEW_HEADLINE.to_string(), REVIEW_BODY.to_string()],
            batch_size: DEFAULT_BATCH_SIZE,
            years: Vec::new(),
            rows_per_file: None,
            sample_seed: DEFAULT_SAMPLE_SEED,
        }
    }
}
