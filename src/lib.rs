#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// CLI runner behind the `review-clean` binary.
pub mod app;
/// Cleaning and input configuration types.
pub mod config;
/// Centralized constants for column names, defaults, and file layout.
pub mod constants;
/// Batch and column types passed between stages.
pub mod data;
/// Date normalizer.
pub mod dates;
/// Row-level consistency rules.
pub mod filters;
mod hash;
/// Run counters and the run report.
pub mod metrics;
/// Outlier handler: percentiles, capping, log view, and binning.
pub mod outliers;
/// Stage ordering and the two-pass run.
pub mod pipeline;
/// Text repairer.
pub mod repair;
/// Output sinks.
pub mod sink;
/// Review sources.
pub mod source;
/// Input discovery.
pub mod transport;
/// String trimmer.
pub mod trim;
/// Shared type aliases.
pub mod types;
/// Text normalization helpers.
pub mod utils;

mod errors;

pub use config::{
    BinningStrategy, CleanConfig, DateEncoding, InvalidTextPolicy, ParquetSourceConfig,
    QuantileMode, RowFilters,
};
pub use data::{
    CleanedBatch, FinishedBatch, LabelColumn, RawReviewBatch, ReviewBatch, ReviewColumns,
    ReviewDate, TextColumn, TextState, TextValues, UndecodedValue,
};
pub use errors::CleanError;
pub use metrics::{RunReport, RunTally};
pub use outliers::{BinEdges, BinSummary, CapCutoff, OutlierPlan, QuantileSketch};
pub use pipeline::ReviewCleaner;
pub use sink::{MemorySink, ParquetReviewSink, ReviewSink};
pub use source::{InMemorySource, ParquetReviewSource, ReviewSource};
pub use types::{ColumnName, RawText, ReviewId, SourceId};
