use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{
    BinningStrategy, CleanConfig, DateEncoding, InvalidTextPolicy, ParquetSourceConfig,
    QuantileMode, RowFilters,
};
use crate::constants::files::{DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT_FILE};
use crate::constants::outliers::{DEFAULT_BIN_COUNT, DEFAULT_CAP_PERCENTILE, DEFAULT_RESERVOIR_SEED};
use crate::constants::text::DEFAULT_REPLACEMENT_MARKER;
use crate::pipeline::ReviewCleaner;
use crate::sink::{ParquetReviewSink, report_path_for, write_report_json};
use crate::source::ParquetReviewSource;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateEncodingArg {
    Days,
    Yyyymmdd,
    UnixSeconds,
}

impl From<DateEncodingArg> for DateEncoding {
    fn from(value: DateEncodingArg) -> Self {
        match value {
            DateEncodingArg::Days => DateEncoding::DaysSinceEpoch,
            DateEncodingArg::Yyyymmdd => DateEncoding::YyyyMmDd,
            DateEncodingArg::UnixSeconds => DateEncoding::UnixSeconds,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InvalidTextArg {
    Substitute,
    Drop,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BinningArg {
    EqualWidth,
    EqualFrequency,
}

impl From<BinningArg> for BinningStrategy {
    fn from(value: BinningArg) -> Self {
        match value {
            BinningArg::EqualWidth => BinningStrategy::EqualWidth,
            BinningArg::EqualFrequency => BinningStrategy::EqualFrequency,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "review-clean",
    disable_help_subcommand = true,
    about = "Clean Amazon review parquet shards into one analysis-ready file",
    long_about = "Normalize review dates, repair invalid UTF-8, trim text, apply consistency rules, and add percentile-capped and binned columns. Inputs are read twice: once to profile thresholds, once to write.",
    after_help = "Set RUST_LOG (e.g. RUST_LOG=review_clean=debug) to see per-file progress."
)]
struct CleanCli {
    #[arg(
        long = "data-dir",
        value_name = "DIR",
        help = "Folder containing amazon_reviews_*.parquet shards"
    )]
    data_dir: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_OUTPUT_FILE,
        help = "Output parquet file"
    )]
    out: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Run report path (defaults to <out>.report.json)"
    )]
    report: Option<PathBuf>,
    #[arg(
        long = "year",
        value_name = "YYYY",
        help = "Only read shards for this year, repeat as needed"
    )]
    years: Vec<i32>,
    #[arg(
        long = "rows-per-file",
        value_parser = parse_positive_usize,
        help = "Keep at most this many rows per shard, chosen by seeded review_id hash"
    )]
    rows_per_file: Option<usize>,
    #[arg(
        long = "batch-size",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_positive_usize,
        help = "Rows per record batch"
    )]
    batch_size: usize,
    #[arg(
        long = "date-encoding",
        value_enum,
        default_value = "days",
        help = "Encoding of integer review_date values (DATE columns are always days)"
    )]
    date_encoding: DateEncodingArg,
    #[arg(
        long = "invalid-text",
        value_enum,
        default_value = "substitute",
        help = "What to do with text that is not valid UTF-8"
    )]
    invalid_text: InvalidTextArg,
    #[arg(
        long,
        default_value = DEFAULT_REPLACEMENT_MARKER,
        help = "Marker substituted for each invalid byte sequence"
    )]
    marker: String,
    #[arg(
        long = "cap-percentile",
        default_value_t = DEFAULT_CAP_PERCENTILE,
        help = "Percentile (0-100] used as the capping threshold"
    )]
    cap_percentile: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_BIN_COUNT,
        value_parser = parse_positive_usize,
        help = "Number of review-length bins"
    )]
    bins: usize,
    #[arg(
        long,
        value_enum,
        default_value = "equal-frequency",
        help = "Review-length bin layout"
    )]
    binning: BinningArg,
    #[arg(
        long,
        value_name = "CAPACITY",
        value_parser = parse_positive_usize,
        help = "Estimate percentiles from a reservoir sample of this size instead of every value"
    )]
    reservoir: Option<usize>,
    #[arg(
        long,
        help = "Seed for per-file sampling and the reservoir sketch"
    )]
    seed: Option<u64>,
    #[arg(long = "drop-blank-body", help = "Exclude rows with an empty review body")]
    drop_blank_body: bool,
    #[arg(
        long = "drop-blank-category",
        help = "Exclude rows with a missing product category"
    )]
    drop_blank_category: bool,
}

impl CleanCli {
    fn clean_config(&self) -> CleanConfig {
        let text_policy = match self.invalid_text {
            InvalidTextArg::Substitute => InvalidTextPolicy::Substitute {
                marker: self.marker.clone(),
            },
            InvalidTextArg::Drop => InvalidTextPolicy::Drop,
        };
        let quantile_mode = match self.reservoir {
            Some(capacity) => QuantileMode::Reservoir {
                capacity,
                seed: self.seed.unwrap_or(DEFAULT_RESERVOIR_SEED),
            },
            None => QuantileMode::Exact,
        };
        CleanConfig {
            date_encoding: self.date_encoding.into(),
            text_policy,
            cap_percentile: self.cap_percentile,
            quantile_mode,
            binning: self.binning.into(),
            bin_count: self.bins,
            filters: RowFilters {
                drop_blank_body: self.drop_blank_body,
                drop_blank_category: self.drop_blank_category,
                ..RowFilters::default()
            },
            ..CleanConfig::default()
        }
    }

    fn source_config(&self) -> ParquetSourceConfig {
        let mut config = ParquetSourceConfig::new(&self.data_dir);
        config.batch_size = self.batch_size;
        config.years = self.years.clone();
        config.rows_per_file = self.rows_per_file;
        config.sample_seed = self.seed.unwrap_or(config.sample_seed);
        config
    }
}

/// Parse CLI arguments, clean every selected shard into one parquet file, and
/// write the run report next to it.
///
/// `args_iter` excludes the program name.
pub fn run_clean_app<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<CleanCli, _>(std::iter::once("review-clean".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let cleaner = ReviewCleaner::new(cli.clean_config())?;
    let source_config = cli.source_config();
    let text_columns = source_config.text_columns.clone();
    let source = ParquetReviewSource::open(source_config)?;
    let mut sink = ParquetReviewSink::create(&cli.out, &text_columns)?;

    let report = cleaner.run(&source, &mut sink)?;

    let report_path = cli.report.unwrap_or_else(|| report_path_for(&cli.out));
    write_report_json(&report_path, &report)?;

    println!("{report}");
    println!("output: {}", cli.out.display());
    println!("report: {}", report_path.display());
    Ok(())
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
