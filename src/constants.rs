/// Constants used by column lookup in input and output schemas.
pub mod columns {
    /// Integer-encoded review date.
    pub const REVIEW_DATE: &str = "review_date";
    /// Derived calendar year of the review.
    pub const REVIEW_YEAR: &str = "review_year";
    /// Derived calendar month (1-12) of the review.
    pub const REVIEW_MONTH: &str = "review_month";
    /// Input file each output row came from.
    pub const SOURCE_FILE: &str = "source_file";
    /// Marketplace code column.
    pub const MARKETPLACE: &str = "marketplace";
    /// Review identifier column.
    pub const REVIEW_ID: &str = "review_id";
    /// Product identifier column.
    pub const PRODUCT_ID: &str = "product_id";
    /// Product category column.
    pub const PRODUCT_CATEGORY: &str = "product_category";
    /// Star rating column (1-5).
    pub const STAR_RATING: &str = "star_rating";
    /// Helpful vote count column.
    pub const HELPFUL_VOTES: &str = "helpful_votes";
    /// Total vote count column.
    pub const TOTAL_VOTES: &str = "total_votes";
    /// Vine program flag column.
    pub const VINE: &str = "vine";
    /// Verified purchase flag column.
    pub const VERIFIED_PURCHASE: &str = "verified_purchase";
    /// Review headline text column.
    pub const REVIEW_HEADLINE: &str = "review_headline";
    /// Review body text column.
    pub const REVIEW_BODY: &str = "review_body";
    /// Suffix used by sampled inputs that stored text columns as blobs.
    pub const BLOB_SUFFIX: &str = "_blob";
    /// Character length of the normalized length column.
    pub const REVIEW_LENGTH: &str = "review_length";
    /// Length clamped at the configured percentile.
    pub const REVIEW_LENGTH_CAPPED: &str = "review_length_capped";
    /// Exploratory bin index of the capped length.
    pub const REVIEW_LENGTH_BIN: &str = "review_length_bin";
    /// Helpful votes clamped at the configured percentile.
    pub const HELPFUL_VOTES_CAPPED: &str = "helpful_votes_capped";
}

/// Constants used by date normalization.
pub mod dates {
    /// Highest integer accepted by the `YYYYMMDD` encoding.
    pub const MAX_YYYYMMDD: i64 = 9999_12_31;
}

/// Constants used by the text repairer and trimmer.
pub mod text {
    /// Default substitution marker for invalid byte sequences.
    pub const DEFAULT_REPLACEMENT_MARKER: &str = "\u{FFFD}";
    /// HTML line-break spellings found in review bodies.
    pub const HTML_LINE_BREAKS: [&str; 4] = ["<br />", "<br/>", "<br>", "<BR>"];
}

/// Constants used by the outlier handler.
pub mod outliers {
    /// Default percentile (0-100] used for capping.
    pub const DEFAULT_CAP_PERCENTILE: f64 = 99.0;
    /// Default number of exploratory bins.
    pub const DEFAULT_BIN_COUNT: usize = 10;
    /// Default sample size for the approximate reservoir sketch.
    pub const DEFAULT_RESERVOIR_CAPACITY: usize = 100_000;
    /// Default seed for the reservoir sketch.
    pub const DEFAULT_RESERVOIR_SEED: u64 = 42;
}

/// Constants used by parquet input discovery and output.
pub mod files {
    /// File name prefix of dataset shards.
    pub const INPUT_FILE_PREFIX: &str = "amazon_reviews_";
    /// Extension of parquet inputs.
    pub const PARQUET_EXTENSION: &str = "parquet";
    /// Compressed parquet suffix used by the dataset shards.
    pub const SNAPPY_PARQUET_SUFFIX: &str = ".snappy.parquet";
    /// Default record-batch size when reading inputs.
    pub const DEFAULT_BATCH_SIZE: usize = 8192;
    /// Default seed for per-file review sampling.
    pub const DEFAULT_SAMPLE_SEED: u64 = 0;
    /// Default output file name.
    pub const DEFAULT_OUTPUT_FILE: &str = "merged_clean.parquet";
    /// Suffix appended to the output path for the JSON run report.
    pub const REPORT_SUFFIX: &str = ".report.json";
}
