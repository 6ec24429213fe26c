use std::io;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::config::DateEncoding;
use crate::data::TextState;
use crate::types::ColumnName;

/// Error type for per-record data failures, pipeline-ordering bugs, and IO.
///
/// `InvalidDateEncoding` and `InvalidTextEncoding` describe per-record data
/// problems; stages recover from them locally and tally the record. Every other
/// variant stops the run.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("review_date value {value} is not a valid {encoding} date")]
    InvalidDateEncoding { value: i64, encoding: DateEncoding },
    #[error("column '{column}' holds {invalid_sequences} invalid UTF-8 sequence(s)")]
    InvalidTextEncoding {
        column: ColumnName,
        invalid_sequences: usize,
    },
    #[error("column '{column}' is still in {state} state; {operation} needs validated text")]
    PreconditionViolation {
        column: ColumnName,
        state: TextState,
        operation: &'static str,
    },
    #[error("input '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parquet(#[from] ParquetError),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value_and_state() {
        let date = CleanError::InvalidDateEncoding {
            value: 20231301,
            encoding: DateEncoding::YyyyMmDd,
        };
        assert!(date.to_string().contains("20231301"));
        assert!(date.to_string().contains("YYYYMMDD"));

        let ordering = CleanError::PreconditionViolation {
            column: "review_body".to_string(),
            state: TextState::RawBytes,
            operation: "normalize",
        };
        assert!(ordering.to_string().contains("raw-bytes"));
    }
}
