//! String trimming: validated text to normalized text.

use crate::data::{ReviewColumns, TextColumn, TextState, TextValues};
use crate::errors::CleanError;
use crate::utils::normalize_review_text;

/// Normalize one text column in place.
///
/// Fails with `PreconditionViolation` when the column still holds raw bytes.
/// Normalized columns are left as they are.
pub fn normalize_text_column(column: &mut TextColumn) -> Result<(), CleanError> {
    match &mut column.values {
        TextValues::RawBytes(_) => Err(CleanError::PreconditionViolation {
            column: column.name.clone(),
            state: TextState::RawBytes,
            operation: "normalize",
        }),
        TextValues::Validated(values) => {
            let normalized = values
                .drain(..)
                .map(|value| value.map(|text| normalize_review_text(&text)))
                .collect();
            column.values = TextValues::Normalized(normalized);
            Ok(())
        }
        TextValues::Normalized(_) => Ok(()),
    }
}

/// Normalize every text column of a batch.
///
/// Label values still waiting for repair are a `PreconditionViolation` too.
pub fn normalize_text_columns(columns: &mut ReviewColumns) -> Result<(), CleanError> {
    if let Some(pending) = columns.undecoded.first() {
        return Err(CleanError::PreconditionViolation {
            column: pending.column.name().to_string(),
            state: TextState::RawBytes,
            operation: "normalize",
        });
    }
    for column in &mut columns.text {
        normalize_text_column(column)?;
    }
    Ok(())
}

/// Character count of each value in the normalized column `name`.
///
/// Missing values count as zero. Fails with `PreconditionViolation` when the
/// column has not been normalized, and with `Configuration` when it is absent.
pub fn text_lengths(columns: &ReviewColumns, name: &str) -> Result<Vec<u64>, CleanError> {
    let column = columns.text_column(name).ok_or_else(|| {
        CleanError::Configuration(format!("length column '{name}' is not a text column"))
    })?;
    match &column.values {
        TextValues::Normalized(values) => Ok(values
            .iter()
            .map(|value| value.as_ref().map_or(0, |text| text.chars().count() as u64))
            .collect()),
        _ => Err(CleanError::PreconditionViolation {
            column: column.name.clone(),
            state: column.state(),
            operation: "measure length",
        }),
    }
}
