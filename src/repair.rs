//! Text repair: raw byte columns to validated UTF-8 text.
//!
//! Invalid encoding is an expected condition on this dataset, so nothing here
//! aborts a batch. Every value goes through the same `InvalidTextPolicy`.

use tracing::debug;

use crate::config::InvalidTextPolicy;
use crate::data::{ReviewColumns, TextValues, UndecodedValue};
use crate::errors::CleanError;
use crate::metrics::RunTally;

/// Result of decoding one text value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Bytes were valid UTF-8.
    Clean(String),
    /// Invalid sequences were replaced by the marker.
    Substituted {
        text: String,
        invalid_sequences: usize,
    },
    /// Bytes were invalid and the policy drops the record.
    Rejected { invalid_sequences: usize },
}

/// Decode `bytes` strictly, falling back to `policy` on invalid sequences.
///
/// Each maximal invalid subsequence counts once and is replaced by one marker.
pub fn repair_bytes(bytes: &[u8], policy: &InvalidTextPolicy) -> RepairOutcome {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return RepairOutcome::Clean(text.to_string());
    }

    let invalid_sequences = bytes
        .utf8_chunks()
        .filter(|chunk| !chunk.invalid().is_empty())
        .count();

    match policy {
        InvalidTextPolicy::Drop => RepairOutcome::Rejected { invalid_sequences },
        InvalidTextPolicy::Substitute { marker } => {
            let mut text = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
                if !chunk.invalid().is_empty() {
                    text.push_str(marker);
                }
            }
            RepairOutcome::Substituted {
                text,
                invalid_sequences,
            }
        }
    }
}

/// Move every raw-bytes text column to validated text under `policy`, and
/// resolve the label values the loader could not decode.
///
/// Returns the keep mask for the batch: a row is dropped when any of its text
/// or label values is rejected. Columns already past the raw-bytes state are
/// left untouched. Tallies repaired records, dropped records, repaired values
/// and replaced sequences.
pub fn repair_text_columns(
    columns: &mut ReviewColumns,
    policy: &InvalidTextPolicy,
    tally: &mut RunTally,
) -> Vec<bool> {
    let rows = columns.len();
    let mut keep = vec![true; rows];
    let mut repaired = vec![false; rows];

    for column in &mut columns.text {
        let TextValues::RawBytes(raw) = &mut column.values else {
            continue;
        };
        let mut validated = Vec::with_capacity(raw.len());
        for (row, value) in raw.drain(..).enumerate() {
            let Some(bytes) = value else {
                validated.push(None);
                continue;
            };
            match repair_bytes(&bytes, policy) {
                RepairOutcome::Clean(text) => validated.push(Some(text)),
                RepairOutcome::Substituted {
                    text,
                    invalid_sequences,
                } => {
                    tally.values_repaired += 1;
                    tally.invalid_sequences_replaced += invalid_sequences as u64;
                    repaired[row] = true;
                    validated.push(Some(text));
                }
                RepairOutcome::Rejected { invalid_sequences } => {
                    let err = CleanError::InvalidTextEncoding {
                        column: column.name.clone(),
                        invalid_sequences,
                    };
                    debug!("dropping record: {err}");
                    keep[row] = false;
                    validated.push(None);
                }
            }
        }
        column.values = TextValues::Validated(validated);
    }

    for value in std::mem::take(&mut columns.undecoded) {
        let UndecodedValue { row, column, bytes } = value;
        let resolved = match repair_bytes(&bytes, policy) {
            RepairOutcome::Clean(text) => Some(text),
            RepairOutcome::Substituted {
                text,
                invalid_sequences,
            } => {
                tally.values_repaired += 1;
                tally.invalid_sequences_replaced += invalid_sequences as u64;
                if let Some(flag) = repaired.get_mut(row) {
                    *flag = true;
                }
                Some(text)
            }
            RepairOutcome::Rejected { invalid_sequences } => {
                let err = CleanError::InvalidTextEncoding {
                    column: column.name().to_string(),
                    invalid_sequences,
                };
                debug!("dropping record: {err}");
                if let Some(kept) = keep.get_mut(row) {
                    *kept = false;
                }
                None
            }
        };
        if let Some(cell) = columns.label_mut(column).get_mut(row) {
            *cell = resolved;
        }
    }

    for (kept, was_repaired) in keep.iter().zip(&repaired) {
        if !kept {
            tally.excluded_invalid_text += 1;
        } else if *was_repaired {
            tally.records_repaired += 1;
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LabelColumn, TextColumn, TextState};

    fn substitute(marker: &str) -> InvalidTextPolicy {
        InvalidTextPolicy::Substitute {
            marker: marker.to_string(),
        }
    }

    #[test]
    fn valid_bytes_decode_cleanly() {
        let outcome = repair_bytes("Great product, five stars ✓".as_bytes(), &substitute("?"));
        assert_eq!(
            outcome,
            RepairOutcome::Clean("Great product, five stars ✓".to_string())
        );
    }

    #[test]
    fn invalid_byte_is_replaced_by_marker() {
        let outcome = repair_bytes(b"caf\xE9 au lait", &substitute("?"));
        assert_eq!(
            outcome,
            RepairOutcome::Substituted {
                text: "caf? au lait".to_string(),
                invalid_sequences: 1,
            }
        );
    }

    #[test]
    fn truncated_multibyte_sequence_counts_once() {
        // First two bytes of a three-byte sequence, then ASCII.
        let outcome = repair_bytes(b"ok \xE2\x82 done \xFF\xFE", &substitute("\u{FFFD}"));
        assert_eq!(
            outcome,
            RepairOutcome::Substituted {
                text: String::from_utf8_lossy(b"ok \xE2\x82 done \xFF\xFE").into_owned(),
                invalid_sequences: 3,
            }
        );
    }

    #[test]
    fn drop_policy_rejects_invalid_bytes() {
        let outcome = repair_bytes(b"\xC3\x28", &InvalidTextPolicy::Drop);
        assert_eq!(
            outcome,
            RepairOutcome::Rejected {
                invalid_sequences: 1
            }
        );
    }

    fn two_column_batch() -> ReviewColumns {
        ReviewColumns::with_nulls(
            3,
            vec![
                TextColumn::raw(
                    "review_headline",
                    vec![Some(b"fine".to_vec()), Some(b"bad \xFF".to_vec()), None],
                ),
                TextColumn::raw(
                    "review_body",
                    vec![
                        Some(b"also \xFF bad".to_vec()),
                        Some(b"bad \xFE".to_vec()),
                        Some(b"clean".to_vec()),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn substitute_policy_keeps_rows_and_counts_records_once() {
        let mut columns = two_column_batch();
        let mut tally = RunTally::default();
        let keep = repair_text_columns(&mut columns, &substitute("#"), &mut tally);

        assert_eq!(keep, vec![true, true, true]);
        assert_eq!(tally.records_repaired, 2);
        assert_eq!(tally.values_repaired, 3);
        assert_eq!(tally.invalid_sequences_replaced, 3);
        assert_eq!(tally.excluded_invalid_text, 0);
        assert!(columns
            .text
            .iter()
            .all(|column| column.state() == TextState::Validated));
        assert_eq!(
            columns.text[1].values,
            TextValues::Validated(vec![
                Some("also # bad".to_string()),
                Some("bad #".to_string()),
                Some("clean".to_string()),
            ])
        );
    }

    fn batch_with_bad_category() -> ReviewColumns {
        let mut columns = ReviewColumns::with_nulls(
            2,
            vec![TextColumn::raw(
                "review_body",
                vec![Some(b"fine".to_vec()), Some(b"also fine".to_vec())],
            )],
        );
        columns.product_category = vec![Some("Books".to_string()), None];
        columns.undecoded = vec![UndecodedValue {
            row: 1,
            column: LabelColumn::ProductCategory,
            bytes: b"Bo\xffks".to_vec(),
        }];
        columns
    }

    #[test]
    fn undecoded_labels_follow_the_substitute_policy() {
        let mut columns = batch_with_bad_category();
        let mut tally = RunTally::default();
        let keep = repair_text_columns(&mut columns, &substitute("?"), &mut tally);

        assert_eq!(keep, vec![true, true]);
        assert!(columns.undecoded.is_empty());
        assert_eq!(
            columns.product_category,
            vec![Some("Books".to_string()), Some("Bo?ks".to_string())]
        );
        assert_eq!(tally.records_repaired, 1);
        assert_eq!(tally.values_repaired, 1);
    }

    #[test]
    fn undecoded_labels_are_dropped_under_the_drop_policy() {
        let mut columns = batch_with_bad_category();
        let mut tally = RunTally::default();
        let keep = repair_text_columns(&mut columns, &InvalidTextPolicy::Drop, &mut tally);

        assert_eq!(keep, vec![true, false]);
        assert!(columns.undecoded.is_empty());
        assert_eq!(tally.excluded_invalid_text, 1);
        assert_eq!(tally.records_repaired, 0);
    }

    #[test]
    fn drop_policy_applies_across_every_text_column() {
        let mut columns = two_column_batch();
        let mut tally = RunTally::default();
        let keep = repair_text_columns(&mut columns, &InvalidTextPolicy::Drop, &mut tally);

        assert_eq!(keep, vec![false, false, true]);
        assert_eq!(tally.excluded_invalid_text, 2);
        assert_eq!(tally.records_repaired, 0);
        assert_eq!(tally.values_repaired, 0);
    }
}
