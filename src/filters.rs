//! Row-level consistency rules run after text normalization.

use crate::config::RowFilters;
use crate::constants::columns::REVIEW_BODY;
use crate::data::ReviewBatch;
use crate::metrics::RunTally;

/// Valid `star_rating` range.
const STAR_RATING_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// Exclude rows that break the enabled rules, counting each by the first rule hit.
///
/// Rules run in a fixed order: vote consistency, rating range, blank body,
/// blank category.
pub fn apply_row_filters(batch: &mut ReviewBatch, filters: &RowFilters, tally: &mut RunTally) {
    let columns = &batch.columns;
    let body = columns
        .text_column(REVIEW_BODY)
        .and_then(|column| column.text_values());

    let mut keep = Vec::with_capacity(batch.len());
    for row in 0..batch.len() {
        let votes_mismatch = filters.require_vote_consistency
            && matches!(
                (columns.helpful_votes[row], columns.total_votes[row]),
                (Some(helpful), Some(total)) if helpful > total
            );
        if votes_mismatch {
            tally.excluded_vote_mismatch += 1;
            keep.push(false);
            continue;
        }

        let rating_out_of_range = filters.require_rating_range
            && columns.star_rating[row].is_some_and(|rating| !STAR_RATING_RANGE.contains(&rating));
        if rating_out_of_range {
            tally.excluded_rating_range += 1;
            keep.push(false);
            continue;
        }

        if filters.drop_blank_body {
            let blank = body
                .and_then(|values| values[row].as_deref())
                .is_none_or(|text| text.trim().is_empty());
            if blank {
                tally.excluded_blank_body += 1;
                keep.push(false);
                continue;
            }
        }

        if filters.drop_blank_category {
            let blank = columns.product_category[row]
                .as_deref()
                .is_none_or(|category| category.trim().is_empty());
            if blank {
                tally.excluded_blank_category += 1;
                keep.push(false);
                continue;
            }
        }

        keep.push(true);
    }

    batch.retain_rows(&keep);
}
