use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::config::DateEncoding;
use crate::constants::columns::{MARKETPLACE, PRODUCT_CATEGORY, PRODUCT_ID, REVIEW_ID};
pub use crate::types::{ColumnName, RawText, ReviewId, SourceId};

/// Processing state of a text column.
///
/// Transitions only go forward: `RawBytes` -> `Validated` -> `Normalized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextState {
    /// Bytes with untrusted encoding.
    RawBytes,
    /// Decoded and guaranteed well-formed UTF-8.
    Validated,
    /// Validated and whitespace/format cleaned.
    Normalized,
}

impl fmt::Display for TextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TextState::RawBytes => "raw-bytes",
            TextState::Validated => "validated-text",
            TextState::Normalized => "normalized-text",
        };
        f.write_str(label)
    }
}

/// Cell values of a text column, tagged with the column's state.
#[derive(Clone, Debug, PartialEq)]
pub enum TextValues {
    /// Loader output; bytes may not be UTF-8.
    RawBytes(Vec<Option<RawText>>),
    /// Repairer output.
    Validated(Vec<Option<String>>),
    /// Trimmer output.
    Normalized(Vec<Option<String>>),
}

/// A named text column.
#[derive(Clone, Debug, PartialEq)]
pub struct TextColumn {
    /// Canonical column name (`review_body`, not `review_body_blob`).
    pub name: ColumnName,
    /// Values in the column's current state.
    pub values: TextValues,
}

impl TextColumn {
    /// Column holding untrusted bytes, as produced by the loader.
    pub fn raw(name: impl Into<ColumnName>, values: Vec<Option<RawText>>) -> Self {
        Self {
            name: name.into(),
            values: TextValues::RawBytes(values),
        }
    }

    /// Current state of the column.
    pub fn state(&self) -> TextState {
        match self.values {
            TextValues::RawBytes(_) => TextState::RawBytes,
            TextValues::Validated(_) => TextState::Validated,
            TextValues::Normalized(_) => TextState::Normalized,
        }
    }

    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match &self.values {
            TextValues::RawBytes(values) => values.len(),
            TextValues::Validated(values) | TextValues::Normalized(values) => values.len(),
        }
    }

    /// True when the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text values when the column is validated or normalized.
    pub fn text_values(&self) -> Option<&[Option<String>]> {
        match &self.values {
            TextValues::RawBytes(_) => None,
            TextValues::Validated(values) | TextValues::Normalized(values) => Some(values),
        }
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        match &mut self.values {
            TextValues::RawBytes(values) => retain_by_mask(values, keep),
            TextValues::Validated(values) | TextValues::Normalized(values) => {
                retain_by_mask(values, keep)
            }
        }
    }
}

/// String pass-through columns, decoded by the loader rather than the repairer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelColumn {
    /// `marketplace`
    Marketplace,
    /// `review_id`
    ReviewId,
    /// `product_id`
    ProductId,
    /// `product_category`
    ProductCategory,
}

impl LabelColumn {
    /// Every label column, in output order.
    pub const ALL: [LabelColumn; 4] = [
        LabelColumn::Marketplace,
        LabelColumn::ReviewId,
        LabelColumn::ProductId,
        LabelColumn::ProductCategory,
    ];

    /// Column name in the dataset.
    pub fn name(self) -> &'static str {
        match self {
            LabelColumn::Marketplace => MARKETPLACE,
            LabelColumn::ReviewId => REVIEW_ID,
            LabelColumn::ProductId => PRODUCT_ID,
            LabelColumn::ProductCategory => PRODUCT_CATEGORY,
        }
    }
}

/// A label value whose bytes were not valid UTF-8.
///
/// Its cell stays null until the text repairer resolves it under the run's
/// invalid-text policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndecodedValue {
    /// Row of the value within its batch.
    pub row: usize,
    /// Column the value belongs to.
    pub column: LabelColumn,
    /// Bytes as stored.
    pub bytes: RawText,
}

/// Calendar date of a review with its derived year and month.
///
/// Only constructible from a date, so `(year, month)` always equals
/// `decompose(date)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReviewDate {
    date: NaiveDate,
    year: i32,
    month: u32,
}

impl ReviewDate {
    /// Wrap `date` and derive its year and month.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month(),
        }
    }

    /// Calendar date.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1-12.
    pub fn month(&self) -> u32 {
        self.month
    }
}

/// Columns shared by every batch stage, one entry per row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReviewColumns {
    /// Two-letter marketplace code.
    pub marketplace: Vec<Option<String>>,
    /// Review identifier.
    pub review_id: Vec<Option<ReviewId>>,
    /// Product identifier.
    pub product_id: Vec<Option<String>>,
    /// Product category label.
    pub product_category: Vec<Option<String>>,
    /// Star rating, expected in 1-5.
    pub star_rating: Vec<Option<i64>>,
    /// Helpful votes received.
    pub helpful_votes: Vec<Option<i64>>,
    /// Total votes received.
    pub total_votes: Vec<Option<i64>>,
    /// Vine program review.
    pub vine: Vec<Option<bool>>,
    /// Verified purchase.
    pub verified_purchase: Vec<Option<bool>>,
    /// Text columns (headline, body, ...) in their current state.
    pub text: Vec<TextColumn>,
    /// Label values still waiting for the text repairer.
    pub undecoded: Vec<UndecodedValue>,
}

impl ReviewColumns {
    /// Empty columns sized for `rows` rows of nulls, with the given text columns.
    pub fn with_nulls(rows: usize, text: Vec<TextColumn>) -> Self {
        Self {
            marketplace: vec![None; rows],
            review_id: vec![None; rows],
            product_id: vec![None; rows],
            product_category: vec![None; rows],
            star_rating: vec![None; rows],
            helpful_votes: vec![None; rows],
            total_votes: vec![None; rows],
            vine: vec![None; rows],
            verified_purchase: vec![None; rows],
            text,
            undecoded: Vec::new(),
        }
    }

    /// Row count, taken from the id column.
    pub fn len(&self) -> usize {
        self.review_id.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable cells of a label column.
    pub fn label_mut(&mut self, column: LabelColumn) -> &mut Vec<Option<String>> {
        match column {
            LabelColumn::Marketplace => &mut self.marketplace,
            LabelColumn::ReviewId => &mut self.review_id,
            LabelColumn::ProductId => &mut self.product_id,
            LabelColumn::ProductCategory => &mut self.product_category,
        }
    }

    /// Look up a text column by name.
    pub fn text_column(&self, name: &str) -> Option<&TextColumn> {
        self.text.iter().find(|column| column.name == name)
    }

    /// True when every column has the same row count.
    pub fn is_rectangular(&self) -> bool {
        let rows = self.len();
        self.marketplace.len() == rows
            && self.product_id.len() == rows
            && self.product_category.len() == rows
            && self.star_rating.len() == rows
            && self.helpful_votes.len() == rows
            && self.total_votes.len() == rows
            && self.vine.len() == rows
            && self.verified_purchase.len() == rows
            && self.text.iter().all(|column| column.len() == rows)
            && self.undecoded.iter().all(|value| value.row < rows)
    }

    /// Keep row `i` iff `keep[i]`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        retain_by_mask(&mut self.marketplace, keep);
        retain_by_mask(&mut self.review_id, keep);
        retain_by_mask(&mut self.product_id, keep);
        retain_by_mask(&mut self.product_category, keep);
        retain_by_mask(&mut self.star_rating, keep);
        retain_by_mask(&mut self.helpful_votes, keep);
        retain_by_mask(&mut self.total_votes, keep);
        retain_by_mask(&mut self.vine, keep);
        retain_by_mask(&mut self.verified_purchase, keep);
        for column in &mut self.text {
            column.retain_rows(keep);
        }
        retain_undecoded(&mut self.undecoded, keep);
    }
}

/// A chunk of input rows as read by the loader.
#[derive(Clone, Debug, PartialEq)]
pub struct RawReviewBatch {
    /// Input the rows came from.
    pub source: SourceId,
    /// Integer-encoded review dates.
    pub review_date: Vec<Option<i64>>,
    /// Encoding fixed by the storage type (a native parquet DATE column);
    /// `None` means the configured encoding applies.
    pub date_encoding: Option<DateEncoding>,
    /// Remaining columns.
    pub columns: ReviewColumns,
}

impl RawReviewBatch {
    /// Row count.
    pub fn len(&self) -> usize {
        self.review_date.len()
    }

    /// True when the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.review_date.is_empty()
    }

    /// Keep row `i` iff `keep[i]`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        retain_by_mask(&mut self.review_date, keep);
        self.columns.retain_rows(keep);
    }
}

/// A chunk of rows with normalized dates.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewBatch {
    /// Input the rows came from.
    pub source: SourceId,
    /// Calendar dates with derived year/month.
    pub review_date: Vec<ReviewDate>,
    /// Remaining columns.
    pub columns: ReviewColumns,
}

impl ReviewBatch {
    /// Row count.
    pub fn len(&self) -> usize {
        self.review_date.len()
    }

    /// True when the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.review_date.is_empty()
    }

    /// Keep row `i` iff `keep[i]`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        retain_by_mask(&mut self.review_date, keep);
        self.columns.retain_rows(keep);
    }
}

/// A batch after every row-level stage, carrying its length statistic.
#[derive(Clone, Debug, PartialEq)]
pub struct CleanedBatch {
    /// Rows with normalized dates and normalized text.
    pub batch: ReviewBatch,
    /// Character count of the normalized length column per row.
    pub review_length: Vec<u64>,
}

/// A cleaned batch with outlier columns applied, ready for output.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedBatch {
    /// Rows with normalized dates and normalized text.
    pub batch: ReviewBatch,
    /// Character count of the normalized length column per row.
    pub review_length: Vec<u64>,
    /// `review_length` clamped at the length threshold.
    pub review_length_capped: Vec<f64>,
    /// Exploratory bin of `review_length_capped`.
    pub review_length_bin: Vec<u32>,
    /// `helpful_votes` clamped at the helpful-vote threshold.
    pub helpful_votes_capped: Vec<Option<f64>>,
}

impl FinishedBatch {
    /// Row count.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True when the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Keep `values[i]` iff `keep[i]`; rows past the mask are dropped.
pub(crate) fn retain_by_mask<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut idx = 0;
    values.retain(|_| {
        let kept = keep.get(idx).copied().unwrap_or(false);
        idx += 1;
        kept
    });
}

/// Drop undecoded values of removed rows and renumber the rest.
fn retain_undecoded(values: &mut Vec<UndecodedValue>, keep: &[bool]) {
    let mut new_rows = Vec::with_capacity(keep.len());
    let mut next = 0;
    for kept in keep {
        new_rows.push(next);
        if *kept {
            next += 1;
        }
    }
    values.retain_mut(|value| match keep.get(value.row) {
        Some(true) => {
            value.row = new_rows[value.row];
            true
        }
        _ => false,
    });
}
