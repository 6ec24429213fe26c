use std::fmt;

use serde::Serialize;

use crate::config::{BinningStrategy, DateEncoding, InvalidTextPolicy};
use crate::outliers::{BinSummary, CapCutoff};

/// Running counters for one cleaning run.
///
/// Stages take `&mut RunTally` instead of touching shared state, so a stage can
/// be run alone and its counts inspected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    /// Rows read from inputs.
    pub records_seen: u64,
    /// Rows written to the cleaned output.
    pub records_kept: u64,
    /// Rows excluded for a null or undecodable `review_date`.
    pub excluded_invalid_date: u64,
    /// Rows dropped for invalid text under the drop policy.
    pub excluded_invalid_text: u64,
    /// Rows excluded because `helpful_votes > total_votes`.
    pub excluded_vote_mismatch: u64,
    /// Rows excluded because `star_rating` is outside 1-5.
    pub excluded_rating_range: u64,
    /// Rows excluded for a blank body.
    pub excluded_blank_body: u64,
    /// Rows excluded for a blank product category.
    pub excluded_blank_category: u64,
    /// Rows with at least one substituted text value.
    pub records_repaired: u64,
    /// Text values with at least one substitution.
    pub values_repaired: u64,
    /// Invalid byte sequences replaced by the marker.
    pub invalid_sequences_replaced: u64,
}

impl RunTally {
    /// Rows excluded for any reason.
    pub fn excluded_total(&self) -> u64 {
        self.excluded_invalid_date
            + self.excluded_invalid_text
            + self.excluded_vote_mismatch
            + self.excluded_rating_range
            + self.excluded_blank_body
            + self.excluded_blank_category
    }

    /// Add another tally's counts into this one.
    pub fn merge(&mut self, other: &RunTally) {
        self.records_seen += other.records_seen;
        self.records_kept += other.records_kept;
        self.excluded_invalid_date += other.excluded_invalid_date;
        self.excluded_invalid_text += other.excluded_invalid_text;
        self.excluded_vote_mismatch += other.excluded_vote_mismatch;
        self.excluded_rating_range += other.excluded_rating_range;
        self.excluded_blank_body += other.excluded_blank_body;
        self.excluded_blank_category += other.excluded_blank_category;
        self.records_repaired += other.records_repaired;
        self.values_repaired += other.values_repaired;
        self.invalid_sequences_replaced += other.invalid_sequences_replaced;
    }

    /// True when every seen row is accounted for as kept or excluded.
    pub fn is_balanced(&self) -> bool {
        self.records_seen == self.records_kept + self.excluded_total()
    }
}

/// Run metadata reported alongside the cleaned dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    /// Input files (or in-memory sources) read.
    pub sources: Vec<String>,
    /// Final counters.
    pub tally: RunTally,
    /// Date encoding in force.
    pub date_encoding: DateEncoding,
    /// Invalid-text policy in force.
    pub text_policy: InvalidTextPolicy,
    /// Threshold used for `review_length_capped`.
    pub length_cutoff: CapCutoff,
    /// Threshold used for `helpful_votes_capped`.
    pub helpful_votes_cutoff: CapCutoff,
    /// Lengths altered by capping.
    pub length_values_capped: u64,
    /// Helpful-vote counts altered by capping.
    pub helpful_votes_values_capped: u64,
    /// Strategy the length bins were built with.
    pub binning: BinningStrategy,
    /// Helpful-vote aggregates per capped-length bin.
    pub length_bins: Vec<BinSummary>,
}

impl RunReport {
    /// Pretty JSON rendering.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = &self.tally;
        writeln!(f, "=== cleaning run ===")?;
        writeln!(f, "sources read:          {}", self.sources.len())?;
        writeln!(f, "records processed:     {}", tally.records_seen)?;
        writeln!(f, "records kept:          {}", tally.records_kept)?;
        writeln!(f, "records excluded:      {}", tally.excluded_total())?;
        writeln!(f, "  invalid date:        {}", tally.excluded_invalid_date)?;
        writeln!(f, "  invalid text:        {}", tally.excluded_invalid_text)?;
        writeln!(f, "  helpful > total:     {}", tally.excluded_vote_mismatch)?;
        writeln!(f, "  rating out of range: {}", tally.excluded_rating_range)?;
        writeln!(f, "  blank body:          {}", tally.excluded_blank_body)?;
        writeln!(f, "  blank category:      {}", tally.excluded_blank_category)?;
        writeln!(
            f,
            "records repaired:      {} ({} values, {} sequences)",
            tally.records_repaired, tally.values_repaired, tally.invalid_sequences_replaced
        )?;
        writeln!(f, "date encoding:         {}", self.date_encoding)?;
        for cutoff in [&self.length_cutoff, &self.helpful_votes_cutoff] {
            match cutoff.threshold {
                Some(threshold) => writeln!(
                    f,
                    "{} cap:  p{} = {:.2} ({} observed)",
                    cutoff.column, cutoff.percentile, threshold, cutoff.observed
                )?,
                None => writeln!(f, "{} cap:  n/a (no values)", cutoff.column)?,
            }
        }
        writeln!(
            f,
            "values capped:         length={}, helpful_votes={}",
            self.length_values_capped, self.helpful_votes_values_capped
        )?;
        for bin in &self.length_bins {
            let mean = bin
                .mean_helpful_votes
                .map(|mean| format!("{mean:.3}"))
                .unwrap_or_else(|| "n/a".to_string());
            writeln!(
                f,
                "  bin {:>2} [{:>8.1}, {:>8.1}]  rows={:<8} mean_helpful={}",
                bin.bin, bin.lower, bin.upper, bin.rows, mean
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_merges_and_balances() {
        let mut total = RunTally::default();
        let chunk = RunTally {
            records_seen: 10,
            records_kept: 6,
            excluded_invalid_date: 1,
            excluded_invalid_text: 1,
            excluded_vote_mismatch: 1,
            excluded_rating_range: 1,
            records_repaired: 2,
            values_repaired: 3,
            invalid_sequences_replaced: 4,
            ..RunTally::default()
        };
        total.merge(&chunk);
        total.merge(&chunk);
        assert_eq!(total.records_seen, 20);
        assert_eq!(total.excluded_total(), 8);
        assert_eq!(total.records_repaired, 4);
        assert!(total.is_balanced());

        total.records_kept -= 1;
        assert!(!total.is_balanced());
    }
}
