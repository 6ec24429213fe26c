//! Outlier handling: percentile capping, the log1p view, and exploratory bins.
//!
//! Thresholds need the whole distribution, so a run first feeds an
//! [`OutlierProfile`] with every cleaned batch, freezes it into an
//! [`OutlierPlan`], and then applies the plan batch by batch.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{BinningStrategy, CleanConfig, QuantileMode};
use crate::constants::columns::{HELPFUL_VOTES, REVIEW_LENGTH};
use crate::data::{CleanedBatch, FinishedBatch};

/// Value at percentile `p` (0-100) of ascending `sorted`, interpolating
/// linearly between the two closest ranks. `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Clamp `values` at `threshold`; values at or below it are returned unchanged.
pub fn cap_values(values: &[f64], threshold: f64) -> Vec<f64> {
    values.iter().map(|value| value.min(threshold)).collect()
}

/// `ln(1 + x)` for each value, leaving the input untouched.
pub fn log1p_view(values: &[f64]) -> Vec<f64> {
    values.iter().map(|value| value.ln_1p()).collect()
}

/// `ln(1 + x)` view of a nullable count column such as `helpful_votes`.
///
/// Negative counts have no log view and map to `None`.
pub fn log1p_counts(values: &[Option<i64>]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|value| {
            value
                .filter(|count| *count >= 0)
                .map(|count| (count as f64).ln_1p())
        })
        .collect()
}

/// Ascending bin boundaries; bin `i` covers `[edges[i], edges[i + 1])`, with the
/// last bin closed on both ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Boundaries in ascending order.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins (zero when built from no values).
    pub fn bin_count(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Bin index for `value`; values outside the range land in the first or last bin.
    pub fn assign(&self, value: f64) -> u32 {
        if self.edges.len() < 2 {
            return 0;
        }
        let inner = &self.edges[1..self.edges.len() - 1];
        inner.partition_point(|edge| *edge <= value) as u32
    }

    /// `(lower, upper)` bounds of bin `bin`.
    pub fn bounds(&self, bin: usize) -> Option<(f64, f64)> {
        Some((*self.edges.get(bin)?, *self.edges.get(bin + 1)?))
    }
}

/// Partition ascending `sorted` into at most `count` bins.
///
/// Equal-frequency edges sit at evenly spaced percentiles; repeated edges from
/// skewed data collapse, so fewer bins may come back.
pub fn bin_edges(sorted: &[f64], count: usize, strategy: BinningStrategy) -> BinEdges {
    let (Some(min), Some(max)) = (sorted.first().copied(), sorted.last().copied()) else {
        return BinEdges::default();
    };
    let count = count.max(1);
    if min == max {
        return BinEdges {
            edges: vec![min, max],
        };
    }

    let mut edges: Vec<f64> = match strategy {
        BinningStrategy::EqualWidth => {
            let width = (max - min) / count as f64;
            (0..=count)
                .map(|idx| {
                    if idx == count {
                        max
                    } else {
                        min + width * idx as f64
                    }
                })
                .collect()
        }
        BinningStrategy::EqualFrequency => (0..=count)
            .filter_map(|idx| percentile(sorted, 100.0 * idx as f64 / count as f64))
            .collect(),
    };
    edges.dedup();
    BinEdges { edges }
}

/// Accumulator feeding a percentile estimate across chunks.
#[derive(Clone, Debug)]
pub enum QuantileSketch {
    /// Every observed value.
    Exact { values: Vec<f64> },
    /// Uniform reservoir sample of the observed values.
    Reservoir {
        capacity: usize,
        seen: u64,
        sample: Vec<f64>,
        rng: StdRng,
    },
}

impl QuantileSketch {
    /// Empty sketch for `mode`.
    pub fn new(mode: QuantileMode) -> Self {
        match mode {
            QuantileMode::Exact => Self::Exact { values: Vec::new() },
            QuantileMode::Reservoir { capacity, seed } => Self::Reservoir {
                capacity,
                seen: 0,
                sample: Vec::with_capacity(capacity.min(1 << 16)),
                rng: StdRng::seed_from_u64(seed),
            },
        }
    }

    /// Record one observation.
    pub fn push(&mut self, value: f64) {
        match self {
            Self::Exact { values } => values.push(value),
            Self::Reservoir {
                capacity,
                seen,
                sample,
                rng,
            } => {
                *seen += 1;
                if sample.len() < *capacity {
                    sample.push(value);
                } else {
                    let slot = rng.random_range(0..*seen);
                    if let Ok(slot) = usize::try_from(slot)
                        && slot < *capacity
                    {
                        sample[slot] = value;
                    }
                }
            }
        }
    }

    /// Number of observations recorded.
    pub fn observed(&self) -> u64 {
        match self {
            Self::Exact { values } => values.len() as u64,
            Self::Reservoir { seen, .. } => *seen,
        }
    }

    /// Retained values in ascending order.
    pub fn into_sorted(self) -> Vec<f64> {
        let mut values = match self {
            Self::Exact { values } => values,
            Self::Reservoir { sample, .. } => sample,
        };
        values.sort_by(f64::total_cmp);
        values
    }
}

/// Threshold chosen for one capped column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapCutoff {
    /// Column the threshold applies to.
    pub column: String,
    /// Percentile the threshold was taken at.
    pub percentile: f64,
    /// Threshold value; `None` when no values were observed.
    pub threshold: Option<f64>,
    /// How the percentile was estimated.
    pub method: QuantileMode,
    /// Values observed while estimating.
    pub observed: u64,
}

impl CapCutoff {
    fn from_sorted(column: &str, sorted: &[f64], config: &CleanConfig, observed: u64) -> Self {
        Self {
            column: column.to_string(),
            percentile: config.cap_percentile,
            threshold: percentile(sorted, config.cap_percentile),
            method: config.quantile_mode,
            observed,
        }
    }

    /// Clamp `value` at the threshold, if any.
    pub fn cap(&self, value: f64) -> f64 {
        match self.threshold {
            Some(threshold) => value.min(threshold),
            None => value,
        }
    }
}

/// First-pass accumulator over cleaned batches.
#[derive(Clone, Debug)]
pub struct OutlierProfile {
    length: QuantileSketch,
    helpful_votes: QuantileSketch,
}

impl OutlierProfile {
    /// Empty profile using the configured quantile mode.
    pub fn new(config: &CleanConfig) -> Self {
        Self {
            length: QuantileSketch::new(config.quantile_mode),
            helpful_votes: QuantileSketch::new(config.quantile_mode),
        }
    }

    /// Feed the length and helpful-vote columns of a cleaned batch.
    pub fn observe(&mut self, cleaned: &CleanedBatch) {
        for length in &cleaned.review_length {
            self.length.push(*length as f64);
        }
        for votes in cleaned.batch.columns.helpful_votes.iter().flatten() {
            self.helpful_votes.push(*votes as f64);
        }
    }

    /// Freeze thresholds and length bins.
    ///
    /// Bins are laid out over the capped lengths so the extreme tail does not
    /// stretch equal-width bins.
    pub fn finish(self, config: &CleanConfig) -> OutlierPlan {
        let length_observed = self.length.observed();
        let lengths = self.length.into_sorted();
        let length = CapCutoff::from_sorted(REVIEW_LENGTH, &lengths, config, length_observed);
        let capped_lengths: Vec<f64> = lengths.iter().map(|value| length.cap(*value)).collect();
        let length_bins = bin_edges(&capped_lengths, config.bin_count, config.binning);

        let votes_observed = self.helpful_votes.observed();
        let votes = self.helpful_votes.into_sorted();
        let helpful_votes = CapCutoff::from_sorted(HELPFUL_VOTES, &votes, config, votes_observed);

        OutlierPlan {
            length,
            helpful_votes,
            length_bins,
            binning: config.binning,
        }
    }
}

/// Frozen thresholds and bins applied to every cleaned batch.
#[derive(Clone, Debug, PartialEq)]
pub struct OutlierPlan {
    /// Cap on `review_length`.
    pub length: CapCutoff,
    /// Cap on `helpful_votes`.
    pub helpful_votes: CapCutoff,
    /// Bins over the capped length.
    pub length_bins: BinEdges,
    /// Strategy the bins were built with.
    pub binning: BinningStrategy,
}

impl OutlierPlan {
    /// Add capped and binned columns to `cleaned`, folding the result into `summary`.
    pub fn apply(&self, cleaned: CleanedBatch, summary: &mut OutlierSummary) -> FinishedBatch {
        let lengths: Vec<f64> = cleaned.review_length.iter().map(|v| *v as f64).collect();
        let review_length_capped = match self.length.threshold {
            Some(threshold) => cap_values(&lengths, threshold),
            None => lengths.clone(),
        };
        summary.length_values_capped += lengths
            .iter()
            .zip(&review_length_capped)
            .filter(|(raw, capped)| raw != capped)
            .count() as u64;

        let review_length_bin: Vec<u32> = review_length_capped
            .iter()
            .map(|value| self.length_bins.assign(*value))
            .collect();

        let helpful_votes = &cleaned.batch.columns.helpful_votes;
        let helpful_votes_capped: Vec<Option<f64>> = helpful_votes
            .iter()
            .map(|votes| votes.map(|count| self.helpful_votes.cap(count as f64)))
            .collect();
        summary.helpful_votes_values_capped += helpful_votes
            .iter()
            .zip(&helpful_votes_capped)
            .filter(|(raw, capped)| match (raw, capped) {
                (Some(raw), Some(capped)) => (*raw as f64) != *capped,
                _ => false,
            })
            .count() as u64;

        let log_votes = log1p_counts(helpful_votes);
        for (row, bin) in review_length_bin.iter().enumerate() {
            summary.record(*bin, helpful_votes[row], log_votes[row]);
        }

        FinishedBatch {
            batch: cleaned.batch,
            review_length: cleaned.review_length,
            review_length_capped,
            review_length_bin,
            helpful_votes_capped,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct BinAccumulator {
    rows: u64,
    voted_rows: u64,
    helpful_votes_sum: f64,
    log1p_sum: f64,
}

/// Second-pass accumulator: capped-value counts and per-bin aggregates.
#[derive(Clone, Debug, Default)]
pub struct OutlierSummary {
    /// Lengths altered by capping.
    pub length_values_capped: u64,
    /// Helpful-vote counts altered by capping.
    pub helpful_votes_values_capped: u64,
    bins: Vec<BinAccumulator>,
}

impl OutlierSummary {
    fn record(&mut self, bin: u32, helpful_votes: Option<i64>, log_votes: Option<f64>) {
        let bin = bin as usize;
        if self.bins.len() <= bin {
            self.bins.resize(bin + 1, BinAccumulator::default());
        }
        let entry = &mut self.bins[bin];
        entry.rows += 1;
        if let (Some(votes), Some(log_votes)) = (helpful_votes, log_votes) {
            entry.voted_rows += 1;
            entry.helpful_votes_sum += votes as f64;
            entry.log1p_sum += log_votes;
        }
    }

    /// Per-bin aggregates for every bin in `plan`.
    pub fn bin_summaries(&self, plan: &OutlierPlan) -> Vec<BinSummary> {
        (0..plan.length_bins.bin_count())
            .filter_map(|bin| {
                let (lower, upper) = plan.length_bins.bounds(bin)?;
                let entry = self.bins.get(bin).cloned().unwrap_or_default();
                let mean = |sum: f64| (entry.voted_rows > 0).then(|| sum / entry.voted_rows as f64);
                Some(BinSummary {
                    bin: bin as u32,
                    lower,
                    upper,
                    rows: entry.rows,
                    mean_helpful_votes: mean(entry.helpful_votes_sum),
                    mean_log1p_helpful_votes: mean(entry.log1p_sum),
                })
            })
            .collect()
    }
}

/// Exploratory aggregate of helpful votes within one length bin.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BinSummary {
    /// Bin index.
    pub bin: u32,
    /// Lower bound of the capped length.
    pub lower: f64,
    /// Upper bound of the capped length.
    pub upper: f64,
    /// Rows in the bin.
    pub rows: u64,
    /// Mean helpful votes over rows with a vote count.
    pub mean_helpful_votes: Option<f64>,
    /// Mean `ln(1 + helpful_votes)` over rows with a vote count.
    pub mean_log1p_helpful_votes: Option<f64>,
}
