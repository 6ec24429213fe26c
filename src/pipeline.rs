//! Stage ordering and the two-pass run.
//!
//! Every batch goes Loader -> Date Normalizer -> Text Repairer -> String
//! Trimmer -> Row Filters -> Outlier Handler. The first pass only feeds the
//! quantile sketches; the second applies the frozen plan and writes.

use tracing::{debug, info};

use crate::config::CleanConfig;
use crate::data::{CleanedBatch, FinishedBatch, RawReviewBatch};
use crate::dates::normalize_dates;
use crate::errors::CleanError;
use crate::filters::apply_row_filters;
use crate::metrics::{RunReport, RunTally};
use crate::outliers::{OutlierPlan, OutlierProfile, OutlierSummary};
use crate::repair::repair_text_columns;
use crate::sink::{MemorySink, ReviewSink};
use crate::source::{InMemorySource, ReviewSource};
use crate::trim::{normalize_text_columns, text_lengths};

/// Runs the cleaning stages with one validated configuration.
#[derive(Clone, Debug)]
pub struct ReviewCleaner {
    config: CleanConfig,
}

impl ReviewCleaner {
    /// Validate `config` and build a cleaner.
    pub fn new(config: CleanConfig) -> Result<Self, CleanError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in force.
    pub fn config(&self) -> &CleanConfig {
        &self.config
    }

    /// Run the row-level stages on one loader batch.
    pub fn clean_batch(
        &self,
        raw: RawReviewBatch,
        tally: &mut RunTally,
    ) -> Result<CleanedBatch, CleanError> {
        tally.records_seen += raw.len() as u64;

        let mut batch = normalize_dates(raw, self.config.date_encoding, tally);
        let keep = repair_text_columns(&mut batch.columns, &self.config.text_policy, tally);
        batch.retain_rows(&keep);
        normalize_text_columns(&mut batch.columns)?;
        apply_row_filters(&mut batch, &self.config.filters, tally);
        let review_length = text_lengths(&batch.columns, &self.config.length_column)?;

        tally.records_kept += batch.len() as u64;
        debug!(source = %batch.source, kept = batch.len(), "cleaned batch");
        Ok(CleanedBatch {
            batch,
            review_length,
        })
    }

    /// First pass: clean every batch and freeze the outlier plan.
    pub fn profile<S>(&self, source: &S) -> Result<OutlierPlan, CleanError>
    where
        S: ReviewSource + ?Sized,
    {
        let mut profile = OutlierProfile::new(&self.config);
        let mut scratch = RunTally::default();
        for raw in source.batches()? {
            let cleaned = self.clean_batch(raw?, &mut scratch)?;
            profile.observe(&cleaned);
        }
        let plan = profile.finish(&self.config);
        info!(
            source = source.id(),
            records = scratch.records_kept,
            length_cap = ?plan.length.threshold,
            helpful_votes_cap = ?plan.helpful_votes.threshold,
            "profiled outlier thresholds"
        );
        Ok(plan)
    }

    /// Full run: profile, then clean again, apply the plan and write to `sink`.
    pub fn run<S, K>(&self, source: &S, sink: &mut K) -> Result<RunReport, CleanError>
    where
        S: ReviewSource + ?Sized,
        K: ReviewSink + ?Sized,
    {
        info!(source = source.id(), "starting cleaning run");
        let plan = self.profile(source)?;

        let mut tally = RunTally::default();
        let mut summary = OutlierSummary::default();
        for raw in source.batches()? {
            let mut batch_tally = RunTally::default();
            let cleaned = self.clean_batch(raw?, &mut batch_tally)?;
            let finished = plan.apply(cleaned, &mut summary);
            sink.write_batch(&finished)?;
            debug!(
                source = %finished.batch.source,
                seen = batch_tally.records_seen,
                excluded = batch_tally.excluded_total(),
                repaired = batch_tally.records_repaired,
                "wrote batch"
            );
            tally.merge(&batch_tally);
        }
        sink.finish()?;

        let report = RunReport {
            sources: source.inputs(),
            date_encoding: self.config.date_encoding,
            text_policy: self.config.text_policy.clone(),
            length_bins: summary.bin_summaries(&plan),
            length_values_capped: summary.length_values_capped,
            helpful_votes_values_capped: summary.helpful_votes_values_capped,
            length_cutoff: plan.length,
            helpful_votes_cutoff: plan.helpful_votes,
            binning: plan.binning,
            tally,
        };
        info!(
            records_seen = report.tally.records_seen,
            records_kept = report.tally.records_kept,
            excluded = report.tally.excluded_total(),
            repaired = report.tally.records_repaired,
            "cleaning run finished"
        );
        Ok(report)
    }

    /// Run over in-memory batches, returning the finished batches.
    pub fn run_in_memory(
        &self,
        batches: Vec<RawReviewBatch>,
    ) -> Result<(Vec<FinishedBatch>, RunReport), CleanError> {
        let source = InMemorySource::new("memory", batches);
        let mut sink = MemorySink::default();
        let report = self.run(&source, &mut sink)?;
        Ok((sink.into_batches(), report))
    }
}
