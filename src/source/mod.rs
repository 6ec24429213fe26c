//! Review sources.
//!
//! A source yields `RawReviewBatch` chunks and must yield the same rows every
//! time `batches` is called, since a run reads its input twice (profile, then
//! apply).

use std::sync::Arc;

use crate::data::RawReviewBatch;
use crate::errors::CleanError;
use crate::types::SourceId;

/// Parquet directory source.
pub mod parquet_files;

pub use parquet_files::ParquetReviewSource;

/// Boxed stream of loader batches.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<RawReviewBatch, CleanError>> + 'a>;

/// Pipeline-facing input interface.
pub trait ReviewSource: Send + Sync {
    /// Stable source identifier used in logs and reports.
    fn id(&self) -> &str;

    /// Names of the inputs behind this source (files, or just the id).
    fn inputs(&self) -> Vec<SourceId> {
        vec![self.id().to_string()]
    }

    /// Start a fresh pass over every batch.
    fn batches(&self) -> Result<BatchIter<'_>, CleanError>;
}

/// In-memory source for tests and small datasets.
pub struct InMemorySource {
    id: SourceId,
    batches: Arc<Vec<RawReviewBatch>>,
}

impl InMemorySource {
    /// Create an in-memory source from prebuilt batches.
    pub fn new(id: impl Into<SourceId>, batches: Vec<RawReviewBatch>) -> Self {
        Self {
            id: id.into(),
            batches: Arc::new(batches),
        }
    }
}

impl ReviewSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn batches(&self) -> Result<BatchIter<'_>, CleanError> {
        Ok(Box::new(self.batches.iter().cloned().map(Ok)))
    }
}
