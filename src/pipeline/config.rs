//! Run inputs and tuning knobs.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Serialize;

use crate::pipeline::error::PipelineError;

/// Default capacity of the enrichment to estimator channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The inputs a run requires. These are the only settings that change what
/// the pipeline computes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineInputs {
    /// Record source (SAM/BAM path)
    pub input: Option<PathBuf>,
    /// Reference FASTA
    pub reference: Option<PathBuf>,
    /// Known-variant VCFs
    pub known_sites: Vec<PathBuf>,
    /// Explicit interval specifications; whole reference when `None`
    pub intervals: Option<Vec<String>>,
}

impl PipelineInputs {
    /// Check that every required input is present
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` for a missing input or
    /// reference, or an explicit but empty interval list.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input.is_none() {
            return Err(PipelineError::Configuration(
                "no record source supplied".to_string(),
            ));
        }
        if self.reference.is_none() {
            return Err(PipelineError::Configuration(
                "no reference supplied".to_string(),
            ));
        }
        if matches!(&self.intervals, Some(specs) if specs.is_empty()) {
            return Err(PipelineError::Configuration(
                "explicit interval list is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Execution tuning. Does not affect results.
///
/// Both knobs are at least 1; the builders floor zero to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    concurrency: usize,
    channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Maximum number of partitions processed at once
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Bound on enriched records in flight to the model estimator
    #[must_use]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
