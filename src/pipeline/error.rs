use std::fmt;
use thiserror::Error;

use crate::core::interval::IntervalError;
use crate::parsing::sam::ParseError;
use crate::source::SourceError;

/// Pipeline stages, named after the transforms they implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    MarkDuplicates,
    AddContextData,
    BaseRecalibrator,
    ApplyBqsr,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkDuplicates => write!(f, "MarkDuplicates"),
            Self::AddContextData => write!(f, "AddContextDataToReads"),
            Self::BaseRecalibrator => write!(f, "BaseRecalibrator"),
            Self::ApplyBqsr => write!(f, "ApplyBQSR"),
        }
    }
}

/// Failure reported by a pluggable policy or lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Not enough input to produce a meaningful result
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A failure the collaborator considers retryable
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Failed(String),
}

/// Reading a broadcast value in the wrong state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast '{0}' read before it was published")]
    NotReady(&'static str),

    #[error("broadcast '{0}' was already published")]
    AlreadyPublished(&'static str),
}

/// Every way a run can fail. All of them abort the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid input, detected before any stage runs
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read records: {0}")]
    SourceRead(#[from] SourceError),

    #[error("{stage} failed on record '{record}': {source}")]
    PerRecordPolicy {
        stage: Stage,
        record: String,
        #[source]
        source: PolicyError,
    },

    /// The fitting policy failed for a reason other than missing data
    #[error("BaseRecalibrator failed: {0}")]
    ModelFitting(#[source] PolicyError),

    /// The model estimator had nothing meaningful to fit
    #[error("insufficient data for recalibration: {0}")]
    InsufficientData(String),

    #[error("ordering violation: broadcast '{0}' read before it was published")]
    NotReady(&'static str),

    #[error("ordering violation: broadcast '{0}' published twice")]
    AlreadyPublished(&'static str),

    /// The estimator saw a different number of records than the main branch holds
    #[error("aggregation incomplete: expected {expected} records, observed {observed}")]
    IncompleteAggregation { expected: u64, observed: u64 },

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<BroadcastError> for PipelineError {
    fn from(error: BroadcastError) -> Self {
        match error {
            BroadcastError::NotReady(name) => Self::NotReady(name),
            BroadcastError::AlreadyPublished(name) => Self::AlreadyPublished(name),
        }
    }
}

impl From<IntervalError> for PipelineError {
    fn from(error: IntervalError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<ParseError> for PipelineError {
    fn from(error: ParseError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Worker(error.to_string())
    }
}

impl PipelineError {
    pub(crate) fn policy(stage: Stage, record: &str, source: PolicyError) -> Self {
        Self::PerRecordPolicy {
            stage,
            record: record.to_string(),
            source,
        }
    }
}
