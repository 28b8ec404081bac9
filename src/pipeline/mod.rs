//! The orchestration core: stage graph, broadcasts, and the aggregation barrier.
//!
//! ```text
//! RecordSource ─► RecordAdapter ─► DuplicateMarker ─┬─► ContextEnricher ─► ModelEstimator
//!                                                   │                          │ (barrier)
//!                                                   │                    ModelBroadcast
//!                                                   │                          ▼
//!                                                   └──────────────► RecalibrationApplier
//! ```
//!
//! The enrichment branch only feeds the model. The records that reach
//! [`RecalibrationApplier`](stages::RecalibrationApplier) are the
//! duplicate-marked ones, without their context.

pub mod broadcast;
pub mod config;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod policy;
pub mod stages;

pub use broadcast::BroadcastSlot;
pub use config::{PipelineConfig, PipelineInputs};
pub use driver::{PipelineDriver, PipelineOutput, RunSummary};
pub use error::{BroadcastError, PipelineError, PolicyError, Stage};
pub use estimator::{ModelAccumulator, ModelEstimator};
pub use policy::{
    DuplicatePolicy, EmpiricalQualityFitter, EmpiricalQualityRecalibrator, ModelFittingPolicy,
    RecalibrationPolicy, SourceFlagDuplicates,
};
pub use stages::EnrichedRecord;
