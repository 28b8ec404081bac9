//! Per-record stages.
//!
//! Each stage maps exactly one input record to exactly one output; none of
//! them drops, duplicates, or holds on to records. Stages are cheap to clone
//! and are shared by all partition workers.

use std::sync::Arc;

use tracing::warn;

use crate::core::context::Context;
use crate::core::header::Header;
use crate::core::model::RecalibrationModel;
use crate::core::record::Record;
use crate::lookup::ContextLookup;
use crate::pipeline::broadcast::BroadcastSlot;
use crate::pipeline::error::{PipelineError, PolicyError, Stage};
use crate::pipeline::policy::{DuplicatePolicy, RecalibrationPolicy};
use crate::source::{NativeRecord, SourceError};
use crate::utils::validation::check_record_shape;

/// A record joined with its context, as consumed by the model estimator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub record: Record,
    pub context: Context,
}

/// Converts source-native records into pipeline records
#[derive(Debug, Clone)]
pub struct RecordAdapter {
    header: Arc<BroadcastSlot<Header>>,
}

impl RecordAdapter {
    #[must_use]
    pub fn new(header: Arc<BroadcastSlot<Header>>) -> Self {
        Self { header }
    }

    /// # Errors
    ///
    /// Returns `PipelineError::SourceRead` for records that cannot be
    /// converted or are malformed.
    pub fn adapt<N: NativeRecord>(&self, native: N) -> Result<Record, PipelineError> {
        let header = self.header.get()?;
        let record = native.into_record(&header)?;
        if let Some(problem) = check_record_shape(&record) {
            return Err(SourceError::InvalidRecord(problem).into());
        }
        Ok(record)
    }
}

/// Flags duplicates using the duplicate policy and the broadcast header
#[derive(Clone)]
pub struct DuplicateMarker {
    policy: Arc<dyn DuplicatePolicy>,
    header: Arc<BroadcastSlot<Header>>,
}

impl DuplicateMarker {
    #[must_use]
    pub fn new(policy: Arc<dyn DuplicatePolicy>, header: Arc<BroadcastSlot<Header>>) -> Self {
        Self { policy, header }
    }

    /// # Errors
    ///
    /// Returns `PipelineError::PerRecordPolicy` if the policy fails.
    pub fn mark(&self, mut record: Record) -> Result<Record, PipelineError> {
        let header = self.header.get()?;
        record.duplicate = self
            .policy
            .is_duplicate(&record, &header)
            .map_err(|e| PipelineError::policy(Stage::MarkDuplicates, &record.name, e))?;
        Ok(record)
    }
}

/// Joins each record with the context overlapping its span
#[derive(Clone)]
pub struct ContextEnricher {
    lookup: Arc<dyn ContextLookup>,
}

impl ContextEnricher {
    #[must_use]
    pub fn new(lookup: Arc<dyn ContextLookup>) -> Self {
        Self { lookup }
    }

    /// Records without a span get an empty context; they are never dropped.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::PerRecordPolicy` if the lookup fails.
    pub fn enrich(&self, record: Record) -> Result<EnrichedRecord, PipelineError> {
        let context = match record.span() {
            Some(span) => self.lookup.lookup(&span).map_err(|e| {
                if let PolicyError::Transient(reason) = &e {
                    warn!(record = %record.name, %reason, "Transient context lookup failure");
                }
                PipelineError::policy(Stage::AddContextData, &record.name, e)
            })?,
            None => Context::empty(),
        };
        Ok(EnrichedRecord { record, context })
    }
}

/// Rewrites records with the broadcast header and model.
///
/// Reads the model on every call, so it fails with `NotReady` if invoked
/// before the model has been published.
#[derive(Clone)]
pub struct RecalibrationApplier {
    policy: Arc<dyn RecalibrationPolicy>,
    header: Arc<BroadcastSlot<Header>>,
    model: Arc<BroadcastSlot<RecalibrationModel>>,
}

impl RecalibrationApplier {
    #[must_use]
    pub fn new(
        policy: Arc<dyn RecalibrationPolicy>,
        header: Arc<BroadcastSlot<Header>>,
        model: Arc<BroadcastSlot<RecalibrationModel>>,
    ) -> Self {
        Self {
            policy,
            header,
            model,
        }
    }

    /// # Errors
    ///
    /// Returns `PipelineError::NotReady` if the model is not published yet,
    /// or `PipelineError::PerRecordPolicy` if the policy fails.
    pub fn apply(&self, record: Record) -> Result<Record, PipelineError> {
        let model = self.model.get()?;
        let header = self.header.get()?;
        let name = record.name.clone();
        self.policy
            .apply(record, &header, &model)
            .map_err(|e| PipelineError::policy(Stage::ApplyBqsr, &name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contig::Contig;
    use crate::core::interval::GenomicInterval;
    use crate::lookup::EmptyLookup;
    use crate::pipeline::policy::{EmpiricalQualityRecalibrator, SourceFlagDuplicates, DUPLICATE_FLAG};
    use std::collections::BTreeMap;

    fn header_slot() -> Arc<BroadcastSlot<Header>> {
        Arc::new(BroadcastSlot::ready(
            "header",
            Header::new(vec![Contig::new("chr1", 100)]),
        ))
    }

    struct FailingLookup;

    impl ContextLookup for FailingLookup {
        fn lookup(&self, _span: &GenomicInterval) -> Result<Context, PolicyError> {
            Err(PolicyError::Transient("service unavailable".to_string()))
        }
    }

    #[test]
    fn test_adapter_rejects_malformed_record() {
        let adapter = RecordAdapter::new(header_slot());
        let record = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 3]);

        assert!(matches!(
            adapter.adapt(record),
            Err(PipelineError::SourceRead(SourceError::InvalidRecord(_)))
        ));
    }

    #[test]
    fn test_marker_sets_flag() {
        let marker = DuplicateMarker::new(Arc::new(SourceFlagDuplicates), header_slot());
        let mut record = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]);
        record.flags = DUPLICATE_FLAG;

        assert!(marker.mark(record).unwrap().duplicate);
    }

    #[test]
    fn test_enricher_keeps_unmapped_record() {
        let enricher = ContextEnricher::new(Arc::new(FailingLookup));
        let record = Record::new("unmapped", b"ACGT", &[30; 4]);

        let enriched = enricher.enrich(record.clone()).unwrap();
        assert_eq!(enriched.record, record);
        assert!(enriched.context.is_empty());
    }

    #[test]
    fn test_enricher_tolerates_empty_context() {
        let enricher = ContextEnricher::new(Arc::new(EmptyLookup));
        let record = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]);

        let enriched = enricher.enrich(record.clone()).unwrap();
        assert_eq!(enriched.record, record);
        assert!(enriched.context.is_empty());
    }

    #[test]
    fn test_enricher_lookup_failure() {
        let enricher = ContextEnricher::new(Arc::new(FailingLookup));
        let record = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]);

        assert!(matches!(
            enricher.enrich(record),
            Err(PipelineError::PerRecordPolicy {
                stage: Stage::AddContextData,
                ..
            })
        ));
    }

    #[test]
    fn test_applier_not_ready_before_publish() {
        let model = Arc::new(BroadcastSlot::pending("model"));
        let applier = RecalibrationApplier::new(
            Arc::new(EmpiricalQualityRecalibrator::default()),
            header_slot(),
            Arc::clone(&model),
        );
        let record = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]);

        assert!(matches!(
            applier.apply(record.clone()),
            Err(PipelineError::NotReady("model"))
        ));

        model
            .publish(RecalibrationModel::new(1, BTreeMap::new()))
            .unwrap();
        let applied = applier.apply(record).unwrap();
        assert!(applied.recalibration.is_some());
    }
}
