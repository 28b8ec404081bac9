//! The aggregation barrier between enrichment and recalibration.
//!
//! Partition workers push enriched records into a bounded channel. A single
//! collector task drains it into a [`ModelAccumulator`]; the channel closing
//! (every sender dropped) is the closure signal. The accumulator can only be
//! turned into a [`ClosedAggregate`] by [`ModelAccumulator::close`], which
//! checks that it saw exactly as many records as the main branch holds, and
//! only a `ClosedAggregate` can be fitted. A partial model therefore cannot
//! be built, let alone published.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::header::Header;
use crate::core::model::RecalibrationModel;
use crate::pipeline::broadcast::BroadcastSlot;
use crate::pipeline::error::{PipelineError, PolicyError};
use crate::pipeline::policy::ModelFittingPolicy;
use crate::pipeline::stages::EnrichedRecord;

/// Enriched records gathered so far. Not usable for fitting until closed.
#[derive(Debug, Default)]
pub struct ModelAccumulator {
    observations: Vec<EnrichedRecord>,
}

impl ModelAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, enriched: EnrichedRecord) {
        self.observations.push(enriched);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Seal the accumulator once every input has been accounted for
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::IncompleteAggregation` if the number of
    /// observed records differs from `expected`.
    pub fn close(self, expected: u64) -> Result<ClosedAggregate, PipelineError> {
        let observed = self.observations.len() as u64;
        if observed != expected {
            return Err(PipelineError::IncompleteAggregation { expected, observed });
        }
        Ok(ClosedAggregate {
            observations: self.observations,
        })
    }
}

/// The complete enrichment output of a run
#[derive(Debug)]
pub struct ClosedAggregate {
    observations: Vec<EnrichedRecord>,
}

impl ClosedAggregate {
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Drain `rx` into an accumulator until every sender is gone
pub fn spawn_collector(mut rx: mpsc::Receiver<EnrichedRecord>) -> JoinHandle<ModelAccumulator> {
    tokio::spawn(async move {
        let mut accumulator = ModelAccumulator::new();
        while let Some(enriched) = rx.recv().await {
            accumulator.observe(enriched);
        }
        debug!(observed = accumulator.len(), "Enrichment channel closed");
        accumulator
    })
}

/// Fits the run's single model from a closed aggregate
#[derive(Clone)]
pub struct ModelEstimator {
    policy: Arc<dyn ModelFittingPolicy>,
    header: Arc<BroadcastSlot<Header>>,
}

impl ModelEstimator {
    #[must_use]
    pub fn new(policy: Arc<dyn ModelFittingPolicy>, header: Arc<BroadcastSlot<Header>>) -> Self {
        Self { policy, header }
    }

    /// Fit the model. Observations are sorted into canonical record order
    /// first, so the result does not depend on partitioning or arrival order.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InsufficientData` for an empty aggregate or when
    /// the policy reports insufficient data, `PipelineError::ModelFitting` for
    /// other policy failures.
    pub fn estimate(&self, aggregate: ClosedAggregate) -> Result<RecalibrationModel, PipelineError> {
        if aggregate.is_empty() {
            return Err(PipelineError::InsufficientData(
                "no records reached the model estimator".to_string(),
            ));
        }

        let header = self.header.get()?;
        let mut observations = aggregate.observations;
        observations.sort_by_cached_key(|e| e.record.sort_key(&header));

        self.policy
            .fit(&header, &observations)
            .map_err(|e| match e {
                PolicyError::InsufficientData(reason) => PipelineError::InsufficientData(reason),
                other => PipelineError::ModelFitting(other),
            })
    }

    /// Fit the model and publish it into `slot`
    ///
    /// # Errors
    ///
    /// See [`ModelEstimator::estimate`]; also returns
    /// `PipelineError::AlreadyPublished` if the slot already holds a model.
    pub fn estimate_and_publish(
        &self,
        aggregate: ClosedAggregate,
        slot: &BroadcastSlot<RecalibrationModel>,
    ) -> Result<Arc<RecalibrationModel>, PipelineError> {
        let records = aggregate.len();
        let model = self.estimate(aggregate)?;
        let model = slot.publish(model)?;
        info!(
            records,
            bases = model.bases_observed(),
            digest = %model.digest(),
            "Published recalibration model"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Context;
    use crate::core::contig::Contig;
    use crate::core::record::Record;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Records the names it was fitted on, in the order received
    #[derive(Default)]
    struct RecordingFitter {
        seen: Mutex<Vec<String>>,
    }

    impl ModelFittingPolicy for RecordingFitter {
        fn fit(
            &self,
            _header: &Header,
            observations: &[EnrichedRecord],
        ) -> Result<RecalibrationModel, PolicyError> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(observations.iter().map(|e| e.record.name.clone()));
            Ok(RecalibrationModel::new(observations.len() as u64, BTreeMap::new()))
        }
    }

    fn header_slot() -> Arc<BroadcastSlot<Header>> {
        Arc::new(BroadcastSlot::ready(
            "header",
            Header::new(vec![Contig::new("chr1", 1000), Contig::new("chr2", 1000)]),
        ))
    }

    fn enriched(name: &str, contig: &str, start: u64) -> EnrichedRecord {
        EnrichedRecord {
            record: Record::aligned(name, contig, start, b"A", &[30]),
            context: Context::empty(),
        }
    }

    #[test]
    fn test_close_checks_completeness() {
        let mut accumulator = ModelAccumulator::new();
        accumulator.observe(enriched("a", "chr1", 1));
        accumulator.observe(enriched("b", "chr1", 2));

        assert!(matches!(
            accumulator.close(3),
            Err(PipelineError::IncompleteAggregation {
                expected: 3,
                observed: 2
            })
        ));
    }

    #[test]
    fn test_estimate_empty_is_insufficient() {
        let estimator = ModelEstimator::new(Arc::new(RecordingFitter::default()), header_slot());
        let aggregate = ModelAccumulator::new().close(0).unwrap();

        assert!(matches!(
            estimator.estimate(aggregate),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_estimate_sorts_canonically() {
        let fitter = Arc::new(RecordingFitter::default());
        let estimator = ModelEstimator::new(fitter.clone(), header_slot());

        let mut accumulator = ModelAccumulator::new();
        accumulator.observe(enriched("c", "chr2", 5));
        accumulator.observe(enriched("b", "chr1", 50));
        accumulator.observe(enriched("a", "chr1", 10));
        estimator.estimate(accumulator.close(3).unwrap()).unwrap();

        assert_eq!(*fitter.seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_policy_insufficient_data_is_mapped() {
        struct Refusing;
        impl ModelFittingPolicy for Refusing {
            fn fit(&self, _: &Header, _: &[EnrichedRecord]) -> Result<RecalibrationModel, PolicyError> {
                Err(PolicyError::InsufficientData("degenerate".to_string()))
            }
        }

        let estimator = ModelEstimator::new(Arc::new(Refusing), header_slot());
        let mut accumulator = ModelAccumulator::new();
        accumulator.observe(enriched("a", "chr1", 1));
        let slot = BroadcastSlot::pending("model");

        let result = estimator.estimate_and_publish(accumulator.close(1).unwrap(), &slot);
        assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_estimate_and_publish() {
        let estimator = ModelEstimator::new(Arc::new(RecordingFitter::default()), header_slot());
        let mut accumulator = ModelAccumulator::new();
        accumulator.observe(enriched("a", "chr1", 1));
        let slot = BroadcastSlot::pending("model");

        let model = estimator
            .estimate_and_publish(accumulator.close(1).unwrap(), &slot)
            .unwrap();
        assert_eq!(model.records_observed, 1);
        assert!(Arc::ptr_eq(&model, &slot.get().unwrap()));
    }

    #[tokio::test]
    async fn test_collector_drains_until_closed() {
        let (tx, rx) = mpsc::channel(2);
        let collector = spawn_collector(rx);

        let producers: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    for j in 0..10 {
                        tx.send(enriched(&format!("r{i}-{j}"), "chr1", j)).await.unwrap();
                    }
                })
            })
            .collect();
        drop(tx);
        for producer in producers {
            producer.await.unwrap();
        }

        let accumulator = collector.await.unwrap();
        assert_eq!(accumulator.len(), 40);
        assert!(accumulator.close(40).is_ok());
    }
}
