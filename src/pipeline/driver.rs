//! Wires the stage graph and runs it to completion.
//!
//! A run has two phases separated by the one aggregation barrier:
//!
//! | Phase | Per partition (blocking workers) | Afterwards |
//! |-------|----------------------------------|------------|
//! | 1 | adapt, mark duplicates, enrich; keep the marked records, send the enriched pairs to the collector | join every worker, close the accumulator, fit and publish the model |
//! | 2 | apply recalibration to the kept marked records | concatenate in partition order |
//!
//! Phase 2 workers are spawned only after the model slot reports ready, and
//! each applier call reads the slot again, so no recalibrated record can
//! exist before the model does.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::core::header::Header;
use crate::core::interval::{GenomicInterval, IntervalSet};
use crate::core::model::RecalibrationModel;
use crate::core::record::Record;
use crate::lookup::ContextLookup;
use crate::parsing::intervals::parse_interval_args;
use crate::pipeline::broadcast::BroadcastSlot;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::estimator::{spawn_collector, ClosedAggregate, ModelEstimator};
use crate::pipeline::policy::{
    DuplicatePolicy, EmpiricalQualityFitter, EmpiricalQualityRecalibrator, ModelFittingPolicy,
    RecalibrationPolicy, SourceFlagDuplicates,
};
use crate::pipeline::stages::{
    ContextEnricher, DuplicateMarker, EnrichedRecord, RecalibrationApplier, RecordAdapter,
};
use crate::source::RecordSource;

/// Counters and identity of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub partitions: usize,
    pub records_read: u64,
    pub duplicates_flagged: u64,
    pub records_with_context: u64,
    pub records_written: u64,
    pub records_observed: u64,
    pub bases_observed: u64,
    pub model_digest: String,
}

/// Everything a successful run produces
#[derive(Debug)]
pub struct PipelineOutput {
    pub header: Arc<Header>,
    pub intervals: IntervalSet,
    pub model: Arc<RecalibrationModel>,
    /// Recalibrated records, grouped by partition in interval order
    pub records: Vec<Record>,
    pub summary: RunSummary,
}

/// Duplicate-marked records of one partition, held for phase 2
#[derive(Debug)]
struct MarkedPartition {
    index: usize,
    records: Vec<Record>,
    duplicates: u64,
    with_context: u64,
}

#[derive(Clone)]
struct EnrichmentStages {
    adapter: RecordAdapter,
    marker: DuplicateMarker,
    enricher: ContextEnricher,
}

pub struct PipelineDriver<S: RecordSource> {
    source: Arc<S>,
    lookup: Arc<dyn ContextLookup>,
    duplicates: Arc<dyn DuplicatePolicy>,
    fitter: Arc<dyn ModelFittingPolicy>,
    recalibrator: Arc<dyn RecalibrationPolicy>,
    config: PipelineConfig,
}

impl<S: RecordSource> PipelineDriver<S> {
    /// A driver using the default policies
    #[must_use]
    pub fn new(source: S, lookup: Arc<dyn ContextLookup>) -> Self {
        Self {
            source: Arc::new(source),
            lookup,
            duplicates: Arc::new(SourceFlagDuplicates),
            fitter: Arc::new(EmpiricalQualityFitter::default()),
            recalibrator: Arc::new(EmpiricalQualityRecalibrator::default()),
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: Arc<dyn DuplicatePolicy>) -> Self {
        self.duplicates = policy;
        self
    }

    #[must_use]
    pub fn with_fitting_policy(mut self, policy: Arc<dyn ModelFittingPolicy>) -> Self {
        self.fitter = policy;
        self
    }

    #[must_use]
    pub fn with_recalibration_policy(mut self, policy: Arc<dyn RecalibrationPolicy>) -> Self {
        self.recalibrator = policy;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read the header from the source
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SourceRead` if the header cannot be read.
    pub async fn read_header(&self) -> Result<Header, PipelineError> {
        let source = Arc::clone(&self.source);
        let header = tokio::task::spawn_blocking(move || source.header()).await??;
        Ok(header)
    }

    /// Resolve interval specifications (or the whole reference) against the source header
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SourceRead` if the header cannot be read, or
    /// `PipelineError::Configuration` for invalid interval specifications.
    pub async fn resolve_intervals(
        &self,
        specs: Option<&[String]>,
    ) -> Result<(Header, IntervalSet), PipelineError> {
        let header = self.read_header().await?;
        let explicit = specs
            .map(|specs| parse_interval_args(specs, &header))
            .transpose()?;
        let intervals = IntervalSet::resolve(explicit, &header)?;
        Ok((header, intervals))
    }

    /// Run the pipeline over `specs` (interval strings or files), or the
    /// whole reference when `None`.
    ///
    /// # Errors
    ///
    /// Any `PipelineError`; a failed run produces no records.
    pub async fn run(&self, specs: Option<&[String]>) -> Result<PipelineOutput, PipelineError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let (header, intervals) = self.resolve_intervals(specs).await?;
        self.execute(header, intervals, started_at, clock).await
    }

    /// Run the pipeline over already parsed intervals, or the whole reference when `None`
    ///
    /// # Errors
    ///
    /// Any `PipelineError`; a failed run produces no records.
    pub async fn run_with_intervals(
        &self,
        explicit: Option<Vec<GenomicInterval>>,
    ) -> Result<PipelineOutput, PipelineError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let header = self.read_header().await?;
        let intervals = IntervalSet::resolve(explicit, &header)?;
        self.execute(header, intervals, started_at, clock).await
    }

    async fn execute(
        &self,
        header: Header,
        intervals: IntervalSet,
        started_at: DateTime<Utc>,
        clock: Instant,
    ) -> Result<PipelineOutput, PipelineError> {
        let location = self.source.location();
        info!(
            source = %location,
            contigs = header.contigs.len(),
            read_groups = header.read_groups.len(),
            "Resolved header"
        );
        info!(
            partitions = intervals.len(),
            bases = intervals.total_bases(),
            "Resolved intervals"
        );

        let header = Arc::new(BroadcastSlot::ready("header", header));
        let model_slot = Arc::new(BroadcastSlot::pending("model"));
        let intervals = Arc::new(intervals);

        let (partitions, aggregate) = self.enrich_partitions(&header, &intervals).await?;
        let records_read: u64 = partitions.iter().map(|p| p.records.len() as u64).sum();
        let duplicates_flagged: u64 = partitions.iter().map(|p| p.duplicates).sum();
        let records_with_context: u64 = partitions.iter().map(|p| p.with_context).sum();
        info!(records = records_read, duplicates = duplicates_flagged, "Enrichment complete");

        let estimator = ModelEstimator::new(Arc::clone(&self.fitter), Arc::clone(&header));
        let model = estimator.estimate_and_publish(aggregate, &model_slot)?;

        let applier = RecalibrationApplier::new(
            Arc::clone(&self.recalibrator),
            Arc::clone(&header),
            Arc::clone(&model_slot),
        );
        let records = self.apply_partitions(&model_slot, applier, partitions).await?;
        let records_written = records.len() as u64;
        if records_written != records_read {
            return Err(PipelineError::Worker(format!(
                "{records_read} records entered recalibration but {records_written} left it"
            )));
        }
        info!(records = records_written, "Recalibration applied");

        let summary = RunSummary {
            source: location,
            started_at,
            elapsed_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            partitions: intervals.len(),
            records_read,
            duplicates_flagged,
            records_with_context,
            records_written,
            records_observed: model.records_observed,
            bases_observed: model.bases_observed(),
            model_digest: model.digest().to_string(),
        };

        Ok(PipelineOutput {
            header: header.get()?,
            intervals: IntervalSet::clone(&intervals),
            model,
            records,
            summary,
        })
    }

    /// Phase 1. Returns the marked partitions in interval order and the
    /// closed aggregate of enriched pairs.
    async fn enrich_partitions(
        &self,
        header: &Arc<BroadcastSlot<Header>>,
        intervals: &Arc<IntervalSet>,
    ) -> Result<(Vec<MarkedPartition>, ClosedAggregate), PipelineError> {
        let stages = EnrichmentStages {
            adapter: RecordAdapter::new(Arc::clone(header)),
            marker: DuplicateMarker::new(Arc::clone(&self.duplicates), Arc::clone(header)),
            enricher: ContextEnricher::new(Arc::clone(&self.lookup)),
        };
        let (tx, rx) = mpsc::channel(self.config.channel_capacity());
        let collector = spawn_collector(rx);
        let permits = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut workers = JoinSet::new();

        for index in 0..intervals.len() {
            let permit = acquire(&permits).await?;
            let source = Arc::clone(&self.source);
            let header = Arc::clone(header);
            let intervals = Arc::clone(intervals);
            let stages = stages.clone();
            let tx = tx.clone();
            workers.spawn_blocking(move || {
                let _permit = permit;
                enrich_partition(source.as_ref(), &header, &intervals, index, &stages, &tx)
            });
        }
        // The workers now hold the only senders; the channel closes when the last one finishes.
        drop(tx);

        let mut partitions = Vec::with_capacity(intervals.len());
        while let Some(joined) = workers.join_next().await {
            match joined.map_err(PipelineError::from).and_then(|result| result) {
                Ok(partition) => partitions.push(partition),
                Err(e) => {
                    workers.abort_all();
                    collector.abort();
                    return Err(e);
                }
            }
        }

        let accumulator = collector.await?;
        let expected: u64 = partitions.iter().map(|p| p.records.len() as u64).sum();
        let aggregate = accumulator.close(expected)?;

        partitions.sort_by_key(|p| p.index);
        Ok((partitions, aggregate))
    }

    /// Phase 2
    async fn apply_partitions(
        &self,
        model: &BroadcastSlot<RecalibrationModel>,
        applier: RecalibrationApplier,
        partitions: Vec<MarkedPartition>,
    ) -> Result<Vec<Record>, PipelineError> {
        model.wait().await?;

        let permits = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut workers = JoinSet::new();
        for partition in partitions {
            let permit = acquire(&permits).await?;
            let applier = applier.clone();
            workers.spawn_blocking(move || {
                let _permit = permit;
                let records = partition
                    .records
                    .into_iter()
                    .map(|record| applier.apply(record))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, PipelineError>((partition.index, records))
            });
        }

        let mut applied = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined.map_err(PipelineError::from).and_then(|result| result) {
                Ok(partition) => applied.push(partition),
                Err(e) => {
                    workers.abort_all();
                    return Err(e);
                }
            }
        }

        applied.sort_by_key(|(index, _)| *index);
        Ok(applied.into_iter().flat_map(|(_, records)| records).collect())
    }
}

async fn acquire(permits: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, PipelineError> {
    Arc::clone(permits)
        .acquire_owned()
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))
}

fn enrich_partition<S: RecordSource>(
    source: &S,
    header: &BroadcastSlot<Header>,
    intervals: &IntervalSet,
    index: usize,
    stages: &EnrichmentStages,
    tx: &mpsc::Sender<EnrichedRecord>,
) -> Result<MarkedPartition, PipelineError> {
    let header = header.get()?;
    let mut partition = MarkedPartition {
        index,
        records: Vec::new(),
        duplicates: 0,
        with_context: 0,
    };

    for native in source.partition(&header, intervals, index)? {
        let record = stages.marker.mark(stages.adapter.adapt(native?)?)?;
        let enriched = stages.enricher.enrich(record.clone())?;

        if record.duplicate {
            partition.duplicates += 1;
        }
        if !enriched.context.is_empty() {
            partition.with_context += 1;
        }
        tx.blocking_send(enriched).map_err(|_| {
            PipelineError::Worker("model estimator stopped receiving records".to_string())
        })?;
        partition.records.push(record);
    }

    debug!(
        partition = index,
        interval = %intervals.get(index).map(ToString::to_string).unwrap_or_default(),
        records = partition.records.len(),
        "Partition enriched"
    );
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contig::Contig;
    use crate::lookup::EmptyLookup;
    use crate::pipeline::error::PolicyError;
    use crate::source::InMemorySource;
    use std::collections::BTreeMap;

    /// Fits a model that only counts records
    struct CountingFitter;

    impl ModelFittingPolicy for CountingFitter {
        fn fit(
            &self,
            _header: &Header,
            observations: &[EnrichedRecord],
        ) -> Result<RecalibrationModel, PolicyError> {
            Ok(RecalibrationModel::new(observations.len() as u64, BTreeMap::new()))
        }
    }

    fn source() -> InMemorySource {
        let header = Header::new(vec![Contig::new("chr1", 100), Contig::new("chr2", 100)]);
        let records = vec![
            Record::aligned("a", "chr1", 10, b"ACGT", &[30; 4]),
            Record::aligned("b", "chr2", 10, b"ACGT", &[30; 4]),
            Record::new("u", b"ACGT", &[30; 4]),
        ];
        InMemorySource::new(header, records)
    }

    fn driver() -> PipelineDriver<InMemorySource> {
        PipelineDriver::new(source(), Arc::new(EmptyLookup))
            .with_fitting_policy(Arc::new(CountingFitter))
            .with_config(PipelineConfig::default().with_concurrency(2))
    }

    #[tokio::test]
    async fn test_run_whole_reference() {
        let output = driver().run(None).await.unwrap();

        assert_eq!(output.intervals.len(), 2);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.model.records_observed, 2);
        assert_eq!(output.summary.records_read, 2);
        assert_eq!(output.summary.records_written, 2);
        assert!(output
            .records
            .iter()
            .all(|r| r.recalibration.as_ref().map(|p| p.model_digest.as_str())
                == Some(output.model.digest())));
    }

    #[tokio::test]
    async fn test_run_with_interval_specs() {
        let specs = vec!["chr2".to_string()];
        let output = driver().run(Some(&specs)).await.unwrap();

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].name, "b");
    }

    #[tokio::test]
    async fn test_unknown_interval_contig_is_configuration_error() {
        let specs = vec!["chrZ:1-10".to_string()];
        assert!(matches!(
            driver().run(Some(&specs)).await,
            Err(PipelineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_knobs_are_floored() {
        let config = PipelineConfig::default()
            .with_concurrency(0)
            .with_channel_capacity(0);
        let output = PipelineDriver::new(source(), Arc::new(EmptyLookup))
            .with_fitting_policy(Arc::new(CountingFitter))
            .with_config(config)
            .run(None)
            .await
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.model.records_observed, 2);
    }

    #[tokio::test]
    async fn test_resolve_intervals_defaults_to_contigs() {
        let (header, intervals) = driver().resolve_intervals(None).await.unwrap();
        assert_eq!(header.contigs.len(), 2);
        assert_eq!(
            intervals.as_slice(),
            &[
                GenomicInterval::new("chr1", 1, 100),
                GenomicInterval::new("chr2", 1, 100)
            ]
        );
    }
}
