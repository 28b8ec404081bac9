//! Pluggable per-stage policies.
//!
//! The pipeline core only decides *when* and *on what* each policy runs. The
//! statistics live behind these traits, so a run can be driven end to end by
//! trivial deterministic policies as easily as by the defaults below.
//!
//! | Trait | Stage | Default |
//! |-------|-------|---------|
//! | [`DuplicatePolicy`] | `MarkDuplicates` | [`SourceFlagDuplicates`] |
//! | [`ModelFittingPolicy`] | `BaseRecalibrator` | [`EmpiricalQualityFitter`] |
//! | [`RecalibrationPolicy`] | `ApplyBQSR` | [`EmpiricalQualityRecalibrator`] |

use std::collections::BTreeMap;

use crate::core::header::Header;
use crate::core::model::{RecalDatum, RecalibrationModel, UNKNOWN_READ_GROUP};
use crate::core::record::{Recalibration, Record};
use crate::pipeline::error::PolicyError;
use crate::pipeline::stages::EnrichedRecord;

/// SAM flag bit for PCR or optical duplicates
pub const DUPLICATE_FLAG: u16 = 0x400;

/// Base qualities below this are left untouched and not counted
pub const DEFAULT_PRESERVED_QUALITY: u8 = 6;

/// Decides whether one read is a duplicate.
///
/// Must not depend on the order in which reads are presented.
pub trait DuplicatePolicy: Send + Sync {
    /// # Errors
    ///
    /// Returns a `PolicyError` if the decision cannot be made for this record.
    fn is_duplicate(&self, record: &Record, header: &Header) -> Result<bool, PolicyError>;
}

/// Fits the single recalibration model of a run.
///
/// Called exactly once, with every (record, context) pair of the run sorted
/// in canonical order.
pub trait ModelFittingPolicy: Send + Sync {
    /// # Errors
    ///
    /// Returns `PolicyError::InsufficientData` when the input cannot support a
    /// model, or another `PolicyError` on failure.
    fn fit(
        &self,
        header: &Header,
        observations: &[EnrichedRecord],
    ) -> Result<RecalibrationModel, PolicyError>;
}

/// Rewrites one read using the published model
pub trait RecalibrationPolicy: Send + Sync {
    /// # Errors
    ///
    /// Returns a `PolicyError` if the record cannot be recalibrated.
    fn apply(
        &self,
        record: Record,
        header: &Header,
        model: &RecalibrationModel,
    ) -> Result<Record, PolicyError>;
}

/// Trusts the duplicate bit already present on the input
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceFlagDuplicates;

impl DuplicatePolicy for SourceFlagDuplicates {
    fn is_duplicate(&self, record: &Record, _header: &Header) -> Result<bool, PolicyError> {
        Ok(record.flags & DUPLICATE_FLAG != 0)
    }
}

/// Counts observed and mismatching bases per (read group, reported quality).
///
/// A base is observed when the context has a reference base at its position,
/// neither base is `N`, the position is not a known variant site, and its
/// reported quality is at least `min_quality`. Bases are placed on the
/// reference by the record's CIGAR: clipped and inserted bases are never
/// observed, deletions and skips advance the reference position. A record
/// without a CIGAR is placed gaplessly from its start.
#[derive(Debug, Clone, Copy)]
pub struct EmpiricalQualityFitter {
    pub min_quality: u8,
}

impl Default for EmpiricalQualityFitter {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_PRESERVED_QUALITY,
        }
    }
}

impl ModelFittingPolicy for EmpiricalQualityFitter {
    fn fit(
        &self,
        _header: &Header,
        observations: &[EnrichedRecord],
    ) -> Result<RecalibrationModel, PolicyError> {
        if observations.is_empty() {
            return Err(PolicyError::InsufficientData(
                "no records reached the estimator".to_string(),
            ));
        }

        let mut table: BTreeMap<String, BTreeMap<u8, RecalDatum>> = BTreeMap::new();
        let mut bases_observed: u64 = 0;

        for EnrichedRecord { record, context } in observations {
            if !record.is_mapped() {
                continue;
            }
            let read_group = record
                .read_group
                .clone()
                .unwrap_or_else(|| UNKNOWN_READ_GROUP.to_string());
            let bins = table.entry(read_group).or_default();

            for (offset, position) in record.aligned_positions() {
                let (Some(&base), Some(&quality)) =
                    (record.bases.get(offset), record.qualities.get(offset))
                else {
                    continue;
                };
                if quality < self.min_quality {
                    continue;
                }
                if context.is_known_site(position) {
                    continue;
                }
                let Some(reference) = context.reference_base_at(position) else {
                    continue;
                };
                let base = base.to_ascii_uppercase();
                let reference = reference.to_ascii_uppercase();
                if base == b'N' || reference == b'N' {
                    continue;
                }

                bins.entry(quality).or_default().observe(base != reference);
                bases_observed += 1;
            }
        }

        if bases_observed == 0 {
            return Err(PolicyError::InsufficientData(format!(
                "none of {} records had bases covered by reference context",
                observations.len()
            )));
        }

        table.retain(|_, bins| !bins.is_empty());
        Ok(RecalibrationModel::new(observations.len() as u64, table))
    }
}

/// Replaces each reported quality with the model's empirical quality
#[derive(Debug, Clone, Copy)]
pub struct EmpiricalQualityRecalibrator {
    /// Qualities below this are copied through unchanged
    pub preserve_below: u8,
}

impl Default for EmpiricalQualityRecalibrator {
    fn default() -> Self {
        Self {
            preserve_below: DEFAULT_PRESERVED_QUALITY,
        }
    }
}

impl RecalibrationPolicy for EmpiricalQualityRecalibrator {
    fn apply(
        &self,
        mut record: Record,
        _header: &Header,
        model: &RecalibrationModel,
    ) -> Result<Record, PolicyError> {
        let read_group = record
            .read_group
            .as_deref()
            .unwrap_or(UNKNOWN_READ_GROUP);

        let qualities = record
            .qualities
            .iter()
            .map(|&q| {
                if q < self.preserve_below {
                    q
                } else {
                    model.recalibrate(read_group, q)
                }
            })
            .collect();

        record.recalibration = Some(Recalibration {
            qualities,
            model_digest: model.digest().to_string(),
        });
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{Context, ReferenceWindow};
    use crate::core::contig::Contig;

    fn header() -> Header {
        Header::new(vec![Contig::new("chr1", 100)])
    }

    fn enriched(record: Record, reference: &[u8], start: u64, known_sites: Vec<u64>) -> EnrichedRecord {
        EnrichedRecord {
            record,
            context: Context {
                reference: Some(ReferenceWindow {
                    start,
                    bases: reference.to_vec(),
                }),
                known_sites,
            },
        }
    }

    #[test]
    fn test_source_flag_duplicates() {
        let mut record = Record::aligned("r1", "chr1", 1, b"A", &[30]);
        assert!(!SourceFlagDuplicates.is_duplicate(&record, &header()).unwrap());

        record.flags = DUPLICATE_FLAG | 0x10;
        assert!(SourceFlagDuplicates.is_duplicate(&record, &header()).unwrap());
    }

    #[test]
    fn test_fit_counts_mismatches() {
        let observations = vec![
            // One mismatch at position 12 (G vs C)
            enriched(
                Record::aligned("r1", "chr1", 10, b"ACGT", &[30; 4]).with_read_group("rg1"),
                b"ACCT",
                10,
                vec![],
            ),
            enriched(
                Record::aligned("r2", "chr1", 10, b"ACCT", &[30; 4]).with_read_group("rg1"),
                b"ACCT",
                10,
                vec![],
            ),
        ];

        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        assert_eq!(model.records_observed, 2);
        let datum = model.table["rg1"][&30];
        assert_eq!(datum.observations, 8);
        assert_eq!(datum.mismatches, 1);
    }

    #[test]
    fn test_fit_skips_known_sites_low_quality_and_n() {
        let observations = vec![enriched(
            Record::aligned("r1", "chr1", 1, b"ANGTA", &[30, 30, 30, 2, 30]),
            b"ACTTA",
            1,
            vec![3],
        )];

        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        // Position 2 is N, 3 is a known site, 4 is below the minimum quality
        let datum = model.table[UNKNOWN_READ_GROUP][&30];
        assert_eq!(datum.observations, 2);
        assert_eq!(datum.mismatches, 0);
    }

    #[test]
    fn test_fit_without_records() {
        let result = EmpiricalQualityFitter::default().fit(&header(), &[]);
        assert!(matches!(result, Err(PolicyError::InsufficientData(_))));
    }

    #[test]
    fn test_fit_without_reference_context() {
        let observations = vec![EnrichedRecord {
            record: Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]),
            context: Context::empty(),
        }];
        let result = EmpiricalQualityFitter::default().fit(&header(), &observations);
        assert!(matches!(result, Err(PolicyError::InsufficientData(_))));
    }

    #[test]
    fn test_fit_ignores_soft_clipped_bases() {
        // TT is clipped; ACGT lines up with the reference at 10..=13
        let observations = vec![enriched(
            Record::aligned("r1", "chr1", 10, b"TTACGT", &[30; 6])
                .with_cigar("2S4M".parse().unwrap()),
            b"ACGT",
            10,
            vec![],
        )];

        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        let datum = model.table[UNKNOWN_READ_GROUP][&30];
        assert_eq!(datum.observations, 4);
        assert_eq!(datum.mismatches, 0);
    }

    #[test]
    fn test_fit_skips_inserted_bases() {
        // The inserted G at read offset 2 has no reference position
        let observations = vec![enriched(
            Record::aligned("r1", "chr1", 10, b"ACGGT", &[30, 30, 20, 30, 30])
                .with_cigar("2M1I2M".parse().unwrap()),
            b"ACGT",
            10,
            vec![],
        )];

        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        let bins = &model.table[UNKNOWN_READ_GROUP];
        assert_eq!(bins[&30].observations, 4);
        assert_eq!(bins[&30].mismatches, 0);
        assert!(!bins.contains_key(&20));
    }

    #[test]
    fn test_fit_advances_over_deletions() {
        // 2M2D2M: read CG lines up with reference 14..=15, not 12..=13
        let observations = vec![enriched(
            Record::aligned("r1", "chr1", 10, b"ACCG", &[30; 4])
                .with_cigar("2M2D2M".parse().unwrap()),
            b"ACTTCG",
            10,
            vec![],
        )];

        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        let datum = model.table[UNKNOWN_READ_GROUP][&30];
        assert_eq!(datum.observations, 4);
        assert_eq!(datum.mismatches, 0);
    }

    #[test]
    fn test_fit_is_order_independent() {
        let a = enriched(Record::aligned("a", "chr1", 1, b"AC", &[30, 20]), b"AG", 1, vec![]);
        let b = enriched(Record::aligned("b", "chr1", 5, b"TT", &[20, 30]), b"TA", 5, vec![]);

        let fitter = EmpiricalQualityFitter::default();
        let forward = fitter.fit(&header(), &[a.clone(), b.clone()]).unwrap();
        let reverse = fitter.fit(&header(), &[b, a]).unwrap();

        assert_eq!(forward, reverse);
        assert_eq!(forward.digest(), reverse.digest());
    }

    #[test]
    fn test_apply_writes_payload() {
        let observations = vec![enriched(
            Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]),
            b"ACGT",
            1,
            vec![],
        )];
        let model = EmpiricalQualityFitter::default()
            .fit(&header(), &observations)
            .unwrap();

        let record = Record::aligned("r2", "chr1", 1, b"ACG", &[30, 2, 40]);
        let recalibrated = EmpiricalQualityRecalibrator::default()
            .apply(record.clone(), &header(), &model)
            .unwrap();

        let payload = recalibrated.recalibration.unwrap();
        assert_eq!(payload.model_digest, model.digest());
        // Observed bin: 4 observations, 0 mismatches -> 1/6 -> Q8
        assert_eq!(payload.qualities[0], 8);
        // Preserved
        assert_eq!(payload.qualities[1], 2);
        // Unseen quality falls back to the read group total
        assert_eq!(payload.qualities[2], 8);
        // Original qualities untouched
        assert_eq!(recalibrated.qualities, record.qualities);
    }
}
