use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest quality the model will ever report
pub const MAX_RECALIBRATED_QUALITY: u8 = 93;

/// Lowest quality the model will ever report
pub const MIN_RECALIBRATED_QUALITY: u8 = 1;

/// Read-group key used for records that carry no RG tag
pub const UNKNOWN_READ_GROUP: &str = "*";

/// Observation counts for one covariate bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecalDatum {
    pub observations: u64,
    pub mismatches: u64,
}

impl RecalDatum {
    pub fn observe(&mut self, mismatch: bool) {
        self.observations += 1;
        if mismatch {
            self.mismatches += 1;
        }
    }

    pub fn merge(&mut self, other: &RecalDatum) {
        self.observations += other.observations;
        self.mismatches += other.mismatches;
    }

    /// Phred-scaled empirical quality with a +1/+2 pseudocount
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn empirical_quality(&self) -> u8 {
        let error_rate = (self.mismatches as f64 + 1.0) / (self.observations as f64 + 2.0);
        let phred = (-10.0 * error_rate.log10()).round();
        phred.clamp(
            f64::from(MIN_RECALIBRATED_QUALITY),
            f64::from(MAX_RECALIBRATED_QUALITY),
        ) as u8
    }
}

/// The single recalibration artifact of a run.
///
/// Counts are keyed by read group, then by reported base quality. The model
/// is immutable once built; its digest identifies it in corrected records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalibrationModel {
    /// Number of (record, context) pairs the model was fitted from
    pub records_observed: u64,

    pub table: BTreeMap<String, BTreeMap<u8, RecalDatum>>,

    digest: String,
}

impl RecalibrationModel {
    #[must_use]
    pub fn new(records_observed: u64, table: BTreeMap<String, BTreeMap<u8, RecalDatum>>) -> Self {
        let digest = compute_digest(records_observed, &table);
        Self {
            records_observed,
            table,
            digest,
        }
    }

    /// MD5 of the canonical JSON form of the counts
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Totals for one read group across all qualities
    #[must_use]
    pub fn read_group_total(&self, read_group: &str) -> Option<RecalDatum> {
        let bins = self.table.get(read_group)?;
        let mut total = RecalDatum::default();
        for datum in bins.values() {
            total.merge(datum);
        }
        Some(total)
    }

    /// Totals across every bin
    #[must_use]
    pub fn global_total(&self) -> RecalDatum {
        let mut total = RecalDatum::default();
        for datum in self.table.values().flat_map(BTreeMap::values) {
            total.merge(datum);
        }
        total
    }

    /// Number of base observations behind the model
    #[must_use]
    pub fn bases_observed(&self) -> u64 {
        self.global_total().observations
    }

    /// Recalibrated quality for a base, falling back from the exact bin to the
    /// read group and then to the whole model.
    #[must_use]
    pub fn recalibrate(&self, read_group: &str, reported: u8) -> u8 {
        if let Some(datum) = self
            .table
            .get(read_group)
            .and_then(|bins| bins.get(&reported))
        {
            return datum.empirical_quality();
        }
        if let Some(total) = self.read_group_total(read_group) {
            return total.empirical_quality();
        }
        self.global_total().empirical_quality()
    }
}

fn compute_digest(records_observed: u64, table: &BTreeMap<String, BTreeMap<u8, RecalDatum>>) -> String {
    let canonical = serde_json::to_string(&(records_observed, table)).unwrap_or_default();
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datum(observations: u64, mismatches: u64) -> RecalDatum {
        RecalDatum {
            observations,
            mismatches,
        }
    }

    #[test]
    fn test_empirical_quality() {
        // (0 + 1) / (98 + 2) = 0.01 -> Q20
        assert_eq!(datum(98, 0).empirical_quality(), 20);
        // (9 + 1) / (998 + 2) = 0.01 -> Q20
        assert_eq!(datum(998, 9).empirical_quality(), 20);
        // No observations: 1/2 -> Q3
        assert_eq!(datum(0, 0).empirical_quality(), 3);
    }

    #[test]
    fn test_empirical_quality_clamped() {
        assert_eq!(datum(u64::MAX / 2, 0).empirical_quality(), MAX_RECALIBRATED_QUALITY);
        assert_eq!(datum(10, 10).empirical_quality(), MIN_RECALIBRATED_QUALITY);
    }

    #[test]
    fn test_recalibrate_fallbacks() {
        let mut table = BTreeMap::new();
        table.insert(
            "rg1".to_string(),
            BTreeMap::from([(30, datum(98, 0)), (20, datum(8, 0))]),
        );
        let model = RecalibrationModel::new(3, table);

        assert_eq!(model.recalibrate("rg1", 30), 20);
        // Unknown quality in a known read group: read-group total (1 / 108)
        assert_eq!(model.recalibrate("rg1", 40), 20);
        // Unknown read group: global total
        assert_eq!(model.recalibrate("rg9", 30), model.global_total().empirical_quality());
        assert_eq!(model.bases_observed(), 106);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let build = || {
            let mut table = BTreeMap::new();
            table.insert("b".to_string(), BTreeMap::from([(10, datum(5, 1))]));
            table.insert("a".to_string(), BTreeMap::from([(30, datum(7, 0))]));
            RecalibrationModel::new(2, table)
        };

        assert_eq!(build().digest(), build().digest());
        assert_eq!(build().digest().len(), 32);
        assert_ne!(
            build().digest(),
            RecalibrationModel::new(3, build().table).digest()
        );
    }
}
