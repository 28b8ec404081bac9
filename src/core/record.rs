use serde::{Deserialize, Serialize};

use crate::core::cigar::Cigar;
use crate::core::header::Header;
use crate::core::interval::GenomicInterval;

/// Orientation of a read relative to the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

/// Quality-correction payload written by the recalibration stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recalibration {
    /// Recalibrated base qualities, parallel to `Record::qualities`
    pub qualities: Vec<u8>,

    /// Digest of the model that produced these qualities
    pub model_digest: String,
}

/// One sequenced read as it moves through the pipeline.
///
/// Coordinates are 1-based and closed. Bases are stored in reference
/// orientation (as in SAM), whatever the strand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,

    /// Contig the read is aligned to; `None` when unmapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contig: Option<String>,

    /// Alignment start; `None` when unmapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,

    /// Alignment end, when known from the alignment itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,

    pub strand: Strand,

    /// Alignment of the bases to the reference; `None` means gapless
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cigar: Option<Cigar>,

    #[serde(with = "ascii")]
    pub bases: Vec<u8>,

    /// Phred-scaled base qualities (not ASCII offset)
    pub qualities: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_quality: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_group: Option<String>,

    /// Raw SAM flags as read from the source
    #[serde(default)]
    pub flags: u16,

    /// Set by the duplicate-marking stage
    #[serde(default)]
    pub duplicate: bool,

    /// Set by the recalibration stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalibration: Option<Recalibration>,
}

/// Canonical ordering key used to make aggregation independent of arrival order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordKey {
    contig_index: usize,
    start: u64,
    strand: Strand,
    name: String,
    read_group: Option<String>,
    flags: u16,
    mapping_quality: Option<u8>,
    end: Option<u64>,
    bases: Vec<u8>,
    qualities: Vec<u8>,
}

impl Record {
    /// An unmapped read
    pub fn new(name: impl Into<String>, bases: &[u8], qualities: &[u8]) -> Self {
        Self {
            name: name.into(),
            contig: None,
            start: None,
            end: None,
            strand: Strand::Forward,
            cigar: None,
            bases: bases.to_vec(),
            qualities: qualities.to_vec(),
            mapping_quality: None,
            read_group: None,
            flags: 0,
            duplicate: false,
            recalibration: None,
        }
    }

    /// A read aligned at `start` on `contig`
    pub fn aligned(
        name: impl Into<String>,
        contig: impl Into<String>,
        start: u64,
        bases: &[u8],
        qualities: &[u8],
    ) -> Self {
        let mut record = Self::new(name, bases, qualities);
        record.contig = Some(contig.into());
        record.start = Some(start);
        record
    }

    #[must_use]
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    #[must_use]
    pub fn with_read_group(mut self, read_group: impl Into<String>) -> Self {
        self.read_group = Some(read_group.into());
        self
    }

    #[must_use]
    pub fn with_cigar(mut self, cigar: Cigar) -> Self {
        self.cigar = Some(cigar);
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.contig.is_some() && self.start.is_some()
    }

    /// Reference span covered by the read.
    ///
    /// When the alignment end is unknown it is derived from the CIGAR, or
    /// from `start + len(bases) - 1` for a gapless read.
    #[must_use]
    pub fn span(&self) -> Option<GenomicInterval> {
        let contig = self.contig.as_ref()?;
        let start = self.start?;
        let end = self.end.unwrap_or_else(|| {
            let len = match &self.cigar {
                Some(cigar) => cigar.reference_len(),
                None => self.bases.len(),
            };
            start + len.max(1) as u64 - 1
        });
        Some(GenomicInterval::new(contig.clone(), start, end.max(start)))
    }

    /// `(base offset, reference position)` for each base placed on the
    /// reference. Empty when unmapped.
    #[must_use]
    pub fn aligned_positions(&self) -> Vec<(usize, u64)> {
        let Some(start) = self.start.filter(|_| self.contig.is_some()) else {
            return Vec::new();
        };
        match &self.cigar {
            Some(cigar) if !cigar.is_empty() => cigar.aligned_pairs(start),
            _ => (0..self.bases.len())
                .map(|offset| (offset, start + offset as u64))
                .collect(),
        }
    }

    #[must_use]
    pub fn sort_key(&self, header: &Header) -> RecordKey {
        RecordKey {
            contig_index: self
                .contig
                .as_deref()
                .and_then(|c| header.contig_index(c))
                .unwrap_or(usize::MAX),
            start: self.start.unwrap_or(u64::MAX),
            strand: self.strand,
            name: self.name.clone(),
            read_group: self.read_group.clone(),
            flags: self.flags,
            mapping_quality: self.mapping_quality,
            end: self.end,
            bases: self.bases.clone(),
            qualities: self.qualities.clone(),
        }
    }
}

mod ascii {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contig::Contig;

    #[test]
    fn test_span_from_bases() {
        let record = Record::aligned("r1", "chr1", 10, b"ACGT", &[30; 4]);
        assert_eq!(record.span(), Some(GenomicInterval::new("chr1", 10, 13)));
    }

    #[test]
    fn test_span_prefers_alignment_end() {
        let record = Record::aligned("r1", "chr1", 10, b"ACGT", &[30; 4]).with_end(20);
        assert_eq!(record.span().unwrap().end, 20);
    }

    #[test]
    fn test_unmapped_has_no_span() {
        let record = Record::new("r1", b"ACGT", &[30; 4]);
        assert!(!record.is_mapped());
        assert!(record.span().is_none());
    }

    #[test]
    fn test_sort_key_follows_dictionary_order() {
        let header = Header::new(vec![Contig::new("chr2", 100), Contig::new("chr1", 100)]);
        let on_chr2 = Record::aligned("a", "chr2", 50, b"A", &[30]);
        let on_chr1 = Record::aligned("b", "chr1", 1, b"A", &[30]);

        assert!(on_chr2.sort_key(&header) < on_chr1.sort_key(&header));
    }

    #[test]
    fn test_span_from_cigar() {
        let clipped = Record::aligned("r1", "chr1", 10, b"TTACGT", &[30; 6])
            .with_cigar("2S4M".parse().unwrap());
        assert_eq!(clipped.span(), Some(GenomicInterval::new("chr1", 10, 13)));

        let deleted = Record::aligned("r2", "chr1", 10, b"ACGT", &[30; 4])
            .with_cigar("2M3D2M".parse().unwrap());
        assert_eq!(deleted.span(), Some(GenomicInterval::new("chr1", 10, 16)));
    }

    #[test]
    fn test_aligned_positions() {
        let gapless = Record::aligned("r1", "chr1", 5, b"ACG", &[30; 3]);
        assert_eq!(gapless.aligned_positions(), vec![(0, 5), (1, 6), (2, 7)]);

        let inserted = Record::aligned("r2", "chr1", 5, b"ACGTA", &[30; 5])
            .with_cigar("2M1I2M".parse().unwrap());
        assert_eq!(
            inserted.aligned_positions(),
            vec![(0, 5), (1, 6), (3, 7), (4, 8)]
        );

        assert!(Record::new("r3", b"ACG", &[30; 3]).aligned_positions().is_empty());
    }

    #[test]
    fn test_sort_key_breaks_ties_on_alignment_fields() {
        let header = Header::new(vec![Contig::new("chr1", 100)]);
        let plain = Record::aligned("r", "chr1", 1, b"A", &[30]);
        let grouped = plain.clone().with_read_group("rg1");
        let mut flagged = plain.clone();
        flagged.flags = 0x400;

        assert_ne!(plain.sort_key(&header), grouped.sort_key(&header));
        assert!(plain.sort_key(&header) < grouped.sort_key(&header));
        assert!(plain.sort_key(&header) < flagged.sort_key(&header));

        let mut confident = plain.clone();
        confident.mapping_quality = Some(60);
        assert!(plain.sort_key(&header) < confident.sort_key(&header));
        assert!(plain.sort_key(&header) < plain.clone().with_end(1).sort_key(&header));
    }

    #[test]
    fn test_bases_serialize_as_text() {
        let record = Record::aligned("r1", "chr1", 10, b"ACGT", &[30, 31, 32, 33]);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["bases"], "ACGT");
        assert_eq!(json["qualities"], serde_json::json!([30, 31, 32, 33]));
        assert_eq!(json["strand"], "forward");
        assert!(json.get("cigar").is_none());

        let clipped = record.with_cigar("1S3M".parse().unwrap());
        assert_eq!(serde_json::to_value(&clipped).unwrap()["cigar"], "1S3M");
    }
}
