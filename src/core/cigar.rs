use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// One CIGAR operation kind, using the SAM single-letter codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarKind {
    /// `M`: aligned, match or mismatch
    Match,
    /// `I`
    Insertion,
    /// `D`
    Deletion,
    /// `N`: skipped reference, e.g. an intron
    Skip,
    /// `S`
    SoftClip,
    /// `H`
    HardClip,
    /// `P`
    Pad,
    /// `=`
    SequenceMatch,
    /// `X`
    SequenceMismatch,
}

impl CigarKind {
    #[must_use]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }

    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Deletion
                | Self::Skip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }

    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Match => 'M',
            Self::Insertion => 'I',
            Self::Deletion => 'D',
            Self::Skip => 'N',
            Self::SoftClip => 'S',
            Self::HardClip => 'H',
            Self::Pad => 'P',
            Self::SequenceMatch => '=',
            Self::SequenceMismatch => 'X',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'M' => Self::Match,
            'I' => Self::Insertion,
            'D' => Self::Deletion,
            'N' => Self::Skip,
            'S' => Self::SoftClip,
            'H' => Self::HardClip,
            'P' => Self::Pad,
            '=' => Self::SequenceMatch,
            'X' => Self::SequenceMismatch,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: usize,
}

impl CigarOp {
    #[must_use]
    pub fn new(kind: CigarKind, len: usize) -> Self {
        Self { kind, len }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CigarError {
    #[error("Invalid CIGAR '{0}': {1}")]
    Invalid(String, &'static str),
}

/// How a read's bases line up against the reference.
///
/// Serialised in SAM text form, e.g. `2S4M`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cigar(Vec<CigarOp>);

impl Cigar {
    #[must_use]
    pub fn new(ops: Vec<CigarOp>) -> Self {
        Self(ops)
    }

    #[must_use]
    pub fn ops(&self) -> &[CigarOp] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of read bases the alignment accounts for
    #[must_use]
    pub fn read_len(&self) -> usize {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_read())
            .map(|op| op.len)
            .sum()
    }

    /// Number of reference positions the alignment covers
    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| op.len)
            .sum()
    }

    /// `(read offset, reference position)` for every base aligned to the
    /// reference, given a 1-based alignment start.
    ///
    /// Clipped and inserted bases have no reference position and are left
    /// out. Deletions and skips move the reference position without emitting.
    #[must_use]
    pub fn aligned_pairs(&self, start: u64) -> Vec<(usize, u64)> {
        let mut pairs = Vec::new();
        let mut read_offset = 0usize;
        let mut position = start;

        for op in &self.0 {
            match (op.kind.consumes_read(), op.kind.consumes_reference()) {
                (true, true) => {
                    pairs.extend((0..op.len).map(|i| (read_offset + i, position + i as u64)));
                    read_offset += op.len;
                    position += op.len as u64;
                }
                (true, false) => read_offset += op.len,
                (false, true) => position += op.len as u64,
                (false, false) => {}
            }
        }

        pairs
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }
        for op in &self.0 {
            write!(f, "{}{}", op.len, op.kind.code())?;
        }
        Ok(())
    }
}

impl FromStr for Cigar {
    type Err = CigarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::default());
        }

        let mut ops = Vec::new();
        let mut digits = String::new();
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let kind = CigarKind::from_code(c)
                .ok_or_else(|| CigarError::Invalid(s.to_string(), "unknown operation"))?;
            let len = digits
                .parse()
                .map_err(|_| CigarError::Invalid(s.to_string(), "missing operation length"))?;
            ops.push(CigarOp::new(kind, len));
            digits.clear();
        }

        if !digits.is_empty() {
            return Err(CigarError::Invalid(s.to_string(), "trailing length"));
        }
        if ops.is_empty() {
            return Err(CigarError::Invalid(s.to_string(), "no operations"));
        }
        Ok(Self(ops))
    }
}

impl Serialize for Cigar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cigar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cigar(s: &str) -> Cigar {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(cigar("2S4M").to_string(), "2S4M");
        assert_eq!(cigar("10M1I5M2D3M").ops().len(), 5);
        assert_eq!(cigar("*"), Cigar::default());
        assert!("4Q".parse::<Cigar>().is_err());
        assert!("M".parse::<Cigar>().is_err());
        assert!("4M2".parse::<Cigar>().is_err());
    }

    #[test]
    fn test_lengths() {
        let c = cigar("3H2S4M1I2M3D1M");
        assert_eq!(c.read_len(), 2 + 4 + 1 + 2 + 1);
        assert_eq!(c.reference_len(), 4 + 2 + 3 + 1);
    }

    #[test]
    fn test_soft_clip_skips_read_bases() {
        assert_eq!(
            cigar("2S4M").aligned_pairs(10),
            vec![(2, 10), (3, 11), (4, 12), (5, 13)]
        );
    }

    #[test]
    fn test_insertion_and_deletion() {
        // 2M1I2M: the third read base has no reference position
        assert_eq!(
            cigar("2M1I2M").aligned_pairs(10),
            vec![(0, 10), (1, 11), (3, 12), (4, 13)]
        );
        // 2M2D2M: reference jumps over 12 and 13
        assert_eq!(
            cigar("2M2D2M").aligned_pairs(10),
            vec![(0, 10), (1, 11), (2, 14), (3, 15)]
        );
        assert_eq!(cigar("1M5N1M").aligned_pairs(1), vec![(0, 1), (1, 7)]);
    }

    #[test]
    fn test_serializes_as_text() {
        let json = serde_json::to_value(cigar("2M1I2M")).unwrap();
        assert_eq!(json, "2M1I2M");
        let back: Cigar = serde_json::from_value(json).unwrap();
        assert_eq!(back, cigar("2M1I2M"));
    }
}
