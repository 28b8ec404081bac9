//! Genomic intervals and the active interval set of a run.
//!
//! Coordinates are 1-based and closed (`chr1:1-100` covers 100 bases).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::core::header::Header;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Contig '{0}' is not in the sequence dictionary")]
    UnknownContig(String),

    #[error("Interval {interval} lies outside contig bounds 1-{length}")]
    OutOfBounds { interval: String, length: u64 },

    #[error("Intervals {0} and {1} overlap; merge overlapping intervals before passing them")]
    Overlapping(String, String),

    #[error("No intervals to process")]
    Empty,
}

/// A contiguous range on one sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomicInterval {
    pub contig: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicInterval {
    pub fn new(contig: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            contig: contig.into(),
            start,
            end,
        }
    }

    /// Number of bases covered
    #[must_use]
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this interval shares at least one base with `[start, end]` on `contig`
    #[must_use]
    pub fn overlaps_span(&self, contig: &str, start: u64, end: u64) -> bool {
        self.contig == contig && self.start <= end && start <= self.end
    }

    #[must_use]
    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        self.overlaps_span(&other.contig, other.start, other.end)
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

/// The non-overlapping, in-bounds set of intervals a run processes.
///
/// Each interval is one partition of the record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<GenomicInterval>,
}

impl IntervalSet {
    /// One interval per contig spanning its full declared length, in dictionary order
    #[must_use]
    pub fn whole_reference(header: &Header) -> Self {
        let intervals = header
            .contigs
            .iter()
            .filter(|c| c.length > 0)
            .map(|c| GenomicInterval::new(c.name.clone(), 1, c.length))
            .collect();
        Self { intervals }
    }

    /// Validate caller-supplied intervals against the sequence dictionary.
    ///
    /// Order is preserved. Contig aliases are resolved to the dictionary's
    /// primary name so that records (which always carry the primary name)
    /// can be claimed.
    ///
    /// # Errors
    ///
    /// Returns `IntervalError::Empty` for an empty list, `UnknownContig` or
    /// `OutOfBounds` for intervals that do not fit the dictionary, and
    /// `Overlapping` when two intervals share a base.
    pub fn from_explicit(
        intervals: Vec<GenomicInterval>,
        header: &Header,
    ) -> Result<Self, IntervalError> {
        if intervals.is_empty() {
            return Err(IntervalError::Empty);
        }

        let mut resolved = Vec::with_capacity(intervals.len());
        for interval in intervals {
            let contig = header
                .contig(&interval.contig)
                .ok_or_else(|| IntervalError::UnknownContig(interval.contig.clone()))?;
            if !contig.contains_range(interval.start, interval.end) {
                return Err(IntervalError::OutOfBounds {
                    interval: interval.to_string(),
                    length: contig.length,
                });
            }
            resolved.push(GenomicInterval::new(
                contig.name.clone(),
                interval.start,
                interval.end,
            ));
        }

        check_disjoint(&resolved)?;
        Ok(Self {
            intervals: resolved,
        })
    }

    /// Use `explicit` when given, otherwise the whole reference
    ///
    /// # Errors
    ///
    /// See [`IntervalSet::from_explicit`]. Also returns `IntervalError::Empty`
    /// when the header declares no non-empty contigs.
    pub fn resolve(
        explicit: Option<Vec<GenomicInterval>>,
        header: &Header,
    ) -> Result<Self, IntervalError> {
        let set = match explicit {
            Some(intervals) => Self::from_explicit(intervals, header)?,
            None => Self::whole_reference(header),
        };
        if set.is_empty() {
            return Err(IntervalError::Empty);
        }
        Ok(set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&GenomicInterval> {
        self.intervals.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenomicInterval> {
        self.intervals.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[GenomicInterval] {
        &self.intervals
    }

    /// Total number of bases covered by the set
    #[must_use]
    pub fn total_bases(&self) -> u64 {
        self.intervals.iter().map(GenomicInterval::len).sum()
    }

    /// Index of the partition that owns a span: the first interval in set
    /// order that it overlaps.
    #[must_use]
    pub fn claimant(&self, contig: &str, start: u64, end: u64) -> Option<usize> {
        self.intervals
            .iter()
            .position(|i| i.overlaps_span(contig, start, end))
    }

    /// Whether partition `index` owns the span
    #[must_use]
    pub fn claims(&self, index: usize, contig: &str, start: u64, end: u64) -> bool {
        self.claimant(contig, start, end) == Some(index)
    }
}

fn check_disjoint(intervals: &[GenomicInterval]) -> Result<(), IntervalError> {
    let mut by_contig: HashMap<&str, Vec<&GenomicInterval>> = HashMap::new();
    for interval in intervals {
        by_contig
            .entry(interval.contig.as_str())
            .or_default()
            .push(interval);
    }

    for group in by_contig.values_mut() {
        group.sort_by_key(|i| (i.start, i.end));
        for pair in group.windows(2) {
            if pair[0].overlaps(pair[1]) {
                return Err(IntervalError::Overlapping(
                    pair[0].to_string(),
                    pair[1].to_string(),
                ));
            }
        }
    }
    Ok(())
}
