//! Reference and known-variant lookups used to annotate reads with context.
//!
//! The pipeline only sees the [`ContextLookup`] trait: given a read's span it
//! returns whatever side data overlaps it, possibly nothing. How that data is
//! stored or fetched is up to the implementation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use noodles::core::{Position, Region};
use noodles::fasta;
use tracing::{debug, info, warn};

use crate::core::context::{Context, ReferenceWindow};
use crate::core::interval::GenomicInterval;
use crate::parsing::fasta::{is_fasta_file, load_fasta_file, ReferenceSequence};
use crate::parsing::sam::ParseError;
use crate::parsing::vcf::parse_vcf_sites_file;
use crate::pipeline::error::PolicyError;

/// Side-data provider keyed by genomic span
pub trait ContextLookup: Send + Sync {
    /// Context overlapping `span`. An empty context is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Transient` for failures a caller could retry and
    /// `PolicyError::Failed` for everything else.
    fn lookup(&self, span: &GenomicInterval) -> Result<Context, PolicyError>;
}

/// A lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyLookup;

impl ContextLookup for EmptyLookup {
    fn lookup(&self, _span: &GenomicInterval) -> Result<Context, PolicyError> {
        Ok(Context::empty())
    }
}

/// Known variant positions, per contig
#[derive(Debug, Clone, Default)]
pub struct KnownSites {
    positions: HashMap<String, BTreeSet<u64>>,
}

impl KnownSites {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every base of `site` as known
    pub fn add(&mut self, site: &GenomicInterval) {
        let positions = self.positions.entry(site.contig.clone()).or_default();
        positions.extend(site.start..=site.end);
    }

    /// Known positions within `span`, ascending
    #[must_use]
    pub fn within(&self, span: &GenomicInterval) -> Vec<u64> {
        self.positions
            .get(&span.contig)
            .map(|p| p.range(span.start..=span.end).copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type IndexedFasta = fasta::io::IndexedReader<fasta::io::BufReader<File>>;

/// Where reference bases come from
enum ReferenceBases {
    /// Every sequence loaded up front
    InMemory(HashMap<String, Vec<u8>>),
    /// Read per window through the `.fai` index
    Indexed {
        reader: Mutex<IndexedFasta>,
        lengths: HashMap<String, u64>,
    },
}

impl fmt::Debug for ReferenceBases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory(sequences) => f
                .debug_struct("InMemory")
                .field("sequences", &sequences.len())
                .finish(),
            Self::Indexed { lengths, .. } => f
                .debug_struct("Indexed")
                .field("sequences", &lengths.len())
                .finish(),
        }
    }
}

/// Reference bases and known sites.
///
/// A FASTA with a `.fai` next to it is read on demand, one window per
/// lookup. Without an index the whole reference is held in memory.
#[derive(Debug)]
pub struct ReferenceLookup {
    bases: ReferenceBases,
    known_sites: KnownSites,
}

impl ReferenceLookup {
    #[must_use]
    pub fn new(sequences: Vec<ReferenceSequence>) -> Self {
        Self {
            bases: ReferenceBases::InMemory(
                sequences.into_iter().map(|s| (s.name, s.bases)).collect(),
            ),
            known_sites: KnownSites::new(),
        }
    }

    /// Open `reference` through its `<reference>.fai` index
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the index or the FASTA cannot be opened.
    pub fn indexed(reference: &Path) -> Result<Self, ParseError> {
        let reader = fasta::io::indexed_reader::Builder::default().build_from_path(reference)?;
        let lengths = reader
            .index()
            .as_ref()
            .iter()
            .map(|record| {
                (
                    String::from_utf8_lossy(record.name()).into_owned(),
                    record.length(),
                )
            })
            .collect();
        Ok(Self {
            bases: ReferenceBases::Indexed {
                reader: Mutex::new(reader),
                lengths,
            },
            known_sites: KnownSites::new(),
        })
    }

    #[must_use]
    pub fn with_known_sites(mut self, sites: &[GenomicInterval]) -> Self {
        for site in sites {
            self.known_sites.add(site);
        }
        self
    }

    /// Load a reference FASTA and any number of known-sites VCFs.
    ///
    /// The FASTA is opened through its index when `<reference>.fai` exists.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if any file cannot be read or parsed.
    pub fn load(reference: &Path, known_sites: &[PathBuf]) -> Result<Self, ParseError> {
        if !is_fasta_file(reference) {
            warn!(reference = %reference.display(), "Reference does not have a FASTA extension");
        }

        let mut lookup = if fai_path(reference).is_file() {
            let lookup = Self::indexed(reference)?;
            info!(
                reference = %reference.display(),
                sequences = lookup.sequence_count(),
                "Opened indexed reference"
            );
            lookup
        } else {
            let sequences = load_fasta_file(reference)?;
            info!(
                reference = %reference.display(),
                sequences = sequences.len(),
                "Loaded reference"
            );
            Self::new(sequences)
        };

        for path in known_sites {
            let sites = parse_vcf_sites_file(path)?;
            debug!(path = %path.display(), sites = sites.len(), "Loaded known sites");
            lookup = lookup.with_known_sites(&sites);
        }
        Ok(lookup)
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(self.bases, ReferenceBases::Indexed { .. })
    }

    #[must_use]
    pub fn has_sequence(&self, name: &str) -> bool {
        match &self.bases {
            ReferenceBases::InMemory(sequences) => sequences.contains_key(name),
            ReferenceBases::Indexed { lengths, .. } => lengths.contains_key(name),
        }
    }

    fn sequence_count(&self) -> usize {
        match &self.bases {
            ReferenceBases::InMemory(sequences) => sequences.len(),
            ReferenceBases::Indexed { lengths, .. } => lengths.len(),
        }
    }

    #[must_use]
    pub fn known_sites(&self) -> &KnownSites {
        &self.known_sites
    }

    /// Reference bases under `span`, clipped to the contig end
    fn window(&self, span: &GenomicInterval) -> Result<Option<ReferenceWindow>, PolicyError> {
        match &self.bases {
            ReferenceBases::InMemory(sequences) => {
                Ok(sequences.get(&span.contig).and_then(|bases| {
                    let first = usize::try_from(span.start.checked_sub(1)?).ok()?;
                    let last = usize::try_from(span.end).ok()?.min(bases.len());
                    (first < last).then(|| ReferenceWindow {
                        start: span.start,
                        bases: bases[first..last].to_vec(),
                    })
                }))
            }
            ReferenceBases::Indexed { reader, lengths } => {
                let Some(&length) = lengths.get(&span.contig) else {
                    return Ok(None);
                };
                let end = span.end.min(length);
                if span.start == 0 || span.start > end {
                    return Ok(None);
                }

                let position = |n: u64| {
                    usize::try_from(n)
                        .ok()
                        .and_then(Position::new)
                        .ok_or_else(|| PolicyError::Failed(format!("invalid position {n}")))
                };
                let region = Region::new(span.contig.clone(), position(span.start)?..=position(end)?);

                let record = reader
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .query(&region)
                    .map_err(|e| PolicyError::Failed(format!("reference query {region}: {e}")))?;

                Ok(Some(ReferenceWindow {
                    start: span.start,
                    bases: record.sequence().as_ref().to_vec(),
                }))
            }
        }
    }
}

fn fai_path(reference: &Path) -> PathBuf {
    let mut path = reference.as_os_str().to_owned();
    path.push(".fai");
    PathBuf::from(path)
}

impl ContextLookup for ReferenceLookup {
    fn lookup(&self, span: &GenomicInterval) -> Result<Context, PolicyError> {
        Ok(Context {
            reference: self.window(span)?,
            known_sites: self.known_sites.within(span),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> ReferenceLookup {
        ReferenceLookup::new(vec![ReferenceSequence {
            name: "chr1".to_string(),
            bases: b"ACGTACGTAC".to_vec(),
        }])
        .with_known_sites(&[
            GenomicInterval::new("chr1", 3, 3),
            GenomicInterval::new("chr1", 8, 9),
        ])
    }

    #[test]
    fn test_lookup_reference_window() {
        let context = lookup().lookup(&GenomicInterval::new("chr1", 2, 5)).unwrap();

        let window = context.reference.unwrap();
        assert_eq!(window.start, 2);
        assert_eq!(window.bases, b"CGTA".to_vec());
        assert_eq!(context.known_sites, vec![3]);
    }

    #[test]
    fn test_lookup_clipped_at_contig_end() {
        let context = lookup().lookup(&GenomicInterval::new("chr1", 8, 15)).unwrap();

        assert_eq!(context.reference.unwrap().bases, b"TAC".to_vec());
        assert_eq!(context.known_sites, vec![8, 9]);
    }

    #[test]
    fn test_lookup_without_matches_is_empty() {
        let lookup = lookup();

        assert!(lookup.lookup(&GenomicInterval::new("chr2", 1, 5)).unwrap().is_empty());
        assert!(lookup.lookup(&GenomicInterval::new("chr1", 20, 30)).unwrap().is_empty());
        assert!(EmptyLookup.lookup(&GenomicInterval::new("chr1", 1, 5)).unwrap().is_empty());
    }

    /// `ref.fa` wrapped at four bases per line, with its `.fai`
    fn indexed_fasta(dir: &Path) -> PathBuf {
        let path = dir.join("ref.fa");
        std::fs::write(&path, ">chr1\nACGT\nACGT\nAC\n>chr2\nGGCC\n").unwrap();
        std::fs::write(
            dir.join("ref.fa.fai"),
            "chr1\t10\t6\t4\t5\nchr2\t4\t25\t4\t5\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_indexed_reference_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = indexed_fasta(dir.path());
        let indexed = ReferenceLookup::load(&path, &[]).unwrap();
        assert!(indexed.is_indexed());
        assert!(indexed.has_sequence("chr2"));

        let window = |span: GenomicInterval| indexed.lookup(&span).unwrap().reference;
        let across_lines = window(GenomicInterval::new("chr1", 3, 6)).unwrap();
        assert_eq!(across_lines.start, 3);
        assert_eq!(across_lines.bases, b"GTAC".to_vec());
        assert_eq!(window(GenomicInterval::new("chr1", 8, 15)).unwrap().bases, b"TAC".to_vec());
        assert_eq!(window(GenomicInterval::new("chr2", 1, 4)).unwrap().bases, b"GGCC".to_vec());
        assert!(window(GenomicInterval::new("chr1", 11, 20)).is_none());
        assert!(window(GenomicInterval::new("chr3", 1, 5)).is_none());
    }

    #[test]
    fn test_indexed_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = indexed_fasta(dir.path());
        let indexed = ReferenceLookup::indexed(&path).unwrap();
        let in_memory = ReferenceLookup::new(load_fasta_file(&path).unwrap());
        assert!(!in_memory.is_indexed());

        for span in [
            GenomicInterval::new("chr1", 1, 10),
            GenomicInterval::new("chr1", 4, 9),
            GenomicInterval::new("chr2", 2, 3),
        ] {
            assert_eq!(
                indexed.lookup(&span).unwrap(),
                in_memory.lookup(&span).unwrap()
            );
        }
    }

    #[test]
    fn test_known_sites_count() {
        let lookup = lookup();
        assert_eq!(lookup.known_sites().len(), 3);
        assert!(lookup.has_sequence("chr1"));
        assert!(!lookup.has_sequence("chr2"));
    }
}
