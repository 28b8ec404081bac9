use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::contig::Contig;

/// A read group (`@RG` line) declared in the input header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadGroup {
    /// Read group identifier (ID tag)
    pub id: String,

    /// Sample (SM tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,

    /// Sequencing platform (PL tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl ReadGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sample: None,
            platform: None,
        }
    }
}

/// The record universe shared by every stage of a run: the sequence
/// dictionary (in declaration order) and the read groups.
///
/// Built once from the record source and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Source file path (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// All contigs from @SQ lines, in dictionary order
    pub contigs: Vec<Contig>,

    /// All read groups from @RG lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_groups: Vec<ReadGroup>,

    /// Index: contig name or alias -> position in `contigs`
    #[serde(skip)]
    name_to_index: HashMap<String, usize>,
}

impl Header {
    #[must_use]
    pub fn new(contigs: Vec<Contig>) -> Self {
        let mut header = Self {
            source: None,
            contigs,
            read_groups: Vec::new(),
            name_to_index: HashMap::new(),
        };

        header.rebuild_indexes();
        header
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_read_groups(mut self, read_groups: Vec<ReadGroup>) -> Self {
        self.read_groups = read_groups;
        self
    }

    pub fn rebuild_indexes(&mut self) {
        self.name_to_index.clear();

        // Aliases first so a primary name always wins a collision
        for (index, contig) in self.contigs.iter().enumerate() {
            for alias in &contig.aliases {
                self.name_to_index.entry(alias.clone()).or_insert(index);
            }
        }
        for (index, contig) in self.contigs.iter().enumerate() {
            self.name_to_index.insert(contig.name.clone(), index);
        }
    }

    /// Position of a contig in the dictionary, by name or alias
    #[must_use]
    pub fn contig_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Look up a contig by name or alias
    #[must_use]
    pub fn contig(&self, name: &str) -> Option<&Contig> {
        self.contig_index(name).map(|i| &self.contigs[i])
    }

    /// Sum of all declared contig lengths
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.length).sum()
    }

    #[must_use]
    pub fn has_read_group(&self, id: &str) -> bool {
        self.read_groups.iter().any(|rg| rg.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_new() {
        let contigs = vec![Contig::new("chr1", 100), Contig::new("chr2", 200)];
        let header = Header::new(contigs);

        assert_eq!(header.contigs.len(), 2);
        assert_eq!(header.total_length(), 300);
        assert_eq!(header.contig_index("chr2"), Some(1));
        assert!(header.contig("chr3").is_none());
    }

    #[test]
    fn test_contig_lookup_by_alias() {
        let mut mito = Contig::new("chrM", 16569);
        mito.aliases = vec!["MT".to_string()];
        let header = Header::new(vec![Contig::new("chr1", 100), mito]);

        assert_eq!(header.contig("MT").map(|c| c.name.as_str()), Some("chrM"));
        assert_eq!(header.contig_index("MT"), Some(1));
    }

    #[test]
    fn test_primary_name_wins_over_alias() {
        let mut chr1 = Contig::new("chr1", 100);
        chr1.aliases = vec!["2".to_string()];
        let header = Header::new(vec![chr1, Contig::new("2", 200)]);

        assert_eq!(header.contig_index("2"), Some(1));
    }

    #[test]
    fn test_read_groups() {
        let header = Header::new(vec![Contig::new("chr1", 100)])
            .with_read_groups(vec![ReadGroup::new("rg1"), ReadGroup::new("rg2")]);

        assert!(header.has_read_group("rg1"));
        assert!(!header.has_read_group("rg3"));
    }

    #[test]
    fn test_indexes_survive_serde_round_trip() {
        let header = Header::new(vec![Contig::new("chr1", 100)]).with_source("/path/to/file.bam");
        let json = serde_json::to_string(&header).unwrap();
        let mut restored: Header = serde_json::from_str(&json).unwrap();

        assert!(restored.contig_index("chr1").is_none());
        restored.rebuild_indexes();
        assert_eq!(restored.contig_index("chr1"), Some(0));
        assert_eq!(restored.source.as_deref(), Some("/path/to/file.bam"));
    }
}
