use serde::{Deserialize, Serialize};

/// A single contig/sequence in the sequence dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
    /// Sequence name (SN tag in SAM)
    pub name: String,

    /// Sequence length (LN tag in SAM)
    pub length: u64,

    /// MD5 checksum of the sequence (M5 tag in SAM)
    /// Lowercase hex, 32 characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    /// Assembly identifier (AS tag in SAM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly: Option<String>,

    /// URI where sequence can be retrieved (UR tag in SAM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Species (SP tag in SAM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,

    /// Known alternative names for this contig
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Contig {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
            md5: None,
            assembly: None,
            uri: None,
            species: None,
            aliases: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    /// Whether `name` refers to this contig, either directly or through an alias
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    /// Whether the 1-based closed range `[start, end]` lies within this contig
    #[must_use]
    pub fn contains_range(&self, start: u64, end: u64) -> bool {
        start >= 1 && start <= end && end <= self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_named_with_aliases() {
        let mut contig = Contig::new("chrM", 16569);
        contig.aliases = vec!["MT".to_string(), "chrMT".to_string()];

        assert!(contig.is_named("chrM"));
        assert!(contig.is_named("MT"));
        assert!(!contig.is_named("M"));
    }

    #[test]
    fn test_contains_range() {
        let contig = Contig::new("chr1", 100);

        assert!(contig.contains_range(1, 100));
        assert!(contig.contains_range(50, 50));
        assert!(!contig.contains_range(0, 10));
        assert!(!contig.contains_range(10, 101));
        assert!(!contig.contains_range(20, 10));
    }

    #[test]
    fn test_with_md5() {
        let contig = Contig::new("chr1", 100).with_md5("6aef897c3d6ff0c78aff06ac189178dd");
        assert_eq!(
            contig.md5.as_deref(),
            Some("6aef897c3d6ff0c78aff06ac189178dd")
        );
    }
}
