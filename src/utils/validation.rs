//! Centralized validation and helper functions.

use crate::core::record::Record;

/// Maximum number of contigs allowed in a single header
pub const MAX_CONTIGS: usize = 100_000;

/// Validate that a string is a valid MD5 checksum (32 hex characters).
///
/// # Examples
///
/// ```
/// use reads_preprocess::utils::validation::is_valid_md5;
///
/// assert!(is_valid_md5("6aef897c3d6ff0c78aff06ac189178dd"));
/// assert!(!is_valid_md5("not-an-md5"));
/// assert!(!is_valid_md5("6aef897c3d6ff0c78aff06ac189178d")); // 31 chars
/// ```
#[must_use]
pub fn is_valid_md5(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalize an MD5 string to lowercase.
/// Returns None if the input is not a valid MD5.
#[must_use]
pub fn normalize_md5(s: &str) -> Option<String> {
    if is_valid_md5(s) {
        Some(s.to_lowercase())
    } else {
        None
    }
}

/// Check if adding another contig would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new contig.
/// Returns an error message if adding would exceed the limit, None if safe to add.
#[must_use]
pub fn check_contig_limit(count: usize) -> Option<String> {
    if count >= MAX_CONTIGS {
        Some(format!(
            "Too many contigs: adding another would exceed maximum of {MAX_CONTIGS}"
        ))
    } else {
        None
    }
}

/// Check that a record's qualities line up with its bases.
///
/// Returns an error message describing the problem, None if the record is well formed.
/// A record without qualities (SAM `*`) is accepted.
#[must_use]
pub fn check_record_shape(record: &Record) -> Option<String> {
    if !record.qualities.is_empty() && record.qualities.len() != record.bases.len() {
        return Some(format!(
            "Record '{}' has {} bases but {} qualities",
            record.name,
            record.bases.len(),
            record.qualities.len()
        ));
    }
    if record.contig.is_some() != record.start.is_some() {
        return Some(format!(
            "Record '{}' has a partial alignment (contig without start or vice versa)",
            record.name
        ));
    }
    if let Some(cigar) = record.cigar.as_ref().filter(|c| !c.is_empty()) {
        if !record.bases.is_empty() && cigar.read_len() != record.bases.len() {
            return Some(format!(
                "Record '{}' has {} bases but CIGAR {cigar} accounts for {}",
                record.name,
                record.bases.len(),
                cigar.read_len()
            ));
        }
    }
    None
}

/// Parse a genomic position, allowing thousands separators (`1,000,000`)
#[must_use]
pub fn parse_position(s: &str) -> Option<u64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_md5() {
        assert!(is_valid_md5("6aef897c3d6ff0c78aff06ac189178dd"));
        assert!(is_valid_md5("AABBCCDD11223344556677889900AABB")); // uppercase ok
        assert!(!is_valid_md5("not-an-md5"));
        assert!(!is_valid_md5("6aef897c3d6ff0c78aff06ac189178d")); // 31 chars
        assert!(!is_valid_md5("")); // empty
        assert!(!is_valid_md5("6aef897c3d6ff0c78aff06ac189178dg")); // invalid char
    }

    #[test]
    fn test_normalize_md5() {
        assert_eq!(
            normalize_md5("6AEF897C3D6FF0C78AFF06AC189178DD"),
            Some("6aef897c3d6ff0c78aff06ac189178dd".to_string())
        );
        assert_eq!(normalize_md5("invalid"), None);
    }

    #[test]
    fn test_check_contig_limit() {
        assert!(check_contig_limit(100).is_none());
        assert!(check_contig_limit(MAX_CONTIGS - 1).is_none());
        assert!(check_contig_limit(MAX_CONTIGS).is_some());
    }

    #[test]
    fn test_check_record_shape() {
        let ok = Record::aligned("r1", "chr1", 1, b"ACGT", &[30; 4]);
        assert!(check_record_shape(&ok).is_none());

        let no_quals = Record::aligned("r2", "chr1", 1, b"ACGT", &[]);
        assert!(check_record_shape(&no_quals).is_none());

        let mismatched = Record::aligned("r3", "chr1", 1, b"ACGT", &[30; 3]);
        assert!(check_record_shape(&mismatched).is_some());

        let mut partial = Record::new("r4", b"A", &[30]);
        partial.contig = Some("chr1".to_string());
        assert!(check_record_shape(&partial).is_some());

        let clipped = Record::aligned("r5", "chr1", 1, b"TTACGT", &[30; 6])
            .with_cigar("2S4M".parse().unwrap());
        assert!(check_record_shape(&clipped).is_none());

        let short_cigar = Record::aligned("r6", "chr1", 1, b"TTACGT", &[30; 6])
            .with_cigar("4M".parse().unwrap());
        assert!(check_record_shape(&short_cigar).is_some());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("1000"), Some(1000));
        assert_eq!(parse_position("1,000,000"), Some(1_000_000));
        assert_eq!(parse_position(" 42 "), Some(42));
        assert_eq!(parse_position(""), None);
        assert_eq!(parse_position("12a"), None);
        assert_eq!(parse_position("-5"), None);
    }
}
