//! Reference sequence loading from FASTA files using noodles.
//!
//! Supports both uncompressed and gzip/bgzip compressed files.
//!
//! Supported extensions:
//! - `.fa`, `.fasta`, `.fna` (uncompressed)
//! - `.fa.gz`, `.fasta.gz`, `.fna.gz` (gzip compressed)
//! - `.fa.bgz`, `.fasta.bgz`, `.fna.bgz` (bgzip compressed)

use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::fasta;

use crate::parsing::sam::ParseError;
use crate::utils::validation::check_contig_limit;

/// One reference sequence, bases uppercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub bases: Vec<u8>,
}

/// Check if the path has a FASTA extension
pub fn is_fasta_file(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();

    if path_str.ends_with(".fa.gz")
        || path_str.ends_with(".fasta.gz")
        || path_str.ends_with(".fna.gz")
        || path_str.ends_with(".fa.bgz")
        || path_str.ends_with(".fasta.bgz")
        || path_str.ends_with(".fna.bgz")
    {
        return true;
    }

    matches!(
        path.extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
            .as_deref(),
        Some("fa" | "fasta" | "fna")
    )
}

/// Check if the path is a gzipped file
#[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
pub(crate) fn is_gzipped(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    path_str.ends_with(".gz") || path_str.ends_with(".bgz")
}

/// Load every sequence of a FASTA file into memory.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, `ParseError::Noodles` if
/// parsing fails, `ParseError::InvalidFormat` if no sequences are found, or
/// `ParseError::TooManyContigs` if the limit is exceeded.
pub fn load_fasta_file(path: &Path) -> Result<Vec<ReferenceSequence>, ParseError> {
    let file = std::fs::File::open(path)?;
    if is_gzipped(path) {
        let reader = BufReader::new(MultiGzDecoder::new(file));
        load_fasta_reader(&mut fasta::io::Reader::new(reader))
    } else {
        let reader = BufReader::new(file);
        load_fasta_reader(&mut fasta::io::Reader::new(reader))
    }
}

/// Load sequences from FASTA text
///
/// # Errors
///
/// See [`load_fasta_file`].
pub fn load_fasta_text(text: &str) -> Result<Vec<ReferenceSequence>, ParseError> {
    load_fasta_reader(&mut fasta::io::Reader::new(text.as_bytes()))
}

fn load_fasta_reader<R: BufRead>(
    reader: &mut fasta::io::Reader<R>,
) -> Result<Vec<ReferenceSequence>, ParseError> {
    let mut sequences = Vec::new();

    for result in reader.records() {
        let record = result
            .map_err(|e| ParseError::Noodles(format!("Failed to parse FASTA record: {e}")))?;

        if check_contig_limit(sequences.len()).is_some() {
            return Err(ParseError::TooManyContigs(sequences.len()));
        }

        let name = String::from_utf8_lossy(record.name()).to_string();
        let bases: Vec<u8> = record
            .sequence()
            .as_ref()
            .iter()
            .map(u8::to_ascii_uppercase)
            .collect();

        sequences.push(ReferenceSequence { name, bases });
    }

    if sequences.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No sequences found in FASTA file".to_string(),
        ));
    }

    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fasta_file() {
        assert!(is_fasta_file(Path::new("test.fa")));
        assert!(is_fasta_file(Path::new("test.fasta")));
        assert!(is_fasta_file(Path::new("test.fna.gz")));
        assert!(is_fasta_file(Path::new("test.FA.BGZ")));
        assert!(!is_fasta_file(Path::new("test.bam")));
    }

    #[test]
    fn test_load_fasta_text() {
        let fasta = ">chr1 first contig\nACGTacgt\nNNNN\n>chr2\nTTTT\n";
        let sequences = load_fasta_text(fasta).unwrap();

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].name, "chr1");
        assert_eq!(sequences[0].bases, b"ACGTACGTNNNN".to_vec());
        assert_eq!(sequences[1].name, "chr2");
        assert_eq!(sequences[1].bases, b"TTTT".to_vec());
    }

    #[test]
    fn test_load_fasta_empty() {
        assert!(matches!(
            load_fasta_text(""),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_gzipped_fasta_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let file = tempfile::Builder::new().suffix(".fa.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(b">chrM\nGATC\n").unwrap();
        encoder.finish().unwrap();

        let sequences = load_fasta_file(file.path()).unwrap();
        assert_eq!(sequences[0].name, "chrM");
        assert_eq!(sequences[0].bases, b"GATC".to_vec());
    }
}
