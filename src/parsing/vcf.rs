//! Parser for known-variant sites from VCF files.
//!
//! Only the site columns are read (`CHROM`, `POS`, `REF`); each record marks
//! the reference bases it spans as a known site. Filtered records are kept:
//! a known site is masked whatever its filter status.

use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::core::interval::GenomicInterval;
use crate::parsing::fasta::is_gzipped;
use crate::parsing::sam::ParseError;
use crate::utils::validation::parse_position;

/// Read the sites of a VCF file (plain, gzip or bgzip)
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` for malformed data lines.
pub fn parse_vcf_sites_file(path: &Path) -> Result<Vec<GenomicInterval>, ParseError> {
    let file = std::fs::File::open(path)?;
    if is_gzipped(path) {
        parse_vcf_sites_reader(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        parse_vcf_sites_reader(BufReader::new(file))
    }
}

/// Read the sites of VCF text
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for malformed data lines.
pub fn parse_vcf_sites_text(text: &str) -> Result<Vec<GenomicInterval>, ParseError> {
    parse_vcf_sites_reader(text.as_bytes())
}

fn parse_vcf_sites_reader<R: BufRead>(reader: R) -> Result<Vec<GenomicInterval>, ParseError> {
    let mut sites = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        sites.push(parse_site_line(&line, line_number + 1)?);
    }

    Ok(sites)
}

fn parse_site_line(line: &str, line_number: usize) -> Result<GenomicInterval, ParseError> {
    let mut fields = line.split('\t');
    let (Some(chrom), Some(pos), Some(_id), Some(reference)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::InvalidFormat(format!(
            "VCF line {line_number} has fewer than 4 columns"
        )));
    };

    let position = parse_position(pos)
        .filter(|p| *p > 0)
        .ok_or_else(|| {
            ParseError::InvalidFormat(format!("VCF line {line_number} has invalid POS: {pos}"))
        })?;

    let span = reference.len().max(1) as u64;
    Ok(GenomicInterval::new(chrom, position, position + span - 1))
}
