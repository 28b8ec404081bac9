//! Parser for interval specifications.
//!
//! Intervals can be given on the command line or in files:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `chr1` | the whole contig |
//! | `chr1:100-200` | bases 100 to 200 inclusive |
//! | `chr1:100` | the single base 100 |
//! | `chr1:100+` | base 100 to the end of the contig |
//! | `*.bed` | BED file (0-based, half-open) |
//! | `*.interval_list` | Picard interval list (`@` header lines, 1-based) |
//! | any other file | one of the forms above per line |
//!
//! Positions may contain thousands separators (`chr1:1,000-2,000`).

use std::path::Path;

use crate::core::header::Header;
use crate::core::interval::GenomicInterval;
use crate::parsing::sam::ParseError;
use crate::utils::validation::parse_position;

/// Parse interval arguments, reading any argument that names an existing file
///
/// # Errors
///
/// Returns `ParseError::Io` if an interval file cannot be read, or
/// `ParseError::InvalidFormat` for malformed specifications.
pub fn parse_interval_args(args: &[String], header: &Header) -> Result<Vec<GenomicInterval>, ParseError> {
    let mut intervals = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        if path.is_file() {
            intervals.extend(parse_interval_file(path, header)?);
        } else {
            intervals.push(parse_interval(arg, header)?);
        }
    }
    Ok(intervals)
}

/// Parse an interval file, choosing the dialect from the extension
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` for malformed lines.
pub fn parse_interval_file(path: &Path, header: &Header) -> Result<Vec<GenomicInterval>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("bed") => parse_bed_text(&content),
        Some("interval_list") => parse_interval_list_text(&content),
        _ => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| parse_interval(l, header))
            .collect(),
    }
}

/// Parse a single interval specification
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if the specification is malformed or
/// names a contig missing from the dictionary.
pub fn parse_interval(spec: &str, header: &Header) -> Result<GenomicInterval, ParseError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ParseError::InvalidFormat("Empty interval".to_string()));
    }

    // Contig names may themselves contain ':' (e.g. HLA alleles), so try the whole string first
    if let Some(contig) = header.contig(spec) {
        return Ok(GenomicInterval::new(contig.name.clone(), 1, contig.length));
    }

    let (contig_name, range) = spec.rsplit_once(':').ok_or_else(|| {
        ParseError::InvalidFormat(format!("Contig '{spec}' is not in the sequence dictionary"))
    })?;
    let contig = header.contig(contig_name).ok_or_else(|| {
        ParseError::InvalidFormat(format!(
            "Contig '{contig_name}' is not in the sequence dictionary"
        ))
    })?;

    let invalid = || ParseError::InvalidFormat(format!("Invalid interval '{spec}'"));

    let (start, end) = if let Some(start) = range.strip_suffix('+') {
        (parse_position(start).ok_or_else(invalid)?, contig.length)
    } else if let Some((start, end)) = range.split_once('-') {
        (
            parse_position(start).ok_or_else(invalid)?,
            parse_position(end).ok_or_else(invalid)?,
        )
    } else {
        let position = parse_position(range).ok_or_else(invalid)?;
        (position, position)
    };

    if start == 0 || start > end {
        return Err(invalid());
    }

    Ok(GenomicInterval::new(contig.name.clone(), start, end))
}

/// Parse BED text (`chrom<TAB>start<TAB>end`, 0-based half-open)
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for lines with missing or invalid coordinates.
pub fn parse_bed_text(text: &str) -> Result<Vec<GenomicInterval>, ParseError> {
    let mut intervals = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
        {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(ParseError::InvalidFormat(format!(
                "BED line has {} fields, expected at least 3: {}",
                fields.len(),
                line
            )));
        }

        let start = parse_position(fields[1])
            .ok_or_else(|| ParseError::InvalidFormat(format!("Invalid BED start: {}", fields[1])))?;
        let end = parse_position(fields[2])
            .ok_or_else(|| ParseError::InvalidFormat(format!("Invalid BED end: {}", fields[2])))?;
        if end <= start {
            return Err(ParseError::InvalidFormat(format!("Empty BED interval: {line}")));
        }

        intervals.push(GenomicInterval::new(fields[0], start + 1, end));
    }

    Ok(intervals)
}

/// Parse Picard interval list text (`@` header, then `contig start end strand name`)
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for lines with missing or invalid coordinates.
pub fn parse_interval_list_text(text: &str) -> Result<Vec<GenomicInterval>, ParseError> {
    let mut intervals = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('@') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(ParseError::InvalidFormat(format!(
                "Interval list line has {} fields, expected at least 3: {}",
                fields.len(),
                line
            )));
        }

        let start = parse_position(fields[1])
            .ok_or_else(|| ParseError::InvalidFormat(format!("Invalid start: {}", fields[1])))?;
        let end = parse_position(fields[2])
            .ok_or_else(|| ParseError::InvalidFormat(format!("Invalid end: {}", fields[2])))?;

        intervals.push(GenomicInterval::new(fields[0], start, end));
    }

    Ok(intervals)
}
