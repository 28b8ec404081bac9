use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::contig::Contig;
use crate::core::header::{Header, ReadGroup};
use crate::utils::validation::{check_contig_limit, normalize_md5};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Too many contigs: {0} exceeds maximum allowed (100000)")]
    TooManyContigs(usize),
}

/// Alignment container formats the pipeline can read records from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    Sam,
    Bam,
}

impl AlignmentFormat {
    /// Detect the format from the file extension; files without an extension are read as SAM
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("sam") | None => Ok(Self::Sam),
            Some("bam") => Ok(Self::Bam),
            Some(ext) => Err(ParseError::UnsupportedFormat(ext.to_string())),
        }
    }
}

/// Parse a SAM/BAM file and extract the header
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, `ParseError::Noodles` if
/// parsing fails, `ParseError::UnsupportedFormat` for unknown extensions,
/// `ParseError::InvalidFormat` if no contigs are found, or
/// `ParseError::TooManyContigs` if the limit is exceeded.
pub fn parse_file(path: &Path) -> Result<Header, ParseError> {
    match AlignmentFormat::from_path(path)? {
        AlignmentFormat::Sam => parse_sam_file(path),
        AlignmentFormat::Bam => parse_bam_file(path),
    }
}

/// Parse a SAM file (text format)
fn parse_sam_file(path: &Path) -> Result<Header, ParseError> {
    use noodles::sam;

    let mut reader = std::fs::File::open(path)
        .map(BufReader::new)
        .map(sam::io::Reader::new)?;

    let header = reader
        .read_header()
        .map_err(|e| ParseError::Noodles(e.to_string()))?;

    header_from_sam(&header, Some(path))
}

/// Parse a BAM file (binary format)
fn parse_bam_file(path: &Path) -> Result<Header, ParseError> {
    use noodles::bam;

    let mut reader = std::fs::File::open(path).map(bam::io::Reader::new)?;

    let header = reader
        .read_header()
        .map_err(|e| ParseError::Noodles(e.to_string()))?;

    header_from_sam(&header, Some(path))
}

/// Convert a noodles header to the pipeline `Header`
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if the header has no reference
/// sequences, or `ParseError::TooManyContigs` if the limit is exceeded.
pub fn header_from_sam(
    header: &noodles::sam::Header,
    source: Option<&Path>,
) -> Result<Header, ParseError> {
    use noodles::sam::header::record::value::map::tag::Other;

    let mut contigs = Vec::new();

    for (name, map) in header.reference_sequences() {
        let name_str = name.to_string();
        let length = map.length().get() as u64;

        let mut contig = Contig::new(name_str, length);

        if let Ok(m5_tag) = Other::try_from(*b"M5") {
            if let Some(md5_value) = map.other_fields().get(&m5_tag) {
                let md5_str = md5_value.to_string();
                if let Some(normalized) = normalize_md5(&md5_str) {
                    contig.md5 = Some(normalized);
                } else {
                    warn!(
                        contig = %contig.name,
                        md5 = %md5_str,
                        "Invalid MD5 checksum format, ignoring"
                    );
                }
            }
        }

        if let Ok(as_tag) = Other::try_from(*b"AS") {
            if let Some(assembly_value) = map.other_fields().get(&as_tag) {
                contig.assembly = Some(assembly_value.to_string());
            }
        }

        if let Ok(ur_tag) = Other::try_from(*b"UR") {
            if let Some(uri_value) = map.other_fields().get(&ur_tag) {
                contig.uri = Some(uri_value.to_string());
            }
        }

        if let Ok(sp_tag) = Other::try_from(*b"SP") {
            if let Some(species_value) = map.other_fields().get(&sp_tag) {
                contig.species = Some(species_value.to_string());
            }
        }

        // AN is a comma-separated list of aliases
        if let Ok(an_tag) = Other::try_from(*b"AN") {
            if let Some(aliases_value) = map.other_fields().get(&an_tag) {
                contig.aliases = split_aliases(&aliases_value.to_string());
            }
        }

        if check_contig_limit(contigs.len()).is_some() {
            return Err(ParseError::TooManyContigs(contigs.len()));
        }

        contigs.push(contig);
    }

    if contigs.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No @SQ lines found in header".to_string(),
        ));
    }

    let read_groups = header
        .read_groups()
        .keys()
        .map(|id| ReadGroup::new(id.to_string()))
        .collect();

    let mut parsed = Header::new(contigs).with_read_groups(read_groups);
    if let Some(path) = source {
        parsed = parsed.with_source(path.display().to_string());
    }

    Ok(parsed)
}

/// Parse header from raw SAM header text
///
/// Reads `@SQ` lines into the sequence dictionary and `@RG` lines into read
/// groups; every other line is ignored.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if no contigs are found, or
/// `ParseError::TooManyContigs` if the limit is exceeded.
pub fn parse_header_text(text: &str) -> Result<Header, ParseError> {
    let mut contigs = Vec::new();
    let mut read_groups = Vec::new();

    for line in text.lines() {
        if line.starts_with("@RG") {
            if let Some(read_group) = parse_read_group_line(line) {
                read_groups.push(read_group);
            }
            continue;
        }
        if !line.starts_with("@SQ") {
            continue;
        }

        let mut name: Option<String> = None;
        let mut length: Option<u64> = None;
        let mut md5_raw: Option<String> = None;
        let mut assembly: Option<String> = None;
        let mut uri: Option<String> = None;
        let mut species: Option<String> = None;
        let mut aliases: Vec<String> = Vec::new();

        for field in line.split('\t').skip(1) {
            if let Some((tag, value)) = field.split_once(':') {
                match tag {
                    "SN" => name = Some(value.to_string()),
                    "LN" => length = value.parse().ok(),
                    "M5" => md5_raw = Some(value.to_string()),
                    "AS" => assembly = Some(value.to_string()),
                    "UR" => uri = Some(value.to_string()),
                    "SP" => species = Some(value.to_string()),
                    "AN" => aliases = split_aliases(value),
                    _ => {}
                }
            }
        }

        let (Some(name), Some(length)) = (name, length) else {
            warn!(line = %line, "Skipping @SQ line without SN and LN");
            continue;
        };

        if check_contig_limit(contigs.len()).is_some() {
            return Err(ParseError::TooManyContigs(contigs.len()));
        }

        let md5 = md5_raw.and_then(|raw| {
            let normalized = normalize_md5(&raw);
            if normalized.is_none() {
                warn!(contig = %name, md5 = %raw, "Invalid MD5 checksum format, ignoring");
            }
            normalized
        });

        let mut contig = Contig::new(name, length);
        contig.md5 = md5;
        contig.assembly = assembly;
        contig.uri = uri;
        contig.species = species;
        contig.aliases = aliases;
        contigs.push(contig);
    }

    if contigs.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No @SQ lines found in header".to_string(),
        ));
    }

    Ok(Header::new(contigs).with_read_groups(read_groups))
}

fn parse_read_group_line(line: &str) -> Option<ReadGroup> {
    let mut read_group: Option<ReadGroup> = None;
    let mut sample = None;
    let mut platform = None;

    for field in line.split('\t').skip(1) {
        match field.split_once(':') {
            Some(("ID", value)) => read_group = Some(ReadGroup::new(value)),
            Some(("SM", value)) => sample = Some(value.to_string()),
            Some(("PL", value)) => platform = Some(value.to_string()),
            _ => {}
        }
    }

    read_group.map(|mut rg| {
        rg.sample = sample;
        rg.platform = platform;
        rg
    })
}

fn split_aliases(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
