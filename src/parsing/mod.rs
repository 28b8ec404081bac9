//! Parsers for the pipeline's file inputs.
//!
//! This module provides parsers for:
//!
//! - **SAM/BAM headers**: Extract the sequence dictionary (`@SQ`) and read groups (`@RG`)
//! - **Interval specifications**: `chr1:100-200` strings, BED and Picard interval lists
//! - **Reference FASTA**: Load reference bases for context annotation
//! - **Known-sites VCF**: Load known variant positions to mask during recalibration
//!
//! ## Example
//!
//! ```rust,no_run
//! use reads_preprocess::parsing::sam::{parse_file, parse_header_text};
//! use std::path::Path;
//!
//! // Parse from a BAM file
//! let header = parse_file(Path::new("sample.bam")).unwrap();
//!
//! // Or parse from raw header text
//! let text = "@SQ\tSN:chr1\tLN:248956422\tM5:6aef897c3d6ff0c78aff06ac189178dd\n";
//! let header = parse_header_text(text).unwrap();
//! ```
//!
//! ## Supported Tags
//!
//! From SAM `@SQ` lines, the following tags are extracted:
//!
//! | Tag | Description | Required |
//! |-----|-------------|----------|
//! | SN  | Sequence name | Yes |
//! | LN  | Sequence length | Yes |
//! | M5  | MD5 checksum | No |
//! | AS  | Assembly identifier | No |
//! | UR  | URI for sequence | No |
//! | SP  | Species | No |
//! | AN  | Alternate names (aliases) | No |

pub mod fasta;
pub mod intervals;
pub mod sam;
pub mod vcf;
