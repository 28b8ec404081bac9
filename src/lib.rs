//! # reads-preprocess
//!
//! Orchestration of a read preprocessing pipeline: duplicate marking,
//! reference and known-variant context annotation, base quality
//! recalibration model fitting, and recalibration application.
//!
//! The statistics of each step sit behind pluggable policies. What this crate
//! guarantees is the shape of the run:
//!
//! - Every per-record stage is one record in, one record out, and runs in
//!   parallel over disjoint interval partitions.
//! - The header is a broadcast value available from the start.
//! - The recalibration model is fitted exactly once, from every enriched
//!   record of the run, and broadcast only after that aggregation is closed.
//!   No record is recalibrated before the model is published.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reads_preprocess::{AlignmentFileSource, PipelineDriver, ReferenceLookup};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let source = AlignmentFileSource::new("sample.bam")?;
//! let lookup = ReferenceLookup::load("ref.fa".as_ref(), &[])?;
//!
//! let driver = PipelineDriver::new(source, Arc::new(lookup));
//! let output = driver.run(None).await?;
//!
//! println!("{} records, model {}", output.records.len(), output.model.digest());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Records, headers, intervals, context and the model
//! - [`parsing`]: SAM/BAM headers, interval specifications, FASTA and VCF inputs
//! - [`source`]: Record sources and the native record adapter
//! - [`lookup`]: Reference and known-variant context lookups
//! - [`pipeline`]: Stages, broadcasts, the aggregation barrier and the driver
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod lookup;
pub mod parsing;
pub mod pipeline;
pub mod source;
pub mod utils;

// Re-export commonly used types for convenience
pub use core::cigar::Cigar;
pub use core::contig::Contig;
pub use core::header::{Header, ReadGroup};
pub use core::interval::{GenomicInterval, IntervalSet};
pub use core::model::RecalibrationModel;
pub use core::record::Record;
pub use lookup::{ContextLookup, EmptyLookup, ReferenceLookup};
pub use pipeline::{PipelineConfig, PipelineDriver, PipelineError, PipelineInputs, PipelineOutput};
pub use source::{AlignmentFileSource, InMemorySource, RecordSource};
