//! Command-line interface for reads-preprocess.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **run**: Mark duplicates, annotate context, fit and apply base quality recalibration
//! - **intervals**: Show the interval partitions a run over an input would use
//!
//! ## Usage
//!
//! ```text
//! # Whole reference, summary as text
//! reads-preprocess run -I sample.bam -R ref.fa --known-sites dbsnp.vcf.gz
//!
//! # Restrict to a region and keep the corrected records and the model
//! reads-preprocess run -I sample.bam -R ref.fa -L chr1:1,000,000-2,000,000 \
//!     --output corrected.jsonl --model-out model.json
//!
//! # JSON summary for scripting
//! reads-preprocess --format json run -I sample.bam -R ref.fa
//!
//! # Inspect partitions
//! reads-preprocess intervals -I sample.bam -L targets.bed
//! ```

use clap::{Parser, Subcommand};

pub mod intervals;
pub mod run;

#[derive(Parser)]
#[command(name = "reads-preprocess")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Duplicate marking and base quality recalibration for aligned reads")]
#[command(
    long_about = "reads-preprocess runs the read preprocessing pipeline over a SAM/BAM file.\n\nReads are partitioned by genomic interval and processed in parallel:\n- Duplicates are flagged\n- Each read is annotated with overlapping reference bases and known variant sites\n- A single recalibration model is fitted from every annotated read\n- Base qualities are rewritten from that model once it is complete"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the preprocessing pipeline
    Run(run::RunArgs),

    /// Print the resolved interval partitions for an input
    Intervals(intervals::IntervalsArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}
