use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tracing::info;

use crate::cli::OutputFormat;
use crate::core::model::RecalibrationModel;
use crate::core::record::Record;
use crate::lookup::ReferenceLookup;
use crate::pipeline::config::{PipelineConfig, PipelineInputs, DEFAULT_CHANNEL_CAPACITY};
use crate::pipeline::driver::{PipelineDriver, PipelineOutput, RunSummary};
use crate::source::AlignmentFileSource;

#[derive(Args)]
pub struct RunArgs {
    /// Input reads (SAM or BAM)
    #[arg(short = 'I', long)]
    pub input: Option<PathBuf>,

    /// Reference FASTA (optionally gzipped)
    #[arg(short = 'R', long)]
    pub reference: Option<PathBuf>,

    /// Known variant sites (VCF, optionally gzipped); may be repeated
    #[arg(long = "known-sites")]
    pub known_sites: Vec<PathBuf>,

    /// Interval (chr1, chr1:100-200, chr1:100, chr1:100+) or interval file
    /// (.bed, .interval_list, .list); may be repeated. Defaults to every contig.
    /// Intervals must not overlap; merge them first.
    #[arg(short = 'L', long = "intervals")]
    pub intervals: Vec<String>,

    /// Write recalibrated records as JSON lines
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the recalibration model as JSON
    #[arg(long)]
    pub model_out: Option<PathBuf>,

    /// Runtime worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum partitions processed at once (defaults to the number of CPUs)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Capacity of the channel feeding the model estimator
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl RunArgs {
    fn inputs(&self) -> PipelineInputs {
        PipelineInputs {
            input: self.input.clone(),
            reference: self.reference.clone(),
            known_sites: self.known_sites.clone(),
            intervals: (!self.intervals.is_empty()).then(|| self.intervals.clone()),
        }
    }

    fn config(&self) -> PipelineConfig {
        let config = PipelineConfig::default().with_channel_capacity(self.channel_capacity);
        match self.concurrency {
            Some(concurrency) => config.with_concurrency(concurrency),
            None => config,
        }
    }
}

/// Execute run subcommand
///
/// # Errors
///
/// Returns an error if an input is missing or unreadable, or if the pipeline fails.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: RunArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let inputs = args.inputs();
    inputs.validate()?;
    let (Some(input), Some(reference)) = (inputs.input.as_deref(), inputs.reference.as_deref())
    else {
        anyhow::bail!("both --input and --reference are required");
    };

    let source = AlignmentFileSource::new(input)?;
    let lookup = ReferenceLookup::load(reference, &inputs.known_sites)?;
    let driver =
        PipelineDriver::new(source, Arc::new(lookup)).with_config(args.config());

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = args.threads {
        runtime.worker_threads(threads.max(1));
    }
    let rt = runtime.build()?;
    let output = rt.block_on(async { driver.run(inputs.intervals.as_deref()).await })?;

    if let Some(path) = &args.output {
        write_records(path, &output.records)?;
        info!(path = %path.display(), records = output.records.len(), "Wrote records");
    }
    if let Some(path) = &args.model_out {
        write_model(path, &output.model)?;
        info!(path = %path.display(), "Wrote model");
    }

    match format {
        OutputFormat::Text => print_text_summary(&output, verbose),
        OutputFormat::Json => print_json_summary(&output)?,
        OutputFormat::Tsv => print_tsv_summary(&output.summary),
    }

    Ok(())
}

fn write_records(path: &Path, records: &[Record]) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn write_model(path: &Path, model: &RecalibrationModel) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, model)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn print_text_summary(output: &PipelineOutput, verbose: bool) {
    let summary = &output.summary;

    println!("Pipeline Summary");
    println!("{}", "=".repeat(60));

    println!("\nSource: {}", summary.source);
    println!("  Started: {}", summary.started_at.to_rfc3339());
    println!("  Elapsed: {} ms", summary.elapsed_ms);
    println!("  Partitions: {}", summary.partitions);

    println!("\nRecords:");
    println!("  Read: {}", summary.records_read);
    println!("  Duplicates flagged: {}", summary.duplicates_flagged);
    println!("  With context: {}", summary.records_with_context);
    println!("  Written: {}", summary.records_written);

    println!("\nModel:");
    println!("  Digest: {}", summary.model_digest);
    println!("  Records observed: {}", summary.records_observed);
    println!("  Bases observed: {}", summary.bases_observed);

    if verbose {
        for (read_group, bins) in &output.model.table {
            println!("\n  Read group {read_group}:");
            for (quality, datum) in bins {
                println!(
                    "    Q{quality:<3} -> Q{:<3} ({} observed, {} mismatches)",
                    datum.empirical_quality(),
                    datum.observations,
                    datum.mismatches
                );
            }
        }
    }
}

fn print_json_summary(output: &PipelineOutput) -> anyhow::Result<()> {
    let summary = &output.summary;
    let json = serde_json::json!({
        "source": summary.source,
        "started_at": summary.started_at.to_rfc3339(),
        "elapsed_ms": summary.elapsed_ms,
        "partitions": summary.partitions,
        "intervals": output.intervals.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "records": {
            "read": summary.records_read,
            "duplicates_flagged": summary.duplicates_flagged,
            "with_context": summary.records_with_context,
            "written": summary.records_written,
        },
        "model": {
            "digest": summary.model_digest,
            "records_observed": summary.records_observed,
            "bases_observed": summary.bases_observed,
            "read_groups": output.model.table.keys().collect::<Vec<_>>(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_tsv_summary(summary: &RunSummary) {
    println!(
        "source\tpartitions\trecords_read\tduplicates_flagged\trecords_with_context\trecords_written\tmodel_digest\telapsed_ms"
    );
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        summary.source,
        summary.partitions,
        summary.records_read,
        summary.duplicates_flagged,
        summary.records_with_context,
        summary.records_written,
        summary.model_digest,
        summary.elapsed_ms,
    );
}
