use std::path::PathBuf;

use clap::Args;

use crate::cli::OutputFormat;
use crate::core::interval::IntervalSet;
use crate::parsing::intervals::parse_interval_args;
use crate::parsing::sam::parse_file;

#[derive(Args)]
pub struct IntervalsArgs {
    /// Input reads (SAM or BAM); only the header is read
    #[arg(short = 'I', long, required = true)]
    pub input: PathBuf,

    /// Interval or interval file; may be repeated. Defaults to every contig.
    #[arg(short = 'L', long = "intervals")]
    pub intervals: Vec<String>,
}

/// Execute intervals subcommand
///
/// # Errors
///
/// Returns an error if the header cannot be read or the intervals are invalid.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: IntervalsArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let header = parse_file(&args.input)?;
    if verbose {
        eprintln!(
            "Read {} contigs and {} read groups from {}",
            header.contigs.len(),
            header.read_groups.len(),
            args.input.display()
        );
    }

    let explicit = if args.intervals.is_empty() {
        None
    } else {
        Some(parse_interval_args(&args.intervals, &header)?)
    };
    let intervals = IntervalSet::resolve(explicit, &header)?;

    match format {
        OutputFormat::Text => {
            println!(
                "{} partitions covering {} bp",
                intervals.len(),
                intervals.total_bases()
            );
            for (index, interval) in intervals.iter().enumerate() {
                println!("  {index:>4}  {interval}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "partitions": intervals.len(),
                "total_bases": intervals.total_bases(),
                "intervals": intervals,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Tsv => {
            println!("contig\tstart\tend\tlength");
            for interval in intervals.iter() {
                println!(
                    "{}\t{}\t{}\t{}",
                    interval.contig,
                    interval.start,
                    interval.end,
                    interval.len()
                );
            }
        }
    }

    Ok(())
}
