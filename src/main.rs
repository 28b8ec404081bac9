use clap::Parser;
use tracing_subscriber::EnvFilter;

use reads_preprocess::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("reads_preprocess=debug,info")
    } else {
        EnvFilter::new("reads_preprocess=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Run(args) => {
            cli::run::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Intervals(args) => {
            cli::intervals::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
