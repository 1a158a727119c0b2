use std::io::stderr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flatfile::{FlatFileReader, LeapTable};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Write a flat file's record table to a CSV file beside it.
#[derive(Parser)]
#[command(about, long_about = None)]
struct Cli {
    /// Basename shared by the `.ffh`/`.ffd` pair (without extension).
    basename: String,

    /// Path to an IANA `leap-seconds.list` file.
    #[arg(long, value_name = "path")]
    leap_seconds: PathBuf,

    /// Decimal precision for non-time columns.
    #[arg(short, long, default_value_t = 7)]
    precision: usize,

    /// Output path, defaulting to `{basename}.csv`.
    #[arg(short, long, value_name = "path")]
    output: Option<String>,

    #[arg(short, long, default_value = "info")]
    logging: String,
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let leaps = LeapTable::load_path(&cli.leap_seconds)?;
    let mut reader = FlatFileReader::open(&cli.basename)?;
    reader.to_csv(&leaps, cli.output.as_deref(), cli.precision)?;
    info!(basename = %cli.basename, "wrote csv");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(EnvFilter::new(&cli.logging))
        .init();

    if let Err(err) = run(&cli) {
        error!(%err, "ff2csv failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
