use std::io::stderr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flatfile::{FlatFileReader, LeapTable};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Print the header summary and date range for a flat file pair.
#[derive(Parser)]
#[command(about, long_about = None)]
struct Cli {
    /// Basename shared by the `.ffh`/`.ffd` pair (without extension).
    basename: String,

    /// Path to an IANA `leap-seconds.list` file, used to report the date
    /// range for leap-aware epochs (Y2000/J2000).
    #[arg(long, value_name = "path")]
    leap_seconds: PathBuf,

    /// Logging level filter, e.g. debug, info, warn.
    #[arg(short, long, default_value = "info")]
    logging: String,
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let leaps = LeapTable::load_path(&cli.leap_seconds)?;
    let mut reader = FlatFileReader::open(&cli.basename)?;
    println!("{}", reader.list_header(&leaps)?);
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
        error!(%err, "fflist failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_basename_and_leap_seconds() {
        let cli = Cli::try_parse_from(["fflist", "sample", "--leap-seconds", "leap-seconds.list"])
            .unwrap();
        assert_eq!(cli.basename, "sample");
        assert_eq!(cli.leap_seconds, PathBuf::from("leap-seconds.list"));
    }

    #[test]
    fn rejects_missing_basename() {
        assert!(Cli::try_parse_from(["fflist", "--leap-seconds", "x"]).is_err());
    }
}
