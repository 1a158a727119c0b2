use std::io::stderr;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Duration;
use clap::Parser;
use flatfile::{FlatFileReader, FlatFileWriter, LeapTable};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Split a flat file into 4-hour chunks named `ifg_<startUTC>_<endUTC>`.
#[derive(Parser)]
#[command(about, long_about = None)]
struct Cli {
    /// Basename shared by the `.ffh`/`.ffd` pair (without extension).
    basename: String,

    /// Path to an IANA `leap-seconds.list` file.
    #[arg(long, value_name = "path")]
    leap_seconds: PathBuf,

    #[arg(short, long, default_value = "info")]
    logging: String,
}

/// Leftmost index `p` such that `ticks[p] > target` (`bisect.bisect_right`).
fn bisect_right(ticks: &[f64], target: f64) -> usize {
    ticks.partition_point(|&t| t <= target)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let leaps = LeapTable::load_path(&cli.leap_seconds)?;
    let mut reader = FlatFileReader::open(&cli.basename)?;
    let epoch = reader.header().epoch;

    let ticks = reader.ticks()?;
    let data = reader.data(false)?;

    let (t0, t1) = (
        *ticks.first().ok_or_else(|| anyhow::anyhow!("file has no records"))?,
        *ticks.last().unwrap(),
    );
    let (start_date, end_date) = {
        let (dates, _) = flatfile::ticks_to_dates(&[t0, t1], epoch, &leaps);
        (dates[0], dates[1])
    };

    let mut boundaries = Vec::new();
    let chunk = Duration::hours(4);
    let mut cur = start_date;
    while cur < end_date {
        boundaries.push(cur);
        cur += chunk;
    }
    boundaries.push(end_date);

    let mut ranges = Vec::new();
    for pair in boundaries.windows(2) {
        let (dt0, dt1) = (pair[0], pair[1]);
        let tick0 = flatfile::date_to_tick(dt0, epoch, &leaps);
        let tick1 = flatfile::date_to_tick(dt1, epoch, &leaps);
        let mut start = bisect_right(&ticks, tick0);
        if start == 1 {
            start = 0;
        }
        let end = bisect_right(&ticks, tick1);
        if start != end {
            ranges.push((start, end));
        }
    }

    for (start, end) in ranges {
        let chunk_ticks = &ticks[start..end];
        let chunk_data = &data[start..end];

        let first = flatfile::tick_to_date(chunk_ticks[0], epoch, &leaps);
        let last = flatfile::tick_to_date(*chunk_ticks.last().unwrap(), epoch, &leaps);
        let name = format!(
            "ifg_{}_{}",
            first.format("%Y%m%d%H%M%S"),
            last.format("%Y%m%d%H%M%S")
        );

        let mut writer = FlatFileWriter::with_copied_header(&name, &cli.basename)?;
        writer.set_data(chunk_ticks, chunk_data)?;
        writer.write(&leaps)?;
        info!(chunk = %name, rows = chunk_ticks.len(), "wrote chunk");
    }

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
        error!(%err, "ff_split failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
