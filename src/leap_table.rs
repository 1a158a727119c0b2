use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// A single entry from a `leap-seconds.list` table: the UTC instant at which
/// the cumulative TAI-UTC offset became `leap_seconds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeapEntry {
    /// Raw NTP (seconds-since-1900) timestamp as it appears in the source file.
    pub tai_seconds: f64,
    /// Cumulative leap second count in effect at and after `date`.
    pub leap_seconds: f64,
    /// UTC-naive instant the offset takes effect.
    pub date: NaiveDateTime,
}

/// Ordered table of leap second boundaries, loaded once and passed to
/// [`crate::time`] functions rather than kept as a global singleton.
#[derive(Debug, Clone, Default)]
pub struct LeapTable {
    entries: Vec<LeapEntry>,
}

/// `strptime`-equivalent format of the trailing comment on a data line,
/// e.g. `# 1 Jan 1972` (see `original_source/fflib/leap_table.py`'s
/// `date_fmt = '# %d %b %Y'`).
const DATE_FMT: &str = "# %d %b %Y";

impl LeapTable {
    /// Load from an IANA `leap-seconds.list`-formatted reader.
    ///
    /// Comment lines (anything starting with `#`, including the `#$`/`#@`/
    /// `#h` administrative lines) are skipped; a data line is
    /// `<tai_seconds>\t<cumulative_leap>\t<comment>`, tab-separated, with the
    /// boundary date recovered from the comment field rather than the raw
    /// NTP timestamp. This mirrors the pure, declarative parse in
    /// `original_source/fflib/leap_table.py` rather than relying on a
    /// third-party parser's validation of fields this crate never reads
    /// (update/expiration/hash lines).
    pub fn load_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(Error::MalformedHeader(format!(
                    "leap table: expected 3 tab-separated fields, got {:?}",
                    line
                )));
            }
            let tai_seconds: f64 = fields[0].trim().parse().map_err(|_| {
                Error::MalformedHeader(format!("leap table: bad tai_seconds {:?}", fields[0]))
            })?;
            let leap_seconds: f64 = fields[1].trim().parse().map_err(|_| {
                Error::MalformedHeader(format!("leap table: bad leap_seconds {:?}", fields[1]))
            })?;
            let date = chrono::NaiveDate::parse_from_str(fields[2].trim(), DATE_FMT)
                .map_err(|_| {
                    Error::MalformedHeader(format!("leap table: bad date comment {:?}", fields[2]))
                })?
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time");
            entries.push(LeapEntry {
                tai_seconds,
                leap_seconds,
                date,
            });
        }
        // The source list is already date-ordered, but assert the invariant
        // explicitly rather than trusting the upstream file.
        entries.sort_by_key(|e| e.date);

        Ok(LeapTable { entries })
    }

    /// Load from a path on disk.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::MissingFile(path.to_path_buf()))?;
        Self::load_reader(BufReader::new(file))
    }

    /// All entries, ascending by date.
    #[must_use]
    pub fn entries(&self) -> &[LeapEntry] {
        &self.entries
    }

    /// Cumulative leap offset in effect at `date`: the value of the leftmost
    /// entry whose date is `<= date`, or `0.0` if `date` precedes the table's
    /// first entry.
    #[must_use]
    pub fn lookup(&self, date: NaiveDateTime) -> f64 {
        match self.entries.first() {
            Some(first) if first.date > date => 0.0,
            None => 0.0,
            _ => {
                let idx = self.entries.partition_point(|e| e.date <= date);
                self.entries[idx - 1].leap_seconds
            }
        }
    }
}
