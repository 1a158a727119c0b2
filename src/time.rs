//! Time conversion subsystem: ticks <-> datetimes across the four flat file
//! epochs, leap-second aware for `Y2000`/`J2000`.
//!
//! The leap table is passed in explicitly rather than kept as a global
//! singleton (see `DESIGN.md`), so tests can substitute small fixture
//! tables instead of loading the full historical `leap-seconds.list`.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::epoch::{Epoch, OFST_DELTA};
use crate::leap_table::LeapTable;

/// A half-open `[start, end)` range of indices into a ticks/dates array that
/// represent the same leap-second instant. A single true-leap tick is
/// `LeapRange { start: i, end: i + 1 }`; a run of repeated ticks at the same
/// leap instant produces a wider range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeapRange {
    pub start: usize,
    pub end: usize,
}

impl LeapRange {
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

fn duration_seconds(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => d.num_milliseconds() as f64 / 1_000.0,
    }
}

fn seconds_duration(secs: f64) -> Duration {
    Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

/// Leftmost index `p` such that `ticks[p] >= target` (equivalent to Python's
/// `bisect.bisect_left`).
fn bisect_left(ticks: &[f64], target: f64) -> usize {
    ticks.partition_point(|&t| t < target)
}

fn bisect_left_dates(dates: &[NaiveDateTime], target: NaiveDateTime) -> usize {
    dates.partition_point(|&d| d < target)
}

/// Cumulative leap value "in force" at `query`, using the same leftmost
/// (ceiling) bisection the flat-file format's reference implementation
/// applies when walking the leap table by date. Returns `0.0` if `query`
/// precedes the table's first entry.
fn leap_value_at(leaps: &LeapTable, query: NaiveDateTime) -> f64 {
    let entries = leaps.entries();
    if entries.is_empty() || entries[0].date > query {
        return 0.0;
    }
    let dates: Vec<NaiveDateTime> = entries.iter().map(|e| e.date).collect();
    let idx = bisect_left_dates(&dates, query);
    if idx >= entries.len() {
        entries.last().map(|e| e.leap_seconds).unwrap_or(0.0)
    } else {
        entries[idx].leap_seconds
    }
}

/// Map a single UTC-naive datetime to a tick count relative to `epoch`.
///
/// For leap-free epochs (`Y1966`, `Y1970`) this is just elapsed seconds.
/// For leap-aware epochs (`Y2000`, `J2000`) the difference between the
/// cumulative leap value at `date` and at the epoch's reference datetime is
/// added, so ticks advance through leap seconds the way a TAI count would.
#[must_use]
pub fn date_to_tick(date: NaiveDateTime, epoch: Epoch, leaps: &LeapTable) -> f64 {
    let epoch_dt = epoch.reference_datetime();
    let elapsed = duration_seconds(date - epoch_dt);
    if epoch.is_leap_free() {
        return elapsed;
    }
    let base_leap = leap_value_at(leaps, epoch_dt);
    let ref_leap = leap_value_at(leaps, date);
    elapsed + (ref_leap - base_leap)
}

/// Map an ascending sequence of datetimes to ticks relative to `epoch`.
#[must_use]
pub fn dates_to_ticks(dates: &[NaiveDateTime], epoch: Epoch, leaps: &LeapTable) -> Vec<f64> {
    dates.iter().map(|d| date_to_tick(*d, epoch, leaps)).collect()
}

/// Map a single tick to a UTC-naive datetime relative to `epoch`.
#[must_use]
pub fn tick_to_date(tick: f64, epoch: Epoch, leaps: &LeapTable) -> NaiveDateTime {
    ticks_to_dates(&[tick], epoch, leaps).0[0]
}

/// Map an ascending sequence of ticks relative to `epoch` to UTC-naive
/// datetimes, along with the index ranges that land exactly on a leap
/// second instant.
///
/// See spec §4.2 for the full algorithm; this implements the corrected
/// (leftmost-insertion, `leap <= t0` base-selection) variant documented in
/// `DESIGN.md`.
#[must_use]
pub fn ticks_to_dates(
    ticks: &[f64],
    epoch: Epoch,
    leaps: &LeapTable,
) -> (Vec<NaiveDateTime>, Vec<LeapRange>) {
    if ticks.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let epoch_dt = epoch.reference_datetime();

    if epoch.is_leap_free() {
        let dates = ticks
            .iter()
            .map(|t| epoch_dt + seconds_duration(*t))
            .collect();
        return (dates, Vec::new());
    }

    let t0 = ticks[0];
    let t1 = ticks[ticks.len() - 1];

    let entries = leaps.entries();
    let nineteen_ninety_nine = NaiveDate::from_ymd_opt(1999, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let apply_table_delta = epoch_dt > nineteen_ninety_nine;

    let leap_ticks: Vec<f64> = entries
        .iter()
        .map(|e| date_to_tick(e.date, epoch, leaps))
        .collect();
    let leap_values: Vec<f64> = entries
        .iter()
        .map(|e| {
            if apply_table_delta {
                e.leap_seconds - OFST_DELTA
            } else {
                e.leap_seconds
            }
        })
        .collect();

    let mut base_leap_offset = 0.0;
    let mut leap_offsets = Vec::new();
    let mut leap_indices = Vec::new();
    let mut leap_ranges = Vec::new();

    for (&leap, &leapval) in leap_ticks.iter().zip(&leap_values) {
        if leap >= t0 && leap <= t1 {
            let index = bisect_left(ticks, leap);
            leap_offsets.push(leapval);
            leap_indices.push(index);

            let start = if index < ticks.len() && ticks[index] == leap {
                Some(index)
            } else if index >= 1 && ticks[index - 1] == leap {
                Some(index - 1)
            } else {
                None
            };
            if let Some(start) = start {
                let mut end = start + 1;
                while end < ticks.len() && ticks[end] == leap {
                    end += 1;
                }
                leap_ranges.push(LeapRange { start, end });
            }
        } else if leap <= t0 {
            base_leap_offset = leapval;
        }
    }

    let mut dates: Vec<NaiveDateTime> = ticks
        .iter()
        .map(|t| epoch_dt + seconds_duration(*t))
        .collect();

    let (bases, pairs): (Vec<f64>, Vec<usize>) = if leap_indices.is_empty() {
        (vec![base_leap_offset], vec![0, ticks.len()])
    } else {
        let mut bases = vec![base_leap_offset];
        bases.extend(leap_offsets);
        let mut pairs = vec![0];
        pairs.extend(leap_indices);
        pairs.push(ticks.len());
        (bases, pairs)
    };

    for z in 0..bases.len() {
        let (s, e) = (pairs[z], pairs[z + 1]);
        let offset = seconds_duration(bases[z]);
        for slot in &mut dates[s..e] {
            *slot -= offset;
        }
    }

    (dates, leap_ranges)
}

fn is_leap_index(ranges: &[LeapRange], index: usize) -> bool {
    ranges.iter().any(|r| r.contains(index))
}

/// `HH:MM:` prefix plus the seconds field (`"60"` if this index is a true
/// leap, otherwise the datetime's own two-digit seconds) and a
/// zero-padded fractional part of `frac_digits` digits.
fn format_seconds(dt: NaiveDateTime, is_leap: bool, frac_digits: u32) -> String {
    let sec = if is_leap {
        "60".to_string()
    } else {
        format!("{:02}", dt.second())
    };
    let nanos = dt.nanosecond();
    let frac = match frac_digits {
        3 => format!("{:03}", nanos / 1_000_000),
        6 => format!("{:06}", nanos / 1_000),
        other => panic!("unsupported fractional digit width: {other}"),
    };
    format!("{sec}.{frac}")
}

/// `YYYY-MM-DDTHH:MM:SS.sss`, millisecond precision, with `:60` substituted
/// on exact leap-second ticks.
#[must_use]
pub fn ticks_to_iso(ticks: &[f64], epoch: Epoch, leaps: &LeapTable) -> Vec<String> {
    if ticks.is_empty() {
        return Vec::new();
    }
    let (dates, ranges) = ticks_to_dates(ticks, epoch, leaps);
    dates
        .iter()
        .enumerate()
        .map(|(i, dt)| {
            let prefix = dt.format("%Y-%m-%dT%H:%M:");
            format!("{prefix}{}", format_seconds(*dt, is_leap_index(&ranges, i), 3))
        })
        .collect()
}

/// `YYYY DDD Mon DD HH:MM:SS.ssssss`, microsecond precision and
/// day-of-year, with `:60` substituted on exact leap-second ticks.
#[must_use]
pub fn ticks_to_timestamps(ticks: &[f64], epoch: Epoch, leaps: &LeapTable) -> Vec<String> {
    if ticks.is_empty() {
        return Vec::new();
    }
    let (dates, ranges) = ticks_to_dates(ticks, epoch, leaps);
    dates
        .iter()
        .enumerate()
        .map(|(i, dt)| {
            let prefix = dt.format("%Y %j %b %d %H:%M:");
            format!("{prefix}{}", format_seconds(*dt, is_leap_index(&ranges, i), 6))
        })
        .collect()
}

#[must_use]
pub fn tick_to_iso_ts(tick: f64, epoch: Epoch, leaps: &LeapTable) -> String {
    ticks_to_iso(&[tick], epoch, leaps).remove(0)
}

#[must_use]
pub fn tick_to_ts(tick: f64, epoch: Epoch, leaps: &LeapTable) -> String {
    ticks_to_timestamps(&[tick], epoch, leaps).remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_leaps() -> LeapTable {
        let data = "\
2272060800\t10\t# 1 Jan 1972\n\
2303683200\t11\t# 1 Jan 1973\n\
3029443200\t32\t# 1 Jan 1999\n\
3692217600\t33\t# 1 Jan 2006\n\
3850070400\t34\t# 1 Jan 2009\n";
        LeapTable::load_reader(data.as_bytes()).unwrap()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn epoch_zero_tick_roundtrip() {
        let leaps = fixture_leaps();
        for epoch in Epoch::ALL {
            let expect = epoch.reference_datetime();
            assert_eq!(tick_to_date(0.0, epoch, &leaps), expect);
        }
    }

    #[test]
    fn leapless_arithmetic() {
        let leaps = fixture_leaps();
        let year = 365.0 * 86400.0;
        let day = 86400.0;

        let tick = date_to_tick(dt(1970, 1, 1, 0, 0, 0), Epoch::Y1966, &leaps);
        assert_eq!(tick, year * 4.0 + day);

        let tick = date_to_tick(dt(1971, 1, 1, 0, 0, 0), Epoch::Y1970, &leaps);
        assert_eq!(tick, year);
    }

    #[test]
    fn y2000_leap_arithmetic() {
        let leaps = fixture_leaps();
        let year = 365.0 * 86400.0;
        let day = 86400.0;

        let y2000 = date_to_tick(dt(2004, 1, 1, 0, 0, 0), Epoch::Y2000, &leaps);
        assert_eq!(y2000, year * 4.0 + day + OFST_DELTA);

        let j2000 = date_to_tick(dt(2004, 1, 1, 0, 0, 0), Epoch::J2000, &leaps);
        assert_eq!(j2000, y2000 - 43_200.0);
    }

    #[test]
    fn date_to_tick_tick_to_date_roundtrip() {
        let leaps = fixture_leaps();
        for epoch in Epoch::ALL {
            for date in [
                dt(1968, 6, 15, 3, 4, 5),
                dt(1972, 1, 1, 0, 0, 0),
                dt(2001, 3, 3, 12, 0, 0),
                dt(2010, 11, 30, 19, 5, 19),
            ] {
                let tick = date_to_tick(date, epoch, &leaps);
                assert_eq!(tick_to_date(tick, epoch, &leaps), date, "epoch={epoch}");
            }
        }
    }

    #[test]
    fn leap_free_epochs_never_report_leaps() {
        let leaps = fixture_leaps();
        for epoch in [Epoch::Y1966, Epoch::Y1970] {
            let leap_date = dt(2006, 1, 1, 0, 0, 0);
            let tick = date_to_tick(leap_date, epoch, &leaps);
            let (dates, ranges) = ticks_to_dates(&[tick - 1.0, tick], epoch, &leaps);
            assert!(ranges.is_empty());
            assert_eq!(dates[1], leap_date);
        }
    }

    #[test]
    fn exact_leap_for_y2000_family() {
        let leaps = fixture_leaps();
        for epoch in [Epoch::Y2000, Epoch::J2000] {
            for leap_date in [dt(2006, 1, 1, 0, 0, 0), dt(2009, 1, 1, 0, 0, 0)] {
                let leap_tick = date_to_tick(leap_date, epoch, &leaps);
                let (dates, ranges) =
                    ticks_to_dates(&[leap_tick - 1.0, leap_tick], epoch, &leaps);
                assert_eq!(ranges.len(), 1);
                assert_eq!(ranges[0], LeapRange { start: 1, end: 2 });
                assert_eq!(dates[1], leap_date - Duration::seconds(1));
                assert_eq!(dates[0], dates[1]);
            }
        }
    }

    #[test]
    fn repeated_leap_ticks_both_flagged() {
        let leaps = fixture_leaps();
        let leap_date = dt(2006, 1, 1, 0, 0, 0);
        let leap_tick = date_to_tick(leap_date, Epoch::Y2000, &leaps);
        let (dates, ranges) =
            ticks_to_dates(&[leap_tick, leap_tick], Epoch::Y2000, &leaps);
        assert_eq!(ranges, vec![LeapRange { start: 0, end: 2 }]);
        assert_eq!(dates[0], dates[1]);
    }

    #[test]
    fn general_leap_ticks_detected_at_expected_indices() {
        let leaps = fixture_leaps();
        for epoch in [Epoch::Y2000, Epoch::J2000] {
            let leap_dates = [
                dt(1974, 1, 1, 0, 0, 0),
                dt(2006, 1, 1, 0, 0, 0),
                dt(2009, 1, 1, 0, 0, 0),
            ];
            let mut ticks = Vec::new();
            for leap_date in leap_dates {
                let t = date_to_tick(leap_date, epoch, &leaps);
                ticks.push(t);
                ticks.push(t + 1.0);
            }
            let (dates, ranges) = ticks_to_dates(&ticks, epoch, &leaps);
            assert_eq!(ranges.len(), 3);
            for (i, r) in ranges.iter().enumerate() {
                assert_eq!(*r, LeapRange { start: i * 2, end: i * 2 + 1 });
            }
            assert_eq!(dates[1], dates[0] + Duration::seconds(1));
        }
    }

    #[test]
    fn iso_formatting_substitutes_leap_second() {
        let leaps = fixture_leaps();
        let leap_date = dt(2006, 1, 1, 0, 0, 0);
        let leap_tick = date_to_tick(leap_date, Epoch::Y2000, &leaps);
        let ts = ticks_to_iso(&[leap_tick - 1.0, leap_tick], Epoch::Y2000, &leaps);
        assert_eq!(ts[0], "2005-12-31T23:59:59.000");
        assert_eq!(ts[1], "2005-12-31T23:59:60.000");
    }

    #[test]
    fn timestamps_formatting_includes_day_of_year() {
        let leaps = fixture_leaps();
        let tick = date_to_tick(dt(2018, 11, 30, 19, 5, 19), Epoch::Y1966, &leaps);
        let ts = tick_to_ts(tick, Epoch::Y1966, &leaps);
        assert_eq!(ts, "2018 334 Nov 30 19:05:19.000000");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let leaps = fixture_leaps();
        let (dates, ranges) = ticks_to_dates(&[], Epoch::Y2000, &leaps);
        assert!(dates.is_empty());
        assert!(ranges.is_empty());
        assert!(ticks_to_iso(&[], Epoch::Y2000, &leaps).is_empty());
        assert!(dates_to_ticks(&[], Epoch::Y2000, &leaps).is_empty());
    }
}
