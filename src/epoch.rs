use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::Error;

/// Seconds subtracted from the nominal 2000-01-01 reference dates to form the
/// `Y2000`/`J2000` epochs. Should physically be 32.184s (TAI-TT), but the
/// flat file format has always used the integer value and changing it would
/// break interoperability with existing files.
pub const OFST_DELTA: f64 = 32.0;

/// Named reference instant a tick is relative to.
///
/// `Y1966` and `Y1970` are leap-free: ticks are bare elapsed UTC seconds from
/// the reference datetime. `Y2000` and `J2000` are leap-aware: ticks advance
/// through leap seconds the way a TAI count would, minus the fixed
/// [`OFST_DELTA`] offset baked into the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Epoch {
    Y1966,
    Y1970,
    Y2000,
    J2000,
}

impl Epoch {
    pub const ALL: [Epoch; 4] = [Epoch::Y1966, Epoch::Y1970, Epoch::Y2000, Epoch::J2000];

    /// `true` for epochs whose ticks never absorb leap seconds.
    #[must_use]
    pub fn is_leap_free(self) -> bool {
        matches!(self, Epoch::Y1966 | Epoch::Y1970)
    }

    /// The UTC-naive reference datetime this epoch's ticks are relative to.
    #[must_use]
    pub fn reference_datetime(self) -> NaiveDateTime {
        let base = |y, m, d, h, mi, s| {
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .expect("valid date")
                .and_hms_opt(h, mi, s)
                .expect("valid time")
        };
        match self {
            Epoch::Y1966 => base(1966, 1, 1, 0, 0, 0),
            Epoch::Y1970 => base(1970, 1, 1, 0, 0, 0),
            Epoch::Y2000 => {
                base(2000, 1, 1, 0, 0, 0) - chrono::Duration::seconds(OFST_DELTA as i64)
            }
            Epoch::J2000 => {
                base(2000, 1, 1, 12, 0, 0) - chrono::Duration::seconds(OFST_DELTA as i64)
            }
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Epoch::Y1966 => "Y1966",
            Epoch::Y1970 => "Y1970",
            Epoch::Y2000 => "Y2000",
            Epoch::J2000 => "J2000",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Epoch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Y1966" => Ok(Epoch::Y1966),
            "Y1970" => Ok(Epoch::Y1970),
            "Y2000" => Ok(Epoch::Y2000),
            "J2000" => Ok(Epoch::J2000),
            other => Err(Error::UnknownEpoch(other.to_string())),
        }
    }
}
