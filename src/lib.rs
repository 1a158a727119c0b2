//! Reader/writer for the legacy scientific flat-file (FF) time series
//! format: a paired ASCII header (`.ffh`) and big-endian binary record
//! table (`.ffd`), with leap-second-aware time conversion across four
//! historical epochs.

pub mod epoch;
pub mod error;
pub mod flatfile;
pub mod header;
pub mod leap_table;
pub mod record;
pub mod time;

pub use epoch::{Epoch, OFST_DELTA};
pub use error::{Error, Result};
pub use flatfile::{FlatFileReader, FlatFileWriter};
pub use header::{ColumnDescriptor, Header};
pub use leap_table::{LeapEntry, LeapTable};
pub use record::{RecordReader, RecordTable, RecordWriter};
pub use time::{
    date_to_tick, dates_to_ticks, tick_to_date, tick_to_iso_ts, tick_to_ts, ticks_to_dates,
    ticks_to_iso, ticks_to_timestamps, LeapRange,
};
