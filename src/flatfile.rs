//! Façade tying [`Header`], [`RecordReader`]/[`RecordWriter`], and
//! [`crate::time`] together into the read/write API the CLI binaries use.

use chrono::Local;
use csv::Writer as CsvWriter;

use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::leap_table::LeapTable;
use crate::record::{RecordReader, RecordTable, RecordWriter};
use crate::time;

/// Read-only view of an existing `<name>.ffh`/`<name>.ffd` pair.
pub struct FlatFileReader {
    header: Header,
    data: Option<RecordTable>,
}

impl FlatFileReader {
    pub fn open(name: &str) -> Result<Self> {
        let header = Header::read(name)?;
        Ok(FlatFileReader { header, data: None })
    }

    /// Whether both `<name>.ffh` and `<name>.ffd` exist and are non-empty,
    /// matching `ff_reader.check_exists` — a non-erroring existence probe
    /// for callers that want to check before opening.
    #[must_use]
    pub fn exists(name: &str) -> bool {
        [format!("{name}.ffh"), format!("{name}.ffd")]
            .iter()
            .all(|path| std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false))
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    fn ensure_loaded(&mut self) -> Result<&RecordTable> {
        if self.data.is_none() {
            self.data = Some(RecordReader::read(&self.header)?);
        }
        Ok(self.data.as_ref().unwrap())
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.header.nrows(), self.header.ncols())
    }

    /// Data columns, with or without the leading time column.
    pub fn data(&mut self, include_times: bool) -> Result<Vec<Vec<f64>>> {
        let time_index = self.header.time_index();
        let table = self.ensure_loaded()?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                if include_times {
                    row.clone()
                } else {
                    row.iter()
                        .enumerate()
                        .filter(|(i, _)| *i != time_index)
                        .map(|(_, v)| *v)
                        .collect()
                }
            })
            .collect())
    }

    pub fn ticks(&mut self) -> Result<Vec<f64>> {
        let time_index = self.header.time_index();
        let table = self.ensure_loaded()?;
        Ok(table.times(time_index))
    }

    /// Data paired with its column labels, matching `ff_reader.get_data_table`.
    /// The original's structured `numpy` record array has no idiomatic Rust
    /// counterpart, so this returns labels and the plain matrix from
    /// [`Self::data`] side by side; callers wanting a formatted time column
    /// compose with [`Self::timestamps`]/[`Self::datetimes`] instead of a
    /// `time_fmt` string.
    pub fn data_table(&mut self, include_times: bool) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
        let time_index = self.header.time_index();
        let labels: Vec<String> = self
            .header
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| include_times || *i != time_index)
            .map(|(_, c)| c.name.clone())
            .collect();
        let rows = self.data(include_times)?;
        Ok((labels, rows))
    }

    /// Time column rendered as ISO-8601 timestamp strings, matching
    /// `ff_reader.get_times(fmt='timestamps')`.
    pub fn timestamps(&mut self, leaps: &LeapTable) -> Result<Vec<String>> {
        let ticks = self.ticks()?;
        Ok(time::ticks_to_iso(&ticks, self.header.epoch, leaps))
    }

    /// Time column rendered as `NaiveDateTime`s, plus any leap-second
    /// instants encountered, matching `ff_reader.get_times(fmt='datetimes')`.
    pub fn datetimes(
        &mut self,
        leaps: &LeapTable,
    ) -> Result<(Vec<chrono::NaiveDateTime>, Vec<time::LeapRange>)> {
        let ticks = self.ticks()?;
        Ok(time::ticks_to_dates(&ticks, self.header.epoch, leaps))
    }

    /// `(start, end)` tick range, via the fast-path seek when the file size
    /// is exact, otherwise by loading the full table.
    pub fn tick_range(&mut self) -> Result<(f64, f64)> {
        if RecordReader::filesize_is_valid(&self.header).unwrap_or(false) {
            RecordReader::time_range(&self.header)
        } else {
            let ticks = self.ticks()?;
            let first = *ticks
                .first()
                .ok_or_else(|| Error::ShapeMismatch("file has no records".into()))?;
            Ok((first, *ticks.last().unwrap()))
        }
    }

    pub fn time_range(&mut self, leaps: &LeapTable) -> Result<(chrono::NaiveDateTime, chrono::NaiveDateTime)> {
        let (t0, t1) = self.tick_range()?;
        let (dates, _) = time::ticks_to_dates(&[t0, t1], self.header.epoch, leaps);
        Ok((dates[0], dates[1]))
    }

    /// Human-readable summary including the date range, matching
    /// `ff_reader.list_header`'s output.
    pub fn list_header(&mut self, leaps: &LeapTable) -> Result<String> {
        let mut out = self.header.describe();
        if RecordReader::filesize_is_valid(&self.header).unwrap_or(false) {
            let (start, end) = self.time_range(leaps)?;
            out.push_str(&format!("\nDate range: ({start}, {end})"));
        }
        Ok(out)
    }

    /// Memory-mapped view of the raw record bytes.
    pub fn memmap(&self) -> Result<memmap2::Mmap> {
        RecordReader::memmap_table(&self.header)
    }

    /// Write `<name>.csv`: an ISO-millisecond time column followed by the
    /// remaining columns at `%.{prec}f`.
    pub fn to_csv(&mut self, leaps: &LeapTable, name: Option<&str>, prec: usize) -> Result<()> {
        let out_name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.csv", self.header.name));
        let epoch = self.header.epoch;
        let time_index = self.header.time_index();
        let columns = self.header.columns.clone();
        let table = self.ensure_loaded()?.clone();

        let ticks = table.times(time_index);
        let timestamps = time::ticks_to_iso(&ticks, epoch, leaps);

        let mut wtr = CsvWriter::from_path(&out_name).map_err(|e| Error::Csv(e.to_string()))?;

        let mut header_row: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        if let Some(label) = header_row.get_mut(time_index) {
            if !label.to_lowercase().contains("time") {
                *label = "TIME".to_string();
            }
        }
        wtr.write_record(&header_row).map_err(|e| Error::Csv(e.to_string()))?;

        for (row, ts) in table.rows.iter().zip(&timestamps) {
            let mut record = Vec::with_capacity(row.len());
            for (i, value) in row.iter().enumerate() {
                if i == time_index {
                    record.push(ts.clone());
                } else {
                    record.push(format!("{value:.prec$}"));
                }
            }
            wtr.write_record(&record).map_err(|e| Error::Csv(e.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Builder for a fresh `<name>.ffh`/`<name>.ffd` pair.
pub struct FlatFileWriter {
    header: Header,
    data: Option<RecordTable>,
}

impl FlatFileWriter {
    #[must_use]
    pub fn new(name: &str) -> Self {
        FlatFileWriter {
            header: Header::new(name),
            data: None,
        }
    }

    /// Build a writer for `name` whose column table, abstract, epoch, and
    /// error flag are copied from an existing flat file's header, e.g. when
    /// splitting one file into several with the same column layout.
    pub fn with_copied_header(name: &str, source: &str) -> Result<Self> {
        Ok(FlatFileWriter {
            header: Header::new_copied_from(name, source)?,
            data: None,
        })
    }

    pub fn set_epoch(&mut self, epoch: Epoch) {
        self.header.set_epoch(epoch);
    }

    /// Write the column table using the fixed legacy `(3,9,9,25,5,3)`
    /// widths instead of widths sized to the data, for interop with older
    /// flat-file readers.
    pub fn set_compatible(&mut self) {
        self.header.set_compatible();
    }

    pub fn set_labels(&mut self, names: &[String], time_label: &str) {
        let mut full = vec![time_label.to_string()];
        full.extend_from_slice(names);
        self.header.set_columns(&full);
    }

    /// Append a single column to the table incrementally, auto-computing
    /// its index and byte offset, as an alternative to the bulk
    /// [`Self::set_labels`]/[`Self::set_units`]/[`Self::set_sources`] path.
    /// `kind` is `'T'` for the time column (must be first), `'R'` for a
    /// 4-byte real, or `'D'` for an 8-byte real.
    pub fn append_column(&mut self, name: &str, units: &str, source: &str, kind: char) {
        self.header.append_column(name, units, source, kind);
    }

    /// Set non-time column units plus the time column's own unit label.
    /// Fails with `Error::ShapeMismatch` if `units.len()` doesn't match the
    /// number of data columns declared by [`Self::set_labels`].
    pub fn set_units(&mut self, units: &[String], time_units: &str) -> Result<()> {
        let mut full = vec![time_units.to_string()];
        full.extend_from_slice(units);
        self.header.set_units(&full)
    }

    /// Set non-time column sources. Fails with `Error::ShapeMismatch` if
    /// `sources.len()` doesn't match the number of data columns declared by
    /// [`Self::set_labels`].
    pub fn set_sources(&mut self, sources: &[String]) -> Result<()> {
        let mut full = vec![String::new()];
        full.extend_from_slice(sources);
        self.header.set_sources(&full)
    }

    pub fn set_abstract(&mut self, lines: &[String]) {
        self.header.set_abstract(lines);
    }

    pub fn set_error_flag(&mut self, flag: f64) {
        self.header.set_error_flag(flag);
    }

    /// Set the time column and data columns. `times.len()` must equal
    /// `data.len()`, and every row in `data` must have the same width as
    /// the header's currently declared data-column count.
    pub fn set_data(&mut self, times: &[f64], data: &[Vec<f64>]) -> Result<()> {
        if times.len() != data.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} times but {} data rows",
                times.len(),
                data.len()
            )));
        }
        if times.is_empty() {
            return Err(Error::ShapeMismatch("data cannot be empty".into()));
        }
        let rows: Vec<Vec<f64>> = times
            .iter()
            .zip(data)
            .map(|(t, row)| {
                let mut full = Vec::with_capacity(row.len() + 1);
                full.push(*t);
                full.extend_from_slice(row);
                full
            })
            .collect();

        let ncols = rows[0].len();
        if self.header.columns.len() != ncols {
            return Err(Error::ShapeMismatch(format!(
                "data has {ncols} columns but header declares {}",
                self.header.columns.len()
            )));
        }
        self.header.set_value("NROWS", rows.len());
        self.data = Some(RecordTable { rows });
        Ok(())
    }

    /// Write the `.ffh`/`.ffd` pair. `FIRST TIME`/`LAST TIME`/`CDATE` are
    /// populated from the data's tick range and the current local time.
    pub fn write(&mut self, leaps: &LeapTable) -> Result<()> {
        let table = self
            .data
            .as_ref()
            .ok_or_else(|| Error::ShapeMismatch("no data set before write".into()))?;
        let time_index = self.header.time_index();
        let ticks = table.times(time_index);
        let t0 = *ticks.first().unwrap();
        let t1 = *ticks.last().unwrap();

        self.header
            .set_value("FIRST TIME", time::tick_to_ts(t0, self.header.epoch, leaps));
        self.header
            .set_value("LAST TIME", time::tick_to_ts(t1, self.header.epoch, leaps));
        self.header
            .set_value("CDATE", Local::now().format("%Y %j %b %d %H:%M:%S%.6f").to_string());

        self.header.write(&self.header.name.clone())?;
        RecordWriter::write(&self.header, table)
    }
}
