//! Binary record table codec: `<name>.ffd` files are a flat array of
//! fixed-width, big-endian records — one `T`/8-byte time column followed
//! by `NCOLS - 1` columns of `R`/4-byte or `D`/8-byte values.

use std::fs::File;
use std::io::{Read, Write};

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::header::Header;

macro_rules! from_bytes4 {
    ($dat:expr, $start:expr) => {
        f32::from_be_bytes([$dat[$start], $dat[$start + 1], $dat[$start + 2], $dat[$start + 3]])
    };
}

macro_rules! from_bytes8 {
    ($dat:expr, $start:expr) => {
        f64::from_be_bytes([
            $dat[$start],
            $dat[$start + 1],
            $dat[$start + 2],
            $dat[$start + 3],
            $dat[$start + 4],
            $dat[$start + 5],
            $dat[$start + 6],
            $dat[$start + 7],
        ])
    };
}

/// Row-major matrix of decoded record values, time column included at
/// index `header.time_index()` (always `0` for the files this codec
/// produces).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    pub rows: Vec<Vec<f64>>,
}

impl RecordTable {
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// The time column's tick values.
    #[must_use]
    pub fn times(&self, time_index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[time_index]).collect()
    }
}

fn data_path(header: &Header) -> String {
    format!("{}.ffd", header.name)
}

fn decode_row(buf: &[u8], header: &Header) -> Result<Vec<f64>> {
    let mut row = Vec::with_capacity(header.columns.len());
    for col in &header.columns {
        let loc = col.loc as usize;
        let value = if col.kind == 'R' {
            if loc + 4 > buf.len() {
                return Err(Error::ShapeMismatch(format!(
                    "record too short for column {} at offset {loc}",
                    col.name
                )));
            }
            f64::from(from_bytes4!(buf, loc))
        } else {
            if loc + 8 > buf.len() {
                return Err(Error::ShapeMismatch(format!(
                    "record too short for column {} at offset {loc}",
                    col.name
                )));
            }
            from_bytes8!(buf, loc)
        };
        row.push(value);
    }
    Ok(row)
}

fn encode_row(row: &[f64], header: &Header, out: &mut Vec<u8>) -> Result<()> {
    if row.len() != header.columns.len() {
        return Err(Error::ShapeMismatch(format!(
            "row has {} values, header declares {} columns",
            row.len(),
            header.columns.len()
        )));
    }
    for (value, col) in row.iter().zip(&header.columns) {
        if col.kind == 'R' {
            out.extend_from_slice(&(*value as f32).to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    Ok(())
}

/// Reads a `.ffd` file whose layout is fully described by `header`.
pub struct RecordReader;

impl RecordReader {
    /// Decode the full record table. Bulk-decodes when the file size is an
    /// exact multiple of `RECL`; otherwise drops the trailing partial
    /// record and decodes row by row (the `PartialRecord` recovery path).
    pub fn read(header: &Header) -> Result<RecordTable> {
        let path = data_path(header);
        let mut file = File::open(&path).map_err(|_| Error::MissingFile(path.clone().into()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let recl = header.recl() as usize;
        if recl == 0 {
            return Ok(RecordTable { rows: Vec::new() });
        }
        let rows = data.len() / recl;

        let mut table = Vec::with_capacity(rows);
        for i in 0..rows {
            table.push(decode_row(&data[i * recl..(i + 1) * recl], header)?);
        }
        Ok(RecordTable { rows: table })
    }

    /// `true` if the data file's size is an exact multiple of `RECL` (no
    /// trailing partial record).
    pub fn filesize_is_valid(header: &Header) -> Result<bool> {
        let path = data_path(header);
        let meta = std::fs::metadata(&path).map_err(|_| Error::MissingFile(path.into()))?;
        let recl = header.recl() as u64;
        Ok(recl != 0 && meta.len() % recl == 0 && meta.len() / recl == header.nrows() as u64)
    }

    /// First/last tick without loading the full table, when the file size
    /// matches `NROWS * RECL` exactly; falls back to a full read otherwise.
    pub fn time_range(header: &Header) -> Result<(f64, f64)> {
        if Self::filesize_is_valid(header)? {
            let path = data_path(header);
            let mut file = File::open(&path).map_err(|_| Error::MissingFile(path.into()))?;
            let recl = header.recl() as usize;
            let time_loc = header.columns[header.time_index()].loc as usize;
            let nrows = header.nrows();

            let mut buf = [0u8; 8];
            use std::io::{Seek, SeekFrom};
            file.seek(SeekFrom::Start(time_loc as u64))?;
            file.read_exact(&mut buf)?;
            let start = f64::from_be_bytes(buf);

            file.seek(SeekFrom::Start(((nrows.saturating_sub(1)) * recl) as u64))?;
            file.read_exact(&mut buf)?;
            let end = f64::from_be_bytes(buf);

            Ok((start, end))
        } else {
            let table = Self::read(header)?;
            let times = table.times(header.time_index());
            let first = *times.first().ok_or_else(|| {
                Error::ShapeMismatch("no records to determine a time range".into())
            })?;
            let last = *times.last().unwrap();
            Ok((first, last))
        }
    }

    /// Zero-copy memory-mapped view of the record bytes, guarded by the
    /// same filesize check as [`Self::time_range`].
    ///
    /// # Safety note
    /// Per `memmap2`'s contract, the caller must not truncate or replace
    /// the underlying file while the returned mapping is alive.
    pub fn memmap_table(header: &Header) -> Result<Mmap> {
        let path = data_path(header);
        let file = File::open(&path).map_err(|_| Error::MissingFile(path.into()))?;
        // Safety: the file is not concurrently truncated by this process;
        // the caller owns the returned mapping's lifetime and is
        // responsible for not doing so externally either.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap)
    }
}

/// Writes a `.ffd` file matching `header`'s column layout.
pub struct RecordWriter;

impl RecordWriter {
    pub fn write(header: &Header, table: &RecordTable) -> Result<()> {
        let recl = header.recl() as usize;
        let mut bytes = Vec::with_capacity(recl * table.nrows());
        for row in &table.rows {
            encode_row(row, header, &mut bytes)?;
        }
        let path = data_path(header);
        let mut file = File::create(&path).map_err(|_| Error::MissingFile(path.into()))?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::Epoch;
    use tempfile::TempDir;

    fn header_with(dir: &TempDir, names: &[&str], rows: usize) -> Header {
        let path = dir.path().join("sample");
        let mut h = Header::new(path.to_str().unwrap());
        h.set_columns(&names.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        h.set_epoch(Epoch::Y1970);
        h.set_value("NROWS", rows);
        h
    }

    #[test]
    fn round_trips_exact_filesize() {
        let dir = tempfile::tempdir().unwrap();
        let header = header_with(&dir, &["SCET", "A", "B"], 3);

        let table = RecordTable {
            rows: vec![
                vec![0.0, 1.5, 2.5],
                vec![1.0, 3.5, 4.5],
                vec![2.0, 5.5, 6.5],
            ],
        };
        RecordWriter::write(&header, &table).unwrap();

        assert!(RecordReader::filesize_is_valid(&header).unwrap());
        let read_back = RecordReader::read(&header).unwrap();
        assert_eq!(read_back.nrows(), 3);
        assert_eq!(read_back.rows[0][0], 0.0);
        assert!((read_back.rows[1][1] - 3.5).abs() < 1e-5);

        let (start, end) = RecordReader::time_range(&header).unwrap();
        assert_eq!(start, 0.0);
        assert_eq!(end, 2.0);
    }

    #[test]
    fn falls_back_on_truncated_trailing_record() {
        let dir = tempfile::tempdir().unwrap();
        let header = header_with(&dir, &["SCET", "A"], 2);

        let table = RecordTable {
            rows: vec![vec![0.0, 1.5], vec![1.0, 2.5]],
        };
        RecordWriter::write(&header, &table).unwrap();

        // Truncate the file by a few bytes to simulate a partial trailing
        // record.
        let path = data_path(&header);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, &bytes).unwrap();

        assert!(!RecordReader::filesize_is_valid(&header).unwrap());
        let read_back = RecordReader::read(&header).unwrap();
        assert_eq!(read_back.nrows(), 1);
    }

    #[test]
    fn memmap_view_matches_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let header = header_with(&dir, &["SCET", "A"], 1);
        let table = RecordTable {
            rows: vec![vec![42.0, 7.0]],
        };
        RecordWriter::write(&header, &table).unwrap();

        let mmap = RecordReader::memmap_table(&header).unwrap();
        assert_eq!(mmap.len(), header.recl() as usize);
    }
}
