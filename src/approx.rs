//! The approximation file: one `(cell code, object index)` row per object.
//!
//! Text layout, one record per line:
//!
//! ```text
//! <code_0> <code_1> ... <code_{D-1}> <index>
//! ```
//!
//! Each `code_i` is written as a zero-padded bit-string of exactly `B`
//! characters; `index` is the decimal object index. Rows appear in build
//! order, so indices are ascending and dense.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Lines, Read, Write};
use std::path::Path;

use crc32fast::Hasher;

use crate::quantizer::CellCode;
use crate::{Result, VaError};

/// Approximation-file row for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaRecord {
    pub cell: CellCode,
    pub index: u64,
}

/// Record count and checksum of a written approximation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxSummary {
    pub records: u64,
    pub bytes: u64,
    pub checksum: u32,
}

impl ApproxSummary {
    /// Recompute the summary of an existing approximation file.
    pub fn of_file<P: AsRef<Path>>(path: P, dim: usize, bits: u32) -> Result<Self> {
        let path = path.as_ref();

        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Hasher::new();
        let mut bytes = 0u64;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            bytes += read as u64;
        }

        let mut records = 0u64;
        for record in ApproxScan::open(path, dim, bits)? {
            record?;
            records += 1;
        }

        Ok(Self {
            records,
            bytes,
            checksum: hasher.finalize(),
        })
    }
}

/// Size of `path` in bytes, or 0 when the file does not exist.
pub fn file_size<P: AsRef<Path>>(path: P) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
        Err(err) => Err(VaError::Io(err)),
    }
}

pub fn format_va_line(record: &VaRecord, bits: u32) -> String {
    let width = bits as usize;
    let mut line = String::with_capacity(record.cell.len() * (width + 1) + 20);
    for code in record.cell.as_slice() {
        line.push_str(&format!("{code:0width$b} "));
    }
    line.push_str(&record.index.to_string());
    line
}

pub fn parse_va_line(text: &str, dim: usize, bits: u32, line: usize) -> Result<VaRecord> {
    let width = bits as usize;
    let mut tokens = text.split_whitespace();
    let mut codes = Vec::with_capacity(dim);
    for axis in 0..dim {
        let token = tokens.next().ok_or_else(|| {
            VaError::parse(line, format!("expected {dim} cell codes, found {axis}"))
        })?;
        if token.len() != width || !token.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(VaError::parse(
                line,
                format!("cell code {token:?} is not a {width}-bit string"),
            ));
        }
        let code = u16::from_str_radix(token, 2)
            .map_err(|_| VaError::parse(line, format!("cell code {token:?} out of range")))?;
        codes.push(code);
    }
    let index_token = tokens
        .next()
        .ok_or_else(|| VaError::parse(line, "missing object index"))?;
    let index = index_token
        .parse::<u64>()
        .map_err(|_| VaError::parse(line, format!("object index {index_token:?} is invalid")))?;
    if let Some(extra) = tokens.next() {
        return Err(VaError::parse(
            line,
            format!("unexpected token {extra:?} after object index"),
        ));
    }
    Ok(VaRecord {
        cell: CellCode::from(codes),
        index,
    })
}

/// Append-only writer used by the builder.
pub struct ApproxWriter {
    writer: BufWriter<File>,
    hasher: Hasher,
    dim: usize,
    bits: u32,
    records: u64,
    bytes: u64,
}

impl ApproxWriter {
    /// Create (or truncate) the approximation file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, dim: usize, bits: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            hasher: Hasher::new(),
            dim,
            bits,
            records: 0,
            bytes: 0,
        })
    }

    pub fn append(&mut self, record: &VaRecord) -> Result<()> {
        if record.cell.len() != self.dim {
            return Err(VaError::DimensionMismatch {
                expected: self.dim,
                got: record.cell.len(),
            });
        }
        let mut line = format_va_line(record, self.bits);
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.hasher.update(line.as_bytes());
        self.records += 1;
        self.bytes += line.len() as u64;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush buffered rows and return the file summary.
    pub fn finish(mut self) -> Result<ApproxSummary> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(ApproxSummary {
            records: self.records,
            bytes: self.bytes,
            checksum: self.hasher.finalize(),
        })
    }
}

/// Single forward pass over an approximation file.
///
/// A missing file scans as empty.
pub struct ApproxScan {
    lines: Option<Lines<BufReader<File>>>,
    dim: usize,
    bits: u32,
    line: usize,
}

impl ApproxScan {
    pub fn open<P: AsRef<Path>>(path: P, dim: usize, bits: u32) -> Result<Self> {
        let lines = match File::open(path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(VaError::Io(err)),
        };
        Ok(Self {
            lines,
            dim,
            bits,
            line: 0,
        })
    }
}

impl Iterator for ApproxScan {
    type Item = Result<VaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let text = match lines.next()? {
                Ok(text) => text,
                Err(err) => return Some(Err(VaError::Io(err))),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(parse_va_line(&text, self.dim, self.bits, self.line));
        }
    }
}
