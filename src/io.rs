use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VaError};

/// Exact coordinates and payload of one indexed object.
///
/// `index` is the join key between the approximation file and the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub index: u64,
    pub point: Vec<f64>,
    pub payload: String,
}

/// One non-blank line of a point file, before an object index is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLine {
    /// 1-based line number in the source.
    pub line: usize,
    pub point: Vec<f64>,
    pub payload: String,
}

/// Parse `D` whitespace-separated coordinates followed by one payload token.
pub fn parse_point_line(text: &str, dim: usize, line: usize) -> Result<(Vec<f64>, String)> {
    let mut tokens = text.split_whitespace();
    let mut point = Vec::with_capacity(dim);
    for axis in 0..dim {
        let token = tokens.next().ok_or_else(|| {
            VaError::parse(line, format!("expected {dim} coordinates, found {axis}"))
        })?;
        let value = token.parse::<f64>().map_err(|_| {
            VaError::parse(line, format!("coordinate {axis} is not a number: {token:?}"))
        })?;
        point.push(value);
    }
    let payload = tokens
        .next()
        .ok_or_else(|| VaError::parse(line, "missing payload token"))?;
    if let Some(extra) = tokens.next() {
        return Err(VaError::parse(
            line,
            format!("unexpected token {extra:?} after payload"),
        ));
    }
    Ok((point, payload.to_string()))
}

/// Render a point and payload in the same textual shape [`parse_point_line`] reads.
///
/// Coordinates use the shortest representation that parses back to the same `f64`.
pub fn format_point_line(point: &[f64], payload: &str) -> String {
    let mut line = String::with_capacity(point.len() * 8 + payload.len() + 1);
    for value in point {
        line.push_str(&value.to_string());
        line.push(' ');
    }
    line.push_str(payload);
    line
}

/// Streaming reader over a point file. Blank lines are skipped.
pub struct PointLines<R: BufRead> {
    lines: Lines<R>,
    dim: usize,
    line: usize,
}

impl<R: BufRead> PointLines<R> {
    pub fn new(reader: R, dim: usize) -> Self {
        Self {
            lines: reader.lines(),
            dim,
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for PointLines<R> {
    type Item = Result<PointLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => return Some(Err(VaError::Io(err))),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let line = self.line;
            return Some(
                parse_point_line(&text, self.dim, line).map(|(point, payload)| PointLine {
                    line,
                    point,
                    payload,
                }),
            );
        }
    }
}

/// Read every record of a point file, assigning indices in input order from 0.
pub fn read_records_from_reader<R: BufRead>(reader: R, dim: usize) -> Result<Vec<ObjectRecord>> {
    PointLines::new(reader, dim)
        .enumerate()
        .map(|(index, parsed)| {
            parsed.map(|PointLine { point, payload, .. }| ObjectRecord {
                index: index as u64,
                point,
                payload,
            })
        })
        .collect()
}

pub fn read_records<P: AsRef<Path>>(path: P, dim: usize) -> Result<Vec<ObjectRecord>> {
    let file = File::open(path)?;
    read_records_from_reader(BufReader::new(file), dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_coordinates_and_payload() {
        let (point, payload) = parse_point_line("0.1  0.25\t0.5 alpha", 3, 1).unwrap();
        assert_eq!(point, vec![0.1, 0.25, 0.5]);
        assert_eq!(payload, "alpha");
    }

    #[test]
    fn rejects_short_long_and_non_numeric_lines() {
        assert!(matches!(
            parse_point_line("0.1 alpha", 2, 7),
            Err(VaError::Parse { line: 7, .. })
        ));
        assert!(parse_point_line("0.1 0.2", 2, 1).is_err());
        assert!(parse_point_line("0.1 0.2 alpha beta", 2, 1).is_err());
        assert!(parse_point_line("0.1 x alpha", 2, 1).is_err());
    }

    #[test]
    fn formatted_line_parses_back_exactly() {
        let point = vec![0.1, 1.0 / 3.0, 0.999_999_999_7];
        let line = format_point_line(&point, "payload-7");
        let (parsed, payload) = parse_point_line(&line, 3, 1).unwrap();
        assert_eq!(parsed, point);
        assert_eq!(payload, "payload-7");
    }

    #[test]
    fn blank_lines_are_skipped_but_counted() {
        let input = "0.1 0.1 A\n\n   \n0.9 0.9 B\n";
        let records = read_records_from_reader(Cursor::new(input), 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 1);
        assert_eq!(records[1].payload, "B");

        let err = read_records_from_reader(Cursor::new("0.1 0.1 A\n\n0.5 B\n"), 2).unwrap_err();
        assert!(matches!(err, VaError::Parse { line: 3, .. }));
    }
}
