//! Query-description streams.
//!
//! A stream is a sequence of whitespace-separated tokens (line breaks are not
//! significant) describing one query after another:
//!
//! ```text
//! 1 <x_0> ... <x_{D-1}>            point query
//! 2 <x_0> ... <x_{D-1}> <radius>   range query
//! 3 <x_0> ... <x_{D-1}> <k>        k-nearest-neighbour query
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::query::Query;
use crate::{Result, VaError};

/// Token source that remembers the line each token came from.
struct Tokens<R: BufRead> {
    reader: R,
    buffer: Vec<String>,
    cursor: usize,
    line: usize,
}

impl<R: BufRead> Tokens<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            cursor: 0,
            line: 0,
        }
    }

    fn next_token(&mut self) -> Result<Option<String>> {
        while self.cursor == self.buffer.len() {
            let mut text = String::new();
            if self.reader.read_line(&mut text)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            self.buffer = text.split_whitespace().map(str::to_owned).collect();
            self.cursor = 0;
        }
        let token = std::mem::take(&mut self.buffer[self.cursor]);
        self.cursor += 1;
        Ok(Some(token))
    }

    fn expect_token(&mut self, what: &str) -> Result<String> {
        self.next_token()?.ok_or_else(|| {
            VaError::parse(self.line, format!("query stream ended while reading {what}"))
        })
    }

    fn expect_f64(&mut self, what: &str) -> Result<f64> {
        let token = self.expect_token(what)?;
        token
            .parse::<f64>()
            .map_err(|_| VaError::parse(self.line, format!("{what} {token:?} is not a number")))
    }
}

/// Parse a whole query stream.
pub fn parse_queries<R: BufRead>(reader: R, dim: usize) -> Result<Vec<Query>> {
    let mut tokens = Tokens::new(reader);
    let mut queries = Vec::new();
    while let Some(kind) = tokens.next_token()? {
        if !matches!(kind.as_str(), "1" | "2" | "3") {
            return Err(VaError::parse(
                tokens.line,
                format!("unknown query type {kind:?}"),
            ));
        }
        let mut point = Vec::with_capacity(dim);
        for _ in 0..dim {
            point.push(tokens.expect_f64("coordinate")?);
        }
        let query = match kind.as_str() {
            "1" => Query::Point(point),
            "2" => {
                let radius = tokens.expect_f64("radius")?;
                Query::Range { point, radius }
            }
            _ => {
                let token = tokens.expect_token("k")?;
                let k = token.parse::<usize>().map_err(|_| {
                    VaError::parse(tokens.line, format!("k {token:?} is not a non-negative integer"))
                })?;
                Query::Knn { point, k }
            }
        };
        queries.push(query);
    }
    Ok(queries)
}

pub fn read_queries<P: AsRef<Path>>(path: P, dim: usize) -> Result<Vec<Query>> {
    parse_queries(BufReader::new(File::open(path)?), dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_all_three_query_types_across_lines() {
        let text = "1 0.1 0.2\n2 0.3\n0.4 0.05 3 0.5 0.5 4\n";
        let queries = parse_queries(Cursor::new(text), 2).unwrap();
        assert_eq!(
            queries,
            vec![
                Query::Point(vec![0.1, 0.2]),
                Query::Range {
                    point: vec![0.3, 0.4],
                    radius: 0.05
                },
                Query::Knn {
                    point: vec![0.5, 0.5],
                    k: 4
                },
            ]
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_queries(Cursor::new("1 0.1\n7 0.2\n"), 1).unwrap_err();
        assert!(matches!(err, VaError::Parse { line: 2, .. }));
    }

    #[test]
    fn truncated_query_is_rejected() {
        let err = parse_queries(Cursor::new("3 0.1 0.2"), 2).unwrap_err();
        assert!(matches!(err, VaError::Parse { line: 1, .. }));
    }

    #[test]
    fn fractional_k_is_rejected() {
        assert!(parse_queries(Cursor::new("3 0.1 2.5"), 1).is_err());
    }

    #[test]
    fn empty_stream_has_no_queries() {
        assert!(parse_queries(Cursor::new("\n  \n"), 3).unwrap().is_empty());
    }
}
