//! One-pass index construction from a point file.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use std::time::Instant;

use log::{info, warn};

use crate::approx::{ApproxSummary, ApproxWriter, VaRecord};
use crate::io::{ObjectRecord, PointLine, PointLines};
use crate::quantizer::Quantizer;
use crate::store::ObjectStore;
use crate::{Result, VaError};

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// Objects indexed (non-blank input lines).
    pub records: u64,
    pub approx: ApproxSummary,
}

/// Writes the approximation file and fills the object store from raw records.
///
/// Object indices are assigned in input order starting from 0. The object
/// store is cleared first, so rebuilding from the same input yields a
/// byte-identical approximation file and the same store contents.
pub struct IndexBuilder<'a, S: ObjectStore + ?Sized> {
    quantizer: Quantizer,
    approx_path: &'a Path,
    store: &'a mut S,
    strict_domain: bool,
}

impl<'a, S: ObjectStore + ?Sized> IndexBuilder<'a, S> {
    pub fn new(quantizer: Quantizer, approx_path: &'a Path, store: &'a mut S) -> Self {
        Self {
            quantizer,
            approx_path,
            store,
            strict_domain: true,
        }
    }

    /// When disabled, finite coordinates outside `[0, 1)` are clamped into the
    /// domain and the clamped point is what gets stored, so every stored
    /// object lies inside its cell. Non-finite coordinates are always rejected.
    pub fn with_strict_domain(mut self, strict_domain: bool) -> Self {
        self.strict_domain = strict_domain;
        self
    }

    pub fn build<P: AsRef<Path>>(&mut self, input_path: P) -> Result<BuildSummary> {
        let input_path = input_path.as_ref();
        let file = File::open(input_path)?;
        info!("building VA-file from {}", input_path.display());
        self.build_from_reader(BufReader::new(file))
    }

    /// Build from any line-oriented source. On failure the partially written
    /// approximation file is removed.
    pub fn build_from_reader<R: BufRead>(&mut self, reader: R) -> Result<BuildSummary> {
        let started = Instant::now();
        match self.build_inner(reader) {
            Ok(summary) => {
                info!(
                    "indexed {} objects into {} ({} bytes) in {:.2?}",
                    summary.records,
                    self.approx_path.display(),
                    summary.approx.bytes,
                    started.elapsed()
                );
                Ok(summary)
            }
            Err(err) => {
                warn!("build failed, discarding {}: {err}", self.approx_path.display());
                self.discard_partial();
                Err(err)
            }
        }
    }

    fn build_inner<R: BufRead>(&mut self, reader: R) -> Result<BuildSummary> {
        let dim = self.quantizer.dim();
        self.store.clear()?;
        let mut writer = ApproxWriter::create(self.approx_path, dim, self.quantizer.bits())?;

        let mut next_index: u64 = 0;
        for parsed in PointLines::new(reader, dim) {
            let PointLine {
                line,
                mut point,
                payload,
            } = parsed?;
            if self.strict_domain {
                check_domain(&point, line)?;
            } else {
                clamp_into_domain(&mut point, line)?;
            }
            let cell = self.quantizer.grid(&point)?;
            let record = ObjectRecord {
                index: next_index,
                point,
                payload,
            };
            self.store.put(&record)?;
            writer.append(&VaRecord {
                cell,
                index: next_index,
            })?;
            next_index += 1;
        }

        let approx = writer.finish()?;
        self.store.flush()?;
        Ok(BuildSummary {
            records: next_index,
            approx,
        })
    }

    fn discard_partial(&self) {
        match fs::remove_file(self.approx_path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                "could not remove partial approximation file {}: {err}",
                self.approx_path.display()
            ),
        }
    }
}

fn check_domain(point: &[f64], line: usize) -> Result<()> {
    match point
        .iter()
        .find(|&&c| !c.is_finite() || !(0.0..1.0).contains(&c))
    {
        Some(&value) => Err(VaError::OutOfDomain { line, value }),
        None => Ok(()),
    }
}

/// Largest `f64` below 1.0.
const DOMAIN_MAX: f64 = 1.0 - f64::EPSILON / 2.0;

fn clamp_into_domain(point: &mut [f64], line: usize) -> Result<()> {
    for c in point.iter_mut() {
        if !c.is_finite() {
            return Err(VaError::OutOfDomain { line, value: *c });
        }
        *c = c.clamp(0.0, DOMAIN_MAX);
    }
    Ok(())
}
