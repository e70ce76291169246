use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::approx::ApproxSummary;
use crate::config::{StoreKind, VaConfig};
use crate::{Result, VaError};

const MANIFEST_MAGIC: [u8; 4] = *b"VAM1";
const MANIFEST_VERSION: u32 = 1;

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Sidecar describing the most recent successful build.
///
/// Layout: magic `VAM1`, u32 version, u64 body length, bincode body,
/// u32 CRC32 of the body. All integers little endian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub dim: usize,
    pub bits: u32,
    pub store_kind: StoreKind,
    pub records: u64,
    pub approx_bytes: u64,
    pub approx_checksum: u32,
}

impl IndexManifest {
    pub fn new(config: &VaConfig, summary: &ApproxSummary) -> Self {
        Self {
            dim: config.dim,
            bits: config.bits,
            store_kind: config.store_kind,
            records: summary.records,
            approx_bytes: summary.bytes,
            approx_checksum: summary.checksum,
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.save_to_writer(&mut writer)?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    pub fn save_to_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        let body = bincode::serialize(self)
            .map_err(|_| VaError::InvalidPersistence("failed to serialize manifest"))?;

        let mut hasher = Hasher::new();
        hasher.update(&body);

        writer.write_all(&MANIFEST_MAGIC)?;
        write_u32(&mut writer, MANIFEST_VERSION)?;
        write_u64(&mut writer, body.len() as u64)?;
        writer.write_all(&body)?;
        write_u32(&mut writer, hasher.finalize())?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::load_from_reader(BufReader::new(file))
    }

    pub fn load_from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MANIFEST_MAGIC {
            return Err(VaError::InvalidPersistence("unrecognized manifest header"));
        }

        let version = read_u32(&mut reader)?;
        if version != MANIFEST_VERSION {
            return Err(VaError::InvalidPersistence(
                "unsupported manifest format version",
            ));
        }

        let body_len = usize::try_from(read_u64(&mut reader)?)
            .map_err(|_| VaError::InvalidPersistence("manifest length exceeds platform limits"))?;
        if body_len > 4096 {
            return Err(VaError::InvalidPersistence("manifest body is implausibly large"));
        }
        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body)?;

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let stored_checksum = read_u32(&mut reader)?;
        if hasher.finalize() != stored_checksum {
            return Err(VaError::InvalidPersistence("manifest checksum mismatch"));
        }

        bincode::deserialize(&body)
            .map_err(|_| VaError::InvalidPersistence("failed to deserialize manifest"))
    }

    /// Reject reuse of an index built with different fixed parameters.
    pub fn check_config(&self, config: &VaConfig) -> Result<()> {
        if self.dim != config.dim {
            return Err(VaError::InvalidPersistence(
                "index was built with a different dimensionality",
            ));
        }
        if self.bits != config.bits {
            return Err(VaError::InvalidPersistence(
                "index was built with a different bit width",
            ));
        }
        if self.store_kind != config.store_kind {
            return Err(VaError::InvalidPersistence(
                "index was built with a different object store",
            ));
        }
        Ok(())
    }

    /// Recompute the approximation file summary and compare it with this manifest.
    pub fn verify<P: AsRef<Path>>(&self, approx_path: P) -> Result<ApproxSummary> {
        let summary = ApproxSummary::of_file(approx_path, self.dim, self.bits)?;
        if summary.records != self.records {
            return Err(VaError::InvalidPersistence(
                "approximation record count does not match manifest",
            ));
        }
        if summary.bytes != self.approx_bytes || summary.checksum != self.approx_checksum {
            return Err(VaError::InvalidPersistence(
                "approximation file checksum mismatch",
            ));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> IndexManifest {
        IndexManifest {
            dim: 4,
            bits: 6,
            store_kind: StoreKind::Log,
            records: 1_000,
            approx_bytes: 30_000,
            approx_checksum: 0xdead_beef,
        }
    }

    #[test]
    fn manifest_survives_persistence() {
        let mut bytes = Vec::new();
        sample().save_to_writer(&mut bytes).unwrap();
        let loaded = IndexManifest::load_from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn corrupted_manifest_is_rejected() {
        let mut bytes = Vec::new();
        sample().save_to_writer(&mut bytes).unwrap();
        let body_start = 4 + 4 + 8;
        bytes[body_start] ^= 0xff;
        assert!(matches!(
            IndexManifest::load_from_reader(Cursor::new(bytes.clone())),
            Err(VaError::InvalidPersistence("manifest checksum mismatch"))
        ));

        bytes[0] = b'X';
        assert!(matches!(
            IndexManifest::load_from_reader(Cursor::new(bytes)),
            Err(VaError::InvalidPersistence("unrecognized manifest header"))
        ));
    }

    #[test]
    fn config_mismatch_is_reported() {
        let manifest = sample();
        let config = VaConfig::new(4, 6).with_store_kind(StoreKind::Log);
        assert!(manifest.check_config(&config).is_ok());
        assert!(manifest.check_config(&VaConfig::new(3, 6)).is_err());
        assert!(manifest
            .check_config(&VaConfig::new(4, 5).with_store_kind(StoreKind::Log))
            .is_err());
        assert!(manifest.check_config(&VaConfig::new(4, 6)).is_err());
    }
}
