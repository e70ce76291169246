use std::fs;
use std::io::ErrorKind;

use log::{info, warn};

use crate::approx::{file_size, ApproxSummary};
use crate::builder::{BuildSummary, IndexBuilder};
use crate::config::{StoreKind, VaConfig};
use crate::manifest::IndexManifest;
use crate::quantizer::Quantizer;
use crate::query::QueryEngine;
use crate::store::{FileObjectStore, LogObjectStore, ObjectStore};
use crate::{Result, VaError};

/// A VA-file index on disk: approximation file, object store and manifest.
///
/// `VaIndex` owns the fixed parameters of one index instance and wires the
/// builder and query engine to the configured object store backend.
///
/// # Example
///
/// ```no_run
/// use vafile_rs::{VaConfig, VaIndex};
///
/// let config = VaConfig::new(3, 6).with_input_path("points.txt");
/// let index = VaIndex::open_or_build(config)?;
/// let hits = index.engine().range_query(&[0.5, 0.5, 0.5], 0.1)?;
/// println!("{} objects within range", hits.len());
/// # Ok::<(), vafile_rs::VaError>(())
/// ```
pub struct VaIndex {
    config: VaConfig,
    quantizer: Quantizer,
    store: Box<dyn ObjectStore>,
    manifest: Option<IndexManifest>,
    last_build: Option<BuildSummary>,
}

impl VaIndex {
    /// Open an existing index without building.
    ///
    /// A missing approximation file is not an error: the index simply answers
    /// every query with no results. When a manifest exists it must agree with
    /// `config`.
    ///
    /// # Errors
    ///
    /// * `VaError::InvalidConfig` if `config` fails validation
    /// * `VaError::InvalidPersistence` if the manifest is corrupt or was
    ///   written for different fixed parameters
    pub fn open(config: VaConfig) -> Result<Self> {
        config.validate()?;
        let quantizer = Quantizer::new(config.dim, config.bits)?.with_bound(config.bound);
        let store = open_store(&config)?;
        let manifest = load_manifest(&config)?;
        Ok(Self {
            config,
            quantizer,
            store,
            manifest,
            last_build: None,
        })
    }

    /// Open the index, building it first when the approximation file is
    /// missing or empty.
    ///
    /// A non-empty approximation file is reused as is; no rebuild happens even
    /// if the input file changed since. A manifest left behind next to a
    /// missing or empty approximation file is ignored and replaced.
    pub fn open_or_build(config: VaConfig) -> Result<Self> {
        config.validate()?;
        if file_size(&config.approx_path)? == 0 {
            let mut index = Self::open_unchecked(config)?;
            index.rebuild()?;
            return Ok(index);
        }

        let index = Self::open(config)?;
        info!(
            "reusing approximation file {}",
            index.config.approx_path.display()
        );
        if index.manifest.is_none() {
            warn!(
                "no manifest next to {}; index parameters are unchecked",
                index.config.approx_path.display()
            );
        }
        Ok(index)
    }

    /// Unconditionally (re)build the index from `config.input_path`.
    pub fn build(config: VaConfig) -> Result<Self> {
        let mut index = Self::open_unchecked(config)?;
        index.rebuild()?;
        Ok(index)
    }

    /// Rebuild from the configured input, replacing approximation file,
    /// object store contents and manifest.
    pub fn rebuild(&mut self) -> Result<BuildSummary> {
        let manifest_path = self.config.manifest_path();
        remove_if_exists(&manifest_path)?;
        self.manifest = None;

        let summary = IndexBuilder::new(
            self.quantizer,
            &self.config.approx_path,
            self.store.as_mut(),
        )
        .with_strict_domain(self.config.strict_domain)
        .build(&self.config.input_path)?;

        let manifest = IndexManifest::new(&self.config, &summary.approx);
        manifest.save_to_path(&manifest_path)?;
        self.manifest = Some(manifest);
        self.last_build = Some(summary);
        Ok(summary)
    }

    /// Query engine over this index, using the configured kNN strategy.
    pub fn engine(&self) -> QueryEngine<'_, dyn ObjectStore> {
        QueryEngine::new(
            self.quantizer,
            &self.config.approx_path,
            self.store.as_ref(),
        )
        .with_knn_strategy(self.config.knn)
    }

    /// Check the approximation file against the manifest.
    pub fn verify(&self) -> Result<ApproxSummary> {
        match &self.manifest {
            Some(manifest) => manifest.verify(&self.config.approx_path),
            None => Err(VaError::InvalidPersistence("index has no manifest")),
        }
    }

    pub fn config(&self) -> &VaConfig {
        &self.config
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }

    /// Summary of the build performed by this handle, if any.
    pub fn last_build(&self) -> Option<&BuildSummary> {
        self.last_build.as_ref()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Like [`open`](Self::open) but ignores a stale or foreign manifest,
    /// which is about to be replaced anyway.
    fn open_unchecked(config: VaConfig) -> Result<Self> {
        config.validate()?;
        let quantizer = Quantizer::new(config.dim, config.bits)?.with_bound(config.bound);
        let store = open_store(&config)?;
        Ok(Self {
            config,
            quantizer,
            store,
            manifest: None,
            last_build: None,
        })
    }
}

fn open_store(config: &VaConfig) -> Result<Box<dyn ObjectStore>> {
    Ok(match config.store_kind {
        StoreKind::Files => Box::new(FileObjectStore::new(&config.store_path, config.dim)?),
        StoreKind::Log => Box::new(LogObjectStore::new(&config.store_path, config.dim)?),
    })
}

fn load_manifest(config: &VaConfig) -> Result<Option<IndexManifest>> {
    let path = config.manifest_path();
    if !path.exists() {
        return Ok(None);
    }
    let manifest = IndexManifest::load_from_path(&path)?;
    manifest.check_config(config)?;
    Ok(Some(manifest))
}

fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(VaError::Io(err)),
    }
}
