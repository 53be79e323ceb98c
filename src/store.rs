//! Where feature documents come from.
//!
//! The evaluator only needs raw bytes by feature name; decoding happens above the store.
use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use crate::{codec, Error, Feature, Result};

/// Source of serialized feature documents.
///
/// A missing document must be reported as [`Error::StoreNotFound`]; any other failure is an
/// [`Error::Io`].
pub trait FeatureStore {
    /// Load the raw document stored under `feature_name`.
    fn load(&self, feature_name: &str) -> Result<Vec<u8>>;
}

impl<T: FeatureStore + ?Sized> FeatureStore for &T {
    fn load(&self, feature_name: &str) -> Result<Vec<u8>> {
        (**self).load(feature_name)
    }
}

impl<T: FeatureStore + ?Sized> FeatureStore for Arc<T> {
    fn load(&self, feature_name: &str) -> Result<Vec<u8>> {
        (**self).load(feature_name)
    }
}

/// `InMemoryStore` keeps documents in a map that can be updated while readers are active.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl InMemoryStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under `feature_name`, returning the previous document.
    ///
    /// The bytes are not validated; a malformed document fails when it is evaluated.
    pub fn insert(
        &self,
        feature_name: impl Into<String>,
        document: impl Into<Vec<u8>>,
    ) -> Option<Arc<[u8]>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let document: Vec<u8> = document.into();
        let document: Arc<[u8]> = document.into();

        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.insert(feature_name.into(), document)
    }

    /// Encode `feature` and store it under `feature_name`.
    pub fn insert_feature(&self, feature_name: impl Into<String>, feature: &Feature) -> Result<()> {
        self.insert(feature_name, feature.to_json()?);
        Ok(())
    }

    /// Remove the document stored under `feature_name`, returning it.
    pub fn remove(&self, feature_name: &str) -> Option<Arc<[u8]>> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.remove(feature_name)
    }
}

impl FeatureStore for InMemoryStore {
    fn load(&self, feature_name: &str) -> Result<Vec<u8>> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        documents
            .get(feature_name)
            .map(|document| document.to_vec())
            .ok_or_else(|| Error::StoreNotFound(feature_name.to_owned()))
    }
}

/// Store backed by a directory holding one `<feature_name>.json` file per feature.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Environment variable consulted by [`DirectoryStore::from_env`].
    pub const DIR_ENV_VAR: &'static str = "OFFLINE_FEATURES_DIR";

    /// Directory used when [`DirectoryStore::DIR_ENV_VAR`] is not set.
    pub const DEFAULT_DIR: &'static str = "features/materialized";

    /// Create a store reading from `dir`. The directory does not need to exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryStore { dir: dir.into() }
    }

    /// Create a store for the directory named by `OFFLINE_FEATURES_DIR`, or
    /// `features/materialized` when it is unset.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(Self::DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DIR));
        log::trace!(target: "offline_feature", dir:? = dir; "using feature directory");
        DirectoryStore::new(dir)
    }

    #[allow(missing_docs)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `feature_name`.
    ///
    /// Names that would escape the directory are rejected.
    pub fn path(&self, feature_name: &str) -> Result<PathBuf> {
        let valid = !feature_name.is_empty()
            && feature_name != "."
            && feature_name != ".."
            && !feature_name.contains(['/', '\\']);
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid feature name {feature_name:?}"),
            )
            .into());
        }
        Ok(self.dir.join(format!("{feature_name}.json")))
    }

    /// Write `feature` to `<dir>/<feature_name>.json` as indented JSON.
    ///
    /// With `only_if_changed`, an existing file holding an equal document is left untouched.
    /// Otherwise the file is replaced atomically, so concurrent readers never observe a partial
    /// document. Returns `true` if the file was written.
    pub fn save(&self, feature_name: &str, feature: &Feature, only_if_changed: bool) -> Result<bool> {
        let path = self.path(feature_name)?;
        let encoded = feature.to_json_pretty()?;

        if only_if_changed && self.is_unchanged(&path, &encoded) {
            log::trace!(target: "offline_feature", feature_name; "feature file is up to date");
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|err| err.error)?;

        log::trace!(target: "offline_feature", feature_name; "wrote feature file");
        Ok(true)
    }

    fn is_unchanged(&self, path: &Path, encoded: &str) -> bool {
        let Ok(existing) = fs::read(path) else {
            return false;
        };
        // Compare documents rather than bytes so formatting differences do not force a rewrite.
        match (
            codec::from_slice::<serde_json::Value>(&existing),
            codec::from_slice::<serde_json::Value>(encoded.as_bytes()),
        ) {
            (Ok(existing), Ok(encoded)) => existing == encoded,
            _ => false,
        }
    }
}

impl FeatureStore for DirectoryStore {
    fn load(&self, feature_name: &str) -> Result<Vec<u8>> {
        let path = self.path(feature_name)?;
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::StoreNotFound(feature_name.to_owned()),
            _ => err.into(),
        })
    }
}
