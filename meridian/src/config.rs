//! Store-wide settings.

use std::path::{Path, PathBuf};

use log::debug;
use meridian_types::Crs;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Number of identifiers materialized per document-store query.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Name of the document-store collection holding collection metadata records.
pub const DEFAULT_META_COLLECTION: &str = "_collection_meta";

/// Settings shared by every database and collection of a [`Connection`](crate::database::Connection).
///
/// ```
/// use meridian::config::StoreConfig;
///
/// let config = StoreConfig::from_json_str(r#"{ "index_path": "/var/lib/meridian", "default_srid": 3857 }"#)?;
/// assert_eq!(config.default_srid, 3857);
/// assert_eq!(config.batch_size, 1000);
/// # Ok::<(), meridian::error::StoreError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding spatial index files, one subdirectory per database.
    pub index_path: PathBuf,
    /// SRID given to collections that do not declare one.
    pub default_srid: i32,
    /// Batch size of id-set materialization in find and delete.
    pub batch_size: usize,
    /// Collection that stores collection metadata records.
    pub meta_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("indices"),
            default_srid: Crs::DEFAULT_SRID,
            batch_size: DEFAULT_BATCH_SIZE,
            meta_collection: DEFAULT_META_COLLECTION.to_owned(),
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration with index files under `index_path`.
    pub fn new(index_path: impl AsRef<Path>) -> Self {
        Self {
            index_path: index_path.as_ref().into(),
            ..Default::default()
        }
    }

    /// Sets the default SRID.
    pub fn with_default_srid(mut self, srid: i32) -> Self {
        self.default_srid = srid;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Parses and validates a JSON configuration. Missing keys take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!("Loading store configuration from {:?}", path.as_ref());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks the values for consistency.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.batch_size == 0 {
            return Err(StoreError::Validation("batch_size must be positive".into()));
        }
        if Crs::from_srid(self.default_srid).is_none() {
            return Err(StoreError::Validation(format!(
                "default_srid {} is not a supported reference system",
                self.default_srid
            )));
        }
        if self.meta_collection.is_empty() {
            return Err(StoreError::Validation(
                "meta_collection must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Directory holding the index files of the database `database`.
    pub fn database_index_path(&self, database: &str) -> PathBuf {
        self.index_path.join(database)
    }
}
