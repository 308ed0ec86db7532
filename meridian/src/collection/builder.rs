use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::meta::{CollectionMeta, MetaRecord};
use super::FeatureCollection;
use crate::codec::GeometryCodec;
use crate::config::{StoreConfig, DEFAULT_BATCH_SIZE, DEFAULT_META_COLLECTION};
use crate::document::DocumentStore;
use crate::error::StoreError;
use crate::feature::FeatureInput;
use crate::index::SpatialIndex;

const INDEX_EXTENSION: &str = "sqlite";

/// Constructor for a [`FeatureCollection`].
///
/// ```
/// use std::sync::Arc;
/// use meridian::collection::FeatureCollectionBuilder;
/// use meridian::document::MemoryStore;
///
/// let dir = tempfile::tempdir()?;
/// let collection = FeatureCollectionBuilder::new(Arc::new(MemoryStore::new()), "parcels")
///     .with_index_dir(dir.path())
///     .with_srid(3857)
///     .build()?;
///
/// assert_eq!(collection.srid(), Some(3857));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FeatureCollectionBuilder {
    store: Arc<dyn DocumentStore>,
    name: String,
    index_dir: PathBuf,
    srid: Option<i32>,
    default_srid: i32,
    initial_data: Option<FeatureInput>,
    clear_first: bool,
    batch_size: usize,
    meta_collection: String,
}

impl FeatureCollectionBuilder {
    /// Initializes a builder for the collection `name` of `store`, with default settings.
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            store,
            name: name.into(),
            index_dir: defaults.index_path,
            srid: None,
            default_srid: defaults.default_srid,
            initial_data: None,
            clear_first: false,
            batch_size: DEFAULT_BATCH_SIZE,
            meta_collection: DEFAULT_META_COLLECTION.to_owned(),
        }
    }

    /// Takes the default SRID, batch size and metadata collection from `config`.
    ///
    /// The index directory is not taken from the configuration, since it depends on the database the
    /// collection belongs to. Use [`StoreConfig::database_index_path`] with
    /// [`FeatureCollectionBuilder::with_index_dir`].
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.default_srid = config.default_srid;
        self.batch_size = config.batch_size;
        self.meta_collection = config.meta_collection.clone();
        self
    }

    /// Sets the directory of the spatial index file. The file itself is named after the collection.
    pub fn with_index_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.index_dir = path.as_ref().into();
        self
    }

    /// Declares the collection SRID.
    ///
    /// If the collection already exists with another declared SRID, building fails with
    /// [`StoreError::MetadataConflict`]. Without a declaration new collections use the default SRID.
    pub fn with_srid(mut self, srid: i32) -> Self {
        self.srid = Some(srid);
        self
    }

    /// Imports `data` after opening the collection, replacing the collection properties.
    pub fn with_initial_data(mut self, data: impl Into<FeatureInput>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    /// Drops any existing index file, documents and metadata of the collection before opening it.
    pub fn with_clear(mut self) -> Self {
        self.clear_first = true;
        self
    }

    /// Sets the number of identifiers per document-store query of find and delete operations.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the document-store collection holding metadata records.
    pub fn with_meta_collection(mut self, name: impl Into<String>) -> Self {
        self.meta_collection = name.into();
        self
    }

    /// Consumes the builder and opens the collection, creating whatever does not exist yet.
    pub fn build(self) -> Result<FeatureCollection, StoreError> {
        let Self {
            store,
            name,
            index_dir,
            srid,
            default_srid,
            initial_data,
            clear_first,
            batch_size,
            meta_collection,
        } = self;

        validate_name("collection", &name)?;
        if batch_size == 0 {
            return Err(StoreError::Validation("batch_size must be positive".into()));
        }
        if name == meta_collection {
            return Err(StoreError::Validation(format!(
                "`{name}` is reserved for collection metadata"
            )));
        }

        let index_path = index_dir.join(format!("{name}.{INDEX_EXTENSION}"));
        if clear_first {
            if let Some(stored) = MetaRecord::find(store.as_ref(), &meta_collection, &name)? {
                let stored_path = PathBuf::from(stored.index_location);
                if stored_path != index_path {
                    remove_index_file(&stored_path)?;
                }
            }
            remove_index_file(&index_path)?;
            store.drop_collection(&name)?;
            MetaRecord::remove(store.as_ref(), &meta_collection, &name)?;
            info!("Cleared feature collection {name}");
        }

        let default = CollectionMeta::new(
            &name,
            Some(srid.unwrap_or(default_srid)),
            index_path.to_string_lossy().into_owned(),
        );
        let mut meta = MetaRecord::load_or_create(store.clone(), &meta_collection, default)?;
        if let Some(srid) = srid {
            let declared = meta.get().srid;
            match declared {
                Some(declared) if declared != srid => {
                    return Err(StoreError::MetadataConflict { key: "srid".into() })
                }
                Some(_) => {}
                None => meta.modify(|m| {
                    m.srid = Some(srid);
                    Ok(())
                })?,
            }
        }

        store.create_collection(&name)?;

        let effective_srid = meta.get().srid.unwrap_or(default_srid);
        let index = SpatialIndex::open(&meta.get().index_location, effective_srid)?;
        let codec = GeometryCodec::for_srid(effective_srid)?;

        let mut collection = FeatureCollection {
            store,
            name,
            meta,
            index,
            codec,
            default_srid,
            batch_size,
        };
        info!(
            "Opened feature collection {} with SRID {effective_srid}",
            collection.name
        );

        if let Some(data) = initial_data {
            collection.insert_features(data, true)?;
        }

        Ok(collection)
    }
}

/// Checks that `name` can be used as a collection or database name, which also name index files and
/// directories.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "`{name}` is not a valid {kind} name"
        )))
    }
}

fn remove_index_file(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("Spatial index file {path:?} is already absent");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
