//! Registries resolving names to databases and feature collections.
//!
//! Handles are created on first access and cached; nothing is loaded before it is asked for. Removing a
//! name drops the underlying data, not only the cached handle.

use std::collections::hash_map::Entry;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};

use crate::collection::{validate_name, FeatureCollection, FeatureCollectionBuilder};
use crate::config::StoreConfig;
use crate::document::{DocumentClient, DocumentStore, MemoryClient};
use crate::error::StoreError;

/// One database of the document store, as a set of feature collections.
pub struct Database {
    name: String,
    store: Arc<dyn DocumentStore>,
    config: StoreConfig,
    collections: AHashMap<String, FeatureCollection>,
}

impl Database {
    /// Creates a database handle over `store`. Index files of its collections are placed in the database
    /// directory under `config.index_path`.
    pub fn new(name: &str, store: Arc<dyn DocumentStore>, config: StoreConfig) -> Self {
        Self {
            name: name.to_owned(),
            store,
            config,
            collections: AHashMap::new(),
        }
    }

    /// Name of the database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the index files of the collections.
    pub fn index_dir(&self) -> PathBuf {
        self.config.database_index_path(&self.name)
    }

    /// Returns the collection `name`, creating it if it does not exist.
    pub fn collection(&mut self, name: &str) -> Result<&mut FeatureCollection, StoreError> {
        match self.collections.entry(name.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let collection = FeatureCollectionBuilder::new(self.store.clone(), name)
                    .with_config(&self.config)
                    .with_index_dir(self.config.database_index_path(&self.name))
                    .build()?;
                debug!("Loaded collection {name} of database {}", self.name);
                Ok(entry.insert(collection))
            }
        }
    }

    /// Returns true if a handle of the collection `name` is cached.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Drops the collection `name` with its documents, index and metadata.
    pub fn drop_collection(&mut self, name: &str) -> Result<(), StoreError> {
        let collection = match self.collections.remove(name) {
            Some(collection) => collection,
            None => FeatureCollectionBuilder::new(self.store.clone(), name)
                .with_config(&self.config)
                .with_index_dir(self.config.database_index_path(&self.name))
                .build()?,
        };
        collection.drop()
    }

    /// Names of the feature collections of the database, including those not loaded yet.
    pub fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.store.collection_names()?;
        names.retain(|name| *name != self.config.meta_collection);
        Ok(names)
    }
}

/// A document store client together with the store configuration, as a set of databases.
///
/// ```
/// use meridian::config::StoreConfig;
/// use meridian::database::Connection;
///
/// let dir = tempfile::tempdir()?;
/// let mut connection = Connection::in_memory(StoreConfig::new(dir.path()))?;
/// let collection = connection.database("gis")?.collection("parcels")?;
/// assert_eq!(collection.srid(), Some(4326));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Connection {
    client: Arc<dyn DocumentClient>,
    config: StoreConfig,
    databases: AHashMap<String, Database>,
}

impl Connection {
    /// Creates a connection over `client`. Fails if the configuration is invalid.
    pub fn new(client: Arc<dyn DocumentClient>, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            databases: AHashMap::new(),
        })
    }

    /// Creates a connection over a new in-process [`MemoryClient`].
    pub fn in_memory(config: StoreConfig) -> Result<Self, StoreError> {
        Self::new(Arc::new(MemoryClient::new()), config)
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the database `name`, creating it if it does not exist.
    pub fn database(&mut self, name: &str) -> Result<&mut Database, StoreError> {
        match self.databases.entry(name.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                validate_name("database", name)?;
                let store = self.client.database(name)?;
                Ok(entry.insert(Database::new(name, store, self.config.clone())))
            }
        }
    }

    /// Drops the database `name`: its documents and the index files of all its collections.
    pub fn drop_database(&mut self, name: &str) -> Result<(), StoreError> {
        validate_name("database", name)?;
        // Cached collections close their index files when dropped.
        self.databases.remove(name);
        self.client.drop_database(name)?;

        let index_dir = self.config.database_index_path(name);
        match std::fs::remove_dir_all(&index_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        info!("Dropped database {name}");
        Ok(())
    }

    /// Names of the databases of the client, including those not loaded yet.
    pub fn database_names(&self) -> Result<Vec<String>, StoreError> {
        self.client.database_names()
    }
}

/// Named connections.
#[derive(Default)]
pub struct Universe {
    connections: AHashMap<String, Connection>,
}

impl Universe {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection under `name`. Fails with [`StoreError::Uniqueness`] if the name is taken.
    pub fn register(&mut self, name: &str, connection: Connection) -> Result<(), StoreError> {
        match self.connections.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(StoreError::Uniqueness(name.to_owned())),
            Entry::Vacant(entry) => {
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// The connection registered under `name`.
    pub fn connection(&mut self, name: &str) -> Result<&mut Connection, StoreError> {
        self.connections
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("connection {name}")))
    }

    /// Removes a connection from the registry. Its data is left untouched.
    pub fn remove(&mut self, name: &str) -> Option<Connection> {
        self.connections.remove(name)
    }

    /// Names of the registered connections, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use assert_matches::assert_matches;
    use insta::assert_compact_debug_snapshot;
    use serde_json::{json, Map};

    fn connection(dir: &std::path::Path) -> Connection {
        Connection::in_memory(StoreConfig::new(dir)).unwrap()
    }

    fn point() -> Feature {
        Feature::new(
            Some(json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            Map::new(),
        )
    }

    #[test]
    fn collections_are_created_on_access() {
        let dir = tempfile::tempdir().unwrap();
        let mut connection = connection(dir.path());
        let database = connection.database("gis").unwrap();

        assert!(database.collection_names().unwrap().is_empty());
        assert!(!database.is_loaded("parcels"));

        database
            .collection("parcels")
            .unwrap()
            .insert_features(point(), false)
            .unwrap();
        assert!(database.is_loaded("parcels"));
        assert_eq!(database.collection_names().unwrap(), vec!["parcels"]);
        assert!(dir.path().join("gis").join("parcels.sqlite").exists());

        assert_eq!(database.collection("parcels").unwrap().count(None).unwrap(), 1);
    }

    #[test]
    fn drop_collection_removes_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut connection = connection(dir.path());
        let database = connection.database("gis").unwrap();
        database
            .collection("parcels")
            .unwrap()
            .insert_features(point(), false)
            .unwrap();

        database.drop_collection("parcels").unwrap();
        assert!(!database.is_loaded("parcels"));
        assert!(database.collection_names().unwrap().is_empty());
        assert!(!dir.path().join("gis").join("parcels.sqlite").exists());

        // Dropping something that was never created is tolerated.
        database.drop_collection("roads").unwrap();
        assert!(database.collection_names().unwrap().is_empty());

        let recreated = database.collection("parcels").unwrap();
        assert_eq!(recreated.count(None).unwrap(), 0);
    }

    #[test]
    fn drop_database_removes_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut connection = connection(dir.path());
        connection
            .database("gis")
            .unwrap()
            .collection("parcels")
            .unwrap();
        assert_eq!(connection.database_names().unwrap(), vec!["gis"]);

        connection.drop_database("gis").unwrap();
        assert!(connection.database_names().unwrap().is_empty());
        assert!(!dir.path().join("gis").exists());

        connection.drop_database("gis").unwrap();
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = StoreConfig::default().with_batch_size(0);
        assert_matches!(
            Connection::in_memory(config).err(),
            Some(StoreError::Validation(_))
        );
    }

    #[test]
    fn invalid_database_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut connection = connection(dir.path());
        assert_compact_debug_snapshot!(
            connection.database("../etc").map(|_| ()),
            @r#"Err(Validation("`../etc` is not a valid database name"))"#
        );
    }

    #[test]
    fn universe_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut universe = Universe::new();
        universe.register("local", connection(dir.path())).unwrap();
        universe.register("archive", connection(dir.path())).unwrap();

        assert_matches!(
            universe.register("local", connection(dir.path())),
            Err(StoreError::Uniqueness(name)) if name == "local"
        );
        assert_eq!(universe.names(), vec!["archive", "local"]);

        universe.connection("local").unwrap().database("gis").unwrap();
        assert_matches!(
            universe.connection("remote").err(),
            Some(StoreError::NotFound(_))
        );

        assert!(universe.remove("archive").is_some());
        assert_eq!(universe.names(), vec!["local"]);
    }
}
