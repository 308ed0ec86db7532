//! Collection metadata record.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Document, DocumentStore, FeatureId, Filter, Update};
use crate::error::StoreError;

const VERSION_FIELD: &str = "version";
const MAX_ATTEMPTS: usize = 8;

/// Persisted description of a feature collection: declared CRS, index file and collection-level properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Identifier of the record. Equal to the collection name.
    #[serde(rename = "_id")]
    pub id: FeatureId,
    /// Declared SRID. `None` until declared, or after it was unset.
    #[serde(default)]
    pub srid: Option<i32>,
    /// Location of the spatial index file.
    pub index_location: String,
    /// Collection-level properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Incremented on every write.
    #[serde(default)]
    pub version: u64,
}

impl CollectionMeta {
    /// Creates a record for the collection `name`.
    pub fn new(name: &str, srid: Option<i32>, index_location: String) -> Self {
        Self {
            id: FeatureId::from(name),
            srid,
            index_location,
            properties: Map::new(),
            version: 0,
        }
    }

    fn to_document(&self) -> Result<Document, StoreError> {
        Document::try_from(serde_json::to_value(self)?)
    }

    fn from_document(document: Document) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(document.into())?)
    }
}

/// The metadata record of one collection together with the store it lives in.
///
/// Every mutation is a versioned read-modify-write: the record is re-read, modified, and written back only
/// if nobody wrote it in between, otherwise the modification is retried on the fresh record.
pub(crate) struct MetaRecord {
    store: Arc<dyn DocumentStore>,
    collection: String,
    meta: CollectionMeta,
}

impl MetaRecord {
    /// Loads the record of `name`, or stores `default` if there is none.
    pub(crate) fn load_or_create(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        default: CollectionMeta,
    ) -> Result<Self, StoreError> {
        let meta = match store.find_one(collection, &default.id)? {
            Some(document) => CollectionMeta::from_document(document)?,
            None => {
                store.insert(collection, default.to_document()?)?;
                debug!("Created metadata record for collection {}", default.id);
                default
            }
        };

        Ok(Self {
            store,
            collection: collection.to_owned(),
            meta,
        })
    }

    /// Reads the record of `name` without creating it.
    pub(crate) fn find(
        store: &dyn DocumentStore,
        collection: &str,
        name: &str,
    ) -> Result<Option<CollectionMeta>, StoreError> {
        store
            .find_one(collection, &FeatureId::from(name))?
            .map(CollectionMeta::from_document)
            .transpose()
    }

    /// Removes the record of `name` from `collection`. A missing record is not an error.
    pub(crate) fn remove(
        store: &dyn DocumentStore,
        collection: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        store.remove(collection, &Filter::id_eq(&FeatureId::from(name)))?;
        Ok(())
    }

    /// Name of the collection holding the record.
    pub(crate) fn collection(&self) -> &str {
        &self.collection
    }

    /// The last read or written state of the record.
    pub(crate) fn get(&self) -> &CollectionMeta {
        &self.meta
    }

    /// Re-reads the record from the store.
    pub(crate) fn refresh(&mut self) -> Result<&CollectionMeta, StoreError> {
        let document = self
            .store
            .find_one(&self.collection, &self.meta.id)?
            .ok_or_else(|| StoreError::NotFound(format!("metadata of collection {}", self.meta.id)))?;
        self.meta = CollectionMeta::from_document(document)?;
        Ok(&self.meta)
    }

    /// Applies `modify` to the current record and persists the result.
    ///
    /// `modify` may run more than once if the record is written concurrently. If it fails, nothing is written.
    pub(crate) fn modify<R>(
        &mut self,
        mut modify: impl FnMut(&mut CollectionMeta) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        for _ in 0..MAX_ATTEMPTS {
            let current = self.refresh()?.clone();
            let mut next = current.clone();
            let result = modify(&mut next)?;
            next.version = current.version + 1;

            let filter = Filter::id_eq(&current.id).and(Filter::eq(VERSION_FIELD, current.version));
            let written = self.store.update(
                &self.collection,
                &filter,
                &Update::replace(next.to_document()?),
                false,
                false,
            )?;

            if written.matched == 1 {
                self.meta = next;
                return Ok(result);
            }
            debug!(
                "Metadata record {} changed concurrently, retrying",
                current.id
            );
        }

        Err(StoreError::Document(format!(
            "metadata record {} is modified concurrently",
            self.meta.id
        )))
    }
}
