//! Document-store capability the feature collections are built on.
//!
//! A document store keeps schemaless JSON documents in named collections and can find, update and remove
//! them by structured attribute [`Filter`]s. It knows nothing about geometry: spatial queries are answered by
//! the [`SpatialIndex`](crate::index::SpatialIndex) and composed with attribute filters by identifier.
//!
//! The traits here are the seam to the storage backend. [`MemoryClient`] is the in-process implementation
//! shipped with the crate.

use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

mod filter;
mod memory;
mod update;

pub use filter::Filter;
pub use memory::{MemoryClient, MemoryStore};
pub use update::{Update, UpdateOp};

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";

/// Identifier of a stored document, serialized as a plain string regardless of the store's native id type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    /// Creates an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// String form of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FeatureId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<FeatureId> for Value {
    fn from(value: FeatureId) -> Self {
        Value::String(value.0)
    }
}

/// A JSON object stored in a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the document, if it has been stored.
    pub fn id(&self) -> Option<FeatureId> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) => Some(FeatureId::new(s.clone())),
            Value::Number(n) => Some(FeatureId::new(n.to_string())),
            _ => None,
        }
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: &FeatureId) {
        self.0.insert(ID_FIELD.to_owned(), id.clone().into());
    }

    /// Looks up a value by a dotted path, e.g. `properties.name`. Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(object) => object.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Returns the underlying JSON object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl Deref for Document {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Document {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => Ok(Self(object)),
            other => Err(StoreError::Validation(format!(
                "document must be a JSON object, got {other}"
            ))),
        }
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Object(value.0)
    }
}

/// Sort direction of a [`FindOptions`] sort key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Query options forwarded to the document store.
///
/// `timeout`, `snapshot` and `partial` are not interpreted by this crate; they are passed to the store as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Projection. `None` returns whole documents; the identifier is always included.
    pub fields: Option<Vec<String>>,
    /// Number of leading results to skip.
    pub skip: usize,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Sort keys, most significant first.
    pub sort: Vec<(String, SortOrder)>,
    /// Server-side timeout.
    pub timeout: Option<Duration>,
    /// Request snapshot isolation of the query.
    pub snapshot: bool,
    /// Accept partial results from unavailable shards.
    pub partial: bool,
}

impl FindOptions {
    /// Options returning only identifiers.
    pub fn ids_only() -> Self {
        Self {
            fields: Some(vec![ID_FIELD.to_owned()]),
            ..Default::default()
        }
    }

    /// Sets the projection.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the number of skipped results.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Appends a sort key.
    pub fn sort_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((path.into(), order));
        self
    }
}

/// Outcome of [`DocumentStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub matched: usize,
    /// Identifiers of the documents that were modified.
    pub modified: Vec<FeatureId>,
    /// Identifier of the document created by an upsert.
    pub upserted: Option<FeatureId>,
}

impl UpdateResult {
    /// Identifiers of all documents the update wrote: modified ones and the upserted one.
    pub fn touched(&self) -> impl Iterator<Item = &FeatureId> {
        self.modified.iter().chain(self.upserted.iter())
    }
}

/// One database of a document store: a set of named collections of [`Document`]s.
///
/// Inserting into a collection that does not exist creates it. Removing documents and dropping collections
/// that do not exist is not an error.
pub trait DocumentStore: Send + Sync {
    /// Creates an empty collection if it does not exist yet.
    fn create_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Drops a collection with all its documents.
    fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Names of all existing collections.
    fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// Inserts a document. An identifier is assigned unless the document already has one.
    fn insert(&self, collection: &str, document: Document) -> Result<FeatureId, StoreError>;

    /// Inserts several documents at once. Either all of them are inserted or none is.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<FeatureId>, StoreError>;

    /// Inserts the document, or replaces the stored document with the same identifier.
    fn save(&self, collection: &str, document: Document) -> Result<FeatureId, StoreError>;

    /// Returns the documents matching the filter.
    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Returns the document with the given identifier.
    fn find_one(&self, collection: &str, id: &FeatureId) -> Result<Option<Document>, StoreError> {
        let options = FindOptions::default().with_limit(1);
        Ok(self
            .find(collection, &Filter::id_eq(id), &options)?
            .into_iter()
            .next())
    }

    /// Applies `update` to the first matching document, or to all of them if `multi` is set. With `upsert`
    /// a new document is created from the filter equalities when nothing matches.
    fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
        multi: bool,
    ) -> Result<UpdateResult, StoreError>;

    /// Removes all documents matching the filter. Returns the number of removed documents.
    fn remove(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError>;
}

/// Connection to a document store server: a set of named databases.
pub trait DocumentClient: Send + Sync {
    /// Returns the database with the given name, creating it on first use.
    fn database(&self, name: &str) -> Result<Arc<dyn DocumentStore>, StoreError>;

    /// Drops a database with all its collections.
    fn drop_database(&self, name: &str) -> Result<(), StoreError>;

    /// Names of all existing databases.
    fn database_names(&self) -> Result<Vec<String>, StoreError>;
}
