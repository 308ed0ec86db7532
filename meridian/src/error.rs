//! Error types used by the crate.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use meridian_types::GeometryError;
use thiserror::Error;

/// Lifecycle state of a [`SpatialIndex`](crate::index::SpatialIndex).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// The backing file is open.
    Open,
    /// The index was closed explicitly.
    Closed,
    /// The backing file was deleted.
    Dropped,
}

impl Display for IndexState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Open => write!(f, "open"),
            IndexState::Closed => write!(f, "closed"),
            IndexState::Dropped => write!(f, "dropped"),
        }
    }
}

/// Meridian error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or unreconcilable input: CRS, geometry, configuration.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A non-replacing import or assignment tried to redefine a metadata value.
    #[error("property `{key}` is already defined with a different value")]
    MetadataConflict {
        /// Name of the conflicting property.
        key: String,
    },
    /// Spatial predicate name that is not supported.
    #[error("unknown spatial predicate `{0}`")]
    UnknownPredicate(String),
    /// Identifier is already present in the spatial index or the document store.
    #[error("identifier `{0}` is already present")]
    Uniqueness(String),
    /// Item not found.
    #[error("{0} not found")]
    NotFound(String),
    /// Operation on an index that is not open.
    #[error("spatial index is {0}")]
    State(IndexState),
    /// Failure reported by the spatial index engine.
    #[error("spatial index error: {0}")]
    Index(#[from] rusqlite::Error),
    /// Index file exists but was not created by this crate or is damaged.
    #[error("incompatible or corrupt index file {0:?}")]
    IncompatibleIndex(PathBuf),
    /// Failure reported by a document store implementation.
    #[error("document store error: {0}")]
    Document(String),
    /// Error reading/writing index files.
    #[error("failed to access index storage")]
    FsIo(#[from] std::io::Error),
    /// Document or metadata (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors caused by invalid caller input rather than by a backing store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::Validation(_)
                | StoreError::MetadataConflict { .. }
                | StoreError::UnknownPredicate(_)
        )
    }
}

impl From<GeometryError> for StoreError {
    fn from(value: GeometryError) -> Self {
        Self::Validation(value.to_string())
    }
}
