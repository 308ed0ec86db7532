//! Meridian is a geographic feature store: collections of GeoJSON features kept in a schemaless document store,
//! queryable by attribute filters, by topological predicates against query geometries, or by both at once.
//!
//! # Quick start
//!
//! ```
//! use meridian::collection::GeoSpec;
//! use meridian::config::StoreConfig;
//! use meridian::database::Connection;
//! use meridian::document::{Filter, FindOptions};
//! use meridian::feature::FeatureInput;
//! use meridian::index::Predicate;
//! use meridian_types::SpatialGeometry;
//! use meridian_types::geo_types::polygon;
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir()?;
//! let mut connection = Connection::in_memory(StoreConfig::new(dir.path()))?;
//! let parcels = connection.database("cadastre")?.collection("parcels")?;
//!
//! parcels.insert_features(
//!     FeatureInput::from_json(json!({
//!         "type": "FeatureCollection",
//!         "crs": 4326,
//!         "features": [
//!             {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 1.0]}, "properties": {"owner": "a"}},
//!             {"type": "Feature", "geometry": {"type": "Point", "coordinates": [9.0, 9.0]}, "properties": {"owner": "b"}},
//!         ]
//!     }))?,
//!     false,
//! )?;
//!
//! let area = SpatialGeometry::new(
//!     polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 5.0), (x: 0.0, y: 5.0), (x: 0.0, y: 0.0)],
//!     Some(4326),
//! );
//! let found: Vec<_> = parcels
//!     .find_features(
//!         Some(&GeoSpec::new().with(Predicate::Within, area)),
//!         Some(&Filter::eq("properties.owner", "a")),
//!         FindOptions::default(),
//!     )?
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Main components
//!
//! * [`FeatureCollection`](collection::FeatureCollection) owns one collection: its documents, its
//!   [`SpatialIndex`](index::SpatialIndex) file and its metadata record with the declared CRS. It keeps the
//!   document store and the index in agreement and combines attribute and spatial queries.
//! * [`GeometryCodec`](codec::GeometryCodec) reads geometries out of incoming features and reprojects them into
//!   the collection CRS.
//! * [`SpatialIndex`](index::SpatialIndex) is a file-backed SQLite R*Tree with topological predicates registered
//!   as SQL functions.
//! * [`Connection`](database::Connection) and [`Database`](database::Database) resolve names to collections,
//!   creating them on first access.
//! * The document store itself is abstracted by the [`DocumentStore`](document::DocumentStore) and
//!   [`DocumentClient`](document::DocumentClient) traits, with an in-process implementation in
//!   [`MemoryClient`](document::MemoryClient).

pub mod codec;
pub mod collection;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod feature;
pub mod index;

pub use collection::{FeatureCollection, FeatureCollectionBuilder, GeoSpec};
pub use config::StoreConfig;
pub use database::{Connection, Database, Universe};
pub use error::StoreError;

// Reexport types crate
pub use meridian_types;
