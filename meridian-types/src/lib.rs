//! Geometry values and coordinate reference systems used by the `meridian` feature store.
//!
//! The central type is [`SpatialGeometry`]: a [`geo_types::Geometry`] tagged with an optional SRID. It can be
//! read from and written to the two encodings the store deals with:
//!
//! * GeoJSON geometry objects, which is how geometries live inside stored documents (see [`mod@geojson`]),
//! * well-known binary, which is how geometries are persisted in the spatial index (see
//!   [`SpatialGeometry::to_wkb`]).
//!
//! Coordinate reference systems are described by [`Crs`]. A `Crs` knows how to build a [`Projection`] from
//! geographic coordinates into its own plane, and two of them can be chained into a [`CrsTransform`] that
//! reprojects geometries in place.
//!
//! ```
//! use meridian_types::{Crs, SpatialGeometry};
//! use meridian_types::geo_types::point;
//!
//! let mut geometry = SpatialGeometry::new(point!(x: 10.0, y: 20.0), Some(4326));
//! geometry.transform(&Crs::EPSG3857)?;
//! assert_eq!(geometry.srid(), Some(3857));
//! # Ok::<(), meridian_types::GeometryError>(())
//! ```

pub mod bounding_rect;
pub mod crs;
mod datum;
pub mod error;
pub mod geojson;
pub mod geometry;
pub mod projection;

pub use bounding_rect::BoundingRect;
pub use crs::{Crs, CrsCandidate, ProjectionType};
pub use datum::Datum;
pub use error::GeometryError;
pub use geometry::SpatialGeometry;
pub use projection::{CrsTransform, Projection};

// Reexport geo_types
pub use geo_types;
