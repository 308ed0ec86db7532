//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
    /// Well-known binary could not be read or written.
    #[error("invalid WKB: {0}")]
    Wkb(String),
    /// The value cannot be interpreted as a supported coordinate reference system.
    #[error("unsupported coordinate reference system: {0}")]
    UnknownCrs(String),
    /// An operation needs the geometry SRID, but it is not set.
    #[error("geometry srid is not set")]
    MissingSrid,
    /// A coordinate has no image in the target CRS.
    #[error("failed to project coordinate ({x}, {y}) from EPSG:{from} to EPSG:{to}")]
    Projection {
        /// X of the failed coordinate.
        x: f64,
        /// Y of the failed coordinate.
        y: f64,
        /// Source SRID.
        from: i32,
        /// Target SRID.
        to: i32,
    },
}
