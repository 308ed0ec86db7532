//! Projections between geographic coordinates and the planes of supported coordinate reference systems.
//!
//! All projections share one geographic pivot: longitude/latitude in degrees on the CRS datum. Transforming a
//! coordinate between two systems is therefore "unproject from the source, project into the target"
//! (see [`CrsTransform`]). Datum shifts are not modelled.
mod identity;
mod web_mercator;

pub use identity::IdentityProjection;
pub use web_mercator::WebMercator;

#[cfg(feature = "geodesy")]
mod geodesy;
#[cfg(feature = "geodesy")]
pub use geodesy::GeodesyProjection;

use geo_types::Coord;

use crate::crs::Crs;
use crate::error::GeometryError;

/// Conversion between geographic coordinates and a projected plane.
///
/// Geographic coordinates use `x` for longitude and `y` for latitude, both in degrees.
pub trait Projection {
    /// Projects a geographic coordinate. Returns `None` if the coordinate has no image in the plane.
    fn project(&self, lon_lat: Coord<f64>) -> Option<Coord<f64>>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, xy: Coord<f64>) -> Option<Coord<f64>>;
}

/// Chain of two projections converting coordinates from one [`Crs`] into another.
pub struct CrsTransform {
    from: i32,
    to: i32,
    source: Box<dyn Projection>,
    target: Box<dyn Projection>,
}

impl CrsTransform {
    /// Creates a transformation from `source` to `target`.
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, GeometryError> {
        Ok(Self {
            from: source.srid(),
            to: target.srid(),
            source: source.projection()?,
            target: target.projection()?,
        })
    }

    /// SRID of the source system.
    pub fn from_srid(&self) -> i32 {
        self.from
    }

    /// SRID of the target system.
    pub fn to_srid(&self) -> i32 {
        self.to
    }

    /// Returns true if the transformation leaves coordinates unchanged.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Transforms a single coordinate.
    pub fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        if self.is_identity() {
            return Ok(coord);
        }

        self.source
            .unproject(coord)
            .and_then(|lon_lat| self.target.project(lon_lat))
            .ok_or(GeometryError::Projection {
                x: coord.x,
                y: coord.y,
                from: self.from,
                to: self.to,
            })
    }
}

impl std::fmt::Debug for CrsTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsTransform")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}
