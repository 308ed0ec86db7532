use geo_types::Coord;

use crate::projection::Projection;

/// Projection of a geographic CRS onto itself: longitude becomes `x` and latitude becomes `y`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityProjection;

impl IdentityProjection {
    /// Creates a new instance.
    pub fn new() -> Self {
        Self
    }
}

impl Projection for IdentityProjection {
    fn project(&self, lon_lat: Coord<f64>) -> Option<Coord<f64>> {
        Some(lon_lat)
    }

    fn unproject(&self, xy: Coord<f64>) -> Option<Coord<f64>> {
        Some(xy)
    }
}
