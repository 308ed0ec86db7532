use geo_types::{coord, Coord};
use geodesy::prelude::*;

use crate::projection::Projection;

/// Projection defined by a `geodesy` operator, e.g. `utm zone=32 ellps=WGS84`.
pub struct GeodesyProjection {
    context: Minimal,
    op: OpHandle,
}

impl GeodesyProjection {
    /// Builds the projection. Returns `None` if `definition` is not a valid operator.
    pub fn new(definition: &str) -> Option<Self> {
        let mut context = Minimal::new();
        let op = context.op(definition).ok()?;
        Some(Self { context, op })
    }
}

impl Projection for GeodesyProjection {
    fn project(&self, lon_lat: Coord<f64>) -> Option<Coord<f64>> {
        let mut data = [Coor2D::geo(lon_lat.y, lon_lat.x)];
        self.context.apply(self.op, Fwd, &mut data).ok()?;

        if !data[0].0[0].is_finite() || !data[0].0[1].is_finite() {
            return None;
        }

        Some(coord! { x: data[0].0[0], y: data[0].0[1] })
    }

    fn unproject(&self, xy: Coord<f64>) -> Option<Coord<f64>> {
        let mut data = [Coor2D([xy.x, xy.y])];
        self.context.apply(self.op, Inv, &mut data).ok()?;

        Some(coord! {
            x: data[0].0[0].to_degrees(),
            y: data[0].0[1].to_degrees(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn utm_central_meridian_on_equator() {
        let projection = GeodesyProjection::new("utm zone=32 ellps=WGS84").unwrap();
        let projected = projection.project(coord! { x: 9.0, y: 0.0 }).unwrap();

        assert_relative_eq!(projected.x, 500_000.0, epsilon = 1e-3);
        assert_relative_eq!(projected.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn utm_round_trip() {
        let projection = GeodesyProjection::new("utm zone=32 ellps=WGS84").unwrap();
        let projected = projection.project(coord! { x: 10.0, y: 52.0 }).unwrap();
        let restored = projection.unproject(projected).unwrap();

        assert_relative_eq!(restored.x, 10.0, epsilon = 1e-7);
        assert_relative_eq!(restored.y, 52.0, epsilon = 1e-7);
    }

    #[test]
    fn invalid_definition() {
        assert!(GeodesyProjection::new("no_such_operator x=1").is_none());
    }
}
