//! See documentation for [`SpatialGeometry`].

use geo::MapCoordsInPlace;
use geo_types::{Coord, Geometry};
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};

use crate::bounding_rect::BoundingRect;
use crate::crs::Crs;
use crate::error::GeometryError;

/// A geometry in 2d coordinates, tagged with the SRID of the system its coordinates are expressed in.
///
/// An SRID that is not positive is treated as "not set", the same way spatial databases use `0` and `-1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGeometry {
    geometry: Geometry<f64>,
    srid: Option<i32>,
}

impl SpatialGeometry {
    /// Creates a new geometry with the given SRID.
    pub fn new(geometry: impl Into<Geometry<f64>>, srid: Option<i32>) -> Self {
        Self {
            geometry: geometry.into(),
            srid: srid.filter(|v| *v > 0),
        }
    }

    /// Returns the geometry with the SRID replaced.
    pub fn with_srid(mut self, srid: i32) -> Self {
        self.set_srid(Some(srid));
        self
    }

    /// The coordinates.
    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    /// Returns the inner geometry, dropping the SRID.
    pub fn into_inner(self) -> Geometry<f64> {
        self.geometry
    }

    /// SRID of the coordinates, if set.
    pub fn srid(&self) -> Option<i32> {
        self.srid
    }

    /// Sets or clears the SRID without touching the coordinates.
    pub fn set_srid(&mut self, srid: Option<i32>) {
        self.srid = srid.filter(|v| *v > 0);
    }

    /// Reads a geometry from well-known binary.
    pub fn from_wkb(bytes: &[u8], srid: Option<i32>) -> Result<Self, GeometryError> {
        let geometry = Wkb(bytes.to_vec())
            .to_geo()
            .map_err(|err| GeometryError::Wkb(err.to_string()))?;
        Ok(Self::new(geometry, srid))
    }

    /// Writes the 2d well-known binary representation. The SRID is not part of the output.
    pub fn to_wkb(&self) -> Result<Vec<u8>, GeometryError> {
        self.geometry
            .to_wkb(CoordDimensions::xy())
            .map_err(|err| GeometryError::Wkb(err.to_string()))
    }

    /// Bounding rectangle of the geometry. Empty geometries have none.
    pub fn bounding_rect(&self) -> Option<BoundingRect> {
        BoundingRect::of_geometry(&self.geometry)
    }

    /// Reprojects the coordinates into `target` in place and updates the SRID.
    ///
    /// Fails with [`GeometryError::MissingSrid`] if the current SRID is not known. If any coordinate cannot be
    /// projected the geometry is left unchanged.
    pub fn transform(&mut self, target: &Crs) -> Result<(), GeometryError> {
        let srid = self.srid.ok_or(GeometryError::MissingSrid)?;
        if srid == target.srid() {
            return Ok(());
        }

        let source =
            Crs::from_srid(srid).ok_or_else(|| GeometryError::UnknownCrs(format!("EPSG:{srid}")))?;
        let transform = source.transform_to(target)?;

        let mut projected = self.geometry.clone();
        project_in_place(&mut projected, &|c| transform.apply(c))?;

        self.geometry = projected;
        self.srid = Some(target.srid());
        Ok(())
    }

    /// Same as [`SpatialGeometry::transform`], but returns a new geometry.
    pub fn transformed(&self, target: &Crs) -> Result<Self, GeometryError> {
        let mut copy = self.clone();
        copy.transform(target)?;
        Ok(copy)
    }
}

/// Applies `project` to every coordinate. Collections are walked here rather than by `MapCoordsInPlace`, whose
/// `Geometry` impl nests the closure type once per collection level.
fn project_in_place(
    geometry: &mut Geometry<f64>,
    project: &dyn Fn(Coord<f64>) -> Result<Coord<f64>, GeometryError>,
) -> Result<(), GeometryError> {
    match geometry {
        Geometry::Point(g) => g.try_map_coords_in_place(project),
        Geometry::Line(g) => g.try_map_coords_in_place(project),
        Geometry::LineString(g) => g.try_map_coords_in_place(project),
        Geometry::Polygon(g) => g.try_map_coords_in_place(project),
        Geometry::MultiPoint(g) => g.try_map_coords_in_place(project),
        Geometry::MultiLineString(g) => g.try_map_coords_in_place(project),
        Geometry::MultiPolygon(g) => g.try_map_coords_in_place(project),
        Geometry::Rect(g) => g.try_map_coords_in_place(project),
        Geometry::Triangle(g) => g.try_map_coords_in_place(project),
        Geometry::GeometryCollection(collection) => collection
            .iter_mut()
            .try_for_each(|member| project_in_place(member, project)),
    }
}

impl From<Geometry<f64>> for SpatialGeometry {
    fn from(value: Geometry<f64>) -> Self {
        Self::new(value, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use geo_types::{line_string, point, polygon, GeometryCollection, Point};

    #[test]
    fn non_positive_srid_is_unset() {
        let geometry = SpatialGeometry::new(point!(x: 1.0, y: 2.0), Some(-1));
        assert_eq!(geometry.srid(), None);
        assert_eq!(geometry.with_srid(0).srid(), None);
    }

    #[test]
    fn wkb_keeps_coordinates() {
        let polygon =
            polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 50.0), (x: 50.0, y: 50.0), (x: 50.0, y: 0.0), (x: 0.0, y: 0.0)];
        let geometry = SpatialGeometry::new(polygon, Some(4326));

        let bytes = geometry.to_wkb().unwrap();
        let restored = SpatialGeometry::from_wkb(&bytes, Some(4326)).unwrap();

        assert_eq!(restored, geometry);
    }

    #[test]
    fn invalid_wkb() {
        assert_matches!(
            SpatialGeometry::from_wkb(&[1, 2, 3], None),
            Err(GeometryError::Wkb(_))
        );
    }

    #[test]
    fn transform_updates_srid() {
        let mut geometry = SpatialGeometry::new(point!(x: 180.0, y: 0.0), Some(4326));
        geometry.transform(&Crs::EPSG3857).unwrap();

        assert_eq!(geometry.srid(), Some(3857));
        let Geometry::Point(p) = geometry.geometry() else {
            panic!("point expected");
        };
        assert_relative_eq!(p.x(), 20_037_508.342789244, epsilon = 1e-6);
    }

    #[test]
    fn transform_without_srid_fails() {
        let mut geometry = SpatialGeometry::new(Point::new(1.0, 1.0), None);
        assert_matches!(
            geometry.transform(&Crs::EPSG3857),
            Err(GeometryError::MissingSrid)
        );
    }

    #[test]
    fn failed_transform_leaves_geometry_unchanged() {
        let line: Geometry<f64> =
            line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 90.0)].into();
        let mut geometry = SpatialGeometry::new(line.clone(), Some(4326));

        assert_matches!(
            geometry.transform(&Crs::EPSG3857),
            Err(GeometryError::Projection { .. })
        );
        assert_eq!(geometry.geometry(), &line);
        assert_eq!(geometry.srid(), Some(4326));
    }

    #[test]
    fn transform_walks_nested_collections() {
        let inner = GeometryCollection(vec![Geometry::Point(point!(x: 180.0, y: 0.0))]);
        let outer = GeometryCollection(vec![
            Geometry::GeometryCollection(inner),
            Geometry::Point(point!(x: 0.0, y: 0.0)),
        ]);
        let mut geometry = SpatialGeometry::new(Geometry::GeometryCollection(outer), Some(4326));
        geometry.transform(&Crs::EPSG3857).unwrap();

        let Geometry::GeometryCollection(outer) = geometry.geometry() else {
            panic!("collection expected");
        };
        let Geometry::GeometryCollection(inner) = &outer.0[0] else {
            panic!("nested collection expected");
        };
        let Geometry::Point(p) = &inner.0[0] else {
            panic!("point expected");
        };
        assert_relative_eq!(p.x(), 20_037_508.342789244, epsilon = 1e-6);
    }
}
