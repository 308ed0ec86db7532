//! Geometry extraction and CRS normalization of incoming features.

use log::debug;
use meridian_types::{Crs, CrsCandidate, SpatialGeometry};
use serde_json::Value;

use crate::error::StoreError;
use crate::feature::{Feature, FeatureInput};

/// Geometries found in a [`FeatureInput`], in feature order, expressed in the collection CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedGeometry {
    /// The input was a feature collection wrapper.
    pub is_collection: bool,
    /// One entry per feature. Features without a geometry have `None`.
    pub geometries: Vec<Option<SpatialGeometry>>,
}

/// Reads geometries out of GeoJSON features and brings them into the CRS declared by a collection.
///
/// Reprojection rewrites the input in place: the geometry objects of the features are replaced by their
/// reprojected form and `crs` members are set to the target SRID, so storing the features afterwards
/// stores them in the collection CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryCodec {
    target: Crs,
}

impl GeometryCodec {
    /// Creates a codec normalizing into `target`.
    pub fn new(target: Crs) -> Self {
        Self { target }
    }

    /// Creates a codec for the collection SRID `srid`.
    pub fn for_srid(srid: i32) -> Result<Self, StoreError> {
        Crs::from_srid(srid).map(Self::new).ok_or_else(|| {
            StoreError::Validation(format!("SRID {srid} is not a supported reference system"))
        })
    }

    /// The collection CRS.
    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Resolves a CRS candidate. Returns whether geometries in that CRS must be reprojected into the target,
    /// together with the resolved CRS.
    ///
    /// Names are always reprojected. An SRID equal to the target SRID is used as is, other SRIDs are resolved
    /// and reprojected. Unknown names and SRIDs fail with [`StoreError::Validation`].
    pub fn normalize_crs(&self, candidate: &CrsCandidate) -> Result<(bool, Crs), StoreError> {
        match candidate {
            CrsCandidate::Name(name) => Crs::from_name(name)
                .map(|crs| (true, crs))
                .ok_or_else(|| StoreError::Validation(format!("unknown CRS `{name}`"))),
            CrsCandidate::Srid(srid) if *srid == self.target.srid() => Ok((false, self.target)),
            CrsCandidate::Srid(srid) => Crs::from_srid(*srid)
                .map(|crs| (true, crs))
                .ok_or_else(|| StoreError::Validation(format!("unknown SRID {srid}"))),
            CrsCandidate::Reference(crs) => Ok((crs.srid() != self.target.srid(), *crs)),
        }
    }

    /// Extracts the geometries of every feature of `input`, reprojecting them when needed.
    pub fn extract(&self, input: &mut FeatureInput) -> Result<ExtractedGeometry, StoreError> {
        match input {
            FeatureInput::Single(feature) => Ok(ExtractedGeometry {
                is_collection: false,
                geometries: vec![self.extract_feature(feature, None)?],
            }),
            FeatureInput::Many(features) => Ok(ExtractedGeometry {
                is_collection: false,
                geometries: features
                    .iter_mut()
                    .map(|feature| self.extract_feature(feature, None))
                    .collect::<Result<_, _>>()?,
            }),
            FeatureInput::Collection(collection) => {
                let inherited = collection
                    .crs
                    .as_ref()
                    .map(CrsCandidate::from_value)
                    .transpose()?;

                let geometries = collection
                    .features
                    .iter_mut()
                    .map(|feature| self.extract_feature(feature, inherited.as_ref()))
                    .collect::<Result<_, _>>()?;

                if collection.crs.is_some() {
                    collection.crs = Some(self.crs_tag());
                }

                Ok(ExtractedGeometry {
                    is_collection: true,
                    geometries,
                })
            }
        }
    }

    /// Extracts the geometry of one feature. The feature's own `crs` member takes precedence over
    /// `inherited`; without either the geometry is taken to be in the target CRS.
    pub fn extract_feature(
        &self,
        feature: &mut Feature,
        inherited: Option<&CrsCandidate>,
    ) -> Result<Option<SpatialGeometry>, StoreError> {
        let Some(geometry_value) = feature.geometry_value() else {
            return Ok(None);
        };

        let own = feature.crs().map(CrsCandidate::from_value).transpose()?;
        let (reproject, source) = match own.as_ref().or(inherited) {
            Some(candidate) => self.normalize_crs(candidate)?,
            None => (false, self.target),
        };

        let mut geometry = SpatialGeometry::from_geojson_value(geometry_value, Some(source.srid()))?;
        if reproject {
            if source.srid() != self.target.srid() {
                debug!(
                    "Reprojecting feature geometry from {} to {}",
                    source.srid(),
                    self.target.srid()
                );
            }
            geometry.transform(&self.target)?;
            feature.set_geometry_value(geometry.to_geojson_value()?);
        }
        if own.is_some() {
            feature.set_crs(self.crs_tag());
        }

        Ok(Some(geometry))
    }

    /// Geometry of a stored document, which is already in the target CRS.
    pub fn decode_stored(&self, feature: &Feature) -> Result<Option<SpatialGeometry>, StoreError> {
        feature
            .geometry_value()
            .map(|value| SpatialGeometry::from_geojson_value(value, Some(self.target.srid())))
            .transpose()
            .map_err(StoreError::from)
    }

    fn crs_tag(&self) -> Value {
        Value::from(self.target.srid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::GeoJsonFeatureCollection;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use meridian_types::geo_types::{Geometry, Point};
    use serde_json::{json, Map};

    fn point_feature(x: f64, y: f64) -> Feature {
        Feature::new(
            Some(json!({"type": "Point", "coordinates": [x, y]})),
            Map::new(),
        )
    }

    fn as_point(geometry: &SpatialGeometry) -> Point<f64> {
        match geometry.geometry() {
            Geometry::Point(p) => *p,
            other => panic!("expected a point, got {other:?}"),
        }
    }

    #[test]
    fn normalize_candidates() {
        let codec = GeometryCodec::new(Crs::WGS84);

        assert_matches!(
            codec.normalize_crs(&CrsCandidate::Name("EPSG:3857".into())),
            Ok((true, crs)) if crs == Crs::EPSG3857
        );
        assert_matches!(
            codec.normalize_crs(&CrsCandidate::Name("EPSG:4326".into())),
            Ok((true, crs)) if crs == Crs::WGS84
        );
        assert_matches!(codec.normalize_crs(&CrsCandidate::Srid(4326)), Ok((false, _)));
        assert_matches!(codec.normalize_crs(&CrsCandidate::Srid(3857)), Ok((true, _)));
        assert_matches!(codec.normalize_crs(&Crs::WGS84.into()), Ok((false, _)));
        assert_matches!(codec.normalize_crs(&Crs::EPSG3857.into()), Ok((true, _)));
        assert_matches!(
            codec.normalize_crs(&CrsCandidate::Name("EPSG:0".into())),
            Err(StoreError::Validation(_))
        );
        assert_matches!(
            codec.normalize_crs(&CrsCandidate::Srid(123456)),
            Err(StoreError::Validation(_))
        );
    }

    #[test]
    fn single_feature_without_crs_is_kept() {
        let codec = GeometryCodec::new(Crs::WGS84);
        let mut input = FeatureInput::Single(point_feature(10.0, 20.0));
        let extracted = codec.extract(&mut input).unwrap();

        assert!(!extracted.is_collection);
        let geometry = extracted.geometries[0].as_ref().unwrap();
        assert_eq!(geometry.srid(), Some(4326));
        assert_eq!(as_point(geometry), Point::new(10.0, 20.0));
    }

    #[test]
    fn collection_is_reprojected_in_place() {
        let codec = GeometryCodec::new(Crs::WGS84);
        let collection = GeoJsonFeatureCollection::new(vec![
            point_feature(0.0, 0.0),
            point_feature(20037508.342789244, 0.0),
            Feature::new(None, Map::new()),
        ])
        .with_crs("EPSG:3857");
        let mut input = FeatureInput::Collection(collection);

        let extracted = codec.extract(&mut input).unwrap();
        assert!(extracted.is_collection);
        assert_eq!(extracted.geometries.len(), 3);
        assert!(extracted.geometries[2].is_none());

        let east = as_point(extracted.geometries[1].as_ref().unwrap());
        assert_abs_diff_eq!(east.x(), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(east.y(), 0.0, epsilon = 1e-9);

        let FeatureInput::Collection(collection) = input else {
            panic!("input shape changed");
        };
        assert_eq!(collection.crs, Some(json!(4326)));
        let stored = collection.features[1].geometry_value().unwrap();
        let x = stored["coordinates"][0].as_f64().unwrap();
        assert_abs_diff_eq!(x, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn feature_crs_overrides_collection_crs() {
        let codec = GeometryCodec::new(Crs::EPSG3857);
        let mut feature = point_feature(0.0, 0.0);
        feature.set_crs(json!(3857));

        let inherited = CrsCandidate::Name("EPSG:4326".into());
        let geometry = codec
            .extract_feature(&mut feature, Some(&inherited))
            .unwrap()
            .unwrap();
        assert_eq!(geometry.srid(), Some(3857));
        assert_eq!(feature.crs(), Some(&json!(3857)));
    }

    #[test]
    fn unknown_crs_fails_validation() {
        let codec = GeometryCodec::new(Crs::WGS84);
        let mut feature = point_feature(0.0, 0.0);
        feature.set_crs(json!({"type": "link", "properties": {}}));

        assert_matches!(
            codec.extract(&mut FeatureInput::Single(feature)),
            Err(StoreError::Validation(_))
        );
    }
}
