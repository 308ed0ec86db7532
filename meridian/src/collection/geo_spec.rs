use std::collections::BTreeSet;

use meridian_types::{CrsCandidate, SpatialGeometry};
use serde_json::Value;

use crate::document::FeatureId;
use crate::error::StoreError;
use crate::feature::CRS_FIELD;
use crate::index::{GeoOperator, Predicate, SpatialIndex};

const RELATE: &str = "relate";

/// Spatial part of a query: predicates against query geometries, all of which must hold.
///
/// ```
/// use meridian::collection::GeoSpec;
/// use meridian::index::Predicate;
/// use meridian_types::SpatialGeometry;
/// use meridian_types::geo_types::point;
///
/// let spec = GeoSpec::new()
///     .with(Predicate::Contains, SpatialGeometry::new(point!(x: 1.0, y: 2.0), Some(4326)));
/// assert_eq!(spec.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoSpec {
    entries: Vec<(GeoOperator, SpatialGeometry)>,
}

impl GeoSpec {
    /// Creates an empty spec. An empty spec matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint.
    pub fn with(mut self, operator: impl Into<GeoOperator>, geometry: SpatialGeometry) -> Self {
        self.entries.push((operator.into(), geometry));
        self
    }

    /// Adds a constraint by predicate name, e.g. `within` or `$within`.
    pub fn with_named(self, name: &str, geometry: SpatialGeometry) -> Result<Self, StoreError> {
        Ok(self.with(name.parse::<Predicate>()?, geometry))
    }

    /// Adds a DE-9IM `relate` constraint.
    pub fn with_relate(self, pattern: &str, geometry: SpatialGeometry) -> Result<Self, StoreError> {
        Ok(self.with(GeoOperator::relate(pattern)?, geometry))
    }

    /// Reads a spec from a JSON object mapping operator names to GeoJSON geometries.
    ///
    /// Names may carry a `$` prefix. A `relate` operator takes a `[pattern, geometry]` pair. A geometry may
    /// declare its reference system in a `crs` member; otherwise it is taken to be in `default_srid`.
    pub fn from_json(value: &Value, default_srid: i32) -> Result<Self, StoreError> {
        let Value::Object(object) = value else {
            return Err(StoreError::Validation("geo spec must be a JSON object".into()));
        };

        let mut spec = Self::new();
        for (name, argument) in object {
            let bare = name.strip_prefix('$').unwrap_or(name);
            spec = if bare.eq_ignore_ascii_case(RELATE) {
                match argument.as_array().map(Vec::as_slice) {
                    Some([Value::String(pattern), geometry]) => {
                        spec.with_relate(pattern, read_geometry(geometry, default_srid)?)?
                    }
                    _ => {
                        return Err(StoreError::Validation(
                            "relate expects a [pattern, geometry] pair".into(),
                        ))
                    }
                }
            } else {
                spec.with_named(name, read_geometry(argument, default_srid)?)?
            };
        }

        Ok(spec)
    }

    /// Constraints in insertion order.
    pub fn entries(&self) -> &[(GeoOperator, SpatialGeometry)] {
        &self.entries
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers satisfying every constraint, in ascending order.
    pub(crate) fn evaluate(&self, index: &SpatialIndex) -> Result<BTreeSet<FeatureId>, StoreError> {
        let mut result: Option<BTreeSet<FeatureId>> = None;
        for (operator, geometry) in &self.entries {
            let ids: BTreeSet<FeatureId> = index.query(operator, geometry)?.into_iter().collect();
            let narrowed = match result {
                None => ids,
                Some(previous) => previous.intersection(&ids).cloned().collect(),
            };
            if narrowed.is_empty() {
                return Ok(narrowed);
            }
            result = Some(narrowed);
        }

        Ok(result.unwrap_or_default())
    }
}

fn read_geometry(value: &Value, default_srid: i32) -> Result<SpatialGeometry, StoreError> {
    let srid = match value.get(CRS_FIELD) {
        Some(crs) => match CrsCandidate::from_value(crs)? {
            CrsCandidate::Srid(srid) => srid,
            CrsCandidate::Reference(crs) => crs.srid(),
            CrsCandidate::Name(name) => meridian_types::Crs::from_name(&name)
                .map(|crs| crs.srid())
                .ok_or_else(|| StoreError::Validation(format!("unknown CRS `{name}`")))?,
        },
        None => default_srid,
    };

    Ok(SpatialGeometry::from_geojson_value(value, Some(srid))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use geo::polygon;
    use serde_json::json;

    fn square(min: f64, max: f64) -> SpatialGeometry {
        SpatialGeometry::new(
            polygon![(x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max), (x: min, y: min)],
            Some(4326),
        )
    }

    fn index() -> SpatialIndex {
        let mut index = SpatialIndex::open_in_memory(4326).unwrap();
        index.insert(&FeatureId::from("a"), &square(0.0, 10.0), None).unwrap();
        index.insert(&FeatureId::from("b"), &square(5.0, 20.0), None).unwrap();
        index.insert(&FeatureId::from("c"), &square(100.0, 110.0), None).unwrap();
        index
    }

    fn names(ids: BTreeSet<FeatureId>) -> Vec<String> {
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn constraints_are_intersected() {
        let index = index();
        let spec = GeoSpec::new()
            .with(Predicate::Within, square(-1.0, 30.0))
            .with(Predicate::Intersects, square(15.0, 16.0));
        assert_eq!(names(spec.evaluate(&index).unwrap()), vec!["b"]);

        let spec = GeoSpec::new().with(Predicate::Within, square(-1.0, 30.0));
        assert_eq!(names(spec.evaluate(&index).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn empty_spec_matches_nothing() {
        assert!(GeoSpec::new().evaluate(&index()).unwrap().is_empty());
    }

    #[test]
    fn reads_json() {
        let value = json!({
            "$within": {
                "type": "Polygon",
                "coordinates": [[[-1.0, -1.0], [30.0, -1.0], [30.0, 30.0], [-1.0, 30.0], [-1.0, -1.0]]]
            },
            "intersects": {"type": "Point", "coordinates": [15.0, 15.0], "crs": "EPSG:4326"},
            "$relate": ["T********", {"type": "Point", "coordinates": [7.0, 7.0]}]
        });
        let spec = GeoSpec::from_json(&value, 4326).unwrap();
        assert_eq!(spec.len(), 3);
        assert_eq!(names(spec.evaluate(&index()).unwrap()), vec!["b"]);
    }

    #[test]
    fn rejects_unknown_operators() {
        let value = json!({"$near": {"type": "Point", "coordinates": [0.0, 0.0]}});
        assert_matches!(
            GeoSpec::from_json(&value, 4326),
            Err(StoreError::UnknownPredicate(name)) if name == "$near"
        );
        assert_matches!(
            GeoSpec::from_json(&json!({"relate": "T********"}), 4326),
            Err(StoreError::Validation(_))
        );
    }
}
