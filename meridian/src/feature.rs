//! GeoJSON feature shapes accepted and produced by feature collections.

use serde_json::{Map, Value};

use crate::document::{Document, FeatureId};
use crate::error::StoreError;

/// Discriminator member of GeoJSON objects.
pub const TYPE_FIELD: &str = "type";
/// Geometry member of a feature.
pub const GEOMETRY_FIELD: &str = "geometry";
/// Attribute member of a feature.
pub const PROPERTIES_FIELD: &str = "properties";
/// Reference system member of a feature or a feature collection.
pub const CRS_FIELD: &str = "crs";
/// Member listing the children of a feature collection.
pub const FEATURES_FIELD: &str = "features";
/// Member linking an imported feature to the metadata record of the collection it was imported into.
pub const PARENT_FIELD: &str = "_parent";

const FEATURE_TYPE: &str = "Feature";
const COLLECTION_TYPE: &str = "FeatureCollection";

/// One geolocated document: attributes, at most one geometry and, once stored, an identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature(Document);

impl Feature {
    /// Creates a GeoJSON feature from a geometry object and attributes.
    pub fn new(geometry: Option<Value>, properties: Map<String, Value>) -> Self {
        let mut document = Document::new();
        document.insert(TYPE_FIELD.to_owned(), FEATURE_TYPE.into());
        document.insert(GEOMETRY_FIELD.to_owned(), geometry.unwrap_or(Value::Null));
        document.insert(PROPERTIES_FIELD.to_owned(), Value::Object(properties));
        Self(document)
    }

    /// Wraps a stored document.
    pub fn from_document(document: Document) -> Self {
        Self(document)
    }

    /// The underlying document.
    pub fn document(&self) -> &Document {
        &self.0
    }

    /// Mutable access to the underlying document.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.0
    }

    /// Returns the underlying document.
    pub fn into_document(self) -> Document {
        self.0
    }

    /// Identifier of the feature, if it has one.
    pub fn id(&self) -> Option<FeatureId> {
        self.0.id()
    }

    /// The GeoJSON geometry object. A `null` geometry is reported as absent.
    pub fn geometry_value(&self) -> Option<&Value> {
        self.0.get(GEOMETRY_FIELD).filter(|v| !v.is_null())
    }

    /// Replaces the geometry object.
    pub fn set_geometry_value(&mut self, geometry: Value) {
        self.0.insert(GEOMETRY_FIELD.to_owned(), geometry);
    }

    /// The `crs` member of the feature.
    pub fn crs(&self) -> Option<&Value> {
        self.0.get(CRS_FIELD).filter(|v| !v.is_null())
    }

    /// Replaces the `crs` member.
    pub fn set_crs(&mut self, crs: Value) {
        self.0.insert(CRS_FIELD.to_owned(), crs);
    }

    /// Attributes of the feature.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.0.get(PROPERTIES_FIELD).and_then(Value::as_object)
    }

    /// Links the feature to the metadata record `parent`.
    pub fn set_parent(&mut self, parent: &FeatureId) {
        self.0.insert(PARENT_FIELD.to_owned(), parent.clone().into());
    }
}

impl TryFrom<Value> for Feature {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(Self(Document::try_from(value)?))
    }
}

impl From<Feature> for Value {
    fn from(value: Feature) -> Self {
        value.0.into()
    }
}

/// A GeoJSON `FeatureCollection` wrapper: features sharing a reference system, plus wrapper-level members
/// that are promoted to collection metadata on import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoJsonFeatureCollection {
    /// Child features.
    pub features: Vec<Feature>,
    /// Reference system of every child that does not declare its own.
    pub crs: Option<Value>,
    /// Other wrapper members, except `type`, `crs` and `features`.
    pub attributes: Map<String, Value>,
}

impl GeoJsonFeatureCollection {
    /// Creates a wrapper around `features`.
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    /// Sets the reference system.
    pub fn with_crs(mut self, crs: impl Into<Value>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Adds a wrapper-level member.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Serializes the wrapper as a GeoJSON object.
    pub fn to_value(&self) -> Value {
        let mut object = self.attributes.clone();
        object.insert(TYPE_FIELD.to_owned(), COLLECTION_TYPE.into());
        if let Some(crs) = &self.crs {
            object.insert(CRS_FIELD.to_owned(), crs.clone());
        }
        object.insert(
            FEATURES_FIELD.to_owned(),
            Value::Array(self.features.iter().cloned().map(Value::from).collect()),
        );
        Value::Object(object)
    }
}

impl TryFrom<Value> for GeoJsonFeatureCollection {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut object) = value else {
            return Err(StoreError::Validation(
                "feature collection must be a JSON object".into(),
            ));
        };

        let features = match object.remove(FEATURES_FIELD) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(Feature::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            None | Some(Value::Null) => vec![],
            Some(_) => {
                return Err(StoreError::Validation(
                    "`features` of a feature collection must be an array".into(),
                ))
            }
        };
        object.remove(TYPE_FIELD);
        let crs = object.remove(CRS_FIELD).filter(|v| !v.is_null());

        Ok(Self {
            features,
            crs,
            attributes: object,
        })
    }
}

/// Input of [`FeatureCollection::insert_features`](crate::collection::FeatureCollection::insert_features).
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureInput {
    /// One feature, stored and indexed as a unit.
    Single(Feature),
    /// A feature collection wrapper, stored and indexed as a batch.
    Collection(GeoJsonFeatureCollection),
    /// A sequence of features, each stored and indexed on its own.
    Many(Vec<Feature>),
}

impl FeatureInput {
    /// Classifies an untyped JSON value: arrays are [`FeatureInput::Many`], objects typed `FeatureCollection`
    /// are [`FeatureInput::Collection`], other objects are [`FeatureInput::Single`].
    pub fn from_json(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Array(items) => Ok(Self::Many(
                items
                    .into_iter()
                    .map(Feature::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(ref object)
                if object.get(TYPE_FIELD).and_then(Value::as_str) == Some(COLLECTION_TYPE) =>
            {
                Ok(Self::Collection(GeoJsonFeatureCollection::try_from(value)?))
            }
            other => Ok(Self::Single(Feature::try_from(other)?)),
        }
    }

    /// Returns true for the collection wrapper form.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// The features of the input, in order.
    pub fn features(&self) -> &[Feature] {
        match self {
            Self::Single(feature) => std::slice::from_ref(feature),
            Self::Collection(collection) => &collection.features,
            Self::Many(features) => features,
        }
    }
}

impl From<Feature> for FeatureInput {
    fn from(value: Feature) -> Self {
        Self::Single(value)
    }
}

impl From<GeoJsonFeatureCollection> for FeatureInput {
    fn from(value: GeoJsonFeatureCollection) -> Self {
        Self::Collection(value)
    }
}

impl From<Vec<Feature>> for FeatureInput {
    fn from(value: Vec<Feature>) -> Self {
        Self::Many(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn classifies_input() {
        let single = FeatureInput::from_json(json!({"type": "Feature", "geometry": null})).unwrap();
        assert_matches!(&single, FeatureInput::Single(f) if f.geometry_value().is_none());

        let many = FeatureInput::from_json(json!([{"type": "Feature"}, {"type": "Feature"}])).unwrap();
        assert_eq!(many.features().len(), 2);

        let collection = FeatureInput::from_json(json!({
            "type": "FeatureCollection",
            "crs": "EPSG:3857",
            "title": "parcels",
            "features": [{"type": "Feature", "properties": {"name": "a"}}]
        }))
        .unwrap();
        let FeatureInput::Collection(collection) = collection else {
            panic!("expected a collection");
        };
        assert_eq!(collection.crs, Some(json!("EPSG:3857")));
        assert_eq!(collection.attributes, json!({"title": "parcels"}).as_object().cloned().unwrap());
        assert_eq!(
            collection.features[0].properties().and_then(|p| p.get("name")),
            Some(&json!("a"))
        );
    }

    #[test]
    fn rejects_scalars() {
        assert_matches!(FeatureInput::from_json(json!(5)), Err(StoreError::Validation(_)));
        assert_matches!(
            FeatureInput::from_json(json!({"type": "FeatureCollection", "features": 1})),
            Err(StoreError::Validation(_))
        );
    }

    #[test]
    fn collection_serialization() {
        let feature = Feature::new(
            Some(json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            Map::new(),
        );
        let value = GeoJsonFeatureCollection::new(vec![feature])
            .with_crs(4326)
            .with_attribute("title", "points")
            .to_value();

        assert_eq!(
            value,
            json!({
                "type": "FeatureCollection",
                "crs": 4326,
                "title": "points",
                "features": [{
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                    "properties": {}
                }]
            })
        );
    }
}
