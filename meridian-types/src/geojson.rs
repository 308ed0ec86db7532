//! Conversion between [`SpatialGeometry`] and GeoJSON geometry objects stored inside documents.

use geo_types::Geometry;
use serde_json::{json, Value};

use crate::crs::Crs;
use crate::error::GeometryError;
use crate::geometry::SpatialGeometry;

/// Parses a GeoJSON geometry object.
pub fn geometry_from_value(value: &Value) -> Result<Geometry<f64>, GeometryError> {
    let geometry: ::geojson::Geometry = serde_json::from_value(value.clone())
        .map_err(|err| GeometryError::Conversion(err.to_string()))?;
    Geometry::<f64>::try_from(geometry).map_err(|err| GeometryError::Conversion(err.to_string()))
}

/// Serializes a geometry as a GeoJSON geometry object.
pub fn geometry_to_value(geometry: &Geometry<f64>) -> Result<Value, GeometryError> {
    let geometry = ::geojson::Geometry::new(::geojson::Value::from(geometry));
    serde_json::to_value(&geometry).map_err(|err| GeometryError::Conversion(err.to_string()))
}

/// GeoJSON 2008 `crs` member naming the given system.
pub fn crs_member(crs: &Crs) -> Value {
    json!({
        "type": "name",
        "properties": { "name": crs.urn() }
    })
}

impl SpatialGeometry {
    /// Parses a GeoJSON geometry object, tagging it with `srid`.
    pub fn from_geojson_value(value: &Value, srid: Option<i32>) -> Result<Self, GeometryError> {
        Ok(Self::new(geometry_from_value(value)?, srid))
    }

    /// Serializes the coordinates as a GeoJSON geometry object. The SRID is not part of the output.
    pub fn to_geojson_value(&self) -> Result<Value, GeometryError> {
        geometry_to_value(self.geometry())
    }
}
