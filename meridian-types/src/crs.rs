//! Coordinate reference systems identified by EPSG codes.

use serde_json::Value;

use crate::datum::Datum;
use crate::error::GeometryError;
use crate::projection::{CrsTransform, IdentityProjection, Projection, WebMercator};

/// Coordinate reference system.
///
/// Only systems the store can reproject between are representable: geographic WGS84 and NAD83, Web Mercator
/// and (with the `geodesy` feature) the WGS84 UTM zones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crs {
    srid: i32,
    datum: Datum,
    projection_type: ProjectionType,
}

/// Kind of the projection a [`Crs`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProjectionType {
    /// Geographic coordinates, longitude and latitude in degrees.
    None,
    /// Spherical Mercator.
    WebMercator,
    /// Universal Transverse Mercator.
    Utm {
        /// Zone number, 1 to 60.
        zone: u8,
        /// Southern hemisphere variant.
        south: bool,
    },
}

impl Crs {
    /// SRID used when nothing else is declared.
    pub const DEFAULT_SRID: i32 = 4326;

    /// Geographic WGS84 (EPSG:4326).
    pub const WGS84: Crs = Crs {
        srid: 4326,
        datum: Datum::WGS84,
        projection_type: ProjectionType::None,
    };

    /// Web Mercator (EPSG:3857).
    pub const EPSG3857: Crs = Crs {
        srid: 3857,
        datum: Datum::WGS84,
        projection_type: ProjectionType::WebMercator,
    };

    /// Geographic NAD83 (EPSG:4269).
    pub const NAD83: Crs = Crs {
        srid: 4269,
        datum: Datum::GRS80,
        projection_type: ProjectionType::None,
    };

    /// Resolves an EPSG code. Legacy aliases of Web Mercator resolve to EPSG:3857.
    pub fn from_srid(srid: i32) -> Option<Self> {
        match srid {
            4326 => Some(Self::WGS84),
            4269 => Some(Self::NAD83),
            3857 | 3785 | 900913 | 102100 | 102113 => Some(Self::EPSG3857),
            32601..=32660 => Some(Self::utm((srid - 32600) as u8, false)),
            32701..=32760 => Some(Self::utm((srid - 32700) as u8, true)),
            _ => None,
        }
    }

    /// Resolves a CRS name.
    ///
    /// Accepted forms are `EPSG:3857`, `urn:ogc:def:crs:EPSG::3857`, `urn:ogc:def:crs:EPSG:6.6:3857`,
    /// `http://www.opengis.net/def/crs/EPSG/0/3857`, a bare code, and the CRS84 names of geographic WGS84.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") || upper == "WGS84" {
            return Some(Self::WGS84);
        }

        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            upper.rsplit(':').next()?
        } else if upper.starts_with("HTTP://WWW.OPENGIS.NET/DEF/CRS/EPSG/") {
            upper.rsplit('/').next()?
        } else {
            &upper
        };

        code.parse::<i32>().ok().and_then(Self::from_srid)
    }

    fn utm(zone: u8, south: bool) -> Self {
        let base = if south { 32700 } else { 32600 };
        let srid = base + zone as i32;
        Self {
            srid,
            datum: Datum::WGS84,
            projection_type: ProjectionType::Utm { zone, south },
        }
    }

    /// EPSG code of the system.
    pub fn srid(&self) -> i32 {
        self.srid
    }

    /// Datum of the system.
    pub fn datum(&self) -> Datum {
        self.datum
    }

    /// Projection kind of the system.
    pub fn projection_type(&self) -> ProjectionType {
        self.projection_type
    }

    /// Returns true for systems in longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        self.projection_type == ProjectionType::None
    }

    /// URN of the system, as written into GeoJSON `crs` members.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.srid)
    }

    /// Builds the projection from geographic coordinates into this system.
    pub fn projection(&self) -> Result<Box<dyn Projection>, GeometryError> {
        match self.projection_type {
            ProjectionType::None => Ok(Box::new(IdentityProjection::new())),
            ProjectionType::WebMercator => Ok(Box::new(WebMercator::new(self.datum))),
            ProjectionType::Utm { zone, south } => utm_projection(zone, south, self.datum),
        }
    }

    /// Builds a transformation from this system into `target`.
    pub fn transform_to(&self, target: &Crs) -> Result<CrsTransform, GeometryError> {
        CrsTransform::new(self, target)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

#[cfg(feature = "geodesy")]
fn utm_projection(zone: u8, south: bool, datum: Datum) -> Result<Box<dyn Projection>, GeometryError> {
    use crate::projection::GeodesyProjection;

    let definition = format!(
        "utm zone={zone} ellps={}{}",
        datum.ellipsoid(),
        if south { " south" } else { "" }
    );
    match GeodesyProjection::new(&definition) {
        Some(projection) => Ok(Box::new(projection)),
        None => Err(GeometryError::UnknownCrs(definition)),
    }
}

#[cfg(not(feature = "geodesy"))]
fn utm_projection(zone: u8, south: bool, _datum: Datum) -> Result<Box<dyn Projection>, GeometryError> {
    Err(GeometryError::UnknownCrs(format!(
        "UTM zone {zone}{} requires the `geodesy` feature",
        if south { "S" } else { "N" }
    )))
}

/// A not yet resolved CRS as found in input documents.
#[derive(Debug, Clone, PartialEq)]
pub enum CrsCandidate {
    /// CRS name, e.g. `EPSG:3857`.
    Name(String),
    /// Integer EPSG code.
    Srid(i32),
    /// Already resolved reference system.
    Reference(Crs),
}

impl CrsCandidate {
    /// Interprets a JSON `crs` member.
    ///
    /// Strings become [`CrsCandidate::Name`], integers become [`CrsCandidate::Srid`]. GeoJSON 2008 `crs`
    /// objects of `name` type (`{"type": "name", "properties": {"name": "EPSG:4326"}}`) and of `EPSG` type
    /// (`{"type": "EPSG", "properties": {"code": 4326}}`) are accepted too. Everything else is an error.
    pub fn from_value(value: &Value) -> Result<Self, GeometryError> {
        match value {
            Value::String(name) => Ok(Self::Name(name.clone())),
            Value::Number(n) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Srid)
                .ok_or_else(|| GeometryError::UnknownCrs(value.to_string())),
            Value::Object(object) => {
                let properties = object.get("properties");
                match object.get("type").and_then(Value::as_str) {
                    Some("name") => properties
                        .and_then(|p| p.get("name"))
                        .and_then(Value::as_str)
                        .map(|name| Self::Name(name.to_owned()))
                        .ok_or_else(|| GeometryError::UnknownCrs(value.to_string())),
                    Some("EPSG") => properties
                        .and_then(|p| p.get("code"))
                        .and_then(Value::as_i64)
                        .and_then(|v| i32::try_from(v).ok())
                        .map(Self::Srid)
                        .ok_or_else(|| GeometryError::UnknownCrs(value.to_string())),
                    _ => Err(GeometryError::UnknownCrs(value.to_string())),
                }
            }
            _ => Err(GeometryError::UnknownCrs(value.to_string())),
        }
    }
}

impl From<Crs> for CrsCandidate {
    fn from(value: Crs) -> Self {
        Self::Reference(value)
    }
}

impl From<i32> for CrsCandidate {
    fn from(value: i32) -> Self {
        Self::Srid(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn resolves_names() {
        assert_eq!(Crs::from_name("EPSG:3857"), Some(Crs::EPSG3857));
        assert_eq!(Crs::from_name("epsg:4326"), Some(Crs::WGS84));
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::4269"), Some(Crs::NAD83));
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG:6.6:3857"), Some(Crs::EPSG3857));
        assert_eq!(Crs::from_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(Crs::WGS84));
        assert_eq!(
            Crs::from_name("http://www.opengis.net/def/crs/EPSG/0/3857"),
            Some(Crs::EPSG3857)
        );
        assert_eq!(Crs::from_name("900913"), Some(Crs::EPSG3857));
        assert_eq!(Crs::from_name("EPSG:2000000"), None);
        assert_eq!(Crs::from_name("not a crs"), None);
    }

    #[test]
    fn resolves_utm_zones() {
        let north = Crs::from_srid(32633).unwrap();
        assert_eq!(
            north.projection_type(),
            ProjectionType::Utm {
                zone: 33,
                south: false
            }
        );
        let south = Crs::from_srid(32719).unwrap();
        assert_eq!(
            south.projection_type(),
            ProjectionType::Utm {
                zone: 19,
                south: true
            }
        );
        assert_eq!(south.srid(), 32719);
    }

    #[test]
    fn candidate_from_json() {
        assert_eq!(
            CrsCandidate::from_value(&json!("EPSG:3857")).unwrap(),
            CrsCandidate::Name("EPSG:3857".into())
        );
        assert_eq!(
            CrsCandidate::from_value(&json!(4326)).unwrap(),
            CrsCandidate::Srid(4326)
        );
        assert_eq!(
            CrsCandidate::from_value(&json!({"type": "name", "properties": {"name": "EPSG:3857"}}))
                .unwrap(),
            CrsCandidate::Name("EPSG:3857".into())
        );
        assert_eq!(
            CrsCandidate::from_value(&json!({"type": "EPSG", "properties": {"code": 3857}}))
                .unwrap(),
            CrsCandidate::Srid(3857)
        );
        assert_matches!(
            CrsCandidate::from_value(&json!([1, 2])),
            Err(GeometryError::UnknownCrs(_))
        );
        assert_matches!(
            CrsCandidate::from_value(&json!(1.5)),
            Err(GeometryError::UnknownCrs(_))
        );
    }
}
