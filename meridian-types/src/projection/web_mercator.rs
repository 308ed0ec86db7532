use geo_types::{coord, Coord};

use crate::datum::Datum;
use crate::projection::Projection;

/// Spherical Mercator projection (EPSG:3857).
#[derive(Debug, Copy, Clone)]
pub struct WebMercator {
    datum: Datum,
}

impl WebMercator {
    /// Creates a projection on the sphere with the semi-major axis of the given datum.
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self {
            datum: Datum::WGS84,
        }
    }
}

impl Projection for WebMercator {
    fn project(&self, lon_lat: Coord<f64>) -> Option<Coord<f64>> {
        let x = self.datum.semimajor() * lon_lat.x.to_radians();
        let y = self.datum.semimajor()
            * (std::f64::consts::FRAC_PI_4 + lon_lat.y.to_radians() / 2.0)
                .tan()
                .ln();

        // tan() near the poles yields huge but finite values
        if x.is_finite() && y.is_finite() && lon_lat.y.abs() < 90.0 {
            Some(coord! { x: x, y: y })
        } else {
            None
        }
    }

    fn unproject(&self, xy: Coord<f64>) -> Option<Coord<f64>> {
        let lat = 2.0 * (xy.y / self.datum.semimajor()).exp().atan() - std::f64::consts::FRAC_PI_2;
        let lon = xy.x / self.datum.semimajor();

        if lat.is_finite() && lon.is_finite() {
            Some(coord! { x: lon.to_degrees(), y: lat.to_degrees() })
        } else {
            None
        }
    }
}
