/// Reference ellipsoid of a coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    semimajor: f64,
    inv_flattening: f64,
    ellipsoid: &'static str,
}

impl Datum {
    /// World Geodetic System 1984.
    pub const WGS84: Self = Datum {
        semimajor: 6_378_137.0,
        inv_flattening: 298.257223563,
        ellipsoid: "WGS84",
    };

    /// Geodetic Reference System 1980, used by NAD83.
    pub const GRS80: Self = Datum {
        semimajor: 6_378_137.0,
        inv_flattening: 298.257222101,
        ellipsoid: "GRS80",
    };

    /// Semi-major axis in meters.
    pub fn semimajor(&self) -> f64 {
        self.semimajor
    }

    /// Inverse flattening of the ellipsoid.
    pub fn inv_flattening(&self) -> f64 {
        self.inv_flattening
    }

    /// Ellipsoid name as understood by `geodesy` operator definitions.
    pub fn ellipsoid(&self) -> &'static str {
        self.ellipsoid
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::WGS84
    }
}
