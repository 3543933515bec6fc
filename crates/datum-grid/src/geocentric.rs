//! Three-parameter geocentric translation.
//!
//! Converts geodetic coordinates to earth-centred cartesian on the source
//! ellipsoid, translates by (dx, dy, dz) and converts back on the target
//! ellipsoid. Typically configured as the fallback of a grid
//! transformation for points outside grid coverage.

use serde::{Deserialize, Serialize};

use crate::catalog::{GeodeticTransform, MethodType};
use crate::error::{GridTransformError, Result};
use crate::types::{Conversion, GeoPoint};

const LATITUDE_TOLERANCE: f64 = 1.0e-12;
const LATITUDE_PASSES: usize = 10;

/// Reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis (m)
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Self = Self {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    pub const GRS80: Self = Self {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    pub const CLARKE_1866: Self = Self {
        a: 6_378_206.4,
        f: 1.0 / 294.978_698_2,
    };

    /// Clarke 1880 as used by IGN for NTF.
    pub const CLARKE_1880_IGN: Self = Self {
        a: 6_378_249.2,
        f: 1.0 / 293.466_021_3,
    };

    pub const INTERNATIONAL_1924: Self = Self {
        a: 6_378_388.0,
        f: 1.0 / 297.0,
    };

    pub const BESSEL_1841: Self = Self {
        a: 6_377_397.155,
        f: 1.0 / 299.152_812_8,
    };

    /// Look up an ellipsoid by its common key name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "WGS84" => Some(Self::WGS84),
            "GRS80" | "GRS1980" => Some(Self::GRS80),
            "CLRK66" | "CLARKE1866" => Some(Self::CLARKE_1866),
            "CLRK-IGN" | "CLARKE1880IGN" => Some(Self::CLARKE_1880_IGN),
            "INTNL" | "INTERNATIONAL1924" => Some(Self::INTERNATIONAL_1924),
            "BESSEL" | "BESSEL1841" => Some(Self::BESSEL_1841),
            _ => None,
        }
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Semi-minor axis (m).
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// Geodetic (degrees, metres) to earth-centred cartesian (metres).
    pub fn to_cartesian(&self, point: &GeoPoint) -> [f64; 3] {
        let lat = point.lat.to_radians();
        let lon = point.lon.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let n = self.a / (1.0 - self.e2() * sin_lat * sin_lat).sqrt();

        [
            (n + point.height) * cos_lat * lon.cos(),
            (n + point.height) * cos_lat * lon.sin(),
            (n * (1.0 - self.e2()) + point.height) * sin_lat,
        ]
    }

    /// Earth-centred cartesian (metres) to geodetic (degrees, metres).
    pub fn to_geodetic(&self, xyz: [f64; 3]) -> GeoPoint {
        let [x, y, z] = xyz;
        let e2 = self.e2();
        let p = x.hypot(y);
        let lon = y.atan2(x);

        if p < 1.0e-9 {
            let lat = if z >= 0.0 { 90.0 } else { -90.0 };
            return GeoPoint::with_height(lon.to_degrees(), lat, z.abs() - self.b());
        }

        let mut lat = z.atan2(p * (1.0 - e2));
        let mut height = 0.0;
        for _ in 0..LATITUDE_PASSES {
            let sin_lat = lat.sin();
            let n = self.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            height = p / lat.cos() - n;
            let next = z.atan2(p * (1.0 - e2 * n / (n + height)));
            let done = (next - lat).abs() < LATITUDE_TOLERANCE;
            lat = next;
            if done {
                break;
            }
        }

        GeoPoint::with_height(lon.to_degrees(), lat.to_degrees(), height)
    }
}

/// Declarative definition of a geocentric translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocentricDefinition {
    pub name: String,
    #[serde(default)]
    pub source_datum: String,
    #[serde(default)]
    pub target_datum: String,
    pub source_ellipsoid: String,
    pub target_ellipsoid: String,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    #[serde(default)]
    pub dz: f64,
}

/// A geocentric translation between two ellipsoids.
#[derive(Debug, Clone)]
pub struct GeocentricTranslation {
    name: String,
    source: Ellipsoid,
    target: Ellipsoid,
    delta: [f64; 3],
}

impl GeocentricTranslation {
    pub fn new(name: impl Into<String>, source: Ellipsoid, target: Ellipsoid, delta: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            delta,
        }
    }

    pub fn from_definition(def: &GeocentricDefinition) -> Result<Self> {
        let lookup = |name: &str| {
            Ellipsoid::from_name(name).ok_or_else(|| {
                GridTransformError::config_error(format!(
                    "{}: unknown ellipsoid '{}'",
                    def.name, name
                ))
            })
        };

        Ok(Self::new(
            def.name.clone(),
            lookup(&def.source_ellipsoid)?,
            lookup(&def.target_ellipsoid)?,
            [def.dx, def.dy, def.dz],
        ))
    }

    fn shift(&self, point: &GeoPoint, from: Ellipsoid, to: Ellipsoid, sign: f64) -> GeoPoint {
        let [x, y, z] = from.to_cartesian(point);
        to.to_geodetic([
            x + sign * self.delta[0],
            y + sign * self.delta[1],
            z + sign * self.delta[2],
        ])
    }

    fn flat(point: &GeoPoint, shifted: impl FnOnce(&GeoPoint) -> GeoPoint) -> GeoPoint {
        let result = shifted(&GeoPoint::new(point.lon, point.lat));
        GeoPoint::with_height(result.lon, result.lat, point.height)
    }
}

impl GeodeticTransform for GeocentricTranslation {
    fn name(&self) -> &str {
        &self.name
    }

    fn method_type(&self) -> MethodType {
        MethodType::Geocentric
    }

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        let target = Self::flat(source, |p| self.shift(p, self.source, self.target, 1.0));
        Ok(Conversion::Converted(target))
    }

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        Ok(Conversion::Converted(self.shift(source, self.source, self.target, 1.0)))
    }

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        let target = Self::flat(source, |p| self.shift(p, self.target, self.source, -1.0));
        Ok(Conversion::Converted(target))
    }

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        Ok(Conversion::Converted(self.shift(source, self.target, self.source, -1.0)))
    }
}
