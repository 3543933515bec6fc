//! Core types shared by drivers, the transformation object and its callers.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A geographic position: longitude and latitude in degrees, height in metres.
///
/// 2D operations read and write only `lon`/`lat`; `height` is carried through
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub height: f64,
}

impl GeoPoint {
    /// Create a 2D point (height zero).
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon,
            lat,
            height: 0.0,
        }
    }

    /// Create a 3D point.
    pub fn with_height(lon: f64, lat: f64, height: f64) -> Self {
        Self { lon, lat, height }
    }

    /// Largest absolute horizontal difference from another point, in degrees.
    pub fn max_horizontal_delta(&self, other: &GeoPoint) -> f64 {
        (self.lon - other.lon).abs().max((self.lat - other.lat).abs())
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9} {:.9} {:.4}", self.lon, self.lat, self.height)
    }
}

/// Direction of a transformation, or of a grid file relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Inverse,
    /// Unresolved. Never valid on an initialized grid file.
    None,
}

impl Direction {
    /// Parse a direction flag as written in a definition.
    ///
    /// Only `F`, `f`, `I` and `i` are valid; everything else is `None`.
    pub fn from_flag(flag: char) -> Self {
        match flag {
            'F' | 'f' => Direction::Forward,
            'I' | 'i' => Direction::Inverse,
            _ => Direction::None,
        }
    }

    /// Get the direction as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Inverse => "inverse",
            Direction::None => "none",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grid file formats known to the format table.
///
/// A format code that parses here still has to have a registered driver
/// before a definition using it is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridFormat {
    /// Canadian National Transformation, version 1.
    Ntv1,
    /// Canadian National Transformation, version 2 (`.gsb`).
    Ntv2,
    /// US NADCON `.las`/`.los` pairs.
    Nadcon,
    /// French IGN RGF93 grid (`gr3df97a.txt`).
    French,
    /// Japanese JGD2000 parameter files.
    Japan,
    /// Maritime provinces ATS77 transformation.
    Ats77,
    /// Ordnance Survey OSTN97.
    Ost97,
    /// Ordnance Survey OSTN02.
    Ost02,
    /// Chinese GEOCON grids.
    Geocn,
}

impl GridFormat {
    /// All formats, in format-table order.
    pub const ALL: [GridFormat; 9] = [
        GridFormat::Ntv1,
        GridFormat::Ntv2,
        GridFormat::Nadcon,
        GridFormat::French,
        GridFormat::Japan,
        GridFormat::Ats77,
        GridFormat::Ost97,
        GridFormat::Ost02,
        GridFormat::Geocn,
    ];

    /// Parse a format code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "NTV1" => Some(GridFormat::Ntv1),
            "NTV2" => Some(GridFormat::Ntv2),
            "NADCON" => Some(GridFormat::Nadcon),
            "RGF93" | "FRENCH" => Some(GridFormat::French),
            "JAPAN" => Some(GridFormat::Japan),
            "ATS77" => Some(GridFormat::Ats77),
            "OST97" => Some(GridFormat::Ost97),
            "OST02" => Some(GridFormat::Ost02),
            "GEOCN" => Some(GridFormat::Geocn),
            _ => None,
        }
    }

    /// Canonical code for this format.
    pub fn code(&self) -> &'static str {
        match self {
            GridFormat::Ntv1 => "NTv1",
            GridFormat::Ntv2 => "NTv2",
            GridFormat::Nadcon => "NADCON",
            GridFormat::French => "RGF93",
            GridFormat::Japan => "JAPAN",
            GridFormat::Ats77 => "ATS77",
            GridFormat::Ost97 => "OST97",
            GridFormat::Ost02 => "OST02",
            GridFormat::Geocn => "GEOCN",
        }
    }
}

impl fmt::Display for GridFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outcome of a single grid-file lookup, as reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridLookup {
    /// The point was covered and shifted.
    Shifted(GeoPoint),
    /// The point is outside the file's coverage.
    OutsideCoverage,
}

/// Outcome of converting a point through a transformation.
///
/// Fatal conditions are reported as `Err` alongside this type, never as a
/// variant of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Converted by the transformation's own data.
    Converted(GeoPoint),
    /// Not covered by the grid files; converted by the fallback.
    ViaFallback(GeoPoint),
    /// No coverage anywhere, fallback included. No output is produced.
    NoCoverage,
}

impl Conversion {
    /// Legacy numeric status: 0 success, 1 no coverage, 2 success via fallback.
    pub fn status_code(&self) -> i32 {
        match self {
            Conversion::Converted(_) => 0,
            Conversion::NoCoverage => 1,
            Conversion::ViaFallback(_) => 2,
        }
    }

    /// The converted point, if any.
    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            Conversion::Converted(p) | Conversion::ViaFallback(p) => Some(*p),
            Conversion::NoCoverage => None,
        }
    }

    /// True if a point was produced.
    pub fn is_converted(&self) -> bool {
        self.point().is_some()
    }
}

/// Result of a useful-range query over a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeStatus {
    /// Every point is covered.
    Ok,
    /// The point at `index` is the first one not covered.
    OutsideUsefulRange { index: usize },
}

impl RangeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RangeStatus::Ok)
    }
}

/// Dimensionality used when the inverse-3D path falls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackDimension {
    /// Call the fallback's 2D inverse, carrying the height through.
    #[default]
    Legacy2d,
    /// Call the fallback's 3D inverse.
    Full3d,
}

/// Case-insensitive. Unknown values keep the legacy behavior.
impl FromStr for FallbackDimension {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "full3d" | "full_3d" | "3d" => Self::Full3d,
            _ => Self::Legacy2d,
        })
    }
}
