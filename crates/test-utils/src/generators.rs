//! Synthetic NTv2 grid files with predictable shift fields.
//!
//! Shifts are linear in longitude and latitude so bilinear interpolation
//! reproduces them exactly, which lets tests check converted coordinates
//! against the closed-form field.

use std::path::{Path, PathBuf};

use datum_grid::{Ntv2SubGridSpec, Ntv2Writer, Result};

/// A linear shift field, in arc-seconds.
///
/// `dlon = lon_base + lon_gradient * lon` (east-positive) and
/// `dlat = lat_base + lat_gradient * lat`, with coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearShift {
    pub lon_base: f64,
    pub lon_gradient: f64,
    pub lat_base: f64,
    pub lat_gradient: f64,
}

impl LinearShift {
    /// The same shift everywhere.
    pub fn constant(dlon_seconds: f64, dlat_seconds: f64) -> Self {
        Self {
            lon_base: dlon_seconds,
            lon_gradient: 0.0,
            lat_base: dlat_seconds,
            lat_gradient: 0.0,
        }
    }

    /// Shift in arc-seconds at a point, `(dlon east-positive, dlat)`.
    pub fn at(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            self.lon_base + self.lon_gradient * lon,
            self.lat_base + self.lat_gradient * lat,
        )
    }

    /// The point a forward conversion of `(lon, lat)` should produce.
    pub fn apply(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (dlon, dlat) = self.at(lon, lat);
        (lon + dlon / 3600.0, lat + dlat / 3600.0)
    }
}

/// A NAD27-to-NAD83 style field: a few seconds of shift, growing westward
/// and northward.
pub const NAD27_LIKE: LinearShift = LinearShift {
    lon_base: -1.5,
    lon_gradient: 0.02,
    lat_base: 0.25,
    lat_gradient: 0.004,
};

/// Build a single sub-grid covering `bbox` at `inc` degrees.
pub fn linear_subgrid(
    name: &str,
    parent: &str,
    bbox: (f64, f64, f64, f64),
    inc: f64,
    field: LinearShift,
) -> Ntv2SubGridSpec {
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    Ntv2SubGridSpec::from_fn(name, parent, min_lon, min_lat, max_lon, max_lat, inc, inc, move |lon, lat| {
        field.at(lon, lat)
    })
}

/// Write a one-sub-grid NTv2 file at `dir/file_name` and return its path.
pub fn write_linear_ntv2(
    dir: &Path,
    file_name: &str,
    bbox: (f64, f64, f64, f64),
    inc: f64,
    field: LinearShift,
) -> Result<PathBuf> {
    let path = dir.join(file_name);
    Ntv2Writer::new("NAD27", "NAD83")
        .subgrid(linear_subgrid("GRID", "NONE", bbox, inc, field))
        .write_to(&path)?;
    Ok(path)
}

/// Write an NTv2 file with a coarse parent and a finer nested child.
///
/// The child carries `child_field`, which lets tests tell which sub-grid
/// answered a lookup.
pub fn write_nested_ntv2(
    dir: &Path,
    file_name: &str,
    parent: ((f64, f64, f64, f64), f64, LinearShift),
    child: ((f64, f64, f64, f64), f64, LinearShift),
) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let (parent_bbox, parent_inc, parent_field) = parent;
    let (child_bbox, child_inc, child_field) = child;

    Ntv2Writer::new("NAD27", "NAD83")
        .subgrid(linear_subgrid("PARENT", "NONE", parent_bbox, parent_inc, parent_field))
        .subgrid(linear_subgrid("CHILD", "PARENT", child_bbox, child_inc, child_field))
        .write_to(&path)?;
    Ok(path)
}
