//! The grid-interpolation transformation object.
//!
//! A [`GridInterpolation`] owns an ordered list of opened grid files, an
//! optional fallback transformation and the shared numeric tolerances.
//!
//! ```text
//! forward_2d(point)
//!      │
//!      ├─► select(point, Forward) ── first match, or finest density
//!      │         │
//!      │         ├─► file stored Forward: driver forward
//!      │         └─► file stored Inverse: driver inverse
//!      │
//!      └─► no file, or file reports no coverage
//!                │
//!                ├─► fallback configured: Conversion::ViaFallback
//!                └─► otherwise:           Conversion::NoCoverage
//! ```
//!
//! A transformation with no grid files is a null transformation: it covers
//! everything and the host pipeline may skip it.

use std::fmt;

use crate::catalog::{GeodeticTransform, MethodType, TransformCatalog};
use crate::config::{resolve_grid_path, GridFileSpec, GridTransformConfig, GridTransformDefinition};
use crate::driver::{FormatTable, GridFile, GridFileParams};
use crate::error::{GridTransformError, Result};
use crate::types::{Conversion, Direction, FallbackDimension, GeoPoint, GridFormat, GridLookup, RangeStatus};

// ============================================================================
// Fallback direction overrides
// ============================================================================

/// A datum-pair rule forcing the direction a named fallback is run in.
#[derive(Debug, Clone, Copy)]
pub struct FallbackOverride {
    pub fallback: &'static str,
    pub source_datum: &'static str,
    pub target_datum: &'static str,
    pub direction: Direction,
}

/// Known fallback direction overrides.
///
/// The French NTF grid is published in the RGF93 → NTF direction, so its
/// geocentric fallback must run inversely when the owning transformation
/// goes from RGF93 to the NTF grid datum.
pub const FALLBACK_DIRECTION_OVERRIDES: &[FallbackOverride] = &[FallbackOverride {
    fallback: "NTF-G_to_WGS84",
    source_datum: "RGF93",
    target_datum: "NTF-G-Grid",
    direction: Direction::Inverse,
}];

/// Direction a fallback runs in for a transformation between two datums.
pub fn resolve_fallback_direction(fallback: &str, source_datum: &str, target_datum: &str) -> Direction {
    FALLBACK_DIRECTION_OVERRIDES
        .iter()
        .find(|rule| {
            rule.fallback.eq_ignore_ascii_case(fallback)
                && rule.source_datum.eq_ignore_ascii_case(source_datum)
                && rule.target_datum.eq_ignore_ascii_case(target_datum)
        })
        .map(|rule| rule.direction)
        .unwrap_or(Direction::Forward)
}

// ============================================================================
// Setup collaborators
// ============================================================================

/// Everything setup needs beyond the definition itself.
pub struct SetupContext<'a> {
    pub config: &'a GridTransformConfig,
    pub formats: &'a FormatTable,
    pub catalog: &'a dyn TransformCatalog,
}

impl<'a> SetupContext<'a> {
    pub fn new(
        config: &'a GridTransformConfig,
        formats: &'a FormatTable,
        catalog: &'a dyn TransformCatalog,
    ) -> Self {
        Self {
            config,
            formats,
            catalog,
        }
    }
}

/// One initialized grid file.
pub struct GridFileEntry {
    params: GridFileParams,
    object: Box<dyn GridFile>,
}

impl GridFileEntry {
    pub fn params(&self) -> &GridFileParams {
        &self.params
    }
}

struct Fallback {
    transform: Box<dyn GeodeticTransform>,
    direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Two,
    Three,
}

// ============================================================================
// Transformation
// ============================================================================

/// A grid-interpolation datum transformation.
pub struct GridInterpolation {
    name: String,
    source_datum: String,
    target_datum: String,
    // Field order is drop order: grid files first, then the fallback.
    files: Vec<GridFileEntry>,
    fallback: Option<Fallback>,
    use_best: bool,
    convergence_value: f64,
    error_value: f64,
    max_iterations: u32,
    inverse_3d_fallback: FallbackDimension,
}

impl GridInterpolation {
    /// Build a transformation from its definition.
    ///
    /// Every grid file is opened through its format driver, in order, and
    /// the fallback (if any) is instantiated from the catalog. On failure
    /// every file opened so far is dropped before the error is returned.
    pub fn new(def: &GridTransformDefinition, ctx: &SetupContext<'_>) -> Result<Self> {
        let mut xform = Self {
            name: def.name.clone(),
            source_datum: def.source_datum.clone(),
            target_datum: def.target_datum.clone(),
            files: Vec::with_capacity(def.files.len()),
            fallback: None,
            use_best: false,
            convergence_value: def.convergence_value,
            error_value: def.error_value,
            max_iterations: def.max_iterations,
            inverse_3d_fallback: ctx.config.inverse_3d_fallback,
        };

        for (index, spec) in def.files.iter().enumerate() {
            let entry = xform.open_file(index, spec, ctx)?;
            xform.files.push(entry);
        }

        if let Some(name) = def.fallback_name() {
            let index = ctx
                .catalog
                .locate(name)
                .ok_or_else(|| GridTransformError::FallbackNotFound(name.to_string()))?;
            let transform = ctx.catalog.instantiate(index)?;
            let direction = resolve_fallback_direction(name, &def.source_datum, &def.target_datum);

            tracing::debug!(
                transform = %def.name,
                fallback = %name,
                direction = %direction,
                "Resolved fallback transformation"
            );
            xform.fallback = Some(Fallback {
                transform,
                direction,
            });
        }

        tracing::info!(
            transform = %xform.name,
            files = xform.files.len(),
            fallback = xform.fallback.is_some(),
            "Constructed grid interpolation transformation"
        );

        Ok(xform)
    }

    fn open_file(&self, index: usize, spec: &GridFileSpec, ctx: &SetupContext<'_>) -> Result<GridFileEntry> {
        let direction = Direction::from_flag(spec.direction);
        let format = GridFormat::from_code(&spec.format).ok_or_else(|| {
            GridTransformError::internal(
                "setup",
                format!("file #{}: unknown format code '{}'", index, spec.format),
            )
        })?;

        let params = GridFileParams {
            direction,
            format,
            path: resolve_grid_path(&spec.path, &ctx.config.data_dir),
            buffer_size: ctx.config.driver_buffer_size,
            flags: 0,
            density: 0.0,
            convergence_value: self.convergence_value,
            error_value: self.error_value,
            max_iterations: self.max_iterations,
        };

        let driver = ctx.formats.driver(format).ok_or_else(|| {
            GridTransformError::internal(
                "setup",
                format!("file #{}: no driver registered for {}", index, format),
            )
        })?;
        let object = driver.initialize(&params)?;

        tracing::debug!(
            transform = %self.name,
            index,
            path = %params.path.display(),
            format = %format,
            direction = %direction,
            "Initialized grid file"
        );

        Ok(GridFileEntry { params, object })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_datum(&self) -> &str {
        &self.source_datum
    }

    pub fn target_datum(&self) -> &str {
        &self.target_datum
    }

    /// Number of initialized grid files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Initialized grid files, in priority order.
    pub fn files(&self) -> impl Iterator<Item = &GridFileEntry> {
        self.files.iter()
    }

    /// Choose the finest covering file instead of the first covering one.
    pub fn set_use_best(&mut self, use_best: bool) {
        self.use_best = use_best;
    }

    pub fn use_best(&self) -> bool {
        self.use_best
    }

    /// Direction the fallback runs in for forward requests, if one is configured.
    pub fn fallback_direction(&self) -> Option<Direction> {
        self.fallback.as_ref().map(|fallback| fallback.direction)
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_ref().map(|fallback| fallback.transform.name())
    }

    pub fn inverse_3d_fallback(&self) -> FallbackDimension {
        self.inverse_3d_fallback
    }

    pub fn set_inverse_3d_fallback(&mut self, dimension: FallbackDimension) {
        self.inverse_3d_fallback = dimension;
    }

    /// Index of the grid file that covers `point`, if any.
    pub fn select(&mut self, point: &GeoPoint, direction: Direction) -> Option<usize> {
        if self.use_best {
            let mut best: Option<(usize, f64)> = None;
            for (index, entry) in self.files.iter_mut().enumerate() {
                let density = entry.object.test(point, direction);
                if density == 0.0 {
                    continue;
                }
                if best.map_or(true, |(_, finest)| density < finest) {
                    best = Some((index, density));
                }
            }
            best.map(|(index, _)| index)
        } else {
            self.files
                .iter_mut()
                .position(|entry| entry.object.test(point, direction) != 0.0)
        }
    }

    pub fn forward_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.convert(source, Direction::Forward, Dimension::Two, "forward_2d")
    }

    pub fn forward_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.convert(source, Direction::Forward, Dimension::Three, "forward_3d")
    }

    pub fn inverse_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.convert(source, Direction::Inverse, Dimension::Two, "inverse_2d")
    }

    pub fn inverse_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.convert(source, Direction::Inverse, Dimension::Three, "inverse_3d")
    }

    fn convert(
        &mut self,
        source: &GeoPoint,
        request: Direction,
        dimension: Dimension,
        site: &'static str,
    ) -> Result<Conversion> {
        if let Some(index) = self.select(source, request) {
            let entry = &mut self.files[index];

            // A file answers requests in its own direction with its forward
            // function and the other direction with its inverse.
            let driver_direction = match (entry.params.direction, request) {
                (Direction::Forward, Direction::Forward) | (Direction::Inverse, Direction::Inverse) => {
                    Direction::Forward
                }
                (Direction::Forward, Direction::Inverse) | (Direction::Inverse, Direction::Forward) => {
                    Direction::Inverse
                }
                (stored, requested) => {
                    return Err(GridTransformError::internal(
                        site,
                        format!(
                            "file #{} has direction {} for a {} request",
                            index, stored, requested
                        ),
                    ))
                }
            };

            let lookup = match (driver_direction, dimension) {
                (Direction::Forward, Dimension::Two) => entry.object.forward_2d(source)?,
                (Direction::Forward, Dimension::Three) => entry.object.forward_3d(source)?,
                (_, Dimension::Two) => entry.object.inverse_2d(source)?,
                (_, Dimension::Three) => entry.object.inverse_3d(source)?,
            };

            if let GridLookup::Shifted(target) = lookup {
                return Ok(Conversion::Converted(target));
            }

            tracing::debug!(transform = %self.name, index, site, "Selected grid file reported no coverage");
        }

        self.run_fallback(source, request, dimension)
    }

    fn run_fallback(&mut self, source: &GeoPoint, request: Direction, dimension: Dimension) -> Result<Conversion> {
        // Legacy behavior: the inverse-3D path runs the fallback in 2D.
        let dimension = match (request, dimension, self.inverse_3d_fallback) {
            (Direction::Inverse, Dimension::Three, FallbackDimension::Legacy2d) => Dimension::Two,
            _ => dimension,
        };

        let fallback = match self.fallback.as_mut() {
            Some(fallback) => fallback,
            None => return Ok(Conversion::NoCoverage),
        };

        // The resolved fallback direction applies to every request, forward
        // or inverse.
        let result = match (fallback.direction, dimension) {
            (Direction::Inverse, Dimension::Two) => fallback.transform.inverse_2d(source),
            (Direction::Inverse, Dimension::Three) => fallback.transform.inverse_3d(source),
            (_, Dimension::Two) => fallback.transform.forward_2d(source),
            (_, Dimension::Three) => fallback.transform.forward_3d(source),
        };

        match result {
            Ok(conversion) => Ok(match conversion.point() {
                Some(mut target) => {
                    if dimension == Dimension::Two {
                        target.height = source.height;
                    }
                    Conversion::ViaFallback(target)
                }
                None => Conversion::NoCoverage,
            }),
            Err(err) => {
                tracing::warn!(
                    transform = %self.name,
                    fallback = %fallback.transform.name(),
                    error = %err,
                    "Fallback transformation failed"
                );
                Ok(Conversion::NoCoverage)
            }
        }
    }

    /// Whether the grid data itself covers every point. The fallback is
    /// not consulted.
    pub fn in_range(&mut self, points: &[GeoPoint]) -> RangeStatus {
        if self.files.is_empty() {
            return RangeStatus::Ok;
        }

        for (index, point) in points.iter().enumerate() {
            let covered = self
                .files
                .iter_mut()
                .any(|entry| entry.object.test(point, Direction::Forward) != 0.0);
            if !covered {
                return RangeStatus::OutsideUsefulRange { index };
            }
        }

        RangeStatus::Ok
    }

    /// True when no grid file was configured.
    pub fn is_null(&self) -> bool {
        self.files.is_empty()
    }

    /// Release transient driver resources on every grid file.
    ///
    /// All files are released even if one fails; the first failure is
    /// returned. The fallback is left alone.
    pub fn release(&mut self) -> Result<()> {
        let mut first_error = None;

        for entry in &mut self.files {
            if let Err(err) = entry.object.release() {
                tracing::warn!(
                    transform = %self.name,
                    path = %entry.params.path.display(),
                    error = %err,
                    "Grid file release failed"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tear down the transformation: grid files first, then the fallback.
    pub fn destroy(self) {
        drop(self);
    }
}

impl GeodeticTransform for GridInterpolation {
    fn name(&self) -> &str {
        &self.name
    }

    fn method_type(&self) -> MethodType {
        MethodType::GridInterpolation
    }

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        GridInterpolation::forward_2d(self, source)
    }

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        GridInterpolation::forward_3d(self, source)
    }

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        GridInterpolation::inverse_2d(self, source)
    }

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        GridInterpolation::inverse_3d(self, source)
    }

    fn in_range(&mut self, points: &[GeoPoint]) -> RangeStatus {
        GridInterpolation::in_range(self, points)
    }

    fn is_null(&self) -> bool {
        GridInterpolation::is_null(self)
    }

    fn release(&mut self) -> Result<()> {
        GridInterpolation::release(self)
    }
}

impl fmt::Debug for GridInterpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridInterpolation")
            .field("name", &self.name)
            .field("source_datum", &self.source_datum)
            .field("target_datum", &self.target_datum)
            .field("files", &self.files.iter().map(|e| &e.params).collect::<Vec<_>>())
            .field("fallback", &self.fallback_name())
            .field("fallback_direction", &self.fallback_direction())
            .field("use_best", &self.use_best)
            .finish()
    }
}
