//! Grid file driver contract and the format table.
//!
//! Every grid format is handled by a [`GridFormatDriver`], which statically
//! checks file specs and opens files into [`GridFile`] objects. The
//! [`FormatTable`] maps a [`GridFormat`] to its driver.
//!
//! ```text
//! GridFileSpec ──► FormatTable::resolve(code) ──► GridFormatDriver
//!                                                     │
//!                                     check(spec) ◄───┤
//!                                                     │
//!                                initialize(params) ──┴──► Box<dyn GridFile>
//!                                                             test / forward / inverse
//!                                                             release / drop
//! ```

mod ntv2;

pub use ntv2::{Ntv2Driver, Ntv2File, Ntv2SubGridSpec, Ntv2Writer};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::GridFileSpec;
use crate::error::{GridFileIssue, Result};
use crate::types::{Direction, GeoPoint, GridFormat, GridLookup};

/// Runtime parameters of one configured grid file, handed to its driver.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFileParams {
    /// How the file is oriented relative to the owning transformation.
    pub direction: Direction,
    pub format: GridFormat,
    /// Absolute path, separators normalized for the host.
    pub path: PathBuf,
    /// Buffer-size hint in bytes (0 = driver default).
    pub buffer_size: usize,
    pub flags: u32,
    /// Density hint in degrees (0.0 = unset).
    pub density: f64,
    pub convergence_value: f64,
    pub error_value: f64,
    pub max_iterations: u32,
}

/// An opened grid file.
///
/// Exclusively owned by the grid file entry that initialized it. Dropping it
/// frees every resource the driver holds.
pub trait GridFile: Send {
    /// Coverage query.
    ///
    /// Returns the grid density at `point` in degrees: `0.0` means the point
    /// is not covered, smaller positive values mean a finer grid.
    fn test(&mut self, point: &GeoPoint, direction: Direction) -> f64;

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<GridLookup>;

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<GridLookup>;

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<GridLookup>;

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<GridLookup>;

    /// Drop transient resources (caches, buffers). The file stays usable.
    fn release(&mut self) -> Result<()>;
}

/// Driver for one grid file format.
pub trait GridFormatDriver: Send + Sync {
    fn format(&self) -> GridFormat;

    /// Open and validate a grid file.
    fn initialize(&self, params: &GridFileParams) -> Result<Box<dyn GridFile>>;

    /// Statically validate a file spec without opening the file for lookups.
    fn check(&self, spec: &GridFileSpec, data_dir: &Path) -> Vec<GridFileIssue>;
}

/// Registry mapping grid formats to their drivers.
#[derive(Clone, Default)]
pub struct FormatTable {
    drivers: HashMap<GridFormat, Arc<dyn GridFormatDriver>>,
}

impl FormatTable {
    /// An empty table. Every format code is unresolvable until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the drivers shipped in this crate.
    pub fn with_builtin_drivers() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(Ntv2Driver::new()));
        table
    }

    /// Register a driver under its format, replacing any previous one.
    pub fn register(&mut self, driver: Arc<dyn GridFormatDriver>) {
        self.drivers.insert(driver.format(), driver);
    }

    /// Driver for a format enum.
    pub fn driver(&self, format: GridFormat) -> Option<&Arc<dyn GridFormatDriver>> {
        self.drivers.get(&format)
    }

    /// Resolve a format code to its enum and driver.
    pub fn resolve(&self, code: &str) -> Option<(GridFormat, &Arc<dyn GridFormatDriver>)> {
        let format = GridFormat::from_code(code)?;
        self.driver(format).map(|driver| (format, driver))
    }

    /// Formats with a registered driver, in format-table order.
    pub fn formats(&self) -> Vec<GridFormat> {
        GridFormat::ALL
            .iter()
            .copied()
            .filter(|format| self.drivers.contains_key(format))
            .collect()
    }
}

impl std::fmt::Debug for FormatTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatTable")
            .field("formats", &self.formats())
            .finish()
    }
}
