//! Common test fixtures for grid transformation tests.
//!
//! - [`MockGridDriver`]: an in-memory grid format whose files are
//!   rectangles with a constant shift. Every lifecycle event is counted so
//!   tests can assert that files are initialized, released and dropped
//!   exactly when expected.
//! - [`MockFallback`]: a constant-shift fallback transformation that counts
//!   which of its entry points were called.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use datum_grid::{
    Conversion, GeoPoint, GeodeticTransform, GridFile, GridFileIssue, GridFileParams, GridFileSpec, GridFormat,
    GridFormatDriver, GridLookup, GridTransformError, InMemoryCatalog, MethodType, Result,
};

/// Common coverage rectangles, as `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// Roughly the Canadian NTv2 national grid.
    pub const CANADA: (f64, f64, f64, f64) = (-142.0, 40.0, -47.0, 84.0);

    /// A provincial high-density patch inside [`CANADA`].
    pub const QUEBEC_PATCH: (f64, f64, f64, f64) = (-80.0, 45.0, -70.0, 50.0);

    /// Metropolitan France.
    pub const FRANCE: (f64, f64, f64, f64) = (-5.5, 41.0, 10.0, 52.0);

    /// Everything.
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);
}

/// Points with known coverage against [`bbox`].
pub mod points {
    use datum_grid::GeoPoint;

    /// Ottawa: inside `CANADA` and `QUEBEC_PATCH`.
    pub fn ottawa() -> GeoPoint {
        GeoPoint::with_height(-75.7, 45.42, 70.0)
    }

    /// Winnipeg: inside `CANADA` only.
    pub fn winnipeg() -> GeoPoint {
        GeoPoint::with_height(-97.14, 49.9, 239.0)
    }

    /// Paris: inside `FRANCE` only.
    pub fn paris() -> GeoPoint {
        GeoPoint::with_height(2.35, 48.85, 35.0)
    }

    /// Mid-Pacific: outside every regional box.
    pub fn pacific() -> GeoPoint {
        GeoPoint::with_height(-150.0, 0.0, 0.0)
    }
}

// ============================================================================
// Mock grid format
// ============================================================================

/// Lifecycle and call counters shared by a mock driver and its files.
#[derive(Debug, Default)]
pub struct GridCounters {
    pub initialized: AtomicUsize,
    pub released: AtomicUsize,
    pub dropped: AtomicUsize,
    pub tests: AtomicUsize,
    pub forward_2d: AtomicUsize,
    pub forward_3d: AtomicUsize,
    pub inverse_2d: AtomicUsize,
    pub inverse_3d: AtomicUsize,
}

impl GridCounters {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Files initialized and not yet dropped.
    pub fn live(&self) -> usize {
        self.initialized() - self.dropped()
    }

    /// Lookups answered, in the order forward 2D, forward 3D, inverse 2D,
    /// inverse 3D.
    pub fn lookups(&self) -> [usize; 4] {
        [
            self.forward_2d.load(Ordering::SeqCst),
            self.forward_3d.load(Ordering::SeqCst),
            self.inverse_2d.load(Ordering::SeqCst),
            self.inverse_3d.load(Ordering::SeqCst),
        ]
    }
}

/// Contents of one mock grid file.
#[derive(Debug, Clone, PartialEq)]
pub struct MockGrid {
    /// `(min_lon, min_lat, max_lon, max_lat)`, inclusive.
    pub coverage: (f64, f64, f64, f64),
    /// Density reported by coverage queries, in degrees.
    pub density: f64,
    /// Constant `(dlon, dlat, dheight)` applied by forward lookups.
    pub shift: (f64, f64, f64),
    /// Report coverage from `test` but answer every lookup with
    /// `OutsideCoverage`.
    pub lookup_misses: bool,
    /// Fail every lookup with a fatal error.
    pub lookup_fails: bool,
    pub release_fails: bool,
}

impl MockGrid {
    pub fn new(coverage: (f64, f64, f64, f64), density: f64, shift: (f64, f64, f64)) -> Self {
        Self {
            coverage,
            density,
            shift,
            lookup_misses: false,
            lookup_fails: false,
            release_fails: false,
        }
    }

    pub fn lookup_misses(mut self) -> Self {
        self.lookup_misses = true;
        self
    }

    pub fn lookup_fails(mut self) -> Self {
        self.lookup_fails = true;
        self
    }

    pub fn release_fails(mut self) -> Self {
        self.release_fails = true;
        self
    }

    fn covers(&self, point: &GeoPoint) -> bool {
        let (min_lon, min_lat, max_lon, max_lat) = self.coverage;
        point.lon >= min_lon && point.lon <= max_lon && point.lat >= min_lat && point.lat <= max_lat
    }
}

/// A grid format driver serving [`MockGrid`]s keyed by file name.
pub struct MockGridDriver {
    format: GridFormat,
    grids: HashMap<String, MockGrid>,
    failing: Vec<String>,
    check_issues: HashMap<String, Vec<GridFileIssue>>,
    counters: Arc<GridCounters>,
    opened: Mutex<Vec<GridFileParams>>,
}

impl MockGridDriver {
    /// A driver registered under `format`. Pick a format without a
    /// built-in driver (e.g. [`GridFormat::Japan`]) to avoid clashes.
    pub fn new(format: GridFormat) -> Self {
        Self {
            format,
            grids: HashMap::new(),
            failing: Vec::new(),
            check_issues: HashMap::new(),
            counters: Arc::new(GridCounters::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Serve `grid` for files named `file_name`.
    pub fn with_grid(mut self, file_name: &str, grid: MockGrid) -> Self {
        self.grids.insert(file_name.to_string(), grid);
        self
    }

    /// Fail initialization of files named `file_name`.
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.push(file_name.to_string());
        self
    }

    /// Report `issues` when checking files named `file_name`.
    pub fn with_check_issues(mut self, file_name: &str, issues: Vec<GridFileIssue>) -> Self {
        self.check_issues.insert(file_name.to_string(), issues);
        self
    }

    pub fn counters(&self) -> Arc<GridCounters> {
        self.counters.clone()
    }

    /// Parameters of every successful initialization, in order.
    pub fn opened(&self) -> Vec<GridFileParams> {
        self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl GridFormatDriver for MockGridDriver {
    fn format(&self) -> GridFormat {
        self.format
    }

    fn initialize(&self, params: &GridFileParams) -> Result<Box<dyn GridFile>> {
        let name = Self::file_name(&params.path);
        let display = params.path.display().to_string();

        if self.failing.contains(&name) {
            return Err(GridTransformError::open_failed(display, "mock initialization failure"));
        }

        let grid = self
            .grids
            .get(&name)
            .cloned()
            .ok_or_else(|| GridTransformError::open_failed(display, "no such mock grid"))?;

        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(params.clone());
        }

        Ok(Box::new(MockGridFile {
            grid,
            counters: self.counters.clone(),
        }))
    }

    fn check(&self, spec: &GridFileSpec, _data_dir: &Path) -> Vec<GridFileIssue> {
        let name = Self::file_name(Path::new(&spec.path));
        if let Some(issues) = self.check_issues.get(&name) {
            return issues.clone();
        }
        if self.grids.contains_key(&name) {
            Vec::new()
        } else {
            vec![GridFileIssue::NotFound { path: spec.path.clone() }]
        }
    }
}

/// An opened [`MockGrid`].
pub struct MockGridFile {
    grid: MockGrid,
    counters: Arc<GridCounters>,
}

impl MockGridFile {
    fn lookup(&self, source: &GeoPoint, sign: f64, with_height: bool) -> Result<GridLookup> {
        if self.grid.lookup_fails {
            return Err(GridTransformError::invalid_grid_file("mock", "mock lookup failure"));
        }
        if self.grid.lookup_misses || !self.grid.covers(source) {
            return Ok(GridLookup::OutsideCoverage);
        }

        let (dlon, dlat, dh) = self.grid.shift;
        let height = if with_height {
            source.height + sign * dh
        } else {
            source.height
        };
        Ok(GridLookup::Shifted(GeoPoint::with_height(
            source.lon + sign * dlon,
            source.lat + sign * dlat,
            height,
        )))
    }
}

impl GridFile for MockGridFile {
    fn test(&mut self, point: &GeoPoint, _direction: datum_grid::Direction) -> f64 {
        self.counters.tests.fetch_add(1, Ordering::SeqCst);
        if self.grid.covers(point) {
            self.grid.density
        } else {
            0.0
        }
    }

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.counters.forward_2d.fetch_add(1, Ordering::SeqCst);
        self.lookup(source, 1.0, false)
    }

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.counters.forward_3d.fetch_add(1, Ordering::SeqCst);
        self.lookup(source, 1.0, true)
    }

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.counters.inverse_2d.fetch_add(1, Ordering::SeqCst);
        self.lookup(source, -1.0, false)
    }

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.counters.inverse_3d.fetch_add(1, Ordering::SeqCst);
        self.lookup(source, -1.0, true)
    }

    fn release(&mut self) -> Result<()> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        if self.grid.release_fails {
            return Err(GridTransformError::internal("release", "mock release failure"));
        }
        Ok(())
    }
}

impl Drop for MockGridFile {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock fallback
// ============================================================================

/// Calls received by a [`MockFallback`].
#[derive(Debug, Default)]
pub struct FallbackCounters {
    pub forward_2d: AtomicUsize,
    pub forward_3d: AtomicUsize,
    pub inverse_2d: AtomicUsize,
    pub inverse_3d: AtomicUsize,
    pub released: AtomicUsize,
    pub dropped: AtomicUsize,
}

impl FallbackCounters {
    /// Calls in the order forward 2D, forward 3D, inverse 2D, inverse 3D.
    pub fn calls(&self) -> [usize; 4] {
        [
            self.forward_2d.load(Ordering::SeqCst),
            self.forward_3d.load(Ordering::SeqCst),
            self.inverse_2d.load(Ordering::SeqCst),
            self.inverse_3d.load(Ordering::SeqCst),
        ]
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// A fallback transformation applying a constant `(dlon, dlat, dheight)`.
pub struct MockFallback {
    name: String,
    method: MethodType,
    shift: (f64, f64, f64),
    fails: bool,
    counters: Arc<FallbackCounters>,
}

impl MockFallback {
    pub fn new(name: &str, method: MethodType, shift: (f64, f64, f64), counters: Arc<FallbackCounters>) -> Self {
        Self {
            name: name.to_string(),
            method,
            shift,
            fails: false,
            counters,
        }
    }

    /// Fail every conversion with a fatal error.
    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    fn apply(&self, source: &GeoPoint, sign: f64) -> Result<Conversion> {
        if self.fails {
            return Err(GridTransformError::internal("mock_fallback", "mock fallback failure"));
        }
        let (dlon, dlat, dh) = self.shift;
        Ok(Conversion::Converted(GeoPoint::with_height(
            source.lon + sign * dlon,
            source.lat + sign * dlat,
            source.height + sign * dh,
        )))
    }
}

impl GeodeticTransform for MockFallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn method_type(&self) -> MethodType {
        self.method
    }

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.counters.forward_2d.fetch_add(1, Ordering::SeqCst);
        self.apply(source, 1.0)
    }

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.counters.forward_3d.fetch_add(1, Ordering::SeqCst);
        self.apply(source, 1.0)
    }

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.counters.inverse_2d.fetch_add(1, Ordering::SeqCst);
        self.apply(source, -1.0)
    }

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<Conversion> {
        self.counters.inverse_3d.fetch_add(1, Ordering::SeqCst);
        self.apply(source, -1.0)
    }

    fn release(&mut self) -> Result<()> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockFallback {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Register a [`MockFallback`] in `catalog` and return its counters.
pub fn register_mock_fallback(
    catalog: &mut InMemoryCatalog,
    name: &str,
    method: MethodType,
    shift: (f64, f64, f64),
) -> Arc<FallbackCounters> {
    register_fallback_with(catalog, name, method, shift, false)
}

/// Register a [`MockFallback`] whose conversions always fail.
pub fn register_failing_fallback(catalog: &mut InMemoryCatalog, name: &str) -> Arc<FallbackCounters> {
    register_fallback_with(catalog, name, MethodType::Geocentric, (0.0, 0.0, 0.0), true)
}

fn register_fallback_with(
    catalog: &mut InMemoryCatalog,
    name: &str,
    method: MethodType,
    shift: (f64, f64, f64),
    fails: bool,
) -> Arc<FallbackCounters> {
    let counters = Arc::new(FallbackCounters::default());
    let shared = counters.clone();
    let owned = name.to_string();

    catalog.register(name, method, move |_| {
        let fallback = MockFallback::new(&owned, method, shift, shared.clone());
        Ok(Box::new(if fails { fallback.failing() } else { fallback }))
    });

    counters
}

#[cfg(test)]
mod tests {
    use super::*;
    use datum_grid::{Direction, TransformCatalog};
    use std::path::PathBuf;

    fn params(path: &str) -> GridFileParams {
        GridFileParams {
            direction: Direction::Forward,
            format: GridFormat::Japan,
            path: PathBuf::from(path),
            buffer_size: 0,
            flags: 0,
            density: 0.0,
            convergence_value: 1e-9,
            error_value: 5e-8,
            max_iterations: 10,
        }
    }

    #[test]
    fn test_mock_driver_lifecycle() {
        let driver = MockGridDriver::new(GridFormat::Japan)
            .with_grid("a.grd", MockGrid::new(bbox::CANADA, 0.1, (1.0, 2.0, 3.0)));
        let counters = driver.counters();

        let mut file = driver.initialize(&params("/data/a.grd")).unwrap();
        assert_eq!(counters.live(), 1);
        assert_eq!(file.test(&points::ottawa(), Direction::Forward), 0.1);
        assert_eq!(file.test(&points::paris(), Direction::Forward), 0.0);

        let shifted = file.forward_3d(&points::ottawa()).unwrap();
        assert!(matches!(shifted, GridLookup::Shifted(p) if p.height == 73.0));
        file.release().unwrap();
        drop(file);

        assert_eq!(counters.released(), 1);
        assert_eq!(counters.live(), 0);
        assert_eq!(driver.opened().len(), 1);
    }

    #[test]
    fn test_mock_driver_failures() {
        let driver = MockGridDriver::new(GridFormat::Japan).failing_on("bad.grd");
        assert!(driver.initialize(&params("/data/bad.grd")).is_err());
        assert!(driver.initialize(&params("/data/unknown.grd")).is_err());
        assert_eq!(driver.counters().initialized(), 0);

        let spec = GridFileSpec::new("./unknown.grd", 'F', "JAPAN");
        assert_eq!(driver.check(&spec, Path::new(".")).len(), 1);
    }

    #[test]
    fn test_registered_mock_fallback() {
        let mut catalog = InMemoryCatalog::new();
        let counters = register_mock_fallback(&mut catalog, "Fb", MethodType::Geocentric, (0.5, 0.0, 0.0));

        let index = catalog.locate("fb").unwrap();
        let mut fallback = catalog.instantiate(index).unwrap();
        let result = fallback.inverse_2d(&GeoPoint::new(1.0, 1.0)).unwrap();
        assert_eq!(result.point().unwrap().lon, 0.5);
        assert_eq!(counters.calls(), [0, 0, 1, 0]);

        drop(fallback);
        assert_eq!(counters.dropped(), 1);
    }
}
