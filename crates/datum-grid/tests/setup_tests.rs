//! Setup, teardown of partial setups, and the quality check with
//! host-registered drivers.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use datum_grid::{
    check_definition, ConfigIssue, Direction, FormatTable, GridFileIssue, GridFileSpec, GridFormat, GridInterpolation,
    GridTransformConfig, GridTransformDefinition, GridTransformError, InMemoryCatalog, MethodType, QualityContext,
    SetupContext,
};
use test_utils::{bbox, register_mock_fallback, MockGrid, MockGridDriver};

fn driver() -> MockGridDriver {
    MockGridDriver::new(GridFormat::Japan)
        .with_grid("canada.grd", MockGrid::new(bbox::CANADA, 0.25, (0.0, 0.0, 0.0)))
        .with_grid("quebec.grd", MockGrid::new(bbox::QUEBEC_PATCH, 0.05, (0.0, 0.0, 0.0)))
        .failing_on("corrupt.grd")
}

fn formats_with(driver: &Arc<MockGridDriver>) -> FormatTable {
    let mut formats = FormatTable::with_builtin_drivers();
    formats.register(driver.clone());
    formats
}

fn mock_file(path: &str) -> GridFileSpec {
    GridFileSpec::new(path, 'F', "japan")
}

#[test]
fn test_setup_hands_resolved_params_to_driver() {
    let driver = Arc::new(driver());
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();
    let mut config = GridTransformConfig::with_data_dir("/opt/csmap");
    config.driver_buffer_size = 65536;

    let mut def = GridTransformDefinition::new("T", "NAD27", "NAD83")
        .with_file(mock_file("./Canada/canada.grd"))
        .with_file(GridFileSpec::new(".\\Quebec\\quebec.grd", 'i', "JAPAN"));
    def.max_iterations = 25;
    def.convergence_value = 1.0e-10;
    def.error_value = 1.0e-7;

    let xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();
    assert_eq!(xform.file_count(), 2);
    assert!(!xform.is_null());

    let opened = driver.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(
        opened[0].path,
        PathBuf::from(format!("{0}opt{0}csmap{0}Canada{0}canada.grd", MAIN_SEPARATOR))
    );
    assert_eq!(
        opened[1].path,
        PathBuf::from(format!("{0}opt{0}csmap{0}Quebec{0}quebec.grd", MAIN_SEPARATOR))
    );
    assert_eq!(opened[0].direction, Direction::Forward);
    assert_eq!(opened[1].direction, Direction::Inverse);

    for params in &opened {
        assert_eq!(params.format, GridFormat::Japan);
        assert_eq!(params.buffer_size, 65536);
        assert_eq!(params.max_iterations, 25);
        assert_eq!(params.convergence_value, 1.0e-10);
        assert_eq!(params.error_value, 1.0e-7);
        assert_eq!(params.flags, 0);
        assert_eq!(params.density, 0.0);
    }

    let stored: Vec<_> = xform.files().map(|entry| entry.params().clone()).collect();
    assert_eq!(stored, opened);
}

#[test]
fn test_failed_file_drops_earlier_files_once() {
    let driver = Arc::new(driver());
    let counters = driver.counters();
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();
    let config = GridTransformConfig::default();

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_file(mock_file("./corrupt.grd"))
        .with_file(mock_file("./quebec.grd"));

    let err = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap_err();
    assert!(matches!(err, GridTransformError::OpenFailed { .. }), "{:?}", err);

    // The third file is never attempted; the first is torn down exactly once.
    assert_eq!(counters.initialized(), 1);
    assert_eq!(counters.dropped(), 1);
    assert_eq!(counters.released(), 0);
}

#[test]
fn test_missing_fallback_drops_every_file() {
    let driver = Arc::new(driver());
    let counters = driver.counters();
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();
    let config = GridTransformConfig::default();

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_file(mock_file("./quebec.grd"))
        .with_fallback("Nowhere");

    let err = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap_err();
    assert!(matches!(err, GridTransformError::FallbackNotFound(ref name) if name == "Nowhere"));
    assert_eq!(counters.initialized(), 2);
    assert_eq!(counters.live(), 0);
}

#[test]
fn test_fallback_instantiation_error_propagates() {
    let driver = Arc::new(driver());
    let counters = driver.counters();
    let formats = formats_with(&driver);
    let config = GridTransformConfig::default();

    let mut catalog = InMemoryCatalog::new();
    catalog.register("Unbuildable", MethodType::Geocentric, |_| {
        Err(GridTransformError::config_error("ellipsoid table unavailable"))
    });

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_fallback("unbuildable");

    let err = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap_err();
    assert!(matches!(err, GridTransformError::ConfigError(_)), "{:?}", err);
    assert_eq!(counters.live(), 0);
}

#[test]
fn test_blank_fallback_means_none() {
    let driver = Arc::new(driver());
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();
    let config = GridTransformConfig::default();

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_fallback("   ");

    let xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();
    assert_eq!(xform.fallback_name(), None);
    assert_eq!(xform.fallback_direction(), None);
}

#[test]
fn test_setup_takes_inverse_3d_mode_from_config() {
    let driver = Arc::new(driver());
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();
    let mut config = GridTransformConfig::default();
    config.inverse_3d_fallback = datum_grid::FallbackDimension::Full3d;

    let def = GridTransformDefinition::new("T", "A", "B");
    let xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();
    assert_eq!(xform.inverse_3d_fallback(), datum_grid::FallbackDimension::Full3d);
}

// ============================================================================
// Quality check against registered drivers
// ============================================================================

#[test]
fn test_quality_passes_for_registered_driver() {
    let driver = Arc::new(driver());
    let formats = formats_with(&driver);
    let mut catalog = InMemoryCatalog::new();
    register_mock_fallback(&mut catalog, "Molodensky", MethodType::Standalone, (0.0, 0.0, 0.0));

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_file(mock_file("./quebec.grd"))
        .with_fallback("Molodensky");
    let ctx = QualityContext {
        formats: &formats,
        catalog: &catalog,
        data_dir: Path::new("/opt/csmap"),
    };

    let report = check_definition(&def, &ctx, 8);
    assert!(report.is_ok(), "{:?}", report);
}

#[test]
fn test_quality_caps_driver_findings_per_file() {
    let issues: Vec<GridFileIssue> = (0..6)
        .map(|i| GridFileIssue::Unreadable {
            path: "./noisy.grd".to_string(),
            message: format!("record {}", i),
        })
        .collect();
    let driver = Arc::new(driver().with_check_issues("noisy.grd", issues));
    let formats = formats_with(&driver);
    let catalog = InMemoryCatalog::new();

    let def = GridTransformDefinition::new("T", "A", "B").with_file(mock_file("./noisy.grd"));
    let ctx = QualityContext {
        formats: &formats,
        catalog: &catalog,
        data_dir: Path::new("."),
    };

    let report = check_definition(&def, &ctx, 16);
    assert_eq!(report.issues.len(), 4);
    assert_eq!(report.total, 6);
    assert!(report
        .issues
        .iter()
        .all(|issue| matches!(issue, ConfigIssue::GridFile { index: 0, .. })));
}

#[test]
fn test_quality_flags_grid_fallback_and_bad_direction() {
    let driver = Arc::new(driver());
    let formats = formats_with(&driver);
    let mut catalog = InMemoryCatalog::new();
    register_mock_fallback(&mut catalog, "OtherGrid", MethodType::GridInterpolation, (0.0, 0.0, 0.0));

    let def = GridTransformDefinition::new("T", "A", "B")
        .with_file(mock_file("./canada.grd"))
        .with_file(GridFileSpec::new("./quebec.grd", '?', "JAPAN"))
        .with_fallback("OtherGrid");
    let ctx = QualityContext {
        formats: &formats,
        catalog: &catalog,
        data_dir: Path::new("."),
    };

    let report = check_definition(&def, &ctx, 16);
    assert_eq!(
        report.issues,
        vec![
            ConfigIssue::InvalidDirection { index: 1, flag: '?' },
            ConfigIssue::FallbackMethodInvalid {
                name: "OtherGrid".to_string(),
                method: MethodType::GridInterpolation,
            },
        ]
    );
}
