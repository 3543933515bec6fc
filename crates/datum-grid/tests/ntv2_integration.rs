//! End-to-end conversions through NTv2 files written on the fly, and
//! through transform sets loaded from YAML.

use std::fs;
use std::sync::Arc;

use datum_grid::{
    load_transform_set, Conversion, FormatTable, GeoPoint, GeodeticTransform, GridFileSpec, GridInterpolation, GridTransformConfig,
    GridTransformDefinition, InMemoryCatalog, RangeStatus, SetupContext, TransformSet,
};
use test_utils::{
    assert_points_approx_eq, bbox, points, require_test_file, require_test_files, temp_grid_dir, write_linear_ntv2, write_nested_ntv2,
    LinearShift, NAD27_LIKE,
};

const NATIONAL: (f64, f64, f64, f64) = (-100.0, 40.0, -60.0, 60.0);

fn expected(point: &GeoPoint, field: LinearShift) -> GeoPoint {
    let (lon, lat) = field.apply(point.lon, point.lat);
    GeoPoint::with_height(lon, lat, point.height)
}

#[test]
fn test_forward_and_inverse_through_ntv2() {
    let dir = temp_grid_dir();
    write_linear_ntv2(dir.path(), "national.gsb", NATIONAL, 1.0, NAD27_LIKE).unwrap();

    let config = GridTransformConfig::with_data_dir(dir.path());
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("NAD27_to_NAD83", "NAD27", "NAD83")
        .with_file(GridFileSpec::new("./national.gsb", 'F', "NTv2"));
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();

    let ottawa = points::ottawa();
    let forward = match xform.forward_3d(&ottawa).unwrap() {
        Conversion::Converted(p) => p,
        other => panic!("expected grid conversion, got {:?}", other),
    };
    assert_points_approx_eq!(forward, expected(&ottawa, NAD27_LIKE), 1e-9);

    let back = xform.inverse_3d(&forward).unwrap().point().unwrap();
    assert_points_approx_eq!(back, ottawa, 1e-8);

    assert_eq!(
        xform.in_range(&[ottawa, points::winnipeg(), points::paris()]),
        RangeStatus::OutsideUsefulRange { index: 2 }
    );
    assert_eq!(xform.forward_2d(&points::paris()).unwrap(), Conversion::NoCoverage);
}

#[test]
fn test_inverse_stored_file_reverses_roles() {
    let dir = temp_grid_dir();
    write_linear_ntv2(dir.path(), "national.gsb", NATIONAL, 1.0, NAD27_LIKE).unwrap();

    let config = GridTransformConfig::with_data_dir(dir.path());
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("NAD83_to_NAD27", "NAD83", "NAD27")
        .with_file(GridFileSpec::new("./national.gsb", 'I', "NTv2"));
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();

    let nad27 = points::winnipeg();
    let nad83 = expected(&nad27, NAD27_LIKE);

    let converted = xform.forward_2d(&nad83).unwrap().point().unwrap();
    assert_points_approx_eq!(converted, nad27, 1e-8);

    let converted = xform.inverse_2d(&nad27).unwrap().point().unwrap();
    assert_points_approx_eq!(converted, nad83, 1e-9);
}

#[test]
fn test_best_selection_across_ntv2_files() {
    let dir = temp_grid_dir();
    let coarse = LinearShift::constant(1.0, 1.0);
    let fine = LinearShift::constant(2.0, 2.0);
    write_linear_ntv2(dir.path(), "coarse.gsb", NATIONAL, 1.0, coarse).unwrap();
    write_linear_ntv2(dir.path(), "fine.gsb", bbox::QUEBEC_PATCH, 0.25, fine).unwrap();

    let config = GridTransformConfig::with_data_dir(dir.path());
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("T", "NAD27", "NAD83")
        .with_file(GridFileSpec::new("./coarse.gsb", 'F', "NTv2"))
        .with_file(GridFileSpec::new("./fine.gsb", 'F', "NTv2"));
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();

    let ottawa = points::ottawa();
    let first = xform.forward_2d(&ottawa).unwrap().point().unwrap();
    assert_points_approx_eq!(first, expected(&ottawa, coarse), 1e-9);

    xform.set_use_best(true);
    let best = xform.forward_2d(&ottawa).unwrap().point().unwrap();
    assert_points_approx_eq!(best, expected(&ottawa, fine), 1e-9);
}

#[test]
fn test_nested_subgrids_in_one_file() {
    let dir = temp_grid_dir();
    let child_field = LinearShift::constant(3.0, 4.0);
    write_nested_ntv2(
        dir.path(),
        "nested.gsb",
        (NATIONAL, 1.0, NAD27_LIKE),
        (bbox::QUEBEC_PATCH, 0.25, child_field),
    )
    .unwrap();

    let config = GridTransformConfig::with_data_dir(dir.path());
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("T", "NAD27", "NAD83")
        .with_file(GridFileSpec::new("./nested.gsb", 'F', "NTv2"));
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();

    let ottawa = points::ottawa();
    let converted = xform.forward_2d(&ottawa).unwrap().point().unwrap();
    assert_points_approx_eq!(converted, expected(&ottawa, child_field), 1e-9);

    let winnipeg = points::winnipeg();
    let converted = xform.forward_2d(&winnipeg).unwrap().point().unwrap();
    assert_points_approx_eq!(converted, expected(&winnipeg, NAD27_LIKE), 1e-9);

    xform.release().unwrap();
    let again = xform.forward_2d(&winnipeg).unwrap().point().unwrap();
    assert_points_approx_eq!(again, converted, 0.0);
}

#[test]
fn test_missing_ntv2_file_fails_setup() {
    let dir = temp_grid_dir();
    let config = GridTransformConfig::with_data_dir(dir.path());
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("T", "NAD27", "NAD83")
        .with_file(GridFileSpec::new("./absent.gsb", 'F', "NTv2"));

    assert!(GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).is_err());
}

// ============================================================================
// Transform sets
// ============================================================================

fn write_set(dir: &std::path::Path) -> std::path::PathBuf {
    let yaml = format!(
        r#"
data_dir: {}
transforms:
  - method: grid_interpolation
    name: NAD27_to_NAD83
    description: Canadian national grid
    source_datum: NAD27
    target_datum: NAD83
    files:
      - path: ./national.gsb
        direction: F
        format: NTv2
    fallback: NAD27_to_NAD83_Geocentric
  - method: geocentric
    name: NAD27_to_NAD83_Geocentric
    source_datum: NAD27
    target_datum: NAD83
    source_ellipsoid: CLRK66
    target_ellipsoid: GRS80
    dx: -8.0
    dy: 160.0
    dz: 176.0
"#,
        dir.display()
    );
    let path = dir.join("transforms.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_transform_set_with_geocentric_fallback() {
    let dir = temp_grid_dir();
    write_linear_ntv2(dir.path(), "national.gsb", NATIONAL, 1.0, NAD27_LIKE).unwrap();
    let set = load_transform_set(write_set(dir.path())).unwrap();

    let catalog = set.build_catalog(
        Arc::new(FormatTable::with_builtin_drivers()),
        &GridTransformConfig::default(),
    );
    let mut xform = catalog.instantiate_by_name("nad27_to_nad83").unwrap();
    assert_eq!(xform.name(), "NAD27_to_NAD83");

    let ottawa = points::ottawa();
    let inside = xform.forward_2d(&ottawa).unwrap();
    assert_eq!(inside.status_code(), 0);
    assert_points_approx_eq!(inside.point().unwrap(), expected(&ottawa, NAD27_LIKE), 1e-9);

    // Outside the grid the geocentric fallback answers. NAD27 to NAD83
    // moves points by well under a hundred metres.
    let pacific = points::pacific();
    let outside = xform.forward_2d(&pacific).unwrap();
    assert_eq!(outside.status_code(), 2);
    let moved = outside.point().unwrap();
    assert!(moved.max_horizontal_delta(&pacific) > 0.0);
    assert!(moved.max_horizontal_delta(&pacific) < 0.01);
    assert_eq!(moved.height, pacific.height);

    // 2D conversions drop the ellipsoidal height change, so the round trip
    // is only good to a few millimetres.
    let back = xform.inverse_2d(&moved).unwrap();
    assert_eq!(back.status_code(), 2);
    assert_points_approx_eq!(back.point().unwrap(), pacific, 1e-6);
}

#[test]
fn test_transform_set_unknown_name() {
    let set = TransformSet::from_yaml("transforms: []").unwrap();
    let catalog = set.build_catalog(
        Arc::new(FormatTable::with_builtin_drivers()),
        &GridTransformConfig::default(),
    );
    assert!(catalog.is_empty());
    assert!(matches!(
        catalog.instantiate_by_name("anything"),
        Err(datum_grid::GridTransformError::TransformNotFound(_))
    ));
}

// ============================================================================
// Real grid data (skipped when absent)
// ============================================================================

#[test]
fn test_canadian_national_grid() {
    let path = require_test_file!("NTv2_0.gsb");

    let config = GridTransformConfig::default();
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = GridTransformDefinition::new("NAD27_to_NAD83", "NAD27", "NAD83")
        .with_file(GridFileSpec::new(path.to_string_lossy(), 'F', "NTv2"));
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();

    let ottawa = GeoPoint::new(-75.7, 45.42);
    let nad83 = xform.forward_2d(&ottawa).unwrap().point().unwrap();

    // The NAD27 to NAD83 shift in Ontario is a few arc-seconds.
    let delta = nad83.max_horizontal_delta(&ottawa);
    assert!(delta > 1.0e-4 && delta < 5.0e-3, "unexpected shift {}", delta);

    let back = xform.inverse_2d(&nad83).unwrap().point().unwrap();
    assert_points_approx_eq!(back, ottawa, 1e-8);
}

#[test]
fn test_ontario_grid_with_national_grid() {
    let paths = require_test_files!("NTv2_0.gsb", "MAY76V20.gsb");

    let config = GridTransformConfig::default();
    let formats = FormatTable::with_builtin_drivers();
    let catalog = InMemoryCatalog::new();
    let def = paths.iter().fold(
        GridTransformDefinition::new("NAD27_to_NAD83_ON", "NAD27", "NAD83"),
        |def, path| def.with_file(GridFileSpec::new(path.to_string_lossy(), 'F', "NTv2")),
    );
    let mut xform = GridInterpolation::new(&def, &SetupContext::new(&config, &formats, &catalog)).unwrap();
    xform.set_use_best(true);

    let toronto = GeoPoint::new(-79.38, 43.65);
    let nad83 = match xform.forward_2d(&toronto).unwrap() {
        Conversion::Converted(p) => p,
        other => panic!("expected grid conversion, got {:?}", other),
    };
    assert!(nad83.max_horizontal_delta(&toronto) < 5.0e-3);

    let back = xform.inverse_2d(&nad83).unwrap().point().unwrap();
    assert_points_approx_eq!(back, toronto, 1e-8);
}
