//! Grid-Interpolation Datum Transformations
//!
//! This crate converts geographic coordinates between datums by looking up
//! shifts in grid files (NTv2 and other pluggable formats). It provides:
//!
//! - **Format table**: maps grid format codes to drivers that open and
//!   query grid files
//! - **Quality check**: validates a transformation definition before use
//! - **Multi-file coverage**: first-match or finest-density selection across
//!   overlapping grid files
//! - **Fallback chaining**: an independent transformation handles points
//!   outside every grid
//!
//! # Architecture
//!
//! ```text
//! GridTransformDefinition
//!      │
//!      ├─► check_definition() ──► QualityReport
//!      │
//!      └─► GridInterpolation::new()
//!               │
//!               ├─► FormatTable ──► GridFormatDriver::initialize() per file
//!               └─► TransformCatalog ──► fallback instance
//!
//! forward_2d / forward_3d / inverse_2d / inverse_3d (per point)
//!      │
//!      └─► Conversion::{Converted, ViaFallback, NoCoverage}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use datum_grid::{FormatTable, GridInterpolation, GridTransformConfig, InMemoryCatalog, SetupContext};
//!
//! let config = GridTransformConfig::from_env();
//! let formats = FormatTable::with_builtin_drivers();
//! let catalog = InMemoryCatalog::new();
//! let ctx = SetupContext::new(&config, &formats, &catalog);
//!
//! let mut xform = GridInterpolation::new(&definition, &ctx)?;
//! match xform.forward_2d(&GeoPoint::new(-75.7, 45.4))? {
//!     Conversion::Converted(p) | Conversion::ViaFallback(p) => println!("{}", p),
//!     Conversion::NoCoverage => println!("outside coverage"),
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod geocentric;
pub mod quality;
pub mod transform;
pub mod types;

// Re-export commonly used types at crate root
pub use catalog::{GeodeticTransform, InMemoryCatalog, MethodType, TransformCatalog, TransformIndex};
pub use config::{
    load_transform_set, resolve_grid_path, GridFileSpec, GridTransformConfig, GridTransformDefinition,
    TransformDef, TransformSet,
};
pub use driver::{
    FormatTable, GridFile, GridFileParams, GridFormatDriver, Ntv2Driver, Ntv2File, Ntv2SubGridSpec, Ntv2Writer,
};
pub use error::{ConfigIssue, GridFileIssue, GridTransformError, Result};
pub use geocentric::{Ellipsoid, GeocentricDefinition, GeocentricTranslation};
pub use quality::{check_definition, QualityContext, QualityReport};
pub use transform::{
    resolve_fallback_direction, GridFileEntry, GridInterpolation, SetupContext, FALLBACK_DIRECTION_OVERRIDES,
};
pub use types::{Conversion, Direction, FallbackDimension, GeoPoint, GridFormat, GridLookup, RangeStatus};
