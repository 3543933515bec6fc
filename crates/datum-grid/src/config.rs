//! Configuration and declarative definitions.
//!
//! - [`GridTransformConfig`]: process-level settings consulted during setup
//!   (data directory, driver buffer hint, inverse-3D fallback behavior).
//! - [`GridTransformDefinition`]: one grid-interpolation transformation as
//!   written in a definition file.
//! - [`TransformSet`]: a YAML document holding several definitions, loaded
//!   with `${VAR}` environment substitution.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use crate::catalog::{InMemoryCatalog, MethodType};
use crate::driver::FormatTable;
use crate::error::{GridTransformError, Result};
use crate::geocentric::{GeocentricDefinition, GeocentricTranslation};
use crate::transform::{GridInterpolation, SetupContext};
use crate::types::FallbackDimension;

/// Default iteration limit for iterative inverse lookups.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
/// Default convergence tolerance, in degrees.
pub const DEFAULT_CONVERGENCE_VALUE: f64 = 1.0e-9;
/// Default error tolerance, in degrees.
pub const DEFAULT_ERROR_VALUE: f64 = 5.0e-8;

// ============================================================================
// Process configuration
// ============================================================================

/// Settings consulted while constructing grid transformations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTransformConfig {
    /// Directory that `./`-prefixed grid file paths are relative to.
    pub data_dir: PathBuf,

    /// Buffer-size hint handed to every driver (0 = driver default).
    pub driver_buffer_size: usize,

    /// Dimensionality of the fallback call on the inverse-3D path.
    pub inverse_3d_fallback: FallbackDimension,
}

impl Default for GridTransformConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            driver_buffer_size: 0,
            inverse_3d_fallback: FallbackDimension::Legacy2d,
        }
    }
}

impl GridTransformConfig {
    /// Create a configuration rooted at the given data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRIDI_DATA_DIR") {
            if !val.is_empty() {
                config.data_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("GRIDI_BUFFER_SIZE") {
            if let Ok(size) = val.parse() {
                config.driver_buffer_size = size;
            }
        }

        if let Ok(val) = std::env::var("GRIDI_INVERSE_3D_FALLBACK") {
            config.inverse_3d_fallback = val.parse().unwrap_or_default();
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }

        Ok(())
    }
}

/// Resolve a grid file path as written in a definition.
///
/// A leading `./` or `.\` makes the remainder relative to `data_dir`; any
/// other path is used as given. Both separator styles are normalized to the
/// host separator.
pub fn resolve_grid_path(raw: &str, data_dir: &Path) -> PathBuf {
    let relative = raw.strip_prefix("./").or_else(|| raw.strip_prefix(".\\"));

    let joined = match relative {
        Some(rest) => {
            let base = data_dir.to_string_lossy();
            let base = base.trim_end_matches(['/', '\\']);
            format!("{}{}{}", base, MAIN_SEPARATOR, rest)
        }
        None => raw.to_string(),
    };

    PathBuf::from(normalize_separators(&joined))
}

fn normalize_separators(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect()
}

// ============================================================================
// Definitions
// ============================================================================

/// One grid file entry of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFileSpec {
    /// File path; `./` means relative to the data directory.
    pub path: String,

    /// `F`/`f` forward, `I`/`i` inverse.
    #[serde(default = "default_direction")]
    pub direction: char,

    /// Format code, e.g. `NTv2`.
    pub format: String,
}

fn default_direction() -> char {
    'F'
}

impl GridFileSpec {
    pub fn new(path: impl Into<String>, direction: char, format: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction,
            format: format.into(),
        }
    }
}

/// Declarative definition of a grid-interpolation transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTransformDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub source_datum: String,
    pub target_datum: String,

    /// Grid files in priority order.
    #[serde(default)]
    pub files: Vec<GridFileSpec>,

    /// Name of the fallback transformation; empty means none.
    #[serde(default)]
    pub fallback: Option<String>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_convergence_value")]
    pub convergence_value: f64,

    #[serde(default = "default_error_value")]
    pub error_value: f64,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_convergence_value() -> f64 {
    DEFAULT_CONVERGENCE_VALUE
}

fn default_error_value() -> f64 {
    DEFAULT_ERROR_VALUE
}

impl GridTransformDefinition {
    /// Create an empty definition with default tolerances.
    pub fn new(
        name: impl Into<String>,
        source_datum: impl Into<String>,
        target_datum: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source_datum: source_datum.into(),
            target_datum: target_datum.into(),
            files: Vec::new(),
            fallback: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_value: DEFAULT_CONVERGENCE_VALUE,
            error_value: DEFAULT_ERROR_VALUE,
        }
    }

    /// Append a grid file.
    pub fn with_file(mut self, file: GridFileSpec) -> Self {
        self.files.push(file);
        self
    }

    /// Set the fallback transformation name.
    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    /// The fallback name, if one is configured and non-blank.
    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

// ============================================================================
// Transform sets (YAML)
// ============================================================================

/// A definition of any transformation method a set can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TransformDef {
    GridInterpolation(GridTransformDefinition),
    Geocentric(GeocentricDefinition),
}

impl TransformDef {
    pub fn name(&self) -> &str {
        match self {
            TransformDef::GridInterpolation(def) => &def.name,
            TransformDef::Geocentric(def) => &def.name,
        }
    }

    pub fn method_type(&self) -> MethodType {
        match self {
            TransformDef::GridInterpolation(_) => MethodType::GridInterpolation,
            TransformDef::Geocentric(_) => MethodType::Geocentric,
        }
    }
}

/// A YAML document of transformation definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformSet {
    /// Overrides the configured data directory when present.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub transforms: Vec<TransformDef>,
}

impl TransformSet {
    /// Parse a transform set from YAML text, expanding `${VAR}` references.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let set: TransformSet = serde_yaml::from_str(&expanded)?;
        set.validate()?;
        Ok(set)
    }

    /// Find a grid-interpolation definition by name (case-insensitive).
    pub fn grid_definition(&self, name: &str) -> Option<&GridTransformDefinition> {
        self.grid_definitions()
            .find(|def| def.name.eq_ignore_ascii_case(name))
    }

    /// All grid-interpolation definitions, in file order.
    pub fn grid_definitions(&self) -> impl Iterator<Item = &GridTransformDefinition> {
        self.transforms.iter().filter_map(|def| match def {
            TransformDef::GridInterpolation(grid) => Some(grid),
            _ => None,
        })
    }

    /// Apply this set's data directory, if any, on top of a base configuration.
    pub fn effective_config(&self, base: &GridTransformConfig) -> GridTransformConfig {
        let mut config = base.clone();
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        config
    }

    /// Register every transformation of the set in a new catalog.
    ///
    /// Grid transformations are built lazily when the catalog instantiates
    /// them, so one may name another entry of the set as its fallback.
    pub fn build_catalog(
        &self,
        formats: Arc<FormatTable>,
        config: &GridTransformConfig,
    ) -> InMemoryCatalog {
        let config = self.effective_config(config);
        let mut catalog = InMemoryCatalog::new();

        for def in &self.transforms {
            match def {
                TransformDef::GridInterpolation(grid) => {
                    let grid = grid.clone();
                    let formats = formats.clone();
                    let config = config.clone();
                    catalog.register(def.name(), MethodType::GridInterpolation, move |catalog| {
                        let ctx = SetupContext::new(&config, &formats, catalog);
                        Ok(Box::new(GridInterpolation::new(&grid, &ctx)?))
                    });
                }
                TransformDef::Geocentric(geo) => {
                    let geo = geo.clone();
                    catalog.register(def.name(), MethodType::Geocentric, move |_| {
                        Ok(Box::new(GeocentricTranslation::from_definition(&geo)?))
                    });
                }
            }
        }

        catalog
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for def in &self.transforms {
            if def.name().trim().is_empty() {
                return Err(GridTransformError::config_error("transform with empty name"));
            }
            if !seen.insert(def.name().to_lowercase()) {
                return Err(GridTransformError::config_error(format!(
                    "duplicate transform name: {}",
                    def.name()
                )));
            }
        }
        Ok(())
    }
}

/// Load a transform set from a YAML file.
pub fn load_transform_set<P: AsRef<Path>>(path: P) -> Result<TransformSet> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        GridTransformError::config_error(format!(
            "failed to read transform set {:?}: {}",
            path.as_ref(),
            e
        ))
    })?;

    TransformSet::from_yaml(&content)
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => {
                        return Err(GridTransformError::config_error(format!(
                            "unclosed variable substitution: ${{{}",
                            var_expr
                        )))
                    }
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        return Ok(std::env::var(var_name).unwrap_or_else(|_| default.to_string()));
    }

    std::env::var(expr).map_err(|_| {
        GridTransformError::config_error(format!("environment variable {} is not set", expr))
    })
}
