//! Error types for grid-interpolation transformations.
//!
//! Two families live here:
//! - [`GridTransformError`]: setup failures and fatal conversion errors,
//!   propagated with `?`.
//! - [`ConfigIssue`]: findings of the quality checker. These are plain data,
//!   collected into a report and never thrown.

use serde::Serialize;
use thiserror::Error;

use crate::catalog::MethodType;

/// Errors that can occur while building or running a grid transformation.
#[derive(Error, Debug)]
pub enum GridTransformError {
    /// An invariant established by the quality check or setup was violated.
    ///
    /// `site` names the operation that detected the problem. Hitting this is
    /// a logic bug, not a data problem.
    #[error("internal error in {site}: {message}")]
    Internal { site: &'static str, message: String },

    /// A grid file could not be opened.
    #[error("failed to open grid file {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// A grid file was opened but its contents are not valid for its format.
    #[error("invalid grid file {path}: {message}")]
    InvalidGridFile { path: String, message: String },

    /// The configured fallback transformation does not exist.
    #[error("fallback transformation not found: {0}")]
    FallbackNotFound(String),

    /// A named transformation does not exist in the catalog.
    #[error("transformation not found: {0}")]
    TransformNotFound(String),

    /// An iterative inverse failed to converge within the error tolerance.
    #[error("inverse did not converge at ({lon}, {lat}) after {iterations} iterations")]
    Convergence { lon: f64, lat: f64, iterations: u32 },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl GridTransformError {
    /// Create an Internal error.
    pub fn internal(site: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            site,
            message: message.into(),
        }
    }

    /// Create an OpenFailed error.
    pub fn open_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidGridFile error.
    pub fn invalid_grid_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidGridFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a ConfigError.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Returns true for errors that indicate a programming defect.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<std::io::Error> for GridTransformError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_yaml::Error> for GridTransformError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Result type for grid transformation operations.
pub type Result<T> = std::result::Result<T, GridTransformError>;

// ============================================================================
// Quality-check findings
// ============================================================================

/// A problem found by a format driver while statically checking a file spec.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridFileIssue {
    #[error("grid file path is empty")]
    EmptyPath,

    #[error("grid file not found: {path}")]
    NotFound { path: String },

    #[error("grid file {path} does not have the expected .{expected} extension")]
    Extension { path: String, expected: String },

    #[error("grid file {path} is not readable: {message}")]
    Unreadable { path: String, message: String },
}

/// A problem found in a transformation definition by the quality checker.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigIssue {
    /// The format code does not resolve in the format table.
    #[error("file #{index}: unknown or unsupported grid format '{code}'")]
    InvalidFormat { index: usize, code: String },

    /// The direction letter is not one of F, f, I, i.
    #[error("file #{index}: invalid direction '{flag}'")]
    InvalidDirection { index: usize, flag: char },

    /// The format driver rejected the file spec.
    #[error("file #{index}: {issue}")]
    GridFile { index: usize, issue: GridFileIssue },

    #[error("fallback transformation '{name}' not found")]
    FallbackNotFound { name: String },

    #[error("fallback transformation '{name}' uses method {method}, which cannot be a fallback")]
    FallbackMethodInvalid { name: String, method: MethodType },

    #[error("internal error while checking: {context}")]
    Internal { context: String },

    #[error("max_iterations {value} out of range [0, 40)")]
    MaxIterations { value: u32 },

    #[error("convergence_value {value:e} out of range (1e-16, 1e-2)")]
    ConvergenceValue { value: f64 },

    #[error("error_value {value:e} out of range (1e-14, 1.0) or not greater than convergence_value")]
    ErrorValue { value: f64 },
}
