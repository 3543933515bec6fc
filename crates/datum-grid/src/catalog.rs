//! Transformation catalog: name lookup, method classification and
//! instantiation of independent transformations.
//!
//! Grid-interpolation transformations consult a catalog twice: the quality
//! checker asks whether a fallback exists and what kind it is, and setup
//! instantiates it.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::{GridTransformError, Result};
use crate::types::{Conversion, GeoPoint, RangeStatus};

/// Classification of a transformation by its calculation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MethodType {
    /// Closed-form datum shift (e.g. Molodensky).
    Standalone,
    /// Geocentric translation or Helmert-style transformation.
    Geocentric,
    /// Polynomial power-series transformation.
    PowerSeries,
    /// Multiple-regression transformation.
    MultipleRegression,
    /// Grid-file interpolation.
    GridInterpolation,
    /// Identity.
    Null,
}

impl MethodType {
    /// Whether transformations of this type may serve as a fallback.
    pub fn is_valid_fallback(&self) -> bool {
        matches!(
            self,
            MethodType::Standalone | MethodType::Geocentric | MethodType::PowerSeries
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::Standalone => "standalone",
            MethodType::Geocentric => "geocentric",
            MethodType::PowerSeries => "power_series",
            MethodType::MultipleRegression => "multiple_regression",
            MethodType::GridInterpolation => "grid_interpolation",
            MethodType::Null => "null",
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transformation the host pipeline can run polymorphically.
///
/// Dropping a transformation releases everything it owns.
pub trait GeodeticTransform: Send {
    /// Name the transformation was registered under.
    fn name(&self) -> &str;

    fn method_type(&self) -> MethodType;

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<Conversion>;

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<Conversion>;

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<Conversion>;

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<Conversion>;

    /// Whether every point lies within the transformation's useful range.
    fn in_range(&mut self, _points: &[GeoPoint]) -> RangeStatus {
        RangeStatus::Ok
    }

    /// Whether the transformation is a no-op.
    fn is_null(&self) -> bool {
        false
    }

    /// Drop transient resources. The transformation stays usable.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Position of a transformation within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformIndex(pub usize);

/// Registry of named transformations.
pub trait TransformCatalog {
    /// Find a transformation by name.
    fn locate(&self, name: &str) -> Option<TransformIndex>;

    /// Method classification of a located transformation.
    fn method_type(&self, index: TransformIndex) -> Option<MethodType>;

    /// Build a fresh, independently owned instance.
    fn instantiate(&self, index: TransformIndex) -> Result<Box<dyn GeodeticTransform>>;
}

type TransformFactory =
    Box<dyn Fn(&dyn TransformCatalog) -> Result<Box<dyn GeodeticTransform>> + Send + Sync>;

struct CatalogEntry {
    name: String,
    method: MethodType,
    factory: TransformFactory,
}

/// In-memory catalog of transformation factories.
///
/// Names are matched case-insensitively. Factories receive the catalog so
/// they can resolve their own fallbacks; a chain that leads back to an entry
/// already being built is rejected.
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, usize>,
    building: Mutex<Vec<usize>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            building: Mutex::new(Vec::new()),
        }
    }

    /// Register a factory under a name. A later registration with the same
    /// name replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, method: MethodType, factory: F) -> TransformIndex
    where
        F: Fn(&dyn TransformCatalog) -> Result<Box<dyn GeodeticTransform>> + Send + Sync + 'static,
    {
        let name = name.into();
        let key = name.to_lowercase();
        let entry = CatalogEntry {
            name,
            method,
            factory: Box::new(factory),
        };

        let index = match self.by_name.get(&key) {
            Some(&existing) => {
                self.entries[existing] = entry;
                existing
            }
            None => {
                self.entries.push(entry);
                self.by_name.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        TransformIndex(index)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locate and instantiate in one step.
    pub fn instantiate_by_name(&self, name: &str) -> Result<Box<dyn GeodeticTransform>> {
        let index = self
            .locate(name)
            .ok_or_else(|| GridTransformError::TransformNotFound(name.to_string()))?;
        self.instantiate(index)
    }

    fn enter(&self, index: usize) -> Result<()> {
        let mut building = self
            .building
            .lock()
            .map_err(|_| GridTransformError::internal("catalog", "instantiation lock poisoned"))?;
        if building.contains(&index) {
            return Err(GridTransformError::config_error(format!(
                "cyclic fallback chain through '{}'",
                self.entries[index].name
            )));
        }
        building.push(index);
        Ok(())
    }

    fn leave(&self, index: usize) {
        if let Ok(mut building) = self.building.lock() {
            building.retain(|&i| i != index);
        }
    }
}

impl TransformCatalog for InMemoryCatalog {
    fn locate(&self, name: &str) -> Option<TransformIndex> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&index| TransformIndex(index))
    }

    fn method_type(&self, index: TransformIndex) -> Option<MethodType> {
        self.entries.get(index.0).map(|entry| entry.method)
    }

    fn instantiate(&self, index: TransformIndex) -> Result<Box<dyn GeodeticTransform>> {
        let entry = self.entries.get(index.0).ok_or_else(|| {
            GridTransformError::internal("catalog", format!("no entry at index {}", index.0))
        })?;

        self.enter(index.0)?;
        let built = (entry.factory)(self);
        self.leave(index.0);

        tracing::debug!(name = %entry.name, method = %entry.method, ok = built.is_ok(), "Instantiated transformation");
        built
    }
}
