//! Quality check of grid-interpolation definitions.
//!
//! Every check runs independently; findings are gathered rather than
//! short-circuited so a single pass reports everything wrong with a
//! definition. Nothing is opened for lookups and nothing is modified.

use std::path::Path;

use crate::catalog::TransformCatalog;
use crate::config::GridTransformDefinition;
use crate::driver::FormatTable;
use crate::error::ConfigIssue;
use crate::types::Direction;

/// Maximum number of findings kept per grid file from its driver's check.
pub const DRIVER_ISSUE_LIMIT: usize = 4;

/// Exclusive upper bound of `max_iterations`.
pub const MAX_ITERATIONS_LIMIT: u32 = 40;
/// Exclusive bounds of `convergence_value`.
pub const CONVERGENCE_RANGE: (f64, f64) = (1.0e-16, 1.0e-2);
/// Exclusive bounds of `error_value`.
pub const ERROR_RANGE: (f64, f64) = (1.0e-14, 1.0);

/// Collaborators the quality checker consults.
pub struct QualityContext<'a> {
    pub formats: &'a FormatTable,
    pub catalog: &'a dyn TransformCatalog,
    pub data_dir: &'a Path,
}

/// Findings of a quality check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    /// Findings, truncated to the caller's limit.
    pub issues: Vec<ConfigIssue>,
    /// Number of findings, including any that did not fit.
    pub total: usize,
}

impl QualityReport {
    pub fn is_ok(&self) -> bool {
        self.total == 0
    }

    /// True if findings were dropped because of the limit.
    pub fn is_truncated(&self) -> bool {
        self.total > self.issues.len()
    }
}

/// Accumulates findings up to a fixed capacity while counting all of them.
struct IssueSink {
    report: QualityReport,
    capacity: usize,
}

impl IssueSink {
    fn new(capacity: usize) -> Self {
        Self {
            report: QualityReport::default(),
            capacity,
        }
    }

    fn push(&mut self, issue: ConfigIssue) {
        self.report.total += 1;
        if self.report.issues.len() < self.capacity {
            self.report.issues.push(issue);
        }
    }
}

/// Check a definition, keeping at most `max_issues` findings.
pub fn check_definition(
    def: &GridTransformDefinition,
    ctx: &QualityContext<'_>,
    max_issues: usize,
) -> QualityReport {
    let mut sink = IssueSink::new(max_issues);

    for (index, spec) in def.files.iter().enumerate() {
        match ctx.formats.resolve(&spec.format) {
            None => sink.push(ConfigIssue::InvalidFormat {
                index,
                code: spec.format.clone(),
            }),
            Some((_, driver)) => {
                let issues = driver.check(spec, ctx.data_dir);
                let reported = issues.len();
                for issue in issues.into_iter().take(DRIVER_ISSUE_LIMIT) {
                    sink.push(ConfigIssue::GridFile { index, issue });
                }
                // Count what the driver found beyond its sub-list.
                sink.report.total += reported.saturating_sub(DRIVER_ISSUE_LIMIT);
            }
        }

        if Direction::from_flag(spec.direction) == Direction::None {
            sink.push(ConfigIssue::InvalidDirection {
                index,
                flag: spec.direction,
            });
        }
    }

    if let Some(name) = def.fallback_name() {
        match ctx.catalog.locate(name) {
            None => sink.push(ConfigIssue::FallbackNotFound {
                name: name.to_string(),
            }),
            Some(index) => match ctx.catalog.method_type(index) {
                None => sink.push(ConfigIssue::Internal {
                    context: format!("fallback '{}' located but has no method type", name),
                }),
                Some(method) if !method.is_valid_fallback() => {
                    sink.push(ConfigIssue::FallbackMethodInvalid {
                        name: name.to_string(),
                        method,
                    })
                }
                Some(_) => {}
            },
        }
    }

    if def.max_iterations >= MAX_ITERATIONS_LIMIT {
        sink.push(ConfigIssue::MaxIterations {
            value: def.max_iterations,
        });
    }

    let convergence = def.convergence_value;
    if !(convergence > CONVERGENCE_RANGE.0 && convergence < CONVERGENCE_RANGE.1) {
        sink.push(ConfigIssue::ConvergenceValue { value: convergence });
    }

    let error = def.error_value;
    if !(error > ERROR_RANGE.0 && error < ERROR_RANGE.1) || error <= convergence {
        sink.push(ConfigIssue::ErrorValue { value: error });
    }

    tracing::debug!(
        transform = %def.name,
        issues = sink.report.total,
        "Quality check complete"
    );

    sink.report
}
