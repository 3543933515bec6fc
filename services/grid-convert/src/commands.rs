//! Subcommand implementations.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use tracing::{debug, warn};

use datum_grid::{
    check_definition, Conversion, FormatTable, GeoPoint, GridInterpolation, GridTransformConfig, InMemoryCatalog,
    QualityContext, RangeStatus, SetupContext, TransformSet,
};

/// How `convert` runs each point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    pub inverse: bool,
    pub three_d: bool,
    pub best: bool,
    pub json: bool,
}

/// A loaded transform set with its drivers and catalog.
pub struct Session {
    set: TransformSet,
    config: GridTransformConfig,
    formats: Arc<FormatTable>,
    catalog: InMemoryCatalog,
}

impl Session {
    pub fn new(set: TransformSet, config: GridTransformConfig) -> Self {
        let formats = Arc::new(FormatTable::with_builtin_drivers());
        let catalog = set.build_catalog(formats.clone(), &config);
        Self {
            set,
            config,
            formats,
            catalog,
        }
    }

    /// Quality-check every grid transformation. Returns false if any
    /// transformation has findings.
    pub fn check<W: Write>(&self, max_issues: usize, as_json: bool, out: &mut W) -> Result<bool> {
        let ctx = QualityContext {
            formats: &self.formats,
            catalog: &self.catalog,
            data_dir: &self.config.data_dir,
        };

        let mut clean = true;
        for def in self.set.grid_definitions() {
            let report = check_definition(def, &ctx, max_issues);
            clean &= report.is_ok();

            if as_json {
                let line = json!({
                    "transform": def.name,
                    "ok": report.is_ok(),
                    "total": report.total,
                    "issues": report.issues,
                });
                writeln!(out, "{}", line)?;
                continue;
            }

            if report.is_ok() {
                writeln!(out, "{}: ok", def.name)?;
                continue;
            }

            writeln!(out, "{}: {} issue(s)", def.name, report.total)?;
            for issue in &report.issues {
                writeln!(out, "  - {}", issue)?;
            }
            if report.is_truncated() {
                writeln!(out, "  ... {} more", report.total - report.issues.len())?;
            }
        }

        out.flush()?;
        Ok(clean)
    }

    fn open(&self, name: &str) -> Result<GridInterpolation> {
        let def = self
            .set
            .grid_definition(name)
            .ok_or_else(|| anyhow!("No grid interpolation transform named '{}'", name))?;

        let ctx = SetupContext::new(&self.config, &self.formats, &self.catalog);
        GridInterpolation::new(def, &ctx).with_context(|| format!("Failed to set up transform '{}'", def.name))
    }

    pub fn convert_points<W: Write>(
        &self,
        name: &str,
        options: &ConvertOptions,
        points: &[GeoPoint],
        out: &mut W,
    ) -> Result<()> {
        let mut xform = self.open(name)?;
        xform.set_use_best(options.best);

        for point in points {
            let result = convert_one(&mut xform, point, options)?;
            write_conversion(out, point, &result, options.json)?;
        }

        out.flush()?;
        Ok(())
    }

    /// Convert `lon lat [h]` lines. Blank lines and `#` comments are
    /// skipped; malformed lines are reported and skipped.
    pub fn convert_lines<R: BufRead, W: Write>(
        &self,
        name: &str,
        options: &ConvertOptions,
        input: R,
        out: &mut W,
    ) -> Result<()> {
        let mut xform = self.open(name)?;
        xform.set_use_best(options.best);

        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let point = match parse_point(text) {
                Ok(point) => point,
                Err(e) => {
                    warn!(line = number + 1, error = %e, "Skipping malformed input line");
                    continue;
                }
            };

            let result = convert_one(&mut xform, &point, options)?;
            write_conversion(out, &point, &result, options.json)?;
        }

        xform.release()?;
        out.flush()?;
        Ok(())
    }

    pub fn range<W: Write>(&self, name: &str, points: &[GeoPoint], as_json: bool, out: &mut W) -> Result<()> {
        let mut xform = self.open(name)?;
        let status = xform.in_range(points);
        debug!(transform = %name, points = points.len(), status = ?status, "Range check");

        if as_json {
            writeln!(out, "{}", json!({ "transform": xform.name(), "status": status }))?;
        } else {
            match status {
                RangeStatus::Ok => writeln!(out, "in range")?,
                RangeStatus::OutsideUsefulRange { index } => {
                    writeln!(out, "outside useful range at point #{}: {}", index, points[index])?
                }
            }
        }

        out.flush()?;
        Ok(())
    }
}

fn convert_one(xform: &mut GridInterpolation, point: &GeoPoint, options: &ConvertOptions) -> Result<Conversion> {
    let result = match (options.inverse, options.three_d) {
        (false, false) => xform.forward_2d(point),
        (false, true) => xform.forward_3d(point),
        (true, false) => xform.inverse_2d(point),
        (true, true) => xform.inverse_3d(point),
    };
    result.with_context(|| format!("Conversion failed at {}", point))
}

fn status_label(result: &Conversion) -> &'static str {
    match result {
        Conversion::Converted(_) => "ok",
        Conversion::ViaFallback(_) => "fallback",
        Conversion::NoCoverage => "no-coverage",
    }
}

fn write_conversion<W: Write>(out: &mut W, source: &GeoPoint, result: &Conversion, as_json: bool) -> Result<()> {
    if as_json {
        let line = json!({
            "source": source,
            "target": result.point(),
            "status": result.status_code(),
        });
        writeln!(out, "{}", line)?;
        return Ok(());
    }

    match result.point() {
        Some(target) => writeln!(
            out,
            "{:.9} {:.9} {:.4} {}",
            target.lon,
            target.lat,
            target.height,
            status_label(result)
        )?,
        None => writeln!(out, "- - - {}", status_label(result))?,
    }
    Ok(())
}

/// Build a point from `[lon, lat]` or `[lon, lat, h]`.
pub fn point_from_values(values: &[f64]) -> Result<GeoPoint> {
    match values {
        [lon, lat] => Ok(GeoPoint::new(*lon, *lat)),
        [lon, lat, h] => Ok(GeoPoint::with_height(*lon, *lat, *h)),
        _ => bail!("Expected LON LAT [HEIGHT], got {} value(s)", values.len()),
    }
}

/// Parse `lon,lat[,h]` or `lon lat [h]`.
pub fn parse_point(text: &str) -> Result<GeoPoint> {
    let values = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .with_context(|| format!("Invalid coordinate '{}'", part))
        })
        .collect::<Result<Vec<_>>>()?;
    point_from_values(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{temp_grid_dir, write_linear_ntv2, LinearShift};

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("-75.7,45.42").unwrap(), GeoPoint::new(-75.7, 45.42));
        assert_eq!(
            parse_point("  -75.7  45.42 70 ").unwrap(),
            GeoPoint::with_height(-75.7, 45.42, 70.0)
        );
        assert!(parse_point("-75.7").is_err());
        assert!(parse_point("a,b").is_err());
        assert!(parse_point("1,2,3,4").is_err());
    }

    fn session(dir: &std::path::Path) -> Session {
        write_linear_ntv2(dir, "grid.gsb", (-80.0, 40.0, -70.0, 50.0), 1.0, LinearShift::constant(3.6, -3.6))
            .unwrap();
        let yaml = format!(
            r#"
data_dir: {}
transforms:
  - method: grid_interpolation
    name: Demo
    source_datum: A
    target_datum: B
    files:
      - path: ./grid.gsb
        format: NTv2
  - method: grid_interpolation
    name: Broken
    source_datum: A
    target_datum: B
    files:
      - path: ./missing.gsb
        direction: Q
        format: NTv2
"#,
            dir.display()
        );
        let set = TransformSet::from_yaml(&yaml).unwrap();
        let config = set.effective_config(&GridTransformConfig::default());
        Session::new(set, config)
    }

    #[test]
    fn test_check_reports_each_transform() {
        let dir = temp_grid_dir();
        let session = session(dir.path());

        let mut out = Vec::new();
        let clean = session.check(16, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(!clean);
        assert!(text.contains("Demo: ok"), "{}", text);
        assert!(text.contains("Broken: 2 issue(s)"), "{}", text);
    }

    #[test]
    fn test_convert_lines() {
        let dir = temp_grid_dir();
        let session = session(dir.path());

        let input = "# lon lat\n-75.0 45.0\n\nnot a point\n10.0,10.0\n";
        let mut out = Vec::new();
        session
            .convert_lines("demo", &ConvertOptions::default(), input.as_bytes(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines, vec!["-74.999000000 44.999000000 0.0000 ok", "- - - no-coverage"]);
    }

    #[test]
    fn test_convert_json() {
        let dir = temp_grid_dir();
        let session = session(dir.path());
        let options = ConvertOptions {
            json: true,
            ..ConvertOptions::default()
        };

        let mut out = Vec::new();
        session
            .convert_points("Demo", &options, &[GeoPoint::new(-75.0, 45.0)], &mut out)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"], 0);
        assert!((value["target"]["lon"].as_f64().unwrap() + 74.999).abs() < 1e-9);
    }

    #[test]
    fn test_range_and_unknown_transform() {
        let dir = temp_grid_dir();
        let session = session(dir.path());

        let mut out = Vec::new();
        let points = [GeoPoint::new(-75.0, 45.0), GeoPoint::new(0.0, 0.0)];
        session.range("Demo", &points, false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("outside useful range at point #1"));

        let mut out = Vec::new();
        assert!(session.range("Nope", &points, false, &mut out).is_err());
    }
}
