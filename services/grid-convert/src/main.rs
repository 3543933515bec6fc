//! Grid datum conversion tool.
//!
//! Loads a YAML transform set, quality-checks its grid transformations and
//! converts points through them.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use datum_grid::{load_transform_set, GridTransformConfig};

use commands::{ConvertOptions, Session};

#[derive(Parser, Debug)]
#[command(name = "grid-convert")]
#[command(about = "Grid-interpolation datum conversion tool")]
struct Args {
    /// Transform set YAML file
    #[arg(short, long, env = "GRIDI_TRANSFORM_SET")]
    set: PathBuf,

    /// Grid data directory (overrides GRIDI_DATA_DIR and the set's data_dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quality-check every grid transformation in the set
    Check {
        /// Maximum findings listed per transformation
        #[arg(long, default_value = "16")]
        max_issues: usize,
    },

    /// Convert a point, or `lon lat [h]` lines from stdin
    Convert {
        /// Transformation name
        #[arg(short, long)]
        transform: String,

        /// Run the inverse conversion
        #[arg(long)]
        inverse: bool,

        /// Convert heights as well
        #[arg(long)]
        three_d: bool,

        /// Use the finest covering grid file instead of the first
        #[arg(long)]
        best: bool,

        /// LON LAT [HEIGHT]
        #[arg(allow_negative_numbers = true, num_args = 0..=3)]
        coords: Vec<f64>,
    },

    /// Report whether points fall inside the grid data
    Range {
        /// Transformation name
        #[arg(short, long)]
        transform: String,

        /// Points as LON,LAT
        #[arg(required = true, allow_negative_numbers = true)]
        points: Vec<String>,
    },
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // Results go to stdout, so logs go to stderr.
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut set = load_transform_set(&args.set)
        .with_context(|| format!("Failed to load transform set {}", args.set.display()))?;
    if let Some(dir) = args.data_dir {
        set.data_dir = Some(dir);
    }

    let config = set.effective_config(&GridTransformConfig::from_env());
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        set = %args.set.display(),
        transforms = set.transforms.len(),
        data_dir = %config.data_dir.display(),
        "Loaded transform set"
    );

    let session = Session::new(set, config);
    let mut out = std::io::stdout().lock();

    match args.command {
        Command::Check { max_issues } => {
            let clean = session.check(max_issues, args.json, &mut out)?;
            if !clean {
                std::process::exit(1);
            }
        }
        Command::Convert {
            transform,
            inverse,
            three_d,
            best,
            coords,
        } => {
            let options = ConvertOptions {
                inverse,
                three_d,
                best,
                json: args.json,
            };
            if coords.is_empty() {
                let stdin = std::io::stdin();
                session.convert_lines(&transform, &options, stdin.lock(), &mut out)?;
            } else {
                let point = commands::point_from_values(&coords)?;
                session.convert_points(&transform, &options, &[point], &mut out)?;
            }
        }
        Command::Range { transform, points } => {
            let points = points
                .iter()
                .map(|text| commands::parse_point(text))
                .collect::<Result<Vec<_>>>()?;
            session.range(&transform, &points, args.json, &mut out)?;
        }
    }

    Ok(())
}
