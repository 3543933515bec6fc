//! NTv2 (`.gsb`) grid shift files.
//!
//! An NTv2 file is a sequence of 16-byte records: an 8-byte ASCII key and an
//! 8-byte value (int32 plus padding, float64, or 8 ASCII characters).
//!
//! ```text
//! overview header   11 records  NUM_OREC NUM_SREC NUM_FILE GS_TYPE ...
//! sub-file header   11 records  SUB_NAME PARENT ... LAT_INC LONG_INC GS_COUNT
//! node records      GS_COUNT    f32 lat shift, f32 lon shift, f32 lat acc, f32 lon acc
//! ... repeated NUM_FILE times ...
//! END record
//! ```
//!
//! Angles are in GS_TYPE units (normally arc-seconds) and longitudes are
//! positive west. Nodes run from the south-east corner, westward along each
//! row, then northward row by row. Files may be written in either byte
//! order; `NUM_OREC == 11` tells which.
//!
//! Node data is read lazily per sub-grid and held in an LRU cache bounded by
//! the buffer-size hint. [`GridFile::release`] empties the cache.

use lru::LruCache;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{GridFile, GridFileParams, GridFormatDriver};
use crate::config::{resolve_grid_path, GridFileSpec, DEFAULT_MAX_ITERATIONS};
use crate::error::{GridFileIssue, GridTransformError, Result};
use crate::types::{Direction, GeoPoint, GridFormat, GridLookup};

const RECORD_LEN: usize = 16;
const HEADER_RECORDS: usize = 11;
const NODE_LEN: usize = 16;
const DEFAULT_CACHE_BYTES: usize = 4 * 1024 * 1024;
const SECONDS_PER_DEGREE: f64 = 3600.0;

// ============================================================================
// Driver
// ============================================================================

/// Format driver for NTv2 files.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ntv2Driver;

impl Ntv2Driver {
    pub fn new() -> Self {
        Self
    }
}

impl GridFormatDriver for Ntv2Driver {
    fn format(&self) -> GridFormat {
        GridFormat::Ntv2
    }

    fn initialize(&self, params: &GridFileParams) -> Result<Box<dyn GridFile>> {
        Ok(Box::new(Ntv2File::open(params)?))
    }

    fn check(&self, spec: &GridFileSpec, data_dir: &Path) -> Vec<GridFileIssue> {
        let mut issues = Vec::new();

        if spec.path.trim().is_empty() {
            issues.push(GridFileIssue::EmptyPath);
            return issues;
        }

        let path = resolve_grid_path(&spec.path, data_dir);
        let display = path.display().to_string();

        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gsb"))
            .unwrap_or(false);
        if !has_extension {
            issues.push(GridFileIssue::Extension {
                path: display.clone(),
                expected: "gsb".to_string(),
            });
        }

        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => issues.push(GridFileIssue::Unreadable {
                path: display,
                message: "not a regular file".to_string(),
            }),
            Err(_) => issues.push(GridFileIssue::NotFound { path: display }),
        }

        issues
    }
}

// ============================================================================
// Header parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn i32(self, b: [u8; 4]) -> i32 {
        match self {
            ByteOrder::Little => i32::from_le_bytes(b),
            ByteOrder::Big => i32::from_be_bytes(b),
        }
    }

    fn f32(self, b: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(b),
            ByteOrder::Big => f32::from_be_bytes(b),
        }
    }

    fn f64(self, b: [u8; 8]) -> f64 {
        match self {
            ByteOrder::Little => f64::from_le_bytes(b),
            ByteOrder::Big => f64::from_be_bytes(b),
        }
    }

    fn detect(first_record: &[u8]) -> Option<Self> {
        let value = [
            first_record[8],
            first_record[9],
            first_record[10],
            first_record[11],
        ];
        if i32::from_le_bytes(value) == HEADER_RECORDS as i32 {
            Some(ByteOrder::Little)
        } else if i32::from_be_bytes(value) == HEADER_RECORDS as i32 {
            Some(ByteOrder::Big)
        } else {
            None
        }
    }
}

/// A block of header records, looked up by key.
struct HeaderBlock<'a> {
    data: &'a [u8],
    order: ByteOrder,
    path: &'a Path,
}

impl<'a> HeaderBlock<'a> {
    fn value(&self, key: &str) -> Result<[u8; 8]> {
        self.data
            .chunks_exact(RECORD_LEN)
            .find(|record| {
                String::from_utf8_lossy(&record[..8])
                    .trim_end_matches(['\0', ' '])
                    .eq_ignore_ascii_case(key)
            })
            .map(|record| {
                let mut value = [0u8; 8];
                value.copy_from_slice(&record[8..16]);
                value
            })
            .ok_or_else(|| {
                GridTransformError::invalid_grid_file(
                    self.path.display().to_string(),
                    format!("missing {} record", key),
                )
            })
    }

    fn int(&self, key: &str) -> Result<i32> {
        let v = self.value(key)?;
        Ok(self.order.i32([v[0], v[1], v[2], v[3]]))
    }

    fn float(&self, key: &str) -> Result<f64> {
        Ok(self.order.f64(self.value(key)?))
    }

    fn text(&self, key: &str) -> Result<String> {
        let v = self.value(key)?;
        Ok(String::from_utf8_lossy(&v)
            .trim_end_matches(['\0', ' '])
            .to_string())
    }
}

/// One sub-grid's extent, in arc-seconds with longitudes positive west.
#[derive(Debug, Clone)]
struct SubGrid {
    name: String,
    parent: String,
    south: f64,
    north: f64,
    east: f64,
    west: f64,
    lat_inc: f64,
    lon_inc: f64,
    rows: usize,
    cols: usize,
    data_offset: u64,
}

impl SubGrid {
    fn contains(&self, lat: f64, lon_west: f64) -> bool {
        lat >= self.south && lat <= self.north && lon_west >= self.east && lon_west <= self.west
    }

    fn node_count(&self) -> usize {
        self.rows * self.cols
    }

    fn cell_area(&self) -> f64 {
        self.lat_inc * self.lon_inc
    }

    fn density_degrees(&self) -> f64 {
        self.lat_inc.min(self.lon_inc) / SECONDS_PER_DEGREE
    }
}

/// Interpolated shift at a node, in arc-seconds (longitude positive west).
#[derive(Debug, Clone, Copy, Default)]
struct NodeShift {
    lat: f32,
    lon: f32,
}

// ============================================================================
// Node cache
// ============================================================================

/// Memory-bounded LRU cache of decoded sub-grid node arrays.
struct ShiftCache {
    cache: LruCache<usize, Arc<Vec<NodeShift>>>,
    memory_limit: usize,
    current_memory: usize,
}

impl ShiftCache {
    fn new(memory_limit: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
        }
    }

    fn get(&mut self, key: usize) -> Option<Arc<Vec<NodeShift>>> {
        self.cache.get(&key).cloned()
    }

    fn insert(&mut self, key: usize, nodes: Arc<Vec<NodeShift>>) {
        let size = nodes.len() * std::mem::size_of::<NodeShift>();

        while self.current_memory + size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                let evicted_size = evicted.len() * std::mem::size_of::<NodeShift>();
                self.current_memory = self.current_memory.saturating_sub(evicted_size);
            }
        }

        // A sub-grid larger than the whole budget is still cached on its own;
        // it is evicted by the next insert.
        self.cache.put(key, nodes);
        self.current_memory += size;
    }

    fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    fn len(&self) -> usize {
        self.cache.len()
    }
}

// ============================================================================
// Grid file
// ============================================================================

/// An opened NTv2 file.
pub struct Ntv2File {
    path: PathBuf,
    order: ByteOrder,
    subgrids: Vec<SubGrid>,
    cache: ShiftCache,
    density_hint: f64,
    convergence_value: f64,
    error_value: f64,
    max_iterations: u32,
}

impl Ntv2File {
    /// Open a file and read all headers. Node data is loaded on demand.
    pub fn open(params: &GridFileParams) -> Result<Self> {
        let path = params.path.clone();
        let shown = path.display().to_string();
        let file = File::open(&path).map_err(|e| GridTransformError::open_failed(&shown, e.to_string()))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut overview = vec![0u8; RECORD_LEN * HEADER_RECORDS];
        reader
            .read_exact(&mut overview)
            .map_err(|_| GridTransformError::invalid_grid_file(&shown, "truncated overview header"))?;

        let order = ByteOrder::detect(&overview)
            .ok_or_else(|| GridTransformError::invalid_grid_file(&shown, "NUM_OREC is not 11"))?;

        let header = HeaderBlock {
            data: &overview,
            order,
            path: &path,
        };
        let num_srec = header.int("NUM_SREC")?;
        let num_file = header.int("NUM_FILE")?;
        let gs_type = header.text("GS_TYPE")?;

        if num_srec != HEADER_RECORDS as i32 {
            return Err(GridTransformError::invalid_grid_file(
                &shown,
                format!("unsupported NUM_SREC {}", num_srec),
            ));
        }
        if num_file < 1 {
            return Err(GridTransformError::invalid_grid_file(&shown, "file holds no sub-grids"));
        }
        let max_subgrids = file_len / (RECORD_LEN * HEADER_RECORDS) as u64;
        if num_file as u64 > max_subgrids {
            return Err(GridTransformError::invalid_grid_file(
                &shown,
                format!("NUM_FILE {} does not fit in {} bytes", num_file, file_len),
            ));
        }

        let unit = match gs_type.to_uppercase().as_str() {
            "SECONDS" => 1.0,
            "MINUTES" => 60.0,
            "DEGREES" => SECONDS_PER_DEGREE,
            other => {
                return Err(GridTransformError::invalid_grid_file(
                    &shown,
                    format!("unsupported GS_TYPE '{}'", other),
                ))
            }
        };

        let mut subgrids = Vec::with_capacity(num_file as usize);
        let mut offset = overview.len() as u64;

        for _ in 0..num_file {
            let mut block = vec![0u8; RECORD_LEN * HEADER_RECORDS];
            reader.seek(SeekFrom::Start(offset))?;
            reader
                .read_exact(&mut block)
                .map_err(|_| GridTransformError::invalid_grid_file(&shown, "truncated sub-file header"))?;

            let header = HeaderBlock {
                data: &block,
                order,
                path: &path,
            };
            let subgrid = parse_subgrid(&header, unit, offset + block.len() as u64, &shown)?;

            offset = subgrid.data_offset + (subgrid.node_count() * NODE_LEN) as u64;
            if offset > file_len {
                return Err(GridTransformError::invalid_grid_file(
                    &shown,
                    format!("sub-grid {} extends past end of file", subgrid.name),
                ));
            }
            subgrids.push(subgrid);
        }

        let cache_limit = if params.buffer_size == 0 {
            DEFAULT_CACHE_BYTES
        } else {
            params.buffer_size
        };

        tracing::debug!(
            path = %shown,
            subgrids = subgrids.len(),
            byte_order = ?order,
            cache_limit,
            "Opened NTv2 grid file"
        );

        Ok(Self {
            path,
            order,
            subgrids,
            cache: ShiftCache::new(cache_limit),
            density_hint: params.density,
            convergence_value: params.convergence_value,
            error_value: params.error_value,
            max_iterations: if params.max_iterations == 0 {
                DEFAULT_MAX_ITERATIONS
            } else {
                params.max_iterations
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subgrid_count(&self) -> usize {
        self.subgrids.len()
    }

    /// Names of the sub-grids, in file order, paired with their parent names.
    pub fn subgrid_names(&self) -> Vec<(String, String)> {
        self.subgrids
            .iter()
            .map(|sg| (sg.name.clone(), sg.parent.clone()))
            .collect()
    }

    /// Number of sub-grids whose node data is currently cached.
    pub fn cached_subgrids(&self) -> usize {
        self.cache.len()
    }

    /// Finest sub-grid containing the point (arc-seconds, positive west).
    fn select_subgrid(&self, lat: f64, lon_west: f64) -> Option<usize> {
        self.subgrids
            .iter()
            .enumerate()
            .filter(|(_, sg)| sg.contains(lat, lon_west))
            .min_by(|(_, a), (_, b)| a.cell_area().total_cmp(&b.cell_area()))
            .map(|(index, _)| index)
    }

    fn load_nodes(&mut self, index: usize) -> Result<Arc<Vec<NodeShift>>> {
        if let Some(nodes) = self.cache.get(index) {
            return Ok(nodes);
        }

        let subgrid = &self.subgrids[index];
        let mut raw = vec![0u8; subgrid.node_count() * NODE_LEN];
        let mut file = File::open(&self.path)
            .map_err(|e| GridTransformError::open_failed(self.path.display().to_string(), e.to_string()))?;
        file.seek(SeekFrom::Start(subgrid.data_offset))?;
        file.read_exact(&mut raw)?;

        let order = self.order;
        let nodes: Vec<NodeShift> = raw
            .chunks_exact(NODE_LEN)
            .map(|node| NodeShift {
                lat: order.f32([node[0], node[1], node[2], node[3]]),
                lon: order.f32([node[4], node[5], node[6], node[7]]),
            })
            .collect();

        tracing::debug!(
            path = %self.path.display(),
            subgrid = %subgrid.name,
            nodes = nodes.len(),
            "Loaded NTv2 sub-grid"
        );

        let nodes = Arc::new(nodes);
        self.cache.insert(index, nodes.clone());
        Ok(nodes)
    }

    /// Bilinearly interpolated (lat, lon-west) shift in arc-seconds.
    fn shift_at(&mut self, point: &GeoPoint) -> Result<Option<(f64, f64)>> {
        let lat = point.lat * SECONDS_PER_DEGREE;
        let lon_west = -point.lon * SECONDS_PER_DEGREE;

        let index = match self.select_subgrid(lat, lon_west) {
            Some(index) => index,
            None => return Ok(None),
        };
        let nodes = self.load_nodes(index)?;
        let sg = &self.subgrids[index];

        let x = (lon_west - sg.east) / sg.lon_inc;
        let y = (lat - sg.south) / sg.lat_inc;
        let col = (x.floor() as usize).min(sg.cols - 2);
        let row = (y.floor() as usize).min(sg.rows - 2);
        let fx = x - col as f64;
        let fy = y - row as f64;

        let at = |r: usize, c: usize| nodes[r * sg.cols + c];
        let n00 = at(row, col);
        let n01 = at(row, col + 1);
        let n10 = at(row + 1, col);
        let n11 = at(row + 1, col + 1);

        let lerp = |v00: f32, v01: f32, v10: f32, v11: f32| {
            let bottom = v00 as f64 * (1.0 - fx) + v01 as f64 * fx;
            let top = v10 as f64 * (1.0 - fx) + v11 as f64 * fx;
            bottom * (1.0 - fy) + top * fy
        };

        Ok(Some((
            lerp(n00.lat, n01.lat, n10.lat, n11.lat),
            lerp(n00.lon, n01.lon, n10.lon, n11.lon),
        )))
    }

    fn apply(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        Ok(match self.shift_at(source)? {
            Some((dlat, dlon_west)) => GridLookup::Shifted(GeoPoint {
                lon: source.lon - dlon_west / SECONDS_PER_DEGREE,
                lat: source.lat + dlat / SECONDS_PER_DEGREE,
                height: source.height,
            }),
            None => GridLookup::OutsideCoverage,
        })
    }

    /// Invert [`Self::apply`] by fixed-point iteration on the shift.
    fn unapply(&mut self, target: &GeoPoint) -> Result<GridLookup> {
        let mut guess = *target;
        let mut delta = f64::INFINITY;

        for _ in 0..self.max_iterations {
            let shifted = match self.apply(&guess)? {
                GridLookup::Shifted(p) => p,
                GridLookup::OutsideCoverage => return Ok(GridLookup::OutsideCoverage),
            };

            let dlon = target.lon - shifted.lon;
            let dlat = target.lat - shifted.lat;
            guess.lon += dlon;
            guess.lat += dlat;
            delta = dlon.abs().max(dlat.abs());

            if delta < self.convergence_value {
                return Ok(GridLookup::Shifted(guess));
            }
        }

        if delta < self.error_value {
            tracing::warn!(
                path = %self.path.display(),
                lon = target.lon,
                lat = target.lat,
                delta,
                "NTv2 inverse stopped short of convergence; within error tolerance"
            );
            return Ok(GridLookup::Shifted(guess));
        }

        Err(GridTransformError::Convergence {
            lon: target.lon,
            lat: target.lat,
            iterations: self.max_iterations,
        })
    }
}

fn parse_subgrid(header: &HeaderBlock<'_>, unit: f64, data_offset: u64, shown: &str) -> Result<SubGrid> {
    let name = header.text("SUB_NAME")?;
    let parent = header.text("PARENT")?;
    let south = header.float("S_LAT")? * unit;
    let north = header.float("N_LAT")? * unit;
    let east = header.float("E_LONG")? * unit;
    let west = header.float("W_LONG")? * unit;
    let lat_inc = header.float("LAT_INC")? * unit;
    let lon_inc = header.float("LONG_INC")? * unit;
    let count = header.int("GS_COUNT")?;

    if !(lat_inc > 0.0 && lon_inc > 0.0 && north > south && west > east) {
        return Err(GridTransformError::invalid_grid_file(
            shown,
            format!("sub-grid {} has an invalid extent", name),
        ));
    }

    if count < 0 {
        return Err(GridTransformError::invalid_grid_file(
            shown,
            format!("sub-grid {} has a negative GS_COUNT", name),
        ));
    }
    let (rows, cols) = match (node_span(north - south, lat_inc, count), node_span(west - east, lon_inc, count)) {
        (Some(rows), Some(cols)) => (rows, cols),
        _ => {
            return Err(GridTransformError::invalid_grid_file(
                shown,
                format!("sub-grid {}: extent and increments exceed GS_COUNT {}", name, count),
            ))
        }
    };
    if rows < 2 || cols < 2 {
        return Err(GridTransformError::invalid_grid_file(
            shown,
            format!("sub-grid {} needs at least 2 x 2 nodes", name),
        ));
    }
    if rows.checked_mul(cols) != Some(count as usize) {
        return Err(GridTransformError::invalid_grid_file(
            shown,
            format!(
                "sub-grid {}: GS_COUNT {} does not match {} x {} nodes",
                name, count, rows, cols
            ),
        ));
    }

    Ok(SubGrid {
        name,
        parent,
        south,
        north,
        east,
        west,
        lat_inc,
        lon_inc,
        rows,
        cols,
        data_offset,
    })
}

/// Nodes along one axis, or `None` when the count is not finite or cannot
/// fit in `count` nodes.
fn node_span(extent: f64, inc: f64, count: i32) -> Option<usize> {
    let steps = (extent / inc).round();
    if !steps.is_finite() || steps < 0.0 || steps >= f64::from(count) {
        return None;
    }
    (steps as usize).checked_add(1)
}

impl GridFile for Ntv2File {
    fn test(&mut self, point: &GeoPoint, _direction: Direction) -> f64 {
        let lat = point.lat * SECONDS_PER_DEGREE;
        let lon_west = -point.lon * SECONDS_PER_DEGREE;

        match self.select_subgrid(lat, lon_west) {
            Some(_) if self.density_hint > 0.0 => self.density_hint,
            Some(index) => self.subgrids[index].density_degrees(),
            None => 0.0,
        }
    }

    fn forward_2d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.apply(source)
    }

    fn forward_3d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.apply(source)
    }

    fn inverse_2d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.unapply(source)
    }

    fn inverse_3d(&mut self, source: &GeoPoint) -> Result<GridLookup> {
        self.unapply(source)
    }

    fn release(&mut self) -> Result<()> {
        self.cache.clear();
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

/// One sub-grid to write, in degrees with east-positive longitudes.
#[derive(Debug, Clone)]
pub struct Ntv2SubGridSpec {
    pub name: String,
    pub parent: String,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub lon_inc: f64,
    pub lat_inc: f64,
    /// (longitude shift east-positive, latitude shift) in arc-seconds, in
    /// file node order: from the south-east corner westward, row by row.
    pub shifts: Vec<(f64, f64)>,
}

impl Ntv2SubGridSpec {
    /// Build a sub-grid by sampling a shift function at every node.
    ///
    /// `shift(lon, lat)` returns the east-positive longitude shift and the
    /// latitude shift in arc-seconds.
    #[allow(clippy::too_many_arguments)]
    pub fn from_fn<F>(
        name: &str,
        parent: &str,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
        lon_inc: f64,
        lat_inc: f64,
        shift: F,
    ) -> Self
    where
        F: Fn(f64, f64) -> (f64, f64),
    {
        let rows = ((max_lat - min_lat) / lat_inc).round() as usize + 1;
        let cols = ((max_lon - min_lon) / lon_inc).round() as usize + 1;

        let mut shifts = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let lon = max_lon - col as f64 * lon_inc;
                let lat = min_lat + row as f64 * lat_inc;
                shifts.push(shift(lon, lat));
            }
        }

        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            min_lon,
            min_lat,
            max_lon,
            max_lat,
            lon_inc,
            lat_inc,
            shifts,
        }
    }
}

/// Writes NTv2 files. Used for tooling and synthetic test grids.
#[derive(Debug, Clone)]
pub struct Ntv2Writer {
    system_from: String,
    system_to: String,
    big_endian: bool,
    subgrids: Vec<Ntv2SubGridSpec>,
}

impl Ntv2Writer {
    pub fn new(system_from: &str, system_to: &str) -> Self {
        Self {
            system_from: system_from.to_string(),
            system_to: system_to.to_string(),
            big_endian: false,
            subgrids: Vec::new(),
        }
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn subgrid(mut self, spec: Ntv2SubGridSpec) -> Self {
        self.subgrids.push(spec);
        self
    }

    /// Write the file to disk.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        out.write_all(&self.encode()?)?;
        out.flush()?;
        Ok(())
    }

    /// Encode the whole file. Fails if a count does not fit the format's
    /// 32-bit integer records.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let num_file = i32::try_from(self.subgrids.len())
            .map_err(|_| GridTransformError::config_error(format!("too many sub-grids: {}", self.subgrids.len())))?;

        self.int_record(&mut buf, "NUM_OREC", HEADER_RECORDS as i32);
        self.int_record(&mut buf, "NUM_SREC", HEADER_RECORDS as i32);
        self.int_record(&mut buf, "NUM_FILE", num_file);
        text_record(&mut buf, "GS_TYPE", "SECONDS");
        text_record(&mut buf, "VERSION", "NTv2.0");
        text_record(&mut buf, "SYSTEM_F", &self.system_from);
        text_record(&mut buf, "SYSTEM_T", &self.system_to);
        self.float_record(&mut buf, "MAJOR_F", 6_378_206.4);
        self.float_record(&mut buf, "MINOR_F", 6_356_583.8);
        self.float_record(&mut buf, "MAJOR_T", 6_378_137.0);
        self.float_record(&mut buf, "MINOR_T", 6_356_752.314);

        for sg in &self.subgrids {
            let count = i32::try_from(sg.shifts.len()).map_err(|_| {
                GridTransformError::config_error(format!("sub-grid {} has too many nodes: {}", sg.name, sg.shifts.len()))
            })?;

            text_record(&mut buf, "SUB_NAME", &sg.name);
            text_record(&mut buf, "PARENT", &sg.parent);
            text_record(&mut buf, "CREATED", "");
            text_record(&mut buf, "UPDATED", "");
            self.float_record(&mut buf, "S_LAT", sg.min_lat * SECONDS_PER_DEGREE);
            self.float_record(&mut buf, "N_LAT", sg.max_lat * SECONDS_PER_DEGREE);
            self.float_record(&mut buf, "E_LONG", -sg.max_lon * SECONDS_PER_DEGREE);
            self.float_record(&mut buf, "W_LONG", -sg.min_lon * SECONDS_PER_DEGREE);
            self.float_record(&mut buf, "LAT_INC", sg.lat_inc * SECONDS_PER_DEGREE);
            self.float_record(&mut buf, "LONG_INC", sg.lon_inc * SECONDS_PER_DEGREE);
            self.int_record(&mut buf, "GS_COUNT", count);

            for &(dlon_east, dlat) in &sg.shifts {
                self.f32_bytes(&mut buf, dlat as f32);
                self.f32_bytes(&mut buf, -dlon_east as f32);
                self.f32_bytes(&mut buf, 0.0);
                self.f32_bytes(&mut buf, 0.0);
            }
        }

        text_record(&mut buf, "END", "");
        Ok(buf)
    }

    fn int_record(&self, buf: &mut Vec<u8>, key: &str, value: i32) {
        key_bytes(buf, key);
        if self.big_endian {
            buf.extend_from_slice(&value.to_be_bytes());
        } else {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf.extend_from_slice(&[0u8; 4]);
    }

    fn float_record(&self, buf: &mut Vec<u8>, key: &str, value: f64) {
        key_bytes(buf, key);
        if self.big_endian {
            buf.extend_from_slice(&value.to_be_bytes());
        } else {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn f32_bytes(&self, buf: &mut Vec<u8>, value: f32) {
        if self.big_endian {
            buf.extend_from_slice(&value.to_be_bytes());
        } else {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn key_bytes(buf: &mut Vec<u8>, key: &str) {
    let mut field = [b' '; 8];
    for (slot, byte) in field.iter_mut().zip(key.bytes()) {
        *slot = byte;
    }
    buf.extend_from_slice(&field);
}

fn text_record(buf: &mut Vec<u8>, key: &str, value: &str) {
    key_bytes(buf, key);
    let mut field = [b' '; 8];
    for (slot, byte) in field.iter_mut().zip(value.bytes()) {
        *slot = byte;
    }
    buf.extend_from_slice(&field);
}
