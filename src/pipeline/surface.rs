//! Regular-grid bathymetric surfaces.
//!
//! Soundings are binned into cells of a fixed angular resolution spanning
//! the bounding box of the valid points. A triangulated index over the same
//! points is kept for interpolated queries.

use crate::config::SurfaceConfig;
use crate::constants::{DEFAULT_CELL_UNCERTAINTY, MIN_SURFACE_POINTS};
use crate::error::{MapperError, Result};
use crate::models::Dataset;
use crate::pipeline::triangulation::TriangulatedIndex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Grid extent in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl SurfaceBounds {
    fn of(points: &[(f64, f64, f64)]) -> Option<Self> {
        let (&(lon, lat, _), rest) = points.split_first()?;
        let initial = Self {
            min_lon: lon,
            min_lat: lat,
            max_lon: lon,
            max_lat: lat,
        };
        Some(rest.iter().fold(initial, |b, &(lon, lat, _)| Self {
            min_lon: b.min_lon.min(lon),
            min_lat: b.min_lat.min(lat),
            max_lon: b.max_lon.max(lon),
            max_lat: b.max_lat.max(lat),
        }))
    }
}

/// How cell values were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMethod {
    /// Cell binning with a triangulated index over the source points
    Binned,
    /// Every cell takes the value of the nearest source point
    Nearest,
}

impl SurfaceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceMethod::Binned => "binned",
            SurfaceMethod::Nearest => "nearest",
        }
    }
}

/// Gridded surface. Rows run south to north, columns west to east.
/// Cells without data hold `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceGrid {
    pub resolution: f64,
    pub bounds: SurfaceBounds,
    pub rows: usize,
    pub cols: usize,
    pub elevation: Vec<Vec<Option<f64>>>,
    pub uncertainty: Vec<Vec<Option<f64>>>,
    pub density: Vec<Vec<u32>>,
    pub method: SurfaceMethod,
    pub triangulation: Option<TriangulatedIndex>,
}

impl SurfaceGrid {
    fn empty(bounds: SurfaceBounds, rows: usize, cols: usize, resolution: f64) -> Self {
        Self {
            resolution,
            bounds,
            rows,
            cols,
            elevation: vec![vec![None; cols]; rows],
            uncertainty: vec![vec![None; cols]; rows],
            density: vec![vec![0; cols]; rows],
            method: SurfaceMethod::Binned,
            triangulation: None,
        }
    }

    /// Cell containing a position, `None` when outside the grid
    pub fn cell_index(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let row = ((lat - self.bounds.min_lat) / self.resolution).trunc();
        let col = ((lon - self.bounds.min_lon) / self.resolution).trunc();
        if !(row >= 0.0 && col >= 0.0) {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Longitude/latitude of the south-west corner of a cell
    pub fn cell_origin(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.bounds.min_lon + col as f64 * self.resolution,
            self.bounds.min_lat + row as f64 * self.resolution,
        )
    }

    /// Value at a position: triangulated interpolation when available,
    /// otherwise the value of the enclosing cell
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        self.triangulation
            .as_ref()
            .and_then(|index| index.interpolate(lon, lat))
            .or_else(|| {
                let (row, col) = self.cell_index(lon, lat)?;
                self.elevation[row][col]
            })
    }

    pub fn populated_cells(&self) -> usize {
        self.elevation.iter().flatten().filter(|v| v.is_some()).count()
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Builds [`SurfaceGrid`]s from normalized datasets
#[derive(Debug, Clone, Default)]
pub struct SurfaceBuilder {
    config: SurfaceConfig,
}

impl SurfaceBuilder {
    pub fn new(config: SurfaceConfig) -> Self {
        Self { config }
    }

    /// Grid shape for a bounding box: `ceil(span / resolution) + 1` per axis
    pub fn grid_shape(&self, bounds: &SurfaceBounds) -> (usize, usize) {
        let resolution = self.config.resolution;
        let rows = ((bounds.max_lat - bounds.min_lat) / resolution).ceil() as usize + 1;
        let cols = ((bounds.max_lon - bounds.min_lon) / resolution).ceil() as usize + 1;
        (rows, cols)
    }

    /// Build a surface from the valid `(lon, lat, z)` triples of a dataset.
    ///
    /// Fewer than three valid points produce a nearest-value grid. No valid
    /// points, or a grid larger than the configured cell limit, is an error.
    pub fn build(&self, dataset: &Dataset) -> Result<SurfaceGrid> {
        let resolution = self.config.resolution;
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(MapperError::SurfaceBuild {
                message: format!("resolution must be positive, got {}", resolution),
            });
        }

        let points: Vec<(f64, f64, f64)> = dataset
            .readings
            .iter()
            .filter_map(|r| r.valid_triple())
            .collect();

        let bounds = SurfaceBounds::of(&points).ok_or_else(|| MapperError::SurfaceBuild {
            message: "no valid coordinate/depth triples".to_string(),
        })?;

        let (rows, cols) = self.grid_shape(&bounds);
        let cells = rows.saturating_mul(cols);
        if cells > self.config.max_grid_cells {
            return Err(MapperError::SurfaceBuild {
                message: format!(
                    "grid of {}x{} cells exceeds the limit of {}",
                    rows, cols, self.config.max_grid_cells
                ),
            });
        }

        debug!(
            "Building {}x{} surface at {}° from {} valid points",
            rows,
            cols,
            resolution,
            points.len()
        );

        let grid = if points.len() < MIN_SURFACE_POINTS {
            warn!(
                "Only {} valid points, building nearest-value surface",
                points.len()
            );
            self.nearest_grid(&points, bounds, rows, cols)
        } else {
            let mut grid = self.binned_grid(&points, bounds, rows, cols);
            grid.triangulation =
                match TriangulatedIndex::build(&points, self.config.max_triangulation_points) {
                    Ok(index) => Some(index),
                    Err(e) => {
                        warn!("Triangulation unavailable: {}", e);
                        None
                    }
                };
            grid
        };

        info!(
            "Surface built: {}x{} cells, {} populated, method={}, triangulated={}",
            grid.rows,
            grid.cols,
            grid.populated_cells(),
            grid.method.as_str(),
            grid.triangulation.is_some()
        );
        Ok(grid)
    }

    fn binned_grid(
        &self,
        points: &[(f64, f64, f64)],
        bounds: SurfaceBounds,
        rows: usize,
        cols: usize,
    ) -> SurfaceGrid {
        let mut grid = SurfaceGrid::empty(bounds, rows, cols, self.config.resolution);

        for &(lon, lat, z) in points {
            let Some((row, col)) = grid.cell_index(lon, lat) else {
                continue;
            };
            // Pairwise averaging against the current cell value, not a running mean
            let cell = &mut grid.elevation[row][col];
            *cell = Some(match *cell {
                None => {
                    grid.uncertainty[row][col] = Some(DEFAULT_CELL_UNCERTAINTY);
                    z
                }
                Some(old) => (old + z) / 2.0,
            });
            grid.density[row][col] += 1;
        }

        grid
    }

    fn nearest_grid(
        &self,
        points: &[(f64, f64, f64)],
        bounds: SurfaceBounds,
        rows: usize,
        cols: usize,
    ) -> SurfaceGrid {
        let mut grid = SurfaceGrid::empty(bounds, rows, cols, self.config.resolution);
        grid.method = SurfaceMethod::Nearest;

        for &(lon, lat, _) in points {
            if let Some((row, col)) = grid.cell_index(lon, lat) {
                grid.density[row][col] += 1;
            }
        }

        let half = self.config.resolution / 2.0;
        for row in 0..rows {
            for col in 0..cols {
                let (lon, lat) = grid.cell_origin(row, col);
                let (cx, cy) = (lon + half, lat + half);
                let nearest = points.iter().min_by(|a, b| {
                    let da = (a.0 - cx).powi(2) + (a.1 - cy).powi(2);
                    let db = (b.0 - cx).powi(2) + (b.1 - cy).powi(2);
                    da.total_cmp(&db)
                });
                grid.elevation[row][col] = nearest.map(|p| p.2);
                if grid.density[row][col] > 0 {
                    grid.uncertainty[row][col] = Some(DEFAULT_CELL_UNCERTAINTY);
                }
            }
        }

        grid
    }
}
