//! Product writers for finished conversions.
//!
//! Parquet output holds the normalized soundings and the populated surface
//! cells. ASCII-grid output writes one ESRI raster per surface layer. A JSON
//! metadata document is always written; it carries everything a downstream
//! compliance adapter needs.

use crate::config::{MapperConfig, OutputFormat};
use crate::constants::{ASCII_GRID_NODATA, output_file_name};
use crate::error::{MapperError, Result};
use crate::models::{Dataset, Field};
use crate::pipeline::overlay::OverlayMetadata;
use crate::pipeline::{ConversionResult, PipelineMetadata, QcSummary, SurfaceGrid};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raster layers of a surface grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridLayer {
    Elevation,
    Uncertainty,
    Density,
}

impl GridLayer {
    pub const ALL: [GridLayer; 3] = [
        GridLayer::Elevation,
        GridLayer::Uncertainty,
        GridLayer::Density,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GridLayer::Elevation => "elevation",
            GridLayer::Uncertainty => "uncertainty",
            GridLayer::Density => "density",
        }
    }

    fn value(&self, grid: &SurfaceGrid, row: usize, col: usize) -> Option<f64> {
        match self {
            GridLayer::Elevation => grid.elevation[row][col],
            GridLayer::Uncertainty => grid.uncertainty[row][col],
            GridLayer::Density => Some(grid.density[row][col] as f64),
        }
    }
}

/// JSON document written beside every product set
#[derive(Debug, Serialize)]
pub struct ProductMetadata<'a> {
    pub pipeline: &'a PipelineMetadata,
    pub quality: &'a QcSummary,
    pub overlay: Option<&'a OverlayMetadata>,
    pub units: &'a BTreeMap<String, String>,
    pub provenance: &'a BTreeMap<String, String>,
    pub coordinate_system: Option<&'a str>,
}

/// Write every product for a result and return the written paths
pub fn write_products(
    result: &ConversionResult,
    config: &MapperConfig,
    stem: &str,
    fingerprint: &str,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let path_for =
        |suffix: &str| config.output_dir.join(output_file_name(stem, fingerprint, suffix));
    let mut written = Vec::new();

    match config.output_format {
        OutputFormat::Parquet => {
            let path = path_for("soundings.parquet");
            let mut frame = soundings_frame(&result.dataset)?;
            write_parquet(&mut frame, &path, config)?;
            written.push(path);

            if let Some(grid) = &result.surface {
                let path = path_for("surface.parquet");
                let mut frame = surface_frame(grid)?;
                write_parquet(&mut frame, &path, config)?;
                written.push(path);
            }
        }
        OutputFormat::AsciiGrid => {
            if let Some(grid) = &result.surface {
                for layer in GridLayer::ALL {
                    let path = path_for(&format!("{}.asc", layer.as_str()));
                    write_ascii_grid(grid, layer, &path)?;
                    written.push(path);
                }
            }
        }
    }

    if let Some(overlay) = &result.overlay {
        let path = path_for("overlay.json");
        write_json(&overlay.samples, &path)?;
        written.push(path);
    }

    if config.keep_mapping {
        if let Some(mapping) = &result.mapping {
            let path = path_for("mapping.json");
            write_json(mapping, &path)?;
            written.push(path);
        }
    }

    let metadata = ProductMetadata {
        pipeline: &result.metadata,
        quality: &result.quality,
        overlay: result.overlay.as_ref().map(|o| &o.metadata),
        units: &result.dataset.metadata.units,
        provenance: &result.dataset.metadata.provenance,
        coordinate_system: result.dataset.metadata.coordinate_system.as_deref(),
    };
    let path = path_for("metadata.json");
    write_json(&metadata, &path)?;
    written.push(path);

    info!("Exported {} files to {}", written.len(), config.output_dir.display());
    Ok(written)
}

/// One row per reading
pub fn soundings_frame(dataset: &Dataset) -> Result<DataFrame> {
    let readings = &dataset.readings;
    let timestamps: Vec<Option<i64>> = readings
        .iter()
        .map(|r| r.timestamp.map(|t| t.timestamp_millis()))
        .collect();

    let mut columns = vec![
        Column::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        Column::new(
            "latitude".into(),
            readings.iter().map(|r| r.latitude).collect::<Vec<f64>>(),
        ),
        Column::new(
            "longitude".into(),
            readings.iter().map(|r| r.longitude).collect::<Vec<f64>>(),
        ),
    ];

    for field in Field::ALL.iter().filter(|f| !matches!(f, Field::Latitude | Field::Longitude)) {
        if dataset.has_field(*field) {
            let values: Vec<Option<f64>> = readings.iter().map(|r| field.value_of(r)).collect();
            columns.push(Column::new(field.name().into(), values));
        }
    }

    columns.push(text_column("vessel_id", readings.iter().map(|r| r.vessel_id.clone())));
    columns.push(text_column("vessel_name", readings.iter().map(|r| r.vessel_name.clone())));
    columns.push(text_column("survey_id", readings.iter().map(|r| r.survey_id.clone())));

    Ok(DataFrame::new(columns)?)
}

fn text_column(name: &str, values: impl Iterator<Item = Option<String>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<Option<String>>>())
}

/// One row per populated cell, positioned at the cell center
pub fn surface_frame(grid: &SurfaceGrid) -> Result<DataFrame> {
    let half = grid.resolution / 2.0;
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut lons = Vec::new();
    let mut lats = Vec::new();
    let mut elevation = Vec::new();
    let mut uncertainty = Vec::new();
    let mut density = Vec::new();

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let Some(value) = grid.elevation[row][col] else {
                continue;
            };
            let (lon, lat) = grid.cell_origin(row, col);
            rows.push(row as u32);
            cols.push(col as u32);
            lons.push(lon + half);
            lats.push(lat + half);
            elevation.push(value);
            uncertainty.push(grid.uncertainty[row][col]);
            density.push(grid.density[row][col]);
        }
    }

    Ok(DataFrame::new(vec![
        Column::new("row".into(), rows),
        Column::new("col".into(), cols),
        Column::new("longitude".into(), lons),
        Column::new("latitude".into(), lats),
        Column::new("elevation".into(), elevation),
        Column::new("uncertainty".into(), uncertainty),
        Column::new("density".into(), density),
    ])?)
}

fn write_parquet(frame: &mut DataFrame, path: &Path, config: &MapperConfig) -> Result<()> {
    debug!("Writing {} rows to {}", frame.height(), path.display());
    let file = File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(config.compression.to_polars_compression())
        .with_statistics(StatisticsOptions::full())
        .finish(frame)
        .map_err(|e| MapperError::Export {
            path: path.to_path_buf(),
            reason: format!("Failed to write parquet: {}", e),
        })?;
    Ok(())
}

/// ESRI ASCII raster, northernmost row first
pub fn write_ascii_grid(grid: &SurfaceGrid, layer: GridLayer, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "ncols {}", grid.cols)?;
    writeln!(out, "nrows {}", grid.rows)?;
    writeln!(out, "xllcorner {}", grid.bounds.min_lon)?;
    writeln!(out, "yllcorner {}", grid.bounds.min_lat)?;
    writeln!(out, "cellsize {}", grid.resolution)?;
    writeln!(out, "NODATA_value {}", ASCII_GRID_NODATA)?;

    for row in (0..grid.rows).rev() {
        let line: Vec<String> = (0..grid.cols)
            .map(|col| layer.value(grid, row, col).unwrap_or(ASCII_GRID_NODATA).to_string())
            .collect();
        writeln!(out, "{}", line.join(" "))?;
    }

    out.flush()?;
    debug!("Wrote {} grid to {}", layer.as_str(), path.display());
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.flush()?;
    Ok(())
}
