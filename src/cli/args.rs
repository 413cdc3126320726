//! Command-line argument definitions for ocean-mapper
//!
//! Selector arguments (sensor, format, QC mode, overlay) are taken as
//! plain strings and parsed by the library so that an unknown value is
//! reported with the same validation error the library uses everywhere.

use crate::config::{AnonymizationContext, CompressionAlgorithm, MapperConfig, OutputFormat, QcMode};
use crate::error::Result;
use crate::pipeline::OverlayKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the ocean mapping converter
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ocean-mapper",
    version,
    about = "Convert raw ocean mapping soundings into quality-controlled bathymetric products",
    long_about = "Reads raw sounding files from multibeam and single-beam echo sounders, LiDAR \
                  and AUVs, runs quality control and anomaly detection, optionally anonymizes \
                  vessel identity, normalizes coordinates to WGS84, grids a bathymetric surface \
                  and writes Parquet or ESRI ASCII grid products with JSON metadata."
)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Convert sounding files into gridded products
    Convert(ConvertArgs),
    /// List the registered environmental overlays
    Overlays,
    /// Run quality control on one file and print the report
    Inspect(InspectArgs),
}

/// Arguments for the convert command
#[derive(Debug, Clone, Parser)]
pub struct ConvertArgs {
    /// Input files, directories or glob patterns
    #[arg(value_name = "INPUTS", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Sensor type: mbes, sbes, lidar, singlebeam or auv
    #[arg(short, long, value_name = "TYPE")]
    pub sensor: String,

    /// Product format: parquet or ascii-grid
    #[arg(short, long, default_value = "parquet")]
    pub format: String,

    /// Quality control mode: auto, manual or skip
    #[arg(long = "qc-mode", default_value = "auto")]
    pub qc_mode: String,

    /// Hash vessel identifiers and jitter flagged positions
    #[arg(long)]
    pub anonymize: bool,

    /// Salt for identifier hashing
    #[arg(long, env = "OCEAN_MAPPER_SALT", hide_env_values = true)]
    pub salt: Option<String>,

    /// GPS jitter radius in meters
    #[arg(long = "jitter-radius", value_name = "METERS")]
    pub jitter_radius: Option<f64>,

    /// Environmental overlay to apply (see `ocean-mapper overlays`)
    #[arg(long)]
    pub overlay: Option<String>,

    /// Write the hashed-to-original vessel mapping next to the outputs
    #[arg(long = "keep-mapping", requires = "anonymize")]
    pub keep_mapping: bool,

    /// Directory for the written products
    #[arg(short, long = "output-dir", default_value = "output")]
    pub output_dir: PathBuf,

    /// Parquet compression: snappy, zstd, lz4 or none
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Conversion jobs to run at once (defaults to a value sized for this machine)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Convert again even when outputs for the same input exist
    #[arg(long)]
    pub force: bool,
}

impl ConvertArgs {
    /// Build the library configuration from the arguments
    pub fn to_config(&self) -> Result<MapperConfig> {
        let mut config = MapperConfig::detect()
            .with_output_dir(&self.output_dir)
            .with_output_format(self.format.parse::<OutputFormat>()?)
            .with_qc_mode(self.qc_mode.parse::<QcMode>()?)
            .with_compression(self.compression.parse::<CompressionAlgorithm>()?);

        if let Some(workers) = self.workers {
            config = config.with_max_concurrent_jobs(workers);
        }
        if self.force {
            config = config.with_force_reprocess();
        }
        if let Some(overlay) = &self.overlay {
            config = config.with_overlay(overlay.parse::<OverlayKind>()?);
        }
        if self.anonymize {
            let mut context = match &self.salt {
                Some(salt) => AnonymizationContext::new(salt.clone()),
                None => AnonymizationContext::default(),
            };
            if let Some(radius) = self.jitter_radius {
                context = context.with_jitter_radius(radius);
            }
            config = config.with_anonymization(context);
            if self.keep_mapping {
                config = config.with_keep_mapping();
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the inspect command
#[derive(Debug, Clone, Parser)]
pub struct InspectArgs {
    /// File to inspect
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Sensor type; guessed from the file name when omitted
    #[arg(short, long, value_name = "TYPE")]
    pub sensor: Option<String>,

    /// Quality control mode: auto or manual
    #[arg(long = "qc-mode", default_value = "auto")]
    pub qc_mode: String,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}
