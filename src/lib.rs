//! Ocean Mapper Library
//!
//! Converts raw ocean mapping soundings (multibeam and single-beam echo
//! sounders, LiDAR, AUVs) into quality-controlled, optionally anonymized,
//! gridded bathymetric products.
//!
//! Each input runs through the stages of a [`pipeline::ConversionJob`]:
//! - Rule-based quality control and sequence anomaly detection
//! - Salted hashing of vessel identity and GPS jitter
//! - Normalization of projected coordinates to WGS84
//! - Gridded surface building with a Delaunay index for interpolation
//! - Optional environmental overlays
//! - Export to Parquet or ESRI ASCII grids with JSON metadata
//!
//! [`processor::BatchProcessor`] runs many jobs concurrently and tracks
//! them in a [`jobs::JobStore`].

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod geo;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod qc;
pub mod schema;

pub use config::{MapperConfig, OutputFormat, QcMode};
pub use error::{MapperError, Result};
pub use jobs::{JobStatus, JobStore};
pub use models::{Dataset, ProcessingStats, QualityReport, SensorReading, SensorType};
pub use pipeline::{ConversionJob, ConversionResult, OverlayKind};
pub use processor::BatchProcessor;
