//! Configuration management and validation.
//!
//! Provides the top-level conversion configuration, per-stage settings
//! for quality control, anomaly detection, anonymization and surface
//! building, plus system profiling used to size concurrency.

use crate::constants::{
    self, DEFAULT_GRID_RESOLUTION, DEFAULT_JITTER_RADIUS_METERS, DEFAULT_MAX_GRID_CELLS,
    DEFAULT_MAX_TRIANGULATION_POINTS, DEFAULT_SALT, detection, ranges,
};
use crate::error::{MapperError, Result};
use crate::models::Field;
use crate::pipeline::overlay::OverlayKind;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(MapperError::validation(format!(
                "Invalid compression: {}. Must be one of: snappy, zstd, lz4, none",
                other
            ))),
        }
    }
}

/// System profiling information for concurrency sizing
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of CPU cores available
    pub cpu_cores: usize,
    /// Total memory in MB
    pub memory_mb: usize,
    /// Physical cores
    pub performance_cores: usize,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        use sysinfo::System;

        let cpu_cores = num_cpus::get();
        let performance_cores = num_cpus::get_physical();

        let mut system = System::new();
        system.refresh_memory();
        let memory_mb = (system.total_memory() / 1024 / 1024) as usize;

        Self {
            cpu_cores,
            memory_mb,
            performance_cores,
        }
    }

    /// Jobs to run at once: one per physical core, fewer on small-memory hosts
    pub fn recommended_concurrency(&self) -> usize {
        // Roughly 512MB of headroom per in-flight dataset
        let memory_bound = (self.memory_mb / 512).max(1);
        let concurrency = self.performance_cores.max(1).min(memory_bound);

        debug!(
            "Concurrency sizing: {} jobs ({} cores, {}MB memory)",
            concurrency, self.performance_cores, self.memory_mb
        );

        concurrency
    }
}

/// How much quality control a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcMode {
    /// Rule engine and anomaly detector, counts combined
    Auto,
    /// Rule engine only
    Manual,
    /// No quality control
    Skip,
}

impl QcMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcMode::Auto => "auto",
            QcMode::Manual => "manual",
            QcMode::Skip => "skip",
        }
    }
}

impl fmt::Display for QcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QcMode {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(QcMode::Auto),
            "manual" => Ok(QcMode::Manual),
            "skip" => Ok(QcMode::Skip),
            other => Err(MapperError::validation(format!(
                "Invalid QC mode: {}. Must be one of: {:?}",
                other,
                constants::QC_MODES
            ))),
        }
    }
}

/// Product format written by the export stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Parquet,
    AsciiGrid,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::AsciiGrid => "ascii-grid",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "parquet" => Ok(OutputFormat::Parquet),
            "ascii-grid" | "ascii_grid" | "asc" => Ok(OutputFormat::AsciiGrid),
            other => Err(MapperError::validation(format!(
                "Invalid output format: {}. Must be one of: {:?}",
                other,
                constants::OUTPUT_FORMATS
            ))),
        }
    }
}

/// Rule engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityControlConfig {
    /// Replacement (min, max) ranges for individual fields
    pub range_overrides: BTreeMap<Field, (f64, f64)>,
}

impl QualityControlConfig {
    pub fn with_range(mut self, field: Field, min: f64, max: f64) -> Self {
        self.range_overrides.insert(field, (min, max));
        self
    }

    /// Effective inclusive range for a field
    pub fn range_for(&self, field: Field) -> (f64, f64) {
        if let Some(range) = self.range_overrides.get(&field) {
            return *range;
        }
        match field {
            Field::Latitude => ranges::LATITUDE,
            Field::Longitude => ranges::LONGITUDE,
            Field::Depth => ranges::DEPTH,
            Field::Elevation => ranges::ELEVATION,
            Field::BeamAngle => ranges::BEAM_ANGLE,
            Field::Quality => ranges::QUALITY,
            Field::Heading => ranges::HEADING,
            Field::Pitch => ranges::PITCH,
            Field::Roll => ranges::ROLL,
            Field::Velocity => ranges::VELOCITY,
            Field::Intensity => ranges::INTENSITY,
            Field::Classification => ranges::CLASSIFICATION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, (min, max)) in &self.range_overrides {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(MapperError::QualityEvaluation {
                    message: format!("invalid range for {}: [{}, {}]", field, min, max),
                });
            }
        }
        Ok(())
    }
}

/// Anomaly detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub jump_threshold: f64,
    pub high_severity_jump: f64,
    pub duplicate_cluster_size: usize,
    pub duplicate_confidence_scale: f64,
    /// Optional model artifact; validated but not evaluated
    pub model_path: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            jump_threshold: detection::DEPTH_JUMP_THRESHOLD,
            high_severity_jump: detection::HIGH_SEVERITY_JUMP,
            duplicate_cluster_size: detection::DUPLICATE_CLUSTER_SIZE,
            duplicate_confidence_scale: detection::DUPLICATE_CONFIDENCE_SCALE,
            model_path: None,
        }
    }
}

impl DetectorConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.jump_threshold)
            || !positive(self.high_severity_jump)
            || !positive(self.duplicate_confidence_scale)
        {
            return Err(MapperError::AnomalyDetection {
                message: "detector thresholds must be positive and finite".to_string(),
            });
        }

        if let Some(path) = &self.model_path {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !detection::MODEL_EXTENSIONS.contains(&extension.as_str()) {
                return Err(MapperError::AnomalyDetection {
                    message: format!(
                        "unsupported model format '{}', expected one of {:?}",
                        extension,
                        detection::MODEL_EXTENSIONS
                    ),
                });
            }
            let metadata = std::fs::metadata(path).map_err(|e| MapperError::AnomalyDetection {
                message: format!("model file {} is not readable: {}", path.display(), e),
            })?;
            if metadata.len() == 0 {
                return Err(MapperError::AnomalyDetection {
                    message: format!("model file {} is empty", path.display()),
                });
            }
        }

        Ok(())
    }
}

/// Salt and jitter settings for the anonymization stage
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationContext {
    pub salt: String,
    pub jitter_radius_meters: f64,
}

impl Default for AnonymizationContext {
    fn default() -> Self {
        Self {
            salt: DEFAULT_SALT.to_string(),
            jitter_radius_meters: DEFAULT_JITTER_RADIUS_METERS,
        }
    }
}

// Keep the salt out of logs
impl fmt::Debug for AnonymizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymizationContext")
            .field("salt", &"<redacted>")
            .field("jitter_radius_meters", &self.jitter_radius_meters)
            .finish()
    }
}

impl AnonymizationContext {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            ..Default::default()
        }
    }

    pub fn with_jitter_radius(mut self, meters: f64) -> Self {
        self.jitter_radius_meters = meters;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.salt.is_empty() {
            return Err(MapperError::Anonymization {
                message: "salt must not be empty".to_string(),
            });
        }
        if !self.jitter_radius_meters.is_finite() || self.jitter_radius_meters < 0.0 {
            return Err(MapperError::Anonymization {
                message: format!(
                    "jitter radius must be a non-negative number of meters, got {}",
                    self.jitter_radius_meters
                ),
            });
        }
        Ok(())
    }
}

/// Gridding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Cell size in degrees
    pub resolution: f64,
    pub max_grid_cells: usize,
    pub max_triangulation_points: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_GRID_RESOLUTION,
            max_grid_cells: DEFAULT_MAX_GRID_CELLS,
            max_triangulation_points: DEFAULT_MAX_TRIANGULATION_POINTS,
        }
    }
}

impl SurfaceConfig {
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Global configuration for ocean mapping conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Maximum conversion jobs running at once
    pub max_concurrent_jobs: usize,

    /// Memory usage fraction above which concurrency is halved
    pub memory_threshold: f64,

    /// Ignore cached outputs and convert again
    pub force_reprocess: bool,

    pub output_dir: PathBuf,

    pub output_format: OutputFormat,

    pub compression: CompressionAlgorithm,

    pub qc_mode: QcMode,

    /// Run the anonymization stage
    pub anonymize: bool,

    /// Write the hashed-to-original vessel mapping next to the outputs
    pub keep_mapping: bool,

    pub overlay: Option<OverlayKind>,

    pub quality_control: QualityControlConfig,

    pub detector: DetectorConfig,

    pub anonymization: AnonymizationContext,

    pub surface: SurfaceConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            memory_threshold: 0.8,
            force_reprocess: false,
            output_dir: PathBuf::from("output"),
            output_format: OutputFormat::Parquet,
            compression: CompressionAlgorithm::Snappy,
            qc_mode: QcMode::Auto,
            anonymize: false,
            keep_mapping: false,
            overlay: None,
            quality_control: QualityControlConfig::default(),
            detector: DetectorConfig::default(),
            anonymization: AnonymizationContext::default(),
            surface: SurfaceConfig::default(),
        }
    }
}

impl MapperConfig {
    /// Default configuration with concurrency sized for this machine
    pub fn detect() -> Self {
        let profile = SystemProfile::detect();
        Self::default().with_max_concurrent_jobs(profile.recommended_concurrency())
    }

    /// Set maximum concurrent jobs
    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs;
        self
    }

    /// Enable force reprocessing
    pub fn with_force_reprocess(mut self) -> Self {
        self.force_reprocess = true;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_qc_mode(mut self, qc_mode: QcMode) -> Self {
        self.qc_mode = qc_mode;
        self
    }

    /// Enable anonymization with the given context
    pub fn with_anonymization(mut self, context: AnonymizationContext) -> Self {
        self.anonymize = true;
        self.anonymization = context;
        self
    }

    pub fn with_keep_mapping(mut self) -> Self {
        self.keep_mapping = true;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayKind) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_quality_control(mut self, config: QualityControlConfig) -> Self {
        self.quality_control = config;
        self
    }

    pub fn with_detector(mut self, config: DetectorConfig) -> Self {
        self.detector = config;
        self
    }

    pub fn with_surface(mut self, config: SurfaceConfig) -> Self {
        self.surface = config;
        self
    }

    /// Reject settings that can never produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(MapperError::configuration(
                "max_concurrent_jobs must be at least 1",
            ));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(MapperError::configuration(format!(
                "memory_threshold must be in (0, 1], got {}",
                self.memory_threshold
            )));
        }
        if !(self.surface.resolution.is_finite() && self.surface.resolution > 0.0) {
            return Err(MapperError::configuration(format!(
                "surface resolution must be positive, got {}",
                self.surface.resolution
            )));
        }
        if self.surface.max_grid_cells == 0 {
            return Err(MapperError::configuration(
                "max_grid_cells must be at least 1",
            ));
        }
        if self.keep_mapping && !self.anonymize {
            return Err(MapperError::configuration(
                "keep_mapping requires anonymization to be enabled",
            ));
        }
        if self.anonymize {
            self.anonymization.validate().map_err(|e| {
                MapperError::configuration(format!("invalid anonymization settings: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MapperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.qc_mode, QcMode::Auto);
        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(config.surface.resolution, 0.001);
        assert_eq!(config.anonymization.jitter_radius_meters, 50.0);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        assert!(
            MapperConfig::default()
                .with_max_concurrent_jobs(0)
                .validate()
                .is_err()
        );
        assert!(
            MapperConfig::default()
                .with_surface(SurfaceConfig::default().with_resolution(-1.0))
                .validate()
                .is_err()
        );
        assert!(MapperConfig::default().with_keep_mapping().validate().is_err());

        let err = MapperConfig::default()
            .with_anonymization(AnonymizationContext::new(""))
            .validate()
            .unwrap_err();
        assert!(matches!(err, MapperError::Configuration { .. }));
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("SKIP".parse::<QcMode>().unwrap(), QcMode::Skip);
        assert_eq!(
            "ascii-grid".parse::<OutputFormat>().unwrap(),
            OutputFormat::AsciiGrid
        );
        assert!(matches!(
            "bag".parse::<OutputFormat>(),
            Err(MapperError::Validation { .. })
        ));
        assert!(matches!(
            "sometimes".parse::<QcMode>(),
            Err(MapperError::Validation { .. })
        ));
    }

    #[test]
    fn test_range_overrides() {
        let qc = QualityControlConfig::default().with_range(Field::Depth, 0.0, 500.0);
        assert_eq!(qc.range_for(Field::Depth), (0.0, 500.0));
        assert_eq!(qc.range_for(Field::Latitude), (-90.0, 90.0));
        assert!(qc.validate().is_ok());

        let inverted = QualityControlConfig::default().with_range(Field::Depth, 10.0, 0.0);
        assert!(matches!(
            inverted.validate(),
            Err(MapperError::QualityEvaluation { .. })
        ));
    }

    #[test]
    fn test_detector_model_path_validation() {
        let dir = tempfile::TempDir::new().unwrap();

        let wrong_ext = dir.path().join("model.txt");
        std::fs::write(&wrong_ext, b"weights").unwrap();
        assert!(DetectorConfig::default().with_model_path(&wrong_ext).validate().is_err());

        let empty = dir.path().join("model.onnx");
        std::fs::write(&empty, b"").unwrap();
        assert!(DetectorConfig::default().with_model_path(&empty).validate().is_err());

        let missing = dir.path().join("absent.pkl");
        assert!(DetectorConfig::default().with_model_path(&missing).validate().is_err());

        let good = dir.path().join("model.joblib");
        std::fs::write(&good, b"weights").unwrap();
        assert!(DetectorConfig::default().with_model_path(&good).validate().is_ok());
    }

    #[test]
    fn test_salt_is_redacted_in_debug() {
        let context = AnonymizationContext::new("top-secret");
        assert!(!format!("{:?}", context).contains("top-secret"));
    }

    #[test]
    fn test_compression_mapping() {
        assert!(matches!(
            CompressionAlgorithm::Zstd.to_polars_compression(),
            ParquetCompression::Zstd(None)
        ));
        assert_eq!(
            "NONE".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Uncompressed
        );
        assert!("brotli".parse::<CompressionAlgorithm>().is_err());
    }
}
