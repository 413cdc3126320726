//! Conversion pipeline for a single input.
//!
//! A [`ConversionJob`] moves one dataset through the stages
//! `Parsed -> QcApplied -> Anonymized -> Reprojected -> SurfaceBuilt ->
//! OverlayApplied -> Exported`. Anonymization and overlays are optional.
//! Quality evaluation, reprojection and surface building degrade on
//! failure; every other failure aborts the job with a single conversion
//! error and no partial result.

pub mod anonymize;
pub mod overlay;
pub mod reproject;
pub mod surface;
pub mod triangulation;

#[cfg(test)]
pub mod tests;

use crate::config::{MapperConfig, QcMode};
use crate::constants::SOFTWARE_VERSION;
use crate::error::{MapperError, Result};
use crate::export;
use crate::ingest;
use crate::models::{Dataset, QualityReport, SensorType, SpatialExtent};
use crate::processor::{content_fingerprint, output_stem};
use crate::qc::{AnomalyDetector, DetectionReport, QualityRuleEngine, scoring};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use anonymize::{AnonymizationEngine, VesselMapping};
pub use overlay::{OVERLAY_REGISTRY, OverlayKind, OverlayResult};
pub use reproject::{CoordinateReprojector, ReprojectionInfo};
pub use surface::{SurfaceBuilder, SurfaceGrid, SurfaceMethod};
pub use triangulation::TriangulatedIndex;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Parsed,
    QcApplied,
    Anonymized,
    Reprojected,
    SurfaceBuilt,
    OverlayApplied,
    Exported,
}

/// Combined quality control outcome of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcSummary {
    pub mode: QcMode,
    pub report: QualityReport,
    pub detection: Option<DetectionReport>,
    /// Rule anomalies plus detector anomalies, not deduplicated
    pub total_anomalies: usize,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceInfo {
    pub method: SurfaceMethod,
    pub resolution: f64,
    pub rows: usize,
    pub cols: usize,
    pub populated_cells: usize,
    pub triangulated: bool,
}

impl SurfaceInfo {
    fn of(grid: &SurfaceGrid) -> Self {
        Self {
            method: grid.method,
            resolution: grid.resolution,
            rows: grid.rows,
            cols: grid.cols,
            populated_cells: grid.populated_cells(),
            triangulated: grid.triangulation.is_some(),
        }
    }
}

/// Provenance of a conversion, written next to the products
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineMetadata {
    pub job_id: Uuid,
    pub input_file: Option<PathBuf>,
    pub input_file_size: Option<u64>,
    pub sensor_type: SensorType,
    pub qc_mode: QcMode,
    pub stages_completed: Vec<JobStage>,
    pub anonymization_applied: bool,
    pub overlay_applied: Option<OverlayKind>,
    pub reprojection: ReprojectionInfo,
    pub surface: Option<SurfaceInfo>,
    pub spatial_extent: SpatialExtent,
    pub total_points: usize,
    pub software_version: String,
    pub conversion_timestamp: DateTime<Utc>,
    pub processing_time_ms: u128,
    pub annotations: Vec<String>,
}

/// Everything a job produced
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub dataset: Dataset,
    pub quality: QcSummary,
    pub surface: Option<SurfaceGrid>,
    pub overlay: Option<OverlayResult>,
    /// Present only when the caller asked to keep it
    pub mapping: Option<VesselMapping>,
    pub metadata: PipelineMetadata,
    pub output_files: Vec<PathBuf>,
}

/// One input file converted with one configuration
#[derive(Debug, Clone)]
pub struct ConversionJob {
    id: Uuid,
    input: PathBuf,
    sensor: SensorType,
    config: Arc<MapperConfig>,
    fingerprint: Option<String>,
    cancelled: Arc<AtomicBool>,
}

impl ConversionJob {
    /// Validate selectors and configuration up front. Invalid selectors
    /// are fatal before any work starts.
    pub fn new(
        input: impl Into<PathBuf>,
        sensor_label: &str,
        config: Arc<MapperConfig>,
    ) -> Result<Self> {
        let sensor: SensorType = sensor_label.parse()?;
        config.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            input: input.into(),
            sensor,
            config,
            fingerprint: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Fingerprint used to name outputs
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Flag checked between stages; setting it abandons the job
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn sensor(&self) -> SensorType {
        self.sensor
    }

    /// Read, convert and export the input file
    pub fn run(&self) -> Result<ConversionResult> {
        self.run_stages().map_err(Self::wrap)
    }

    /// Convert an already parsed dataset without touching the filesystem
    pub fn convert(&self, dataset: Dataset) -> Result<ConversionResult> {
        self.convert_dataset(dataset, Instant::now())
            .map_err(Self::wrap)
    }

    fn wrap(error: MapperError) -> MapperError {
        match error {
            MapperError::Interrupted { .. } | MapperError::Conversion { .. } => error,
            other => MapperError::conversion(other),
        }
    }

    fn check_cancelled(&self, stage: JobStage) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(MapperError::Interrupted {
                reason: format!("job {} cancelled after {:?}", self.id, stage),
            });
        }
        Ok(())
    }

    fn run_stages(&self) -> Result<ConversionResult> {
        let start = Instant::now();
        info!(
            "Starting conversion job {} for {} (sensor={})",
            self.id,
            self.input.display(),
            self.sensor
        );

        let dataset = ingest::read_dataset(&self.input, self.sensor)?;
        let mut result = self.convert_dataset(dataset, start)?;
        result.metadata.input_file = Some(self.input.clone());
        result.metadata.input_file_size = std::fs::metadata(&self.input).ok().map(|m| m.len());

        let fingerprint = match &self.fingerprint {
            Some(fp) => fp.clone(),
            None => content_fingerprint(&self.input, self.sensor, &self.config)?,
        };
        let stem = output_stem(&self.input);

        result.metadata.stages_completed.push(JobStage::Exported);
        result.metadata.processing_time_ms = start.elapsed().as_millis();
        result.output_files = export::write_products(&result, &self.config, stem, &fingerprint)?;

        info!(
            "Conversion job {} completed in {}ms: {} points, {} anomalies, score {:.3}, {} files",
            self.id,
            result.metadata.processing_time_ms,
            result.metadata.total_points,
            result.quality.total_anomalies,
            result.quality.quality_score,
            result.output_files.len()
        );
        Ok(result)
    }

    fn convert_dataset(&self, dataset: Dataset, start: Instant) -> Result<ConversionResult> {
        let mut stages = vec![JobStage::Parsed];
        let total_points = dataset.len();
        let sensor_label = self.sensor.as_str();
        debug!("Parsed {} readings", total_points);
        self.check_cancelled(JobStage::Parsed)?;

        let quality = self.apply_quality_control(&dataset);
        stages.push(JobStage::QcApplied);
        self.check_cancelled(JobStage::QcApplied)?;

        let (dataset, mapping) = if self.config.anonymize {
            let engine = AnonymizationEngine::new(self.config.anonymization.clone());
            let (anonymized, mapping) = if self.config.keep_mapping {
                let (anonymized, mapping) = engine.anonymize_with_mapping(&dataset, sensor_label)?;
                (anonymized, Some(mapping))
            } else {
                (engine.anonymize(&dataset, sensor_label)?, None)
            };
            stages.push(JobStage::Anonymized);
            (anonymized, mapping)
        } else {
            (dataset, None)
        };
        self.check_cancelled(JobStage::Anonymized)?;

        let (mut dataset, reprojection) = CoordinateReprojector::default().normalize(&dataset);
        stages.push(JobStage::Reprojected);
        self.check_cancelled(JobStage::Reprojected)?;

        let surface = match SurfaceBuilder::new(self.config.surface.clone()).build(&dataset) {
            Ok(grid) => Some(grid),
            Err(e) => {
                warn!("Surface unavailable for job {}: {}", self.id, e);
                dataset
                    .metadata
                    .annotations
                    .push(format!("surface not built: {}", e));
                None
            }
        };
        stages.push(JobStage::SurfaceBuilt);
        self.check_cancelled(JobStage::SurfaceBuilt)?;

        let overlay = match self.config.overlay {
            Some(kind) => {
                let result = kind.apply(&dataset)?;
                stages.push(JobStage::OverlayApplied);
                Some(result)
            }
            None => None,
        };

        let metadata = PipelineMetadata {
            job_id: self.id,
            input_file: None,
            input_file_size: None,
            sensor_type: self.sensor,
            qc_mode: self.config.qc_mode,
            stages_completed: stages,
            anonymization_applied: self.config.anonymize,
            overlay_applied: self.config.overlay,
            reprojection,
            surface: surface.as_ref().map(SurfaceInfo::of),
            spatial_extent: SpatialExtent::from_dataset(&dataset),
            total_points,
            software_version: SOFTWARE_VERSION.to_string(),
            conversion_timestamp: Utc::now(),
            processing_time_ms: start.elapsed().as_millis(),
            annotations: dataset.metadata.annotations.clone(),
        };

        Ok(ConversionResult {
            dataset,
            quality,
            surface,
            overlay,
            mapping,
            metadata,
            output_files: Vec::new(),
        })
    }

    fn apply_quality_control(&self, dataset: &Dataset) -> QcSummary {
        let total_points = dataset.len();
        let mode = self.config.qc_mode;

        let (report, detection) = match mode {
            QcMode::Skip => {
                debug!("Quality control skipped");
                (QualityReport::skipped(total_points), None)
            }
            QcMode::Manual => (
                QualityRuleEngine::new(self.config.quality_control.clone())
                    .evaluate(dataset, self.sensor.as_str()),
                None,
            ),
            QcMode::Auto => (
                QualityRuleEngine::new(self.config.quality_control.clone())
                    .evaluate(dataset, self.sensor.as_str()),
                Some(AnomalyDetector::new(self.config.detector.clone()).detect(dataset)),
            ),
        };

        let (total_anomalies, quality_score) = match (&mode, &detection) {
            (QcMode::Skip, _) => (0, 0.0),
            (QcMode::Auto, Some(detection)) => {
                let total = report.anomalies.len() + detection.anomalies.len();
                let score = if report.error.is_some() {
                    0.0
                } else {
                    let any_high =
                        report.high_severity_count() > 0 || detection.high_severity_count() > 0;
                    scoring::score_from_rate(total, total_points, any_high)
                };
                (total, score)
            }
            _ => (report.anomalies.len(), report.quality_score),
        };

        info!(
            "Quality control ({}) finished: {} anomalies, score {:.3}",
            mode, total_anomalies, quality_score
        );

        QcSummary {
            mode,
            report,
            detection,
            total_anomalies,
            quality_score,
        }
    }
}
