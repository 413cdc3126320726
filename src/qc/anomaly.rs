//! Sequence-aware anomaly detection.
//!
//! Unlike the rule engine this looks at the shape of the survey line:
//! sudden depth jumps between consecutive soundings, impossible depths
//! and suspicious clusters of identical coordinates. Detection is fully
//! deterministic; a configured model file is validated but no model is
//! evaluated.

use crate::config::DetectorConfig;
use crate::constants::detection::{MODEL_EXTENSIONS, MODEL_TYPE};
use crate::constants::ranges;
use crate::error::Result;
use crate::models::{Anomaly, AnomalyKind, AnomalyLocation, Dataset, Field, Severity};
use crate::qc::scoring;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Detector output for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub anomalies: Vec<Anomaly>,
    pub confidence: f64,
    pub total_points: usize,
    pub anomaly_rate: f64,
    pub model_type: String,
    pub error: Option<String>,
}

impl DetectionReport {
    fn degraded(total_points: usize, error: impl Into<String>) -> Self {
        Self {
            anomalies: Vec::new(),
            confidence: 0.0,
            total_points,
            anomaly_rate: 0.0,
            model_type: MODEL_TYPE.to_string(),
            error: Some(error.into()),
        }
    }

    pub fn high_severity_count(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| a.severity == Severity::High)
            .count()
    }
}

/// Description of the detector and its optional model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub model_path: Option<PathBuf>,
    pub model_loaded: bool,
    pub file_valid: Option<bool>,
    pub description: String,
    pub capabilities: Vec<String>,
    pub supported_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Scan a dataset. Never fails: errors yield an empty anomaly list
    /// with zero confidence.
    pub fn detect(&self, dataset: &Dataset) -> DetectionReport {
        info!("Running anomaly detection over {} points", dataset.len());

        match self.try_detect(dataset) {
            Ok(report) => {
                info!(
                    "Anomaly detection completed: anomalies={}, confidence={}",
                    report.anomalies.len(),
                    report.confidence
                );
                report
            }
            Err(e) => {
                warn!("Anomaly detection failed: {}", e);
                DetectionReport::degraded(dataset.len(), e.to_string())
            }
        }
    }

    fn try_detect(&self, dataset: &Dataset) -> Result<DetectionReport> {
        self.config.validate()?;

        let total_points = dataset.len();
        if total_points == 0 {
            return Ok(DetectionReport {
                anomalies: Vec::new(),
                confidence: 0.0,
                total_points,
                anomaly_rate: 0.0,
                model_type: MODEL_TYPE.to_string(),
                error: None,
            });
        }

        let mut anomalies = Vec::new();
        if dataset.has_field(Field::Depth) {
            let order = sequence_order(dataset);
            anomalies.extend(self.detect_depth_jumps(dataset, &order));
            anomalies.extend(detect_unrealistic_depths(dataset, &order));
            anomalies.extend(self.detect_coordinate_duplicates(dataset));
        } else {
            debug!("No depth values present, skipping sequence checks");
        }

        let confidence = scoring::detection_confidence(&anomalies, total_points);
        let anomaly_rate = anomalies.len() as f64 / total_points as f64;

        Ok(DetectionReport {
            anomalies,
            confidence,
            total_points,
            anomaly_rate,
            model_type: MODEL_TYPE.to_string(),
            error: None,
        })
    }

    fn detect_depth_jumps(&self, dataset: &Dataset, order: &[usize]) -> Vec<Anomaly> {
        let threshold = self.config.jump_threshold;
        let high = self.config.high_severity_jump;

        order
            .windows(2)
            .filter_map(|pair| {
                let previous = Field::Depth.value_of(&dataset.readings[pair[0]])?;
                let current = Field::Depth.value_of(&dataset.readings[pair[1]])?;
                let diff = current - previous;

                if diff.abs() <= threshold {
                    return None;
                }

                Some(Anomaly {
                    location: AnomalyLocation::Index(pair[1]),
                    kind: AnomalyKind::DepthJump,
                    severity: if diff.abs() > high {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    field: Some(Field::Depth),
                    observed_value: diff,
                    threshold: threshold.to_string(),
                    confidence: (diff.abs() / high).min(1.0),
                    description: format!("Depth jump of {:.2}m detected", diff),
                })
            })
            .collect()
    }

    fn detect_coordinate_duplicates(&self, dataset: &Dataset) -> Vec<Anomaly> {
        let mut groups: HashMap<(u64, u64), (f64, f64, usize)> = HashMap::new();

        for reading in &dataset.readings {
            let (lat, lon) = (reading.latitude, reading.longitude);
            if lat.is_nan() || lon.is_nan() {
                continue;
            }
            // +0.0 and -0.0 are the same position
            let key = ((lat + 0.0).to_bits(), (lon + 0.0).to_bits());
            groups.entry(key).or_insert((lat, lon, 0)).2 += 1;
        }

        let mut clusters: Vec<(f64, f64, usize)> = groups
            .into_values()
            .filter(|(_, _, count)| *count > self.config.duplicate_cluster_size)
            .collect();
        clusters.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        clusters
            .into_iter()
            .map(|(lat, lon, count)| Anomaly {
                location: AnomalyLocation::Multiple,
                kind: AnomalyKind::CoordinateDuplicate,
                severity: Severity::Medium,
                field: None,
                observed_value: count as f64,
                threshold: self.config.duplicate_cluster_size.to_string(),
                confidence: (count as f64 / self.config.duplicate_confidence_scale).min(1.0),
                description: format!(
                    "Duplicate coordinates: {} points at ({:.6}, {:.6})",
                    count, lat, lon
                ),
            })
            .collect()
    }

    pub fn model_info(&self) -> ModelInfo {
        let file_valid = self
            .config
            .model_path
            .as_ref()
            .map(|_| self.config.validate().is_ok());

        ModelInfo {
            model_type: MODEL_TYPE.to_string(),
            model_path: self.config.model_path.clone(),
            model_loaded: file_valid.unwrap_or(false),
            file_valid,
            description: "Deterministic anomaly detection for ocean mapping data".to_string(),
            capabilities: vec![
                "depth_jump_detection".to_string(),
                "unrealistic_depth_detection".to_string(),
                "coordinate_duplicate_detection".to_string(),
            ],
            supported_extensions: MODEL_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Reading indices in scan order: by timestamp when any reading has one
/// (stable, missing timestamps last), else ingestion order
fn sequence_order(dataset: &Dataset) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dataset.len()).collect();
    if dataset.has_timestamps() {
        order.sort_by_key(|&i| {
            let timestamp = dataset.readings[i].timestamp;
            (timestamp.is_none(), timestamp)
        });
    }
    order
}

fn detect_unrealistic_depths(dataset: &Dataset, order: &[usize]) -> Vec<Anomaly> {
    let (min, max) = ranges::DEPTH;

    order
        .iter()
        .filter_map(|&index| {
            let depth = Field::Depth.value_of(&dataset.readings[index])?;
            if depth >= min && depth <= max {
                return None;
            }
            Some(Anomaly {
                location: AnomalyLocation::Index(index),
                kind: AnomalyKind::UnrealisticDepth,
                severity: Severity::High,
                field: Some(Field::Depth),
                observed_value: depth,
                threshold: format!("{}-{}m", min, max),
                confidence: 1.0,
                description: format!("Unrealistic depth value: {:.2}m", depth),
            })
        })
        .collect()
}
