//! Deterministic rule-based quality evaluation.
//!
//! Each sensor family declares which fields are range-checked and which
//! fields feed the summary statistics. Two cross-record checks run on
//! top of the range rules for recognised families: duplicate timestamps
//! and a 3-sigma depth consistency test.

use crate::config::QualityControlConfig;
use crate::constants::{
    DEPTH_CONSISTENCY_MIN_READINGS, DEPTH_CONSISTENCY_MIN_VALUES, DEPTH_OUTLIER_SIGMA,
};
use crate::error::{MapperError, Result};
use crate::models::{
    Anomaly, AnomalyKind, AnomalyLocation, Dataset, Field, FieldStatistics, QcStatus,
    QualityReport, SensorType, Severity,
};
use crate::qc::scoring;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Rule set selected by a sensor label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSet {
    Mbes,
    /// SBES, single-beam and AUV share the navigation rules
    Sonar,
    Lidar,
    /// Coordinates and vertical ranges only
    Generic,
}

impl RuleSet {
    /// Resolve a free-form sensor label; unknown labels use the generic set
    pub fn for_label(label: &str) -> Self {
        match label.parse::<SensorType>() {
            Ok(sensor) => Self::for_sensor(sensor),
            Err(_) => RuleSet::Generic,
        }
    }

    pub fn for_sensor(sensor: SensorType) -> Self {
        match sensor {
            SensorType::Mbes => RuleSet::Mbes,
            SensorType::Sbes | SensorType::Singlebeam | SensorType::Auv => RuleSet::Sonar,
            SensorType::Lidar => RuleSet::Lidar,
        }
    }

    pub fn range_fields(&self) -> &'static [Field] {
        match self {
            RuleSet::Mbes => &[
                Field::Latitude,
                Field::Longitude,
                Field::Depth,
                Field::BeamAngle,
                Field::Quality,
            ],
            RuleSet::Sonar => &[
                Field::Latitude,
                Field::Longitude,
                Field::Depth,
                Field::Heading,
                Field::Pitch,
                Field::Roll,
                Field::Velocity,
            ],
            RuleSet::Lidar => &[
                Field::Latitude,
                Field::Longitude,
                Field::Elevation,
                Field::Intensity,
                Field::Classification,
            ],
            RuleSet::Generic => &[
                Field::Latitude,
                Field::Longitude,
                Field::Depth,
                Field::Elevation,
            ],
        }
    }

    pub fn statistics_fields(&self) -> &'static [Field] {
        match self {
            RuleSet::Mbes => &[Field::Depth, Field::BeamAngle],
            RuleSet::Sonar => &[Field::Depth],
            RuleSet::Lidar => &[Field::Elevation],
            RuleSet::Generic => &Field::ALL,
        }
    }

    pub fn runs_cross_record_checks(&self) -> bool {
        !matches!(self, RuleSet::Generic)
    }
}

/// Kind and severity reported when a field leaves its range
fn range_class(field: Field) -> (AnomalyKind, Severity, &'static str) {
    match field {
        Field::Latitude | Field::Longitude => (AnomalyKind::CoordinateRange, Severity::High, ""),
        Field::Depth => (AnomalyKind::DepthRange, Severity::High, "m"),
        Field::Elevation => (AnomalyKind::ElevationRange, Severity::High, "m"),
        Field::BeamAngle => (AnomalyKind::BeamAngleRange, Severity::Medium, "°"),
        Field::Quality => (AnomalyKind::QualityRange, Severity::Medium, ""),
        Field::Heading | Field::Pitch | Field::Roll => {
            (AnomalyKind::NavigationRange, Severity::Medium, "°")
        }
        Field::Velocity => (AnomalyKind::VelocityRange, Severity::Medium, "m/s"),
        Field::Intensity => (AnomalyKind::IntensityRange, Severity::Low, ""),
        Field::Classification => (AnomalyKind::ClassificationRange, Severity::Medium, ""),
    }
}

/// Stateless quality rule evaluator
#[derive(Debug, Clone, Default)]
pub struct QualityRuleEngine {
    config: QualityControlConfig,
}

impl QualityRuleEngine {
    pub fn new(config: QualityControlConfig) -> Self {
        Self { config }
    }

    /// Evaluate a dataset. Never fails: internal errors yield a `failed`
    /// report with a zero score.
    pub fn evaluate(&self, dataset: &Dataset, sensor_label: &str) -> QualityReport {
        info!(
            "Applying QC rules: sensor={}, points={}",
            sensor_label,
            dataset.len()
        );

        if dataset.is_empty() {
            return QualityReport::no_data();
        }

        match self.try_evaluate(dataset, sensor_label) {
            Ok(report) => {
                info!(
                    "QC rules applied: score={}, anomalies={}",
                    report.quality_score,
                    report.anomalies.len()
                );
                report
            }
            Err(e) => {
                warn!("QC rules application failed: {}", e);
                QualityReport::failed(dataset.len(), e.to_string())
            }
        }
    }

    fn try_evaluate(&self, dataset: &Dataset, sensor_label: &str) -> Result<QualityReport> {
        self.config.validate()?;

        let rule_set = RuleSet::for_label(sensor_label);
        debug!("Using {:?} rule set for '{}'", rule_set, sensor_label);

        let mut anomalies = Vec::new();
        let mut rules_applied = BTreeSet::new();

        for &field in rule_set.range_fields() {
            if !dataset.has_field(field) {
                continue;
            }
            anomalies.extend(self.check_range(dataset, field)?);
            rules_applied.insert(format!("{}_range_check", field));
        }

        if rule_set.runs_cross_record_checks() {
            if dataset.has_timestamps() {
                anomalies.extend(check_duplicate_timestamps(dataset));
                rules_applied.insert("duplicate_timestamp_check".to_string());
            }
            if dataset.has_field(Field::Depth) {
                anomalies.extend(check_depth_consistency(dataset));
                rules_applied.insert("depth_consistency_check".to_string());
            }
        }

        let statistics = calculate_statistics(dataset, rule_set.statistics_fields());
        let quality_score = scoring::quality_score(&anomalies, dataset.len());

        Ok(QualityReport {
            status: QcStatus::Completed,
            anomalies,
            rules_applied,
            statistics,
            quality_score,
            total_points: dataset.len(),
            error: None,
        })
    }

    fn check_range(&self, dataset: &Dataset, field: Field) -> Result<Vec<Anomaly>> {
        let (min, max) = self.config.range_for(field);
        if min > max {
            return Err(MapperError::QualityEvaluation {
                message: format!("empty range for {}", field),
            });
        }
        let (kind, severity, unit) = range_class(field);

        Ok(dataset
            .field_values(field)
            .into_iter()
            .filter(|(_, value)| *value < min || *value > max)
            .map(|(index, value)| Anomaly {
                location: AnomalyLocation::Index(index),
                kind,
                severity,
                field: Some(field),
                observed_value: value,
                threshold: format!("{}-{}{}", min, max, unit),
                confidence: 1.0,
                description: format!("Invalid {} value: {}{}", field, value, unit),
            })
            .collect())
    }
}

/// One aggregate anomaly counting every reading whose timestamp repeats
fn check_duplicate_timestamps(dataset: &Dataset) -> Option<Anomaly> {
    let mut counts = HashMap::new();
    for timestamp in dataset.readings.iter().filter_map(|r| r.timestamp) {
        *counts.entry(timestamp).or_insert(0usize) += 1;
    }

    let duplicated: usize = counts.values().filter(|&&n| n > 1).sum();
    if duplicated == 0 {
        return None;
    }

    Some(Anomaly {
        location: AnomalyLocation::Multiple,
        kind: AnomalyKind::DuplicateTimestamp,
        severity: Severity::Medium,
        field: None,
        observed_value: duplicated as f64,
        threshold: "0".to_string(),
        confidence: 1.0,
        description: format!("Found {} duplicate timestamps", duplicated),
    })
}

/// Depth values further than three sample standard deviations from the mean
fn check_depth_consistency(dataset: &Dataset) -> Vec<Anomaly> {
    if dataset.len() < DEPTH_CONSISTENCY_MIN_READINGS {
        return Vec::new();
    }

    let depths = dataset.field_values(Field::Depth);
    if depths.len() < DEPTH_CONSISTENCY_MIN_VALUES {
        return Vec::new();
    }

    let values: Vec<f64> = depths.iter().map(|(_, v)| *v).collect();
    let Some(stats) = FieldStatistics::from_values(&values) else {
        return Vec::new();
    };
    let limit = DEPTH_OUTLIER_SIGMA * stats.std_dev;

    depths
        .into_iter()
        .filter(|(_, value)| (value - stats.mean).abs() > limit)
        .map(|(index, value)| Anomaly {
            location: AnomalyLocation::Index(index),
            kind: AnomalyKind::DepthOutlier,
            severity: Severity::Medium,
            field: Some(Field::Depth),
            observed_value: value,
            threshold: format!("3σ from mean ({:.2}±{:.2})", stats.mean, stats.std_dev),
            confidence: 1.0,
            description: format!("Depth outlier: {}m", value),
        })
        .collect()
}

fn calculate_statistics(dataset: &Dataset, fields: &[Field]) -> BTreeMap<String, FieldStatistics> {
    fields
        .iter()
        .filter_map(|&field| {
            let values: Vec<f64> = dataset
                .field_values(field)
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            FieldStatistics::from_values(&values).map(|stats| (field.to_string(), stats))
        })
        .collect()
}
