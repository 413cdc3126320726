//! Core data structures and types for ocean mapping conversion.
//!
//! Defines sensor types, the sounding record that flows through every
//! pipeline stage, datasets, anomalies, quality reports and batch
//! processing statistics.

use crate::error::{MapperError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sensor families supported by the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Mbes,
    Sbes,
    Lidar,
    Singlebeam,
    Auv,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Mbes => "mbes",
            SensorType::Sbes => "sbes",
            SensorType::Lidar => "lidar",
            SensorType::Singlebeam => "singlebeam",
            SensorType::Auv => "auv",
        }
    }

    /// Detect sensor type from filename pattern
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("mbes") || name.contains("multibeam") {
            Some(SensorType::Mbes)
        } else if name.contains("lidar") || name.contains("las") {
            Some(SensorType::Lidar)
        } else if name.contains("singlebeam") {
            Some(SensorType::Singlebeam)
        } else if name.contains("sbes") || name.contains("sbet") {
            Some(SensorType::Sbes)
        } else if name.contains("auv") {
            Some(SensorType::Auv)
        } else {
            None
        }
    }

    /// LiDAR measures elevation; every sonar family measures depth
    pub fn vertical_field(&self) -> Field {
        match self {
            SensorType::Lidar => Field::Elevation,
            _ => Field::Depth,
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mbes" => Ok(SensorType::Mbes),
            "sbes" => Ok(SensorType::Sbes),
            "lidar" => Ok(SensorType::Lidar),
            "singlebeam" => Ok(SensorType::Singlebeam),
            "auv" => Ok(SensorType::Auv),
            other => Err(MapperError::validation(format!(
                "Invalid sensor type: {}. Must be one of: {:?}",
                other,
                crate::constants::SENSOR_TYPES
            ))),
        }
    }
}

/// Vertical component of a sounding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
    /// Positive-down depth in meters
    Depth(f64),
    /// Elevation in meters
    Elevation(f64),
}

impl Vertical {
    pub fn value(&self) -> f64 {
        match self {
            Vertical::Depth(v) | Vertical::Elevation(v) => *v,
        }
    }
}

/// Numeric fields a sounding may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Latitude,
    Longitude,
    Depth,
    Elevation,
    BeamAngle,
    Quality,
    Heading,
    Pitch,
    Roll,
    Velocity,
    Intensity,
    Classification,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Latitude,
        Field::Longitude,
        Field::Depth,
        Field::Elevation,
        Field::BeamAngle,
        Field::Quality,
        Field::Heading,
        Field::Pitch,
        Field::Roll,
        Field::Velocity,
        Field::Intensity,
        Field::Classification,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::Depth => "depth",
            Field::Elevation => "elevation",
            Field::BeamAngle => "beam_angle",
            Field::Quality => "quality",
            Field::Heading => "heading",
            Field::Pitch => "pitch",
            Field::Roll => "roll",
            Field::Velocity => "velocity",
            Field::Intensity => "intensity",
            Field::Classification => "classification",
        }
    }

    /// Read this field from a reading; NaN counts as missing
    pub fn value_of(&self, reading: &SensorReading) -> Option<f64> {
        let value = match self {
            Field::Latitude => Some(reading.latitude),
            Field::Longitude => Some(reading.longitude),
            Field::Depth => match reading.vertical {
                Some(Vertical::Depth(v)) => Some(v),
                _ => None,
            },
            Field::Elevation => match reading.vertical {
                Some(Vertical::Elevation(v)) => Some(v),
                _ => None,
            },
            Field::BeamAngle => reading.beam_angle,
            Field::Quality => reading.quality,
            Field::Heading => reading.heading,
            Field::Pitch => reading.pitch,
            Field::Roll => reading.roll,
            Field::Velocity => reading.velocity,
            Field::Intensity => reading.intensity,
            Field::Classification => reading.classification,
        };
        value.filter(|v| !v.is_nan())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sounding: a depth or elevation measurement with position and time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub vertical: Option<Vertical>,
    pub quality: Option<f64>,
    pub beam_angle: Option<f64>,
    pub vessel_id: Option<String>,
    pub vessel_name: Option<String>,
    pub survey_id: Option<String>,
    pub heading: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub velocity: Option<f64>,
    pub intensity: Option<f64>,
    pub classification: Option<f64>,
    /// Request coordinate jitter during anonymization
    #[serde(default)]
    pub gps_jitter: bool,
}

impl SensorReading {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }

    /// A sonar sounding at a position with a depth
    pub fn sounding(latitude: f64, longitude: f64, depth: f64) -> Self {
        Self::new(latitude, longitude).with_depth(depth)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.vertical = Some(Vertical::Depth(depth));
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.vertical = Some(Vertical::Elevation(elevation));
        self
    }

    pub fn with_vessel_id(mut self, vessel_id: impl Into<String>) -> Self {
        self.vessel_id = Some(vessel_id.into());
        self
    }

    pub fn with_vessel_name(mut self, vessel_name: impl Into<String>) -> Self {
        self.vessel_name = Some(vessel_name.into());
        self
    }

    pub fn with_survey_id(mut self, survey_id: impl Into<String>) -> Self {
        self.survey_id = Some(survey_id.into());
        self
    }

    pub fn with_gps_jitter(mut self) -> Self {
        self.gps_jitter = true;
        self
    }

    pub fn with_field(mut self, field: Field, value: f64) -> Self {
        self.set_field(field, value);
        self
    }

    pub fn set_field(&mut self, field: Field, value: f64) {
        match field {
            Field::Latitude => self.latitude = value,
            Field::Longitude => self.longitude = value,
            Field::Depth => self.vertical = Some(Vertical::Depth(value)),
            Field::Elevation => self.vertical = Some(Vertical::Elevation(value)),
            Field::BeamAngle => self.beam_angle = Some(value),
            Field::Quality => self.quality = Some(value),
            Field::Heading => self.heading = Some(value),
            Field::Pitch => self.pitch = Some(value),
            Field::Roll => self.roll = Some(value),
            Field::Velocity => self.velocity = Some(value),
            Field::Intensity => self.intensity = Some(value),
            Field::Classification => self.classification = Some(value),
        }
    }

    /// Depth or elevation, whichever the sensor measured
    pub fn vertical_value(&self) -> Option<f64> {
        self.vertical.map(|v| v.value()).filter(|v| !v.is_nan())
    }

    /// Position and vertical value when all three are finite
    pub fn valid_triple(&self) -> Option<(f64, f64, f64)> {
        let z = self.vertical_value()?;
        if self.latitude.is_finite() && self.longitude.is_finite() && z.is_finite() {
            Some((self.longitude, self.latitude, z))
        } else {
            None
        }
    }
}

/// Anonymization bookkeeping attached to a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationInfo {
    pub applied: bool,
    pub salt_used: bool,
    pub identifiers_hashed: usize,
    pub gps_jittered: usize,
    pub reversed: bool,
}

/// Descriptive metadata carried alongside the readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub sensor_type: Option<String>,
    pub coordinate_system: Option<String>,
    pub units: BTreeMap<String, String>,
    pub provenance: BTreeMap<String, String>,
    pub anonymization: Option<AnonymizationInfo>,
    /// Non-fatal warnings raised by degrading stages
    pub annotations: Vec<String>,
}

/// Ordered collection of readings plus metadata
///
/// Insertion order is significant: the sequential depth-jump rule reads
/// readings in ingestion order when no timestamps are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub readings: Vec<SensorReading>,
    pub metadata: DatasetMetadata,
}

impl Dataset {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            readings,
            metadata: DatasetMetadata::default(),
        }
    }

    pub fn with_sensor_type(mut self, sensor_type: impl Into<String>) -> Self {
        self.metadata.sensor_type = Some(sensor_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// True when at least one reading carries the field
    pub fn has_field(&self, field: Field) -> bool {
        self.readings.iter().any(|r| field.value_of(r).is_some())
    }

    pub fn has_timestamps(&self) -> bool {
        self.readings.iter().any(|r| r.timestamp.is_some())
    }

    /// Present values of a field, paired with their reading index
    pub fn field_values(&self, field: Field) -> Vec<(usize, f64)> {
        self.readings
            .iter()
            .enumerate()
            .filter_map(|(i, r)| field.value_of(r).map(|v| (i, v)))
            .collect()
    }

    /// Copy of this dataset with the readings replaced
    pub fn with_readings(&self, readings: Vec<SensorReading>) -> Self {
        Self {
            readings,
            metadata: self.metadata.clone(),
        }
    }
}

/// Anomaly severity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Where an anomaly was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyLocation {
    Index(usize),
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    CoordinateRange,
    DepthRange,
    ElevationRange,
    BeamAngleRange,
    QualityRange,
    NavigationRange,
    VelocityRange,
    IntensityRange,
    ClassificationRange,
    DuplicateTimestamp,
    DepthOutlier,
    DepthJump,
    UnrealisticDepth,
    CoordinateDuplicate,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::CoordinateRange => "coordinate_range",
            AnomalyKind::DepthRange => "depth_range",
            AnomalyKind::ElevationRange => "elevation_range",
            AnomalyKind::BeamAngleRange => "beam_angle_range",
            AnomalyKind::QualityRange => "quality_range",
            AnomalyKind::NavigationRange => "navigation_range",
            AnomalyKind::VelocityRange => "velocity_range",
            AnomalyKind::IntensityRange => "intensity_range",
            AnomalyKind::ClassificationRange => "classification_range",
            AnomalyKind::DuplicateTimestamp => "duplicate_timestamp",
            AnomalyKind::DepthOutlier => "depth_outlier",
            AnomalyKind::DepthJump => "depth_jump",
            AnomalyKind::UnrealisticDepth => "unrealistic_depth",
            AnomalyKind::CoordinateDuplicate => "coordinate_duplicate",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation of suspicious data. Never deduplicated by producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub location: AnomalyLocation,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub field: Option<Field>,
    pub observed_value: f64,
    pub threshold: String,
    pub confidence: f64,
    pub description: String,
}

/// Summary statistics for one numeric field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (n - 1); zero for fewer than two values
    pub std_dev: f64,
}

impl FieldStatistics {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        };

        Some(Self {
            count,
            min,
            max,
            mean,
            std_dev,
        })
    }
}

/// Outcome of a quality evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Completed,
    NoData,
    Failed,
    Skipped,
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QcStatus::Completed => "completed",
            QcStatus::NoData => "no_data",
            QcStatus::Failed => "failed",
            QcStatus::Skipped => "skipped",
        })
    }
}

/// Result of rule-based quality evaluation over one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub status: QcStatus,
    pub anomalies: Vec<Anomaly>,
    pub rules_applied: BTreeSet<String>,
    pub statistics: BTreeMap<String, FieldStatistics>,
    pub quality_score: f64,
    pub total_points: usize,
    pub error: Option<String>,
}

impl QualityReport {
    pub fn with_status(status: QcStatus, total_points: usize) -> Self {
        Self {
            status,
            anomalies: Vec::new(),
            rules_applied: BTreeSet::new(),
            statistics: BTreeMap::new(),
            quality_score: 0.0,
            total_points,
            error: None,
        }
    }

    pub fn no_data() -> Self {
        Self::with_status(QcStatus::NoData, 0)
    }

    pub fn failed(total_points: usize, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(QcStatus::Failed, total_points)
        }
    }

    pub fn skipped(total_points: usize) -> Self {
        Self::with_status(QcStatus::Skipped, total_points)
    }

    pub fn high_severity_count(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| a.severity == Severity::High)
            .count()
    }
}

/// Geographic and vertical extent of a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_depth: f64,
    pub max_depth: f64,
}

impl SpatialExtent {
    /// Extent over finite values; all zeros for an empty dataset
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let finite = |values: Vec<f64>| -> (f64, f64) {
            let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
            if values.is_empty() {
                (0.0, 0.0)
            } else {
                (
                    values.iter().copied().fold(f64::INFINITY, f64::min),
                    values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                )
            }
        };

        let (min_lat, max_lat) = finite(dataset.readings.iter().map(|r| r.latitude).collect());
        let (min_lon, max_lon) = finite(dataset.readings.iter().map(|r| r.longitude).collect());
        let (min_depth, max_depth) = finite(
            dataset
                .readings
                .iter()
                .filter_map(|r| r.vertical_value())
                .collect(),
        );

        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            min_depth,
            max_depth,
        }
    }
}

/// Batch processing statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingStats {
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_cached: usize,
    pub jobs_cancelled: usize,
    pub total_points: usize,
    pub output_files: Vec<PathBuf>,
    pub processing_time_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_type_parsing() {
        assert_eq!("MBES".parse::<SensorType>().unwrap(), SensorType::Mbes);
        assert_eq!(" lidar ".parse::<SensorType>().unwrap(), SensorType::Lidar);

        let err = "sidescan".parse::<SensorType>().unwrap_err();
        assert!(matches!(err, MapperError::Validation { .. }));
        assert!(err.to_string().contains("sidescan"));
    }

    #[test]
    fn test_sensor_type_from_path() {
        assert_eq!(
            SensorType::from_path(Path::new("/data/survey_mbes_2024.csv")),
            Some(SensorType::Mbes)
        );
        assert_eq!(
            SensorType::from_path(Path::new("coastal_lidar.csv")),
            Some(SensorType::Lidar)
        );
        assert_eq!(SensorType::from_path(Path::new("unknown.csv")), None);
    }

    #[test]
    fn test_field_value_treats_nan_as_missing() {
        let reading =
            SensorReading::sounding(10.0, 20.0, f64::NAN).with_field(Field::Heading, 90.0);

        assert_eq!(Field::Latitude.value_of(&reading), Some(10.0));
        assert_eq!(Field::Depth.value_of(&reading), None);
        assert_eq!(Field::Elevation.value_of(&reading), None);
        assert_eq!(Field::Heading.value_of(&reading), Some(90.0));
        assert_eq!(reading.valid_triple(), None);
    }

    #[test]
    fn test_field_statistics_sample_std() {
        let stats =
            FieldStatistics::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();

        assert_eq!(stats.count, 8);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);

        let single = FieldStatistics::from_values(&[3.0]).unwrap();
        assert_eq!(single.std_dev, 0.0);
        assert!(FieldStatistics::from_values(&[]).is_none());
    }

    #[test]
    fn test_spatial_extent() {
        let dataset = Dataset::new(vec![
            SensorReading::sounding(40.0, -70.0, 10.0),
            SensorReading::sounding(41.0, -71.0, 30.0),
            SensorReading::new(40.5, -70.5),
        ]);
        let extent = SpatialExtent::from_dataset(&dataset);

        assert_eq!(extent.min_lat, 40.0);
        assert_eq!(extent.max_lat, 41.0);
        assert_eq!(extent.min_lon, -71.0);
        assert_eq!(extent.max_lon, -70.0);
        assert_eq!(extent.min_depth, 10.0);
        assert_eq!(extent.max_depth, 30.0);

        assert_eq!(
            SpatialExtent::from_dataset(&Dataset::default()),
            SpatialExtent::default()
        );
    }
}
