//! Anomaly detector tests

use super::{base_time, depth_line};
use crate::config::DetectorConfig;
use crate::models::{AnomalyKind, AnomalyLocation, Dataset, SensorReading, Severity};
use crate::qc::AnomalyDetector;
use chrono::Duration;

#[test]
fn test_sequential_depth_jumps() {
    let dataset = depth_line(&[10.5, 12.3, 15.7, 200.0, 18.2]);
    let report = AnomalyDetector::default().detect(&dataset);

    assert_eq!(report.total_points, 5);
    let jumps: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::DepthJump)
        .collect();
    assert_eq!(jumps.len(), 2);

    assert_eq!(jumps[0].location, AnomalyLocation::Index(3));
    assert!((jumps[0].observed_value - 184.3).abs() < 1e-9);
    assert_eq!(jumps[0].severity, Severity::Medium);
    assert!((jumps[0].confidence - 184.3 / 200.0).abs() < 1e-9);

    assert_eq!(jumps[1].location, AnomalyLocation::Index(4));
    assert!((jumps[1].observed_value + 181.8).abs() < 1e-9);
    assert_eq!(jumps[1].severity, Severity::Medium);

    // 2 anomalies over 5 points
    assert_eq!(report.confidence, 0.5);
    assert!(report.error.is_none());
}

#[test]
fn test_large_jump_is_high_severity() {
    let dataset = depth_line(&[10.0, 400.0]);
    let report = AnomalyDetector::default().detect(&dataset);

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].severity, Severity::High);
    assert_eq!(report.anomalies[0].confidence, 1.0);
    assert!(report.confidence <= 0.6);
}

#[test]
fn test_readings_sorted_by_timestamp() {
    // Ingestion order 10, 500, 20 but the 500 m reading is last in time
    let mut dataset = depth_line(&[10.0, 500.0, 20.0]);
    dataset.readings[1].timestamp = Some(super::base_time() + Duration::seconds(10));

    let report = AnomalyDetector::default().detect(&dataset);
    let jumps: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::DepthJump)
        .collect();

    assert_eq!(jumps.len(), 1);
    // Jump 20 -> 500 reported at the original index of the later reading
    assert_eq!(jumps[0].location, AnomalyLocation::Index(1));
    assert_eq!(jumps[0].observed_value, 480.0);
}

#[test]
fn test_missing_depth_breaks_the_sequence() {
    let mut dataset = depth_line(&[10.0, 0.0, 300.0]);
    dataset.readings[1].vertical = None;

    let report = AnomalyDetector::default().detect(&dataset);
    assert!(
        !report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::DepthJump)
    );
}

#[test]
fn test_unrealistic_depth() {
    let dataset = depth_line(&[50.0, -20.0, 60.0]);
    let report = AnomalyDetector::default().detect(&dataset);

    let unrealistic: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::UnrealisticDepth)
        .collect();
    assert_eq!(unrealistic.len(), 1);
    assert_eq!(unrealistic[0].location, AnomalyLocation::Index(1));
    assert_eq!(unrealistic[0].severity, Severity::High);
    assert_eq!(unrealistic[0].confidence, 1.0);
}

#[test]
fn test_coordinate_duplicate_cluster() {
    let readings: Vec<SensorReading> = (0..12)
        .map(|i| {
            SensorReading::sounding(45.0, -60.0, 100.0)
                .with_timestamp(base_time() + Duration::seconds(i))
        })
        .collect();
    let report = AnomalyDetector::default().detect(&Dataset::new(readings));

    assert_eq!(report.anomalies.len(), 1);
    let cluster = &report.anomalies[0];
    assert_eq!(cluster.kind, AnomalyKind::CoordinateDuplicate);
    assert_eq!(cluster.location, AnomalyLocation::Multiple);
    assert_eq!(cluster.observed_value, 12.0);
    assert!((cluster.confidence - 0.24).abs() < 1e-12);
}

#[test]
fn test_ten_duplicates_is_not_a_cluster() {
    let readings: Vec<SensorReading> = (0..10)
        .map(|_| SensorReading::sounding(45.0, -60.0, 100.0))
        .collect();
    let report = AnomalyDetector::default().detect(&Dataset::new(readings));

    assert!(report.anomalies.is_empty());
    assert_eq!(report.confidence, 0.9);
}

#[test]
fn test_empty_dataset_has_zero_confidence() {
    let report = AnomalyDetector::default().detect(&Dataset::default());

    assert!(report.anomalies.is_empty());
    assert_eq!(report.confidence, 0.0);
    assert_eq!(report.total_points, 0);
}

#[test]
fn test_invalid_model_path_degrades() {
    let detector =
        AnomalyDetector::new(DetectorConfig::default().with_model_path("/nonexistent/model.onnx"));
    let report = detector.detect(&depth_line(&[10.0, 400.0]));

    assert!(report.anomalies.is_empty());
    assert_eq!(report.confidence, 0.0);
    assert!(report.error.is_some());

    let info = detector.model_info();
    assert_eq!(info.model_type, "deterministic_stub");
    assert_eq!(info.file_valid, Some(false));
    assert!(!info.model_loaded);
}

#[test]
fn test_model_info_without_model() {
    let info = AnomalyDetector::default().model_info();

    assert_eq!(info.file_valid, None);
    assert_eq!(info.capabilities.len(), 3);
    assert!(info.supported_extensions.contains(&"onnx".to_string()));
}
