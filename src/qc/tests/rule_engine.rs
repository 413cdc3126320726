//! Rule engine tests

use super::{base_time, depth_line};
use crate::config::QualityControlConfig;
use crate::models::{
    AnomalyKind, AnomalyLocation, Dataset, Field, QcStatus, SensorReading, Severity,
};
use crate::qc::{QualityRuleEngine, RuleSet};

#[test]
fn test_empty_dataset_reports_no_data() {
    let report = QualityRuleEngine::default().evaluate(&Dataset::default(), "mbes");

    assert_eq!(report.status, QcStatus::NoData);
    assert_eq!(report.quality_score, 0.0);
    assert_eq!(report.total_points, 0);
    assert!(report.anomalies.is_empty());
}

#[test]
fn test_clean_mbes_dataset_scores_one() {
    let dataset = depth_line(&[20.0, 21.0, 22.0, 21.5]);
    let report = QualityRuleEngine::default().evaluate(&dataset, "mbes");

    assert_eq!(report.status, QcStatus::Completed);
    assert_eq!(report.quality_score, 1.0);
    assert!(report.rules_applied.contains("latitude_range_check"));
    assert!(report.rules_applied.contains("depth_range_check"));
    assert!(report.rules_applied.contains("duplicate_timestamp_check"));
    // Beam angle absent, so its rule is not applied
    assert!(!report.rules_applied.contains("beam_angle_range_check"));

    let depth = report.statistics.get("depth").unwrap();
    assert_eq!(depth.count, 4);
    assert_eq!(depth.min, 20.0);
    assert_eq!(depth.max, 22.0);
}

#[test]
fn test_range_violations_carry_field_severity() {
    let readings = vec![
        SensorReading::sounding(95.0, 10.0, 20.0),
        SensorReading::sounding(10.0, 10.0, -5.0),
        SensorReading::sounding(10.0, 10.0, 20.0).with_field(Field::BeamAngle, 120.0),
        SensorReading::sounding(10.0, 10.0, 20.0).with_field(Field::Quality, 150.0),
    ];
    let report = QualityRuleEngine::default().evaluate(&Dataset::new(readings), "MBES");

    let kinds: Vec<(AnomalyKind, Severity, AnomalyLocation)> = report
        .anomalies
        .iter()
        .map(|a| (a.kind, a.severity, a.location))
        .collect();

    assert!(kinds.contains(&(
        AnomalyKind::CoordinateRange,
        Severity::High,
        AnomalyLocation::Index(0)
    )));
    assert!(kinds.contains(&(
        AnomalyKind::DepthRange,
        Severity::High,
        AnomalyLocation::Index(1)
    )));
    assert!(kinds.contains(&(
        AnomalyKind::BeamAngleRange,
        Severity::Medium,
        AnomalyLocation::Index(2)
    )));
    assert!(kinds.contains(&(
        AnomalyKind::QualityRange,
        Severity::Medium,
        AnomalyLocation::Index(3)
    )));

    let depth = report
        .anomalies
        .iter()
        .find(|a| a.kind == AnomalyKind::DepthRange)
        .unwrap();
    assert_eq!(depth.threshold, "0-12000m");
    assert_eq!(depth.observed_value, -5.0);

    // 4 anomalies over 4 points, capped by high severity anyway
    assert_eq!(report.quality_score, 0.2);
}

#[test]
fn test_lidar_rules() {
    let readings = vec![
        SensorReading::new(10.0, 10.0)
            .with_elevation(12_000.0)
            .with_field(Field::Intensity, 300.0),
        SensorReading::new(10.0, 10.0)
            .with_elevation(5.0)
            .with_field(Field::Classification, 40.0),
    ];
    let report = QualityRuleEngine::default().evaluate(&Dataset::new(readings), "lidar");

    let intensity = report
        .anomalies
        .iter()
        .find(|a| a.kind == AnomalyKind::IntensityRange)
        .unwrap();
    assert_eq!(intensity.severity, Severity::Low);
    assert!(
        report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::ElevationRange && a.severity == Severity::High)
    );
    assert!(
        report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::ClassificationRange)
    );
    assert!(report.statistics.contains_key("elevation"));
    assert!(!report.rules_applied.contains("depth_consistency_check"));
}

#[test]
fn test_sonar_navigation_rules() {
    let readings = vec![
        SensorReading::sounding(10.0, 10.0, 30.0)
            .with_field(Field::Heading, 400.0)
            .with_field(Field::Velocity, 60.0),
        SensorReading::sounding(10.0, 10.0, 30.0).with_field(Field::Roll, -95.0),
    ];

    for label in ["sbes", "singlebeam", "auv"] {
        let report = QualityRuleEngine::default().evaluate(&Dataset::new(readings.clone()), label);
        let navigation = report
            .anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::NavigationRange)
            .count();
        assert_eq!(navigation, 2, "sensor {}", label);
        assert!(
            report
                .anomalies
                .iter()
                .any(|a| a.kind == AnomalyKind::VelocityRange && a.threshold == "0-50m/s")
        );
    }
}

#[test]
fn test_unknown_sensor_uses_generic_rules() {
    assert_eq!(RuleSet::for_label("sidescan"), RuleSet::Generic);

    let readings: Vec<SensorReading> = (0..12)
        .map(|i| {
            SensorReading::sounding(10.0, 10.0, 20.0)
                .with_timestamp(base_time())
                .with_field(Field::Heading, if i == 0 { 999.0 } else { 10.0 })
        })
        .collect();
    let report = QualityRuleEngine::default().evaluate(&Dataset::new(readings), "sidescan");

    // Range checks on coordinates and depth only; no cross-record checks
    assert!(report.anomalies.is_empty());
    assert!(!report.rules_applied.contains("duplicate_timestamp_check"));
    assert!(report.statistics.contains_key("heading"));
    assert!(report.statistics.contains_key("latitude"));
}

#[test]
fn test_duplicate_timestamps_count_every_repeat() {
    let mut dataset = depth_line(&[10.0, 11.0, 12.0, 13.0, 14.0]);
    dataset.readings[1].timestamp = dataset.readings[0].timestamp;
    dataset.readings[4].timestamp = dataset.readings[3].timestamp;

    let report = QualityRuleEngine::default().evaluate(&dataset, "mbes");
    let duplicate: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::DuplicateTimestamp)
        .collect();

    assert_eq!(duplicate.len(), 1);
    assert_eq!(duplicate[0].location, AnomalyLocation::Multiple);
    assert_eq!(duplicate[0].observed_value, 4.0);
    assert_eq!(duplicate[0].severity, Severity::Medium);
}

#[test]
fn test_depth_outlier_detection() {
    let mut depths = vec![50.0; 19];
    depths.push(5000.0);
    let dataset = depth_line(&depths);

    let report = QualityRuleEngine::default().evaluate(&dataset, "mbes");
    let outliers: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::DepthOutlier)
        .collect();

    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].location, AnomalyLocation::Index(19));
    assert!(outliers[0].threshold.starts_with("3σ from mean"));
}

#[test]
fn test_depth_consistency_needs_enough_readings() {
    let mut depths = vec![50.0; 8];
    depths.push(5000.0);
    let report = QualityRuleEngine::default().evaluate(&depth_line(&depths), "mbes");

    assert!(
        !report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::DepthOutlier)
    );
}

#[test]
fn test_invalid_override_degrades_to_failed_report() {
    let engine = QualityRuleEngine::new(
        QualityControlConfig::default().with_range(Field::Depth, f64::NAN, 10.0),
    );
    let report = engine.evaluate(&depth_line(&[1.0, 2.0]), "mbes");

    assert_eq!(report.status, QcStatus::Failed);
    assert_eq!(report.quality_score, 0.0);
    assert!(report.error.is_some());
}

#[test]
fn test_range_override_applies() {
    let engine =
        QualityRuleEngine::new(QualityControlConfig::default().with_range(Field::Depth, 0.0, 15.0));
    let report = engine.evaluate(&depth_line(&[10.0, 20.0]), "mbes");

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].threshold, "0-15m");
}

#[test]
fn test_evaluation_does_not_mutate_input() {
    let dataset = depth_line(&[10.0, -1.0, 30.0]);
    let before = dataset.clone();
    let _ = QualityRuleEngine::default().evaluate(&dataset, "mbes");
    assert_eq!(dataset, before);
}
