//! Anomaly-rate scoring shared by the rule engine, the detector and the
//! conversion job.

use crate::constants::{HIGH_SEVERITY_CAP, QUALITY_SCORE_BUCKETS, QUALITY_SCORE_FLOOR, detection};
use crate::models::{Anomaly, Severity};

fn bucket(rate: f64, buckets: &[(f64, f64)], floor: f64) -> f64 {
    buckets
        .iter()
        .find(|(upper, _)| rate < *upper)
        .map(|(_, score)| *score)
        .unwrap_or(floor)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Quality score in [0, 1] from an anomaly count over a point count.
///
/// A rate of zero scores 1.0; any high-severity anomaly caps the score.
pub fn score_from_rate(anomaly_count: usize, total_points: usize, any_high: bool) -> f64 {
    if total_points == 0 {
        return 0.0;
    }

    let rate = anomaly_count as f64 / total_points as f64;
    let mut score = if anomaly_count == 0 {
        1.0
    } else {
        bucket(rate, QUALITY_SCORE_BUCKETS, QUALITY_SCORE_FLOOR)
    };

    if any_high {
        score = score.min(HIGH_SEVERITY_CAP);
    }

    round3(score)
}

/// Quality score over any collection of anomalies
pub fn quality_score<'a>(
    anomalies: impl IntoIterator<Item = &'a Anomaly>,
    total_points: usize,
) -> f64 {
    let (count, any_high) = anomalies.into_iter().fold((0usize, false), |(count, high), a| {
        (count + 1, high || a.severity == Severity::High)
    });
    score_from_rate(count, total_points, any_high)
}

/// Detector confidence: 0 for an empty dataset, otherwise bucketed by rate
pub fn detection_confidence(anomalies: &[Anomaly], total_points: usize) -> f64 {
    if total_points == 0 {
        return 0.0;
    }

    let rate = anomalies.len() as f64 / total_points as f64;
    let confidence = bucket(rate, detection::CONFIDENCE_BUCKETS, detection::CONFIDENCE_FLOOR);

    if anomalies.iter().any(|a| a.severity == Severity::High) {
        confidence.min(HIGH_SEVERITY_CAP)
    } else {
        confidence
    }
}
