//! Tests for the quality control module

pub mod detection;
pub mod rule_engine;

use crate::models::{Dataset, SensorReading};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Soundings one second apart along a short line
pub(crate) fn depth_line(depths: &[f64]) -> Dataset {
    let readings = depths
        .iter()
        .enumerate()
        .map(|(i, &depth)| {
            SensorReading::sounding(40.0 + i as f64 * 0.0001, -70.0, depth)
                .with_timestamp(base_time() + Duration::seconds(i as i64))
        })
        .collect();
    Dataset::new(readings).with_sensor_type("mbes")
}
