//! Tests for the conversion pipeline


use crate::config::MapperConfig;
use crate::models::{Dataset, SensorReading};
use crate::pipeline::ConversionJob;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

pub(crate) fn job(config: MapperConfig) -> ConversionJob {
    ConversionJob::new("survey.csv", "mbes", Arc::new(config)).unwrap()
}

/// MBES soundings one second apart, each tagged with a vessel
pub(crate) fn survey(depths: &[f64]) -> Dataset {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let readings = depths
        .iter()
        .enumerate()
        .map(|(i, &depth)| {
            SensorReading::sounding(40.5 + i as f64 * 0.0004, -73.5 + i as f64 * 0.0003, depth)
                .with_timestamp(start + Duration::seconds(i as i64))
                .with_vessel_id(if i % 2 == 0 { "RV-ALPHA" } else { "RV-BRAVO" })
        })
        .collect();
    Dataset::new(readings).with_sensor_type("mbes")
}
