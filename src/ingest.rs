//! Delimited-text ingestion of raw soundings.
//!
//! Reads CSV (`.txt` files are tab separated) with polars, resolves column
//! aliases for the sensor family and turns each row into a
//! [`SensorReading`]. Every column is read as text so that a single bad
//! cell degrades to a missing value instead of failing the whole file.

use crate::error::{MapperError, Result};
use crate::models::{Dataset, DatasetMetadata, Field, SensorReading, SensorType};
use crate::schema::{ColumnRole, SchemaMapping, units_for};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a raw sounding file into a dataset
pub fn read_dataset(path: &Path, sensor: SensorType) -> Result<Dataset> {
    if !path.exists() {
        return Err(MapperError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let frame = read_frame(path)?;
    let headers: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mapping = SchemaMapping::resolve(&headers, sensor);
    let missing = mapping.missing_required(sensor);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|role| role.name()).collect();
        return Err(MapperError::parse(
            path,
            format!("Missing required columns: {:?}", names),
        ));
    }
    if !mapping.unmapped().is_empty() {
        debug!(
            "Ignoring unrecognised columns in {}: {:?}",
            path.display(),
            mapping.unmapped()
        );
    }

    let mut builders: Vec<ReadingBuilder> = (0..frame.height())
        .map(|_| ReadingBuilder::default())
        .collect();

    for (role, header) in mapping.roles() {
        let column = frame.column(header.as_str())?.str()?;
        for (row, cell) in column.into_iter().enumerate() {
            let Some(cell) = cell.map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            builders[row].apply(*role, cell).map_err(|reason| {
                MapperError::parse(path, format!("row {}: {}", row + 1, reason))
            })?;
        }
    }

    let readings: Vec<SensorReading> = builders.into_iter().map(ReadingBuilder::build).collect();

    let dropped_cells = readings
        .iter()
        .filter(|r| r.latitude.is_nan() || r.longitude.is_nan() || r.vertical_value().is_none())
        .count();
    if dropped_cells > 0 {
        warn!(
            "{} of {} readings in {} have missing position or {} values",
            dropped_cells,
            readings.len(),
            path.display(),
            sensor.vertical_field()
        );
    }

    let metadata = build_metadata(path, sensor, &headers)?;

    debug!(
        "Parsed {} readings from {} as {}",
        readings.len(),
        path.display(),
        sensor
    );

    Ok(Dataset { readings, metadata })
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    let separator = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => b'\t',
        _ => b',',
    };

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| MapperError::parse(path, e.to_string()))
}

fn build_metadata(path: &Path, sensor: SensorType, headers: &[String]) -> Result<DatasetMetadata> {
    let file_size = std::fs::metadata(path)?.len();

    let mut metadata = DatasetMetadata {
        sensor_type: Some(sensor.to_string()),
        units: units_for(sensor),
        ..Default::default()
    };

    let provenance = &mut metadata.provenance;
    provenance.insert(
        "source_file".to_string(),
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    );
    provenance.insert("file_size_bytes".to_string(), file_size.to_string());
    provenance.insert("columns".to_string(), headers.join(","));
    provenance.insert(
        "parser".to_string(),
        format!("ocean_mapper/{}", crate::constants::SOFTWARE_VERSION),
    );

    Ok(metadata)
}

/// Parse a timestamp cell: RFC 3339, naive ISO date-time (taken as UTC),
/// a bare date, or Unix seconds
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "t"
    )
}

/// Accumulates one row's cells
#[derive(Default)]
struct ReadingBuilder {
    reading: SensorReading,
    has_latitude: bool,
    has_longitude: bool,
}

impl ReadingBuilder {
    fn apply(&mut self, role: ColumnRole, cell: &str) -> std::result::Result<(), String> {
        match role {
            ColumnRole::Timestamp => {
                let timestamp = parse_timestamp(cell)
                    .ok_or_else(|| format!("unparseable timestamp '{}'", cell))?;
                self.reading.timestamp = Some(timestamp);
            }
            ColumnRole::Measurement(field) => {
                // Unparseable numbers are treated as missing
                if let Ok(value) = cell.parse::<f64>() {
                    self.reading.set_field(field, value);
                    match field {
                        Field::Latitude => self.has_latitude = true,
                        Field::Longitude => self.has_longitude = true,
                        _ => {}
                    }
                }
            }
            ColumnRole::VesselId => self.reading.vessel_id = Some(cell.to_string()),
            ColumnRole::VesselName => self.reading.vessel_name = Some(cell.to_string()),
            ColumnRole::SurveyId => self.reading.survey_id = Some(cell.to_string()),
            ColumnRole::GpsJitter => self.reading.gps_jitter = parse_flag(cell),
        }
        Ok(())
    }

    fn build(mut self) -> SensorReading {
        if !self.has_latitude {
            self.reading.latitude = f64::NAN;
        }
        if !self.has_longitude {
            self.reading.longitude = f64::NAN;
        }
        self.reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn write_fixture(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00.000"), Some(expected));
        assert_eq!(
            parse_timestamp(&expected.timestamp().to_string()),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_read_mbes_with_aliases() {
        let file = write_fixture(
            ".csv",
            "Time,Lat,Lon,Z,Beam,Qual,Vessel,Survey,notes\n\
             2024-03-01T12:00:00Z,40.5,-73.5,25.0,15.0,90,RV Atlantis,S-01,ok\n\
             2024-03-01T12:00:01Z,40.6,-73.4,bad,-20.0,85,RV Atlantis,S-01,\n",
        );

        let dataset = read_dataset(file.path(), SensorType::Mbes).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.readings[0];
        assert_eq!(first.latitude, 40.5);
        assert_eq!(first.longitude, -73.5);
        assert_eq!(Field::Depth.value_of(first), Some(25.0));
        assert_eq!(first.beam_angle, Some(15.0));
        assert_eq!(first.quality, Some(90.0));
        assert_eq!(first.vessel_id.as_deref(), Some("RV Atlantis"));
        assert_eq!(first.survey_id.as_deref(), Some("S-01"));

        // Unparseable depth becomes missing
        assert_eq!(dataset.readings[1].vertical, None);

        assert_eq!(dataset.metadata.sensor_type.as_deref(), Some("mbes"));
        assert_eq!(
            dataset.metadata.units.get("depth").map(String::as_str),
            Some("meters")
        );
        assert!(dataset.metadata.provenance.contains_key("source_file"));
    }

    #[test]
    fn test_read_tab_separated_lidar() {
        let file = write_fixture(
            ".txt",
            "timestamp\tlatitude\tlongitude\theight\tint\tcls\n\
             1709294400\t10.0\t20.0\t5.5\t120\t2\n",
        );

        let dataset = read_dataset(file.path(), SensorType::Lidar).unwrap();
        let reading = &dataset.readings[0];

        assert_eq!(Field::Elevation.value_of(reading), Some(5.5));
        assert_eq!(reading.intensity, Some(120.0));
        assert_eq!(reading.classification, Some(2.0));
        assert_eq!(
            reading.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_required_columns() {
        let file = write_fixture(".csv", "timestamp,latitude,longitude\n2024-03-01,1,2\n");

        let err = read_dataset(file.path(), SensorType::Sbes).unwrap_err();
        match err {
            MapperError::Parse { reason, .. } => assert!(reason.contains("depth")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp_is_parse_error() {
        let file = write_fixture(
            ".csv",
            "timestamp,latitude,longitude,depth\nnot-a-time,1,2,3\n",
        );

        let err = read_dataset(file.path(), SensorType::Auv).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_dataset(Path::new("/nonexistent/survey.csv"), SensorType::Mbes).unwrap_err();
        assert!(matches!(err, MapperError::InputNotFound { .. }));
    }
}
