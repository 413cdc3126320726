//! Column schema resolution for raw sounding files.
//!
//! Raw survey exports name the same quantity many ways (`lat`, `y`,
//! `northing`, ...). This module maps header names onto canonical column
//! roles for each sensor family and reports which required roles are
//! missing.

use crate::models::{Field, SensorType};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern is valid"));

/// Canonical meaning of a raw column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnRole {
    Timestamp,
    Measurement(Field),
    VesselId,
    VesselName,
    SurveyId,
    GpsJitter,
}

impl ColumnRole {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnRole::Timestamp => "timestamp",
            ColumnRole::Measurement(field) => field.name(),
            ColumnRole::VesselId => "vessel_id",
            ColumnRole::VesselName => "vessel_name",
            ColumnRole::SurveyId => "survey_id",
            ColumnRole::GpsJitter => "gps_jitter",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase a header and collapse punctuation/whitespace runs into `_`
pub fn normalize_column_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Canonical role of a header for a sensor family, if it has one
pub fn canonical_role(raw: &str, sensor: SensorType) -> Option<ColumnRole> {
    let name = normalize_column_name(raw);
    let lidar = sensor == SensorType::Lidar;

    let role = match name.as_str() {
        "timestamp" | "time" | "datetime" | "utc" | "epoch" => ColumnRole::Timestamp,
        "latitude" | "lat" | "y" | "northing" => ColumnRole::Measurement(Field::Latitude),
        "longitude" | "lon" | "lng" | "x" | "easting" => ColumnRole::Measurement(Field::Longitude),

        // Vertical aliases depend on what the sensor measures
        "depth" if !lidar => ColumnRole::Measurement(Field::Depth),
        "z" | "elevation" | "altitude" if !lidar => ColumnRole::Measurement(Field::Depth),
        "elevation" | "z" | "alt" | "altitude" | "height" if lidar => {
            ColumnRole::Measurement(Field::Elevation)
        }

        "beam_angle" | "beam" | "angle" => ColumnRole::Measurement(Field::BeamAngle),
        "quality" | "qual" | "quality_factor" | "signal_quality" => {
            ColumnRole::Measurement(Field::Quality)
        }
        "intensity" | "backscatter" | "int" => ColumnRole::Measurement(Field::Intensity),
        "heading" | "hdg" | "course" => ColumnRole::Measurement(Field::Heading),
        "pitch" | "pitch_angle" => ColumnRole::Measurement(Field::Pitch),
        "roll" | "roll_angle" => ColumnRole::Measurement(Field::Roll),
        "velocity" | "vel" | "speed" => ColumnRole::Measurement(Field::Velocity),
        "classification" | "class" | "cls" => ColumnRole::Measurement(Field::Classification),
        "vessel_id" | "vessel" => ColumnRole::VesselId,
        "vessel_name" | "ship_name" => ColumnRole::VesselName,
        "survey_id" | "survey" => ColumnRole::SurveyId,
        "gps_jitter" | "jitter" => ColumnRole::GpsJitter,
        _ => return None,
    };

    Some(role)
}

/// Roles a file must provide for a sensor family
pub fn required_roles(sensor: SensorType) -> [ColumnRole; 4] {
    [
        ColumnRole::Timestamp,
        ColumnRole::Measurement(Field::Latitude),
        ColumnRole::Measurement(Field::Longitude),
        ColumnRole::Measurement(sensor.vertical_field()),
    ]
}

/// Units recorded in dataset metadata per sensor family
pub fn units_for(sensor: SensorType) -> BTreeMap<String, String> {
    let mut units = BTreeMap::new();
    units.insert("latitude".to_string(), "decimal_degrees".to_string());
    units.insert("longitude".to_string(), "decimal_degrees".to_string());

    match sensor {
        SensorType::Lidar => {
            units.insert("elevation".to_string(), "meters".to_string());
            units.insert("intensity".to_string(), "0-255_scale".to_string());
            units.insert("classification".to_string(), "integer_code".to_string());
        }
        SensorType::Mbes => {
            units.insert("depth".to_string(), "meters".to_string());
            units.insert("beam_angle".to_string(), "degrees".to_string());
        }
        SensorType::Sbes | SensorType::Singlebeam | SensorType::Auv => {
            units.insert("depth".to_string(), "meters".to_string());
            units.insert("heading".to_string(), "degrees".to_string());
            units.insert("velocity".to_string(), "meters_per_second".to_string());
        }
    }

    units
}

/// Resolved mapping from canonical roles to raw header names
#[derive(Debug, Clone, Default)]
pub struct SchemaMapping {
    columns: BTreeMap<ColumnRole, String>,
    unmapped: Vec<String>,
}

impl SchemaMapping {
    /// Map raw headers; the first header claiming a role wins
    pub fn resolve<S: AsRef<str>>(headers: &[S], sensor: SensorType) -> Self {
        let mut mapping = Self::default();

        for header in headers {
            let header = header.as_ref();
            match canonical_role(header, sensor) {
                Some(role) if !mapping.columns.contains_key(&role) => {
                    mapping.columns.insert(role, header.to_string());
                }
                _ => mapping.unmapped.push(header.to_string()),
            }
        }

        mapping
    }

    pub fn column(&self, role: ColumnRole) -> Option<&str> {
        self.columns.get(&role).map(String::as_str)
    }

    pub fn roles(&self) -> impl Iterator<Item = (&ColumnRole, &String)> {
        self.columns.iter()
    }

    /// Headers that did not map to any role
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    /// Required roles with no matching header
    pub fn missing_required(&self, sensor: SensorType) -> Vec<ColumnRole> {
        required_roles(sensor)
            .into_iter()
            .filter(|role| !self.columns.contains_key(role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("  Beam Angle "), "beam_angle");
        assert_eq!(normalize_column_name("Quality-Factor"), "quality_factor");
        assert_eq!(normalize_column_name("LAT (deg)"), "lat_deg");
    }

    #[test]
    fn test_vertical_alias_depends_on_sensor() {
        assert_eq!(
            canonical_role("Z", SensorType::Mbes),
            Some(ColumnRole::Measurement(Field::Depth))
        );
        assert_eq!(
            canonical_role("elevation", SensorType::Sbes),
            Some(ColumnRole::Measurement(Field::Depth))
        );
        assert_eq!(
            canonical_role("z", SensorType::Lidar),
            Some(ColumnRole::Measurement(Field::Elevation))
        );
        assert_eq!(canonical_role("depth", SensorType::Lidar), None);
        assert_eq!(
            canonical_role("height", SensorType::Lidar),
            Some(ColumnRole::Measurement(Field::Elevation))
        );
    }

    #[test]
    fn test_resolve_reports_missing_required() {
        let headers = ["time", "lat", "lon", "backscatter", "notes"];
        let mapping = SchemaMapping::resolve(&headers, SensorType::Mbes);

        assert_eq!(mapping.column(ColumnRole::Timestamp), Some("time"));
        assert_eq!(
            mapping.column(ColumnRole::Measurement(Field::Intensity)),
            Some("backscatter")
        );
        assert_eq!(mapping.unmapped(), &["notes".to_string()]);
        assert_eq!(
            mapping.missing_required(SensorType::Mbes),
            vec![ColumnRole::Measurement(Field::Depth)]
        );
    }

    #[test]
    fn test_first_header_wins() {
        let headers = ["lat", "latitude"];
        let mapping = SchemaMapping::resolve(&headers, SensorType::Auv);

        assert_eq!(
            mapping.column(ColumnRole::Measurement(Field::Latitude)),
            Some("lat")
        );
        assert_eq!(mapping.unmapped(), &["latitude".to_string()]);
    }
}
