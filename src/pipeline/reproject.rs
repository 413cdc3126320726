//! Coordinate normalization to WGS84 degrees.
//!
//! The source reference system is inferred from coordinate magnitudes.
//! Degree-range data passes through; meter-scale data is assumed to be in
//! a placeholder UTM zone and inverted through a [`GeodeticTransform`].
//! Nothing here is fatal: every failure falls back to pass-through with a
//! warning recorded in the dataset annotations.

use crate::constants::geodesy::{PLACEHOLDER_UTM_ZONE, PROJECTED_RANGE_THRESHOLD};
use crate::error::{MapperError, Result};
use crate::geo::{CoordinateReferenceSystem, GeodeticTransform, UtmInverse};
use crate::models::Dataset;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of the reprojection stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReprojectionInfo {
    pub applied: bool,
    pub source_crs: String,
    pub target_crs: String,
    pub method: String,
    pub warning: Option<String>,
}

impl ReprojectionInfo {
    fn pass_through(source: CoordinateReferenceSystem, warning: Option<String>) -> Self {
        Self {
            applied: false,
            source_crs: source.to_string(),
            target_crs: CoordinateReferenceSystem::Wgs84.to_string(),
            method: "pass_through".to_string(),
            warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CoordinateRanges {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl CoordinateRanges {
    fn of(dataset: &Dataset) -> Option<Self> {
        let mut ranges: Option<Self> = None;
        for reading in &dataset.readings {
            let (lat, lon) = (reading.latitude, reading.longitude);
            if !lat.is_finite() || !lon.is_finite() {
                continue;
            }
            ranges = Some(match ranges {
                None => Self {
                    min_lat: lat,
                    max_lat: lat,
                    min_lon: lon,
                    max_lon: lon,
                },
                Some(r) => Self {
                    min_lat: r.min_lat.min(lat),
                    max_lat: r.max_lat.max(lat),
                    min_lon: r.min_lon.min(lon),
                    max_lon: r.max_lon.max(lon),
                },
            });
        }
        ranges
    }

    fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    fn is_wgs84(&self) -> bool {
        self.lat_span() <= 180.0
            && self.lon_span() <= 360.0
            && self.min_lat >= -90.0
            && self.max_lat <= 90.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
    }

    /// Best guess at the source system, `None` when undeterminable
    fn infer_source(&self) -> Option<CoordinateReferenceSystem> {
        if self.lat_span() <= 180.0 && self.lon_span() <= 360.0 {
            return Some(CoordinateReferenceSystem::Wgs84);
        }
        if self.lat_span() > PROJECTED_RANGE_THRESHOLD
            && self.lon_span() > PROJECTED_RANGE_THRESHOLD
        {
            return Some(CoordinateReferenceSystem::Utm {
                zone: PLACEHOLDER_UTM_ZONE,
                north: true,
            });
        }
        None
    }
}

/// Normalizes datasets to WGS84 through a pluggable transform
pub struct CoordinateReprojector {
    transform: Box<dyn GeodeticTransform>,
}

impl Default for CoordinateReprojector {
    fn default() -> Self {
        Self::new(Box::new(UtmInverse))
    }
}

impl std::fmt::Debug for CoordinateReprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateReprojector")
            .field("transform", &self.transform.name())
            .finish()
    }
}

impl CoordinateReprojector {
    pub fn new(transform: Box<dyn GeodeticTransform>) -> Self {
        Self { transform }
    }

    /// Normalized copy of the dataset plus a record of what happened
    pub fn normalize(&self, dataset: &Dataset) -> (Dataset, ReprojectionInfo) {
        let wgs84 = CoordinateReferenceSystem::Wgs84;

        let Some(ranges) = CoordinateRanges::of(dataset) else {
            debug!("No finite coordinates, skipping reprojection");
            return (
                Self::mark_wgs84(dataset.clone(), None),
                ReprojectionInfo::pass_through(wgs84, None),
            );
        };

        if ranges.is_wgs84() {
            debug!("Coordinates already in WGS84 degree bounds");
            return (
                Self::mark_wgs84(dataset.clone(), None),
                ReprojectionInfo::pass_through(wgs84, None),
            );
        }

        match ranges.infer_source() {
            Some(CoordinateReferenceSystem::Wgs84) => {
                let warning = format!(
                    "coordinates look geographic but exceed degree bounds (lat {}..{}, lon {}..{})",
                    ranges.min_lat, ranges.max_lat, ranges.min_lon, ranges.max_lon
                );
                warn!("{}", warning);
                (
                    Self::mark_wgs84(dataset.clone(), Some(warning.clone())),
                    ReprojectionInfo::pass_through(wgs84, Some(warning)),
                )
            }
            Some(source) => match self.reproject(dataset, source) {
                Ok(normalized) => {
                    info!(
                        "Reprojected {} readings from {} to {} via {}",
                        dataset.len(),
                        source,
                        wgs84,
                        self.transform.name()
                    );
                    let info = ReprojectionInfo {
                        applied: true,
                        source_crs: source.to_string(),
                        target_crs: wgs84.to_string(),
                        method: self.transform.name().to_string(),
                        warning: None,
                    };
                    (Self::mark_wgs84(normalized, None), info)
                }
                Err(e) => {
                    let warning = format!("reprojection from {} failed: {}", source, e);
                    warn!("{}", warning);
                    let mut passed = dataset.clone();
                    passed.metadata.annotations.push(warning.clone());
                    (passed, ReprojectionInfo::pass_through(source, Some(warning)))
                }
            },
            None => {
                let warning = format!(
                    "could not determine coordinate reference system (lat span {}, lon span {})",
                    ranges.lat_span(),
                    ranges.lon_span()
                );
                warn!("{}", warning);
                (
                    Self::mark_wgs84(dataset.clone(), Some(warning.clone())),
                    ReprojectionInfo::pass_through(wgs84, Some(warning)),
                )
            }
        }
    }

    fn reproject(&self, dataset: &Dataset, source: CoordinateReferenceSystem) -> Result<Dataset> {
        // Non-finite positions are carried through untouched
        let finite: Vec<usize> = dataset
            .readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.latitude.is_finite() && r.longitude.is_finite())
            .map(|(i, _)| i)
            .collect();
        let points: Vec<(f64, f64)> = finite
            .iter()
            .map(|&i| (dataset.readings[i].longitude, dataset.readings[i].latitude))
            .collect();

        let transformed =
            self.transform
                .transform(source, CoordinateReferenceSystem::Wgs84, &points)?;
        if transformed.len() != points.len() {
            return Err(MapperError::Reprojection {
                message: format!(
                    "transform returned {} points for {} inputs",
                    transformed.len(),
                    points.len()
                ),
            });
        }

        let mut readings = dataset.readings.clone();
        for (&i, (lon, lat)) in finite.iter().zip(transformed) {
            readings[i].longitude = lon;
            readings[i].latitude = lat;
        }
        Ok(dataset.with_readings(readings))
    }

    fn mark_wgs84(mut dataset: Dataset, warning: Option<String>) -> Dataset {
        dataset.metadata.coordinate_system = Some("WGS84".to_string());
        if let Some(warning) = warning {
            dataset.metadata.annotations.push(warning);
        }
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::project_to_utm;
    use crate::models::SensorReading;

    struct FailingTransform;

    impl GeodeticTransform for FailingTransform {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn transform(
            &self,
            _source: CoordinateReferenceSystem,
            _target: CoordinateReferenceSystem,
            _points: &[(f64, f64)],
        ) -> Result<Vec<(f64, f64)>> {
            Err(MapperError::Reprojection {
                message: "backend unavailable".to_string(),
            })
        }
    }

    fn dataset(points: &[(f64, f64)]) -> Dataset {
        Dataset::new(
            points
                .iter()
                .map(|&(lat, lon)| SensorReading::sounding(lat, lon, 10.0))
                .collect(),
        )
    }

    #[test]
    fn test_degrees_pass_through_unchanged() {
        let input = dataset(&[(40.0, -70.0), (41.0, -71.0)]);
        let (output, info) = CoordinateReprojector::default().normalize(&input);

        assert!(!info.applied);
        assert_eq!(info.source_crs, "EPSG:4326");
        assert!(info.warning.is_none());
        assert_eq!(output.readings, input.readings);
        assert_eq!(output.metadata.coordinate_system.as_deref(), Some("WGS84"));
    }

    #[test]
    fn test_projected_meters_are_inverted() {
        let (e1, n1) = project_to_utm(15.0, 45.0, 33, true);
        let (e2, n2) = project_to_utm(15.1, 45.1, 33, true);
        // Readings hold northing in latitude and easting in longitude
        let input = dataset(&[(n1, e1), (n2, e2)]);

        let (output, info) = CoordinateReprojector::default().normalize(&input);

        assert!(info.applied);
        assert_eq!(info.source_crs, "EPSG:32633");
        assert_eq!(info.target_crs, "EPSG:4326");
        assert!((output.readings[0].latitude - 45.0).abs() < 1e-6);
        assert!((output.readings[0].longitude - 15.0).abs() < 1e-6);
        assert!((output.readings[1].longitude - 15.1).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_bounds_degrees_warn() {
        let input = dataset(&[(95.0, 10.0), (80.0, 20.0)]);
        let (output, info) = CoordinateReprojector::default().normalize(&input);

        assert!(!info.applied);
        assert!(info.warning.is_some());
        assert_eq!(output.readings, input.readings);
        assert_eq!(output.metadata.annotations.len(), 1);
    }

    #[test]
    fn test_undeterminable_system_passes_through() {
        // Latitude span over 180 but longitude span under the projected threshold
        let input = dataset(&[(0.0, 0.0), (500.0, 10.0)]);
        let (output, info) = CoordinateReprojector::default().normalize(&input);

        assert!(!info.applied);
        assert!(info.warning.unwrap().contains("could not determine"));
        assert_eq!(output.readings, input.readings);
    }

    #[test]
    fn test_transform_failure_degrades() {
        let input = dataset(&[(5_000_000.0, 400_000.0), (5_010_000.0, 410_000.0)]);
        let reprojector = CoordinateReprojector::new(Box::new(FailingTransform));
        let (output, info) = reprojector.normalize(&input);

        assert!(!info.applied);
        assert_eq!(info.method, "pass_through");
        assert!(info.warning.unwrap().contains("backend unavailable"));
        assert_eq!(output.readings, input.readings);
        assert_eq!(output.metadata.annotations.len(), 1);
    }

    #[test]
    fn test_empty_dataset() {
        let (output, info) = CoordinateReprojector::default().normalize(&Dataset::default());
        assert!(output.is_empty());
        assert!(!info.applied);
    }
}
