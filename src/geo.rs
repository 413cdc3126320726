//! Geodesy helpers: reference systems, UTM projection and great-circle math.

use crate::constants::geodesy::{
    EARTH_RADIUS_METERS, EPSG_WGS84, UTM_FALSE_EASTING, UTM_FALSE_NORTHING_SOUTH, UTM_K0, WGS84_A,
    WGS84_F,
};
use crate::error::{MapperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate reference systems the converter can name and transform between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateReferenceSystem {
    /// Geographic WGS84 degrees (EPSG:4326)
    Wgs84,
    /// WGS84 / UTM, zone 1-60
    Utm { zone: u8, north: bool },
}

impl CoordinateReferenceSystem {
    pub fn epsg(&self) -> u32 {
        match self {
            Self::Wgs84 => EPSG_WGS84,
            Self::Utm { zone, north: true } => 32600 + *zone as u32,
            Self::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            EPSG_WGS84 => Ok(Self::Wgs84),
            32601..=32660 => Ok(Self::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Self::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(MapperError::Reprojection {
                message: format!("unsupported EPSG code {}", other),
            }),
        }
    }
}

impl fmt::Display for CoordinateReferenceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CoordinateReferenceSystem {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .to_uppercase()
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| MapperError::Reprojection {
                message: format!("cannot parse reference system '{}'", s),
            })?;
        Self::from_epsg(code)
    }
}

/// UTM zone containing a position
pub fn utm_zone_for(longitude: f64, latitude: f64) -> CoordinateReferenceSystem {
    let normalized = (longitude + 180.0).rem_euclid(360.0);
    let zone = ((normalized / 6.0).floor() as u8 + 1).min(60);
    CoordinateReferenceSystem::Utm {
        zone,
        north: latitude >= 0.0,
    }
}

/// Great-circle distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
}

/// Initial bearing from the first point to the second, degrees clockwise from north in [0, 360)
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Capability to move coordinate pairs between reference systems.
///
/// Points are `(x, y)`: longitude/latitude for geographic systems,
/// easting/northing for projected ones.
pub trait GeodeticTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(
        &self,
        source: CoordinateReferenceSystem,
        target: CoordinateReferenceSystem,
        points: &[(f64, f64)],
    ) -> Result<Vec<(f64, f64)>>;
}

fn eccentricity_squared() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Project geographic degrees onto a UTM zone (Snyder, Map Projections p. 61)
pub fn project_to_utm(longitude: f64, latitude: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let ep2 = e2 / (1.0 - e2);
    let phi = latitude.to_radians();
    let lambda = (longitude - central_meridian(zone)).to_radians();

    let n = WGS84_A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let t = phi.tan().powi(2);
    let c = ep2 * phi.cos().powi(2);
    let a = phi.cos() * lambda;

    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e2.powi(2) / 32.0 + 45.0 * e2.powi(3) / 1024.0)
                * (2.0 * phi).sin()
            + (15.0 * e2.powi(2) / 256.0 + 45.0 * e2.powi(3) / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e2.powi(3) / 3072.0) * (6.0 * phi).sin());

    let easting = UTM_FALSE_EASTING
        + UTM_K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t.powi(2) + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);

    let mut northing = UTM_K0
        * (m + n
            * phi.tan()
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c.powi(2)) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t.powi(2) + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        northing += UTM_FALSE_NORTHING_SOUTH;
    }

    (easting, northing)
}

/// Inverse UTM projection back to geographic degrees (Snyder, Map Projections p. 63)
pub fn unproject_utm(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let ep2 = e2 / (1.0 - e2);
    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let n1 = WGS84_A / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = phi1.tan().powi(2);
    let c1 = ep2 * phi1.cos().powi(2);
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let latitude = phi1
        - (n1 * phi1.tan() / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2
                    - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let longitude = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
            * d.powi(5)
            / 120.0)
        / phi1.cos();

    (
        central_meridian(zone) + longitude.to_degrees(),
        latitude.to_degrees(),
    )
}

/// Built-in transform from UTM zones to WGS84 degrees
#[derive(Debug, Clone, Copy, Default)]
pub struct UtmInverse;

impl GeodeticTransform for UtmInverse {
    fn name(&self) -> &'static str {
        "utm_inverse"
    }

    fn transform(
        &self,
        source: CoordinateReferenceSystem,
        target: CoordinateReferenceSystem,
        points: &[(f64, f64)],
    ) -> Result<Vec<(f64, f64)>> {
        if source == target {
            return Ok(points.to_vec());
        }

        let (zone, north) = match (source, target) {
            (CoordinateReferenceSystem::Utm { zone, north }, CoordinateReferenceSystem::Wgs84) => {
                (zone, north)
            }
            _ => {
                return Err(MapperError::Reprojection {
                    message: format!("no transform from {} to {}", source, target),
                });
            }
        };

        points
            .iter()
            .map(|&(easting, northing)| {
                let (lon, lat) = unproject_utm(easting, northing, zone, north);
                if lon.is_finite() && lat.is_finite() && lat.abs() <= 90.0 {
                    Ok((lon, lat))
                } else {
                    Err(MapperError::Reprojection {
                        message: format!(
                            "({}, {}) is outside the valid area of {}",
                            easting, northing, source
                        ),
                    })
                }
            })
            .collect()
    }
}
