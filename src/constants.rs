//! Application constants for the ocean mapper
//!
//! This module contains validation ranges, detection thresholds, gridding
//! defaults and file naming conventions used throughout the conversion
//! pipeline.

// =============================================================================
// Sensor Families
// =============================================================================

/// Sensor type selectors accepted on the command line
pub const SENSOR_TYPES: &[&str] = &["mbes", "sbes", "lidar", "singlebeam", "auv"];

/// Output format selectors accepted on the command line
pub const OUTPUT_FORMATS: &[&str] = &["parquet", "ascii-grid"];

/// QC mode selectors accepted on the command line
pub const QC_MODES: &[&str] = &["auto", "manual", "skip"];

// =============================================================================
// Quality Control Ranges
// =============================================================================

/// Valid value ranges for every field the rule engine knows about.
///
/// Values are inclusive; anything strictly outside is an anomaly.
pub mod ranges {
    pub const LATITUDE: (f64, f64) = (-90.0, 90.0);
    pub const LONGITUDE: (f64, f64) = (-180.0, 180.0);
    pub const DEPTH: (f64, f64) = (0.0, 12_000.0);
    pub const ELEVATION: (f64, f64) = (-1_000.0, 10_000.0);
    pub const BEAM_ANGLE: (f64, f64) = (-90.0, 90.0);
    pub const QUALITY: (f64, f64) = (0.0, 100.0);
    pub const HEADING: (f64, f64) = (0.0, 360.0);
    pub const PITCH: (f64, f64) = (-90.0, 90.0);
    pub const ROLL: (f64, f64) = (-90.0, 90.0);
    pub const VELOCITY: (f64, f64) = (0.0, 50.0);
    pub const INTENSITY: (f64, f64) = (0.0, 255.0);
    pub const CLASSIFICATION: (f64, f64) = (0.0, 31.0);
}

/// Minimum dataset size before the statistical depth check runs
pub const DEPTH_CONSISTENCY_MIN_READINGS: usize = 10;

/// Minimum number of valid depth values for the statistical depth check
pub const DEPTH_CONSISTENCY_MIN_VALUES: usize = 5;

/// Outlier distance from the mean, in standard deviations
pub const DEPTH_OUTLIER_SIGMA: f64 = 3.0;

/// Anomaly-rate buckets used for the quality score: (upper bound, score)
pub const QUALITY_SCORE_BUCKETS: &[(f64, f64)] =
    &[(0.01, 0.9), (0.05, 0.8), (0.1, 0.7), (0.2, 0.5)];

/// Score when the anomaly rate exceeds every bucket
pub const QUALITY_SCORE_FLOOR: f64 = 0.2;

/// Upper bound for scores and confidences when any high-severity anomaly exists
pub const HIGH_SEVERITY_CAP: f64 = 0.6;

// =============================================================================
// Anomaly Detection
// =============================================================================

pub mod detection {
    /// Consecutive depth difference above which a jump is reported (meters)
    pub const DEPTH_JUMP_THRESHOLD: f64 = 100.0;

    /// Jumps larger than this are high severity; also the confidence scale (meters)
    pub const HIGH_SEVERITY_JUMP: f64 = 200.0;

    /// Readings sharing one coordinate pair before it becomes suspicious
    pub const DUPLICATE_CLUSTER_SIZE: usize = 10;

    /// Cluster size at which duplicate confidence saturates
    pub const DUPLICATE_CONFIDENCE_SCALE: f64 = 50.0;

    /// Anomaly-rate buckets for detector confidence: (upper bound, confidence)
    pub const CONFIDENCE_BUCKETS: &[(f64, f64)] = &[(0.01, 0.9), (0.05, 0.8), (0.1, 0.7)];

    /// Confidence when the anomaly rate exceeds every bucket
    pub const CONFIDENCE_FLOOR: f64 = 0.5;

    /// Model file extensions the detector recognises
    pub const MODEL_EXTENSIONS: &[&str] = &["onnx", "pb", "h5", "pkl", "joblib"];

    pub const MODEL_TYPE: &str = "deterministic_stub";
}

// =============================================================================
// Anonymization
// =============================================================================

/// Prefix of every hashed identifier
pub const ANONYMIZED_ID_PREFIX: &str = "VESSEL_";

/// Number of hex characters kept from the SHA-256 digest
pub const ANONYMIZED_HASH_CHARS: usize = 8;

/// Salt used when the caller does not supply one
pub const DEFAULT_SALT: &str = "default_salt";

/// Default GPS jitter radius in meters
pub const DEFAULT_JITTER_RADIUS_METERS: f64 = 50.0;

/// Approximate meters per degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_000.0;

// =============================================================================
// Geodesy
// =============================================================================

pub mod geodesy {
    /// WGS84 semi-major axis (meters)
    pub const WGS84_A: f64 = 6_378_137.0;

    /// WGS84 flattening
    pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

    /// UTM central meridian scale factor
    pub const UTM_K0: f64 = 0.9996;

    /// UTM false easting (meters)
    pub const UTM_FALSE_EASTING: f64 = 500_000.0;

    /// UTM false northing for the southern hemisphere (meters)
    pub const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

    /// Mean Earth radius for great-circle distances (meters)
    pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

    pub const EPSG_WGS84: u32 = 4326;

    /// Zone assumed for projected input when nothing better is known (UTM 33N)
    pub const PLACEHOLDER_UTM_ZONE: u8 = 33;

    /// Coordinate range beyond which input is treated as projected meters
    pub const PROJECTED_RANGE_THRESHOLD: f64 = 1_000.0;
}

// =============================================================================
// Surface Gridding
// =============================================================================

/// Grid cell size in degrees (~100m at the equator)
pub const DEFAULT_GRID_RESOLUTION: f64 = 0.001;

/// Uncertainty assigned to the first sounding written into a cell (meters)
pub const DEFAULT_CELL_UNCERTAINTY: f64 = 1.0;

/// Upper bound on rows * cols before surface building refuses the grid
pub const DEFAULT_MAX_GRID_CELLS: usize = 25_000_000;

/// Upper bound on points fed to the triangulated index
pub const DEFAULT_MAX_TRIANGULATION_POINTS: usize = 10_000;

/// Minimum valid points for the binned surface with triangulation
pub const MIN_SURFACE_POINTS: usize = 3;

/// No-data marker written to ESRI ASCII grids
pub const ASCII_GRID_NODATA: f64 = -9999.0;

// =============================================================================
// Files
// =============================================================================

/// Extensions picked up when an input directory is walked
pub const INPUT_EXTENSIONS: &[&str] = &["csv", "txt"];

/// Hex characters of the content fingerprint used in output names
pub const FINGERPRINT_CHARS: usize = 16;

pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Jobs scheduled between memory pressure checks
pub const BATCH_CHUNK_SIZE: usize = 256;

/// Build an output file name from an input stem, a fingerprint and a suffix
pub fn output_file_name(stem: &str, fingerprint: &str, suffix: &str) -> String {
    format!("{}_{}_{}", stem, fingerprint, suffix)
}
