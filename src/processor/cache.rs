//! Content fingerprints and reuse of earlier outputs.
//!
//! Outputs are named `<stem>_<fingerprint>_<suffix>`. The fingerprint
//! covers the input bytes and every parameter that changes the products,
//! so an existing metadata file with the same name means the job has
//! already been done.

use crate::config::MapperConfig;
use crate::constants::{FINGERPRINT_CHARS, output_file_name};
use crate::error::Result;
use crate::models::SensorType;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output file stem for an input path
pub fn output_stem(input: &Path) -> &str {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
}

/// Fingerprint of an input file under a given configuration
pub fn content_fingerprint(
    path: &Path,
    sensor: SensorType,
    config: &MapperConfig,
) -> Result<String> {
    let bytes = std::fs::read(path)?;
    fingerprint_bytes(&bytes, sensor, config)
}

pub(crate) fn fingerprint_bytes(
    bytes: &[u8],
    sensor: SensorType,
    config: &MapperConfig,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(sensor.as_str().as_bytes());

    // Only the digest of the salt enters the fingerprint
    let salt_digest = if config.anonymize {
        let digest = Sha256::digest(config.anonymization.salt.as_bytes());
        format!(
            "{}:{}",
            hex::encode(digest),
            config.anonymization.jitter_radius_meters
        )
    } else {
        "none".to_string()
    };
    hasher.update(salt_digest.as_bytes());

    let overlay = config.overlay.map(|o| o.selector()).unwrap_or("none");
    let flags = format!(
        "qc={};anonymize={};mapping={};overlay={};format={}",
        config.qc_mode, config.anonymize, config.keep_mapping, overlay, config.output_format
    );
    hasher.update(flags.as_bytes());

    // Range overrides are a BTreeMap, so the serialization is stable
    hasher.update(serde_json::to_vec(&config.compression)?);
    hasher.update(serde_json::to_vec(&config.surface)?);
    hasher.update(serde_json::to_vec(&config.quality_control)?);
    hasher.update(serde_json::to_vec(&config.detector)?);

    let mut fingerprint = hex::encode(hasher.finalize());
    fingerprint.truncate(FINGERPRINT_CHARS);
    Ok(fingerprint)
}

/// Products left by an earlier run with the same fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct CachedOutputs {
    pub files: Vec<PathBuf>,
    pub quality_score: Option<f64>,
    pub total_points: Option<usize>,
}

/// Look for a finished earlier run. Only a complete run writes the
/// metadata file, so its presence is the marker.
pub fn find_cached(
    config: &MapperConfig,
    stem: &str,
    fingerprint: &str,
) -> Option<CachedOutputs> {
    let metadata_path = config
        .output_dir
        .join(output_file_name(stem, fingerprint, "metadata.json"));
    if !metadata_path.is_file() {
        return None;
    }

    let metadata: serde_json::Value = match std::fs::read(&metadata_path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    {
        Some(value) => value,
        None => {
            debug!("Ignoring unreadable cache entry {}", metadata_path.display());
            return None;
        }
    };

    let prefix = output_file_name(stem, fingerprint, "");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&config.output_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    files.sort();

    Some(CachedOutputs {
        files,
        quality_score: metadata["quality"]["quality_score"].as_f64(),
        total_points: metadata["pipeline"]["total_points"]
            .as_u64()
            .map(|n| n as usize),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AnonymizationContext, CompressionAlgorithm, DetectorConfig, QcMode, QualityControlConfig,
        SurfaceConfig,
    };
    use crate::models::Field;
    use crate::pipeline::OverlayKind;
    use std::fs;
    use tempfile::TempDir;

    fn fingerprint(bytes: &[u8], sensor: SensorType, config: &MapperConfig) -> String {
        fingerprint_bytes(bytes, sensor, config).unwrap()
    }

    #[test]
    fn test_fingerprint_tracks_dataset_affecting_parameters() {
        let bytes = b"timestamp,lat,lon,depth\n";
        let base = MapperConfig::default();
        let fp = fingerprint(bytes, SensorType::Mbes, &base);

        assert_eq!(fp.len(), FINGERPRINT_CHARS);
        assert_eq!(fp, fingerprint(bytes, SensorType::Mbes, &base));

        let with = |config: MapperConfig| fingerprint(bytes, SensorType::Mbes, &config);
        let variants = [
            fingerprint(b"other", SensorType::Mbes, &base),
            fingerprint(bytes, SensorType::Sbes, &base),
            with(base.clone().with_qc_mode(QcMode::Skip)),
            with(base.clone().with_anonymization(AnonymizationContext::new("a"))),
            with(base.clone().with_anonymization(AnonymizationContext::new("b"))),
            with(base.clone().with_overlay(OverlayKind::WaterQuality)),
            with(base.clone().with_compression(CompressionAlgorithm::Zstd)),
            with(
                base.clone()
                    .with_surface(SurfaceConfig::default().with_resolution(0.01)),
            ),
            with(base.clone().with_surface(SurfaceConfig {
                max_grid_cells: 1_000,
                ..SurfaceConfig::default()
            })),
            with(base.clone().with_surface(SurfaceConfig {
                max_triangulation_points: 500,
                ..SurfaceConfig::default()
            })),
            with(
                base.clone().with_quality_control(
                    QualityControlConfig::default().with_range(Field::Depth, 0.0, 10.0),
                ),
            ),
            with(base.clone().with_detector(DetectorConfig {
                jump_threshold: 2.5,
                ..DetectorConfig::default()
            })),
            with(
                base.clone()
                    .with_detector(DetectorConfig::default().with_model_path("model.onnx")),
            ),
        ];
        for variant in &variants {
            assert_ne!(variant, &fp);
        }
        assert_ne!(variants[3], variants[4]);
    }

    #[test]
    fn test_output_dir_does_not_change_fingerprint() {
        let bytes = b"data";
        let a = MapperConfig::default().with_output_dir("a");
        let b = MapperConfig::default().with_output_dir("b");
        assert_eq!(
            fingerprint(bytes, SensorType::Lidar, &a),
            fingerprint(bytes, SensorType::Lidar, &b)
        );
    }

    #[test]
    fn test_find_cached_reads_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let config = MapperConfig::default().with_output_dir(temp_dir.path());

        assert!(find_cached(&config, "survey", "abc").is_none());

        fs::write(temp_dir.path().join("survey_abc_soundings.parquet"), b"x").unwrap();
        fs::write(temp_dir.path().join("survey_other_soundings.parquet"), b"x").unwrap();
        fs::write(
            temp_dir.path().join("survey_abc_metadata.json"),
            r#"{"pipeline": {"total_points": 12}, "quality": {"quality_score": 0.8}}"#,
        )
        .unwrap();

        let cached = find_cached(&config, "survey", "abc").unwrap();
        assert_eq!(cached.files.len(), 2);
        assert_eq!(cached.quality_score, Some(0.8));
        assert_eq!(cached.total_points, Some(12));
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(Path::new("/data/line_004.csv")), "line_004");
        assert_eq!(output_stem(Path::new("/")), "dataset");
    }
}
