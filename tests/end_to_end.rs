//! End-to-end conversion tests
//!
//! Write raw sounding files to a temporary directory, run them through
//! the public API and check the products on disk.

use ocean_mapper::config::{AnonymizationContext, MapperConfig, OutputFormat, QcMode};
use ocean_mapper::models::Vertical;
use ocean_mapper::pipeline::JobStage;
use ocean_mapper::processor::{BatchProcessor, discover_inputs};
use ocean_mapper::{ConversionJob, JobStatus, JobStore, MapperError, OverlayKind};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A short multibeam line from two vessels over the New York Bight
fn write_mbes_line(dir: &Path, name: &str) -> PathBuf {
    let csv = "\
Time,Lat,Lon,Depth,Beam_Angle,Quality,Vessel,Survey
2024-06-01T12:00:00Z,40.5000,-73.5000,120.5,10.0,95,RV-ALPHA,NYB-24
2024-06-01T12:00:01Z,40.5004,-73.4997,121.0,12.5,94,RV-BRAVO,NYB-24
2024-06-01T12:00:02Z,40.5008,-73.4994,122.2,-8.0,97,RV-ALPHA,NYB-24
2024-06-01T12:00:03Z,40.5012,-73.4991,121.7,5.5,93,RV-BRAVO,NYB-24
2024-06-01 12:00:04,40.5016,-73.4988,bad,3.0,96,RV-ALPHA,NYB-24
1717243205,40.5020,-73.4985,123.4,0.0,92,RV-BRAVO,NYB-24
";
    let path = dir.join(name);
    fs::write(&path, csv).unwrap();
    path
}

fn read_parquet(path: &Path) -> DataFrame {
    ParquetReader::new(File::open(path).unwrap()).finish().unwrap()
}

fn output_with_suffix<'a>(files: &'a [PathBuf], suffix: &str) -> &'a PathBuf {
    files
        .iter()
        .find(|p| p.to_string_lossy().ends_with(suffix))
        .unwrap_or_else(|| panic!("no output ending in {} among {:?}", suffix, files))
}

#[test]
fn test_full_conversion_with_every_stage() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_mbes_line(temp_dir.path(), "nyb_line_01.csv");
    let config = MapperConfig::default()
        .with_output_dir(temp_dir.path().join("products"))
        .with_anonymization(AnonymizationContext::new("nyb-2024"))
        .with_keep_mapping()
        .with_overlay(OverlayKind::DeepSeaGuard);

    let result = ConversionJob::new(&input, "mbes", Arc::new(config))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(
        result.metadata.stages_completed,
        vec![
            JobStage::Parsed,
            JobStage::QcApplied,
            JobStage::Anonymized,
            JobStage::Reprojected,
            JobStage::SurfaceBuilt,
            JobStage::OverlayApplied,
            JobStage::Exported,
        ]
    );
    assert_eq!(result.metadata.total_points, 6);
    assert_eq!(result.output_files.len(), 5);
    assert!(result.output_files.iter().all(|p| p.exists()));

    // The unreadable depth cell degrades to a missing value
    assert!(result.dataset.readings[4].vertical_value().is_none());

    let soundings = read_parquet(output_with_suffix(&result.output_files, "_soundings.parquet"));
    assert_eq!(soundings.height(), 6);
    let vessels = soundings.column("vessel_id").unwrap().str().unwrap();
    assert!(
        vessels
            .into_iter()
            .all(|v| v.is_some_and(|v| v.starts_with("VESSEL_")))
    );

    let mapping: serde_json::Value = serde_json::from_slice(
        &fs::read(output_with_suffix(&result.output_files, "_mapping.json")).unwrap(),
    )
    .unwrap();
    let originals: Vec<&str> = mapping
        .as_object()
        .unwrap()
        .values()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(originals.contains(&"RV-ALPHA"));
    assert!(originals.contains(&"NYB-24"));

    let overlay: serde_json::Value = serde_json::from_slice(
        &fs::read(output_with_suffix(&result.output_files, "_overlay.json")).unwrap(),
    )
    .unwrap();
    let samples = overlay.as_array().unwrap();
    assert_eq!(samples.len(), 6);
    // Inside the plume box and deeper than 100 m
    assert_eq!(samples[0]["plume_detected"], true);

    let metadata: serde_json::Value = serde_json::from_slice(
        &fs::read(output_with_suffix(&result.output_files, "_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["pipeline"]["sensor_type"], "mbes");
    assert_eq!(metadata["pipeline"]["anonymization_applied"], true);
    assert_eq!(metadata["pipeline"]["stages_completed"][6], "exported");
    assert_eq!(metadata["coordinate_system"], "WGS84");
    assert!(metadata["quality"]["quality_score"].as_f64().is_some());
}

#[test]
fn test_missing_input_is_a_conversion_failure() {
    let temp_dir = TempDir::new().unwrap();
    let config = MapperConfig::default().with_output_dir(temp_dir.path());
    let err = ConversionJob::new(temp_dir.path().join("absent.csv"), "sbes", Arc::new(config))
        .unwrap()
        .run()
        .unwrap_err();

    assert!(matches!(err, MapperError::Conversion { .. }));
    assert!(err.to_string().contains("absent.csv"));
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_tab_separated_lidar_with_aliases() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("flight_07.txt");
    let rows = [
        "utc\tlat\tlng\tz\tintensity\tclass",
        "2024-07-02T09:00:00Z\t36.80\t-75.90\t2.5\t180\t2",
        "2024-07-02T09:00:01Z\t36.8005\t-75.8995\t2.7\t175\t2",
        "2024-07-02T09:00:02Z\t36.8010\t-75.8990\t-1.2\t60\t9",
        "2024-07-02T09:00:03Z\t36.8015\t-75.8985\t3.1\t190\t2",
    ];
    fs::write(&input, rows.join("\n")).unwrap();

    let config = MapperConfig::default()
        .with_output_dir(temp_dir.path().join("out"))
        .with_qc_mode(QcMode::Manual);
    let result = ConversionJob::new(&input, "LIDAR", Arc::new(config))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(result.metadata.total_points, 4);
    assert_eq!(
        result.dataset.readings[2].vertical,
        Some(Vertical::Elevation(-1.2))
    );
    assert_eq!(result.dataset.readings[2].classification, Some(9.0));
    assert!(result.quality.report.statistics.contains_key("elevation"));
    assert!(result.surface.is_some());
}

#[tokio::test]
async fn test_batch_over_directory_writes_ascii_grids() {
    let temp_dir = TempDir::new().unwrap();
    let survey_dir = temp_dir.path().join("survey");
    fs::create_dir_all(survey_dir.join("day2")).unwrap();
    write_mbes_line(&survey_dir, "line_01.csv");
    write_mbes_line(&survey_dir.join("day2"), "line_02.csv");
    fs::write(survey_dir.join("README.md"), "not a survey").unwrap();

    let inputs = discover_inputs(&[survey_dir.to_string_lossy()]).unwrap();
    assert_eq!(inputs.len(), 2);

    let store = JobStore::new();
    let config = MapperConfig::default()
        .with_output_dir(temp_dir.path().join("grids"))
        .with_output_format(OutputFormat::AsciiGrid)
        .with_max_concurrent_jobs(2);
    let processor = BatchProcessor::new(config, store.clone())
        .unwrap()
        .with_progress(false);

    let stats = processor.process(&inputs, "mbes").await.unwrap();
    assert_eq!(stats.jobs_completed, 2);
    // elevation, uncertainty, density and metadata per input
    assert_eq!(stats.output_files.len(), 8);

    let elevation = output_with_suffix(&stats.output_files, "_elevation.asc");
    let text = fs::read_to_string(elevation).unwrap();
    let header: Vec<&str> = text.lines().take(6).collect();
    assert!(header[0].starts_with("ncols "));
    assert!(header[1].starts_with("nrows "));
    assert_eq!(header[5], "NODATA_value -9999");

    let jobs = store.list(None, 10, 0).await;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert!(jobs.iter().all(|j| j.total_points == Some(6)));
}
