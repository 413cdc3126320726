//! Batch processing tests
//!
//! Drive the processor over small sounding files written to temporary
//! directories.


use std::fs;
use std::path::{Path, PathBuf};

/// Write an MBES file with one sounding per depth
pub(crate) fn write_survey(dir: &Path, name: &str, depths: &[f64]) -> PathBuf {
    let mut csv = String::from("timestamp,latitude,longitude,depth,vessel_id\n");
    for (i, depth) in depths.iter().enumerate() {
        csv.push_str(&format!(
            "2024-06-01T12:00:{:02}Z,{},{},{},RV-ALPHA\n",
            i,
            40.5 + i as f64 * 0.0004,
            -73.5 + i as f64 * 0.0003,
            depth
        ));
    }
    let path = dir.join(name);
    fs::write(&path, csv).unwrap();
    path
}
