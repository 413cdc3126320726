//! Identifier anonymization and GPS jitter.
//!
//! Vessel and survey identifiers are replaced by a salted SHA-256 digest,
//! so the same identifier always hashes to the same token for a given
//! salt. Coordinates are jittered only for readings that request it; the
//! offset comes from a PRNG seeded per reading from the salt and the
//! original position.

use crate::config::AnonymizationContext;
use crate::constants::{
    ANONYMIZED_HASH_CHARS, ANONYMIZED_ID_PREFIX, DEFAULT_SALT, METERS_PER_DEGREE,
};
use crate::error::{MapperError, Result};
use crate::models::{AnonymizationInfo, Dataset, SensorReading};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Hashed identifier to original identifier
pub type VesselMapping = BTreeMap<String, String>;

/// Deterministic anonymized token for an identifier
pub fn hash_identifier(value: &str, salt: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", value, salt).as_bytes());
    let hex = hex::encode(digest);
    format!(
        "{}{}",
        ANONYMIZED_ID_PREFIX,
        hex[..ANONYMIZED_HASH_CHARS].to_uppercase()
    )
}

/// PRNG seeded from the salt and a position
fn jitter_rng(salt: &str, latitude: f64, longitude: f64) -> StdRng {
    let digest = Sha256::digest(format!("{}_{}_{}", salt, latitude, longitude).as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(seed))
}

/// Jittered position within `radius_meters` of the original
pub fn jitter_position(
    latitude: f64,
    longitude: f64,
    salt: &str,
    radius_meters: f64,
) -> (f64, f64) {
    if !latitude.is_finite() || !longitude.is_finite() || radius_meters == 0.0 {
        return (latitude, longitude);
    }

    let lat_span = radius_meters / METERS_PER_DEGREE;
    let lon_scale = latitude.to_radians().cos().abs().max(1e-6);
    let lon_span = radius_meters / (METERS_PER_DEGREE * lon_scale);

    let mut rng = jitter_rng(salt, latitude, longitude);
    let lat_offset = rng.gen_range(-lat_span..=lat_span);
    let lon_offset = rng.gen_range(-lon_span..=lon_span);

    (latitude + lat_offset, longitude + lon_offset)
}

/// Stateless anonymizer configured with a salt and jitter radius
#[derive(Debug, Clone, Default)]
pub struct AnonymizationEngine {
    context: AnonymizationContext,
}

impl AnonymizationEngine {
    pub fn new(context: AnonymizationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AnonymizationContext {
        &self.context
    }

    /// Anonymized copy of a dataset. Fails on an invalid context; a failure
    /// here must abort the job rather than emit identifiable data.
    pub fn anonymize(&self, dataset: &Dataset, sensor_label: &str) -> Result<Dataset> {
        self.context.validate()?;
        info!(
            "Anonymizing {} readings (sensor={}, custom_salt={})",
            dataset.len(),
            sensor_label,
            self.context.salt != DEFAULT_SALT
        );

        let mut identifiers_hashed = 0;
        let mut gps_jittered = 0;

        let readings: Vec<SensorReading> = dataset
            .readings
            .iter()
            .map(|reading| {
                let (anonymized, hashed, jittered) = self.anonymize_reading(reading);
                identifiers_hashed += hashed;
                gps_jittered += usize::from(jittered);
                anonymized
            })
            .collect();

        let mut anonymized = dataset.with_readings(readings);
        anonymized.metadata.anonymization = Some(AnonymizationInfo {
            applied: true,
            salt_used: self.context.salt != DEFAULT_SALT,
            identifiers_hashed,
            gps_jittered,
            reversed: false,
        });

        info!(
            "Anonymization completed: {} identifiers hashed, {} positions jittered",
            identifiers_hashed, gps_jittered
        );
        Ok(anonymized)
    }

    /// Anonymize and also return the mapping needed to reverse identifiers
    pub fn anonymize_with_mapping(
        &self,
        dataset: &Dataset,
        sensor_label: &str,
    ) -> Result<(Dataset, VesselMapping)> {
        let anonymized = self.anonymize(dataset, sensor_label)?;
        let mapping = generate_vessel_mapping(dataset, &anonymized);
        Ok((anonymized, mapping))
    }

    fn anonymize_reading(&self, reading: &SensorReading) -> (SensorReading, usize, bool) {
        let salt = &self.context.salt;
        let mut anonymized = reading.clone();
        let mut hashed = 0;

        for field in [
            &mut anonymized.vessel_id,
            &mut anonymized.vessel_name,
            &mut anonymized.survey_id,
        ] {
            if let Some(value) = field.as_mut() {
                *value = hash_identifier(value, salt);
                hashed += 1;
            }
        }

        if reading.gps_jitter {
            let (lat, lon) = jitter_position(
                reading.latitude,
                reading.longitude,
                salt,
                self.context.jitter_radius_meters,
            );
            anonymized.latitude = lat;
            anonymized.longitude = lon;
        }

        (anonymized, hashed, reading.gps_jitter)
    }

    /// Restore identifiers found in `mapping`. Only entries whose original
    /// re-hashes to the mapped token under this salt are trusted. Jittered
    /// coordinates are left as they are.
    pub fn reverse(&self, dataset: &Dataset, mapping: &VesselMapping) -> Result<Dataset> {
        self.context.validate()?;
        let salt = &self.context.salt;
        let mut restored = 0;
        let mut rejected = 0;

        let readings = dataset
            .readings
            .iter()
            .map(|reading| {
                let mut reversed = reading.clone();
                for field in [
                    &mut reversed.vessel_id,
                    &mut reversed.vessel_name,
                    &mut reversed.survey_id,
                ] {
                    let Some(token) = field.as_ref() else {
                        continue;
                    };
                    let Some(original) = mapping.get(token) else {
                        continue;
                    };
                    if hash_identifier(original, salt) == *token {
                        *field = Some(original.clone());
                        restored += 1;
                    } else {
                        rejected += 1;
                    }
                }
                reversed
            })
            .collect();

        if rejected > 0 {
            warn!(
                "{} mapping entries did not match the supplied salt and were not restored",
                rejected
            );
        }
        debug!("Restored {} identifiers", restored);

        let mut reversed = dataset.with_readings(readings);
        if let Some(info) = reversed.metadata.anonymization.as_mut() {
            info.reversed = true;
        }
        Ok(reversed)
    }
}

/// Pair identifiers of an original dataset with their anonymized tokens.
///
/// Datasets of different length produce an empty mapping.
pub fn generate_vessel_mapping(original: &Dataset, anonymized: &Dataset) -> VesselMapping {
    let mut mapping = VesselMapping::new();

    if original.len() != anonymized.len() {
        warn!(
            "Point count mismatch between original ({}) and anonymized ({}) data",
            original.len(),
            anonymized.len()
        );
        return mapping;
    }

    for (orig, anon) in original.readings.iter().zip(&anonymized.readings) {
        let pairs = [
            (&orig.vessel_id, &anon.vessel_id),
            (&orig.vessel_name, &anon.vessel_name),
            (&orig.survey_id, &anon.survey_id),
        ];
        for (original_value, token) in pairs {
            if let (Some(original_value), Some(token)) = (original_value, token) {
                mapping.insert(token.clone(), original_value.clone());
            }
        }
    }

    debug!("Vessel mapping generated with {} entries", mapping.len());
    mapping
}

/// True when the dataset is flagged as anonymized and carries hashed tokens
pub fn validate_anonymization(dataset: &Dataset) -> bool {
    let applied = dataset
        .metadata
        .anonymization
        .as_ref()
        .is_some_and(|info| info.applied && !info.reversed);
    if !applied {
        return false;
    }

    dataset.readings.iter().all(|reading| {
        [&reading.vessel_id, &reading.vessel_name, &reading.survey_id]
            .into_iter()
            .flatten()
            .all(|value| value.starts_with(ANONYMIZED_ID_PREFIX))
    })
}
