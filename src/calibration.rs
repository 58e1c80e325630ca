//! Persistent calibration records.
//!
//! Each estimator owns one small record, serialized with postcard and
//! stored under the `calib` namespace.  Loading is forgiving: a missing
//! or undecodable record comes back as `Ok(None)` and the estimator
//! recalibrates from scratch — stale flash must never brick acquisition.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};

const NAMESPACE: &str = "calib";
const KEY_GAS: &str = "gas";
const KEY_RAIN: &str = "rain";
const KEY_UV: &str = "uv";

/// Upper bound on a serialized record; postcard output for these structs
/// is far smaller.
const RECORD_BUF: usize = 64;

/// Clean-air baseline for the gas estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasCalibration {
    /// Sensor resistance at the reference concentration (Ω).
    pub r0_ohms: f32,
}

/// Adaptive wet/dry bounds for the moisture plate, in raw ADC counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoistureCalibration {
    /// Raw reading of a fully dry plate.
    pub dry_raw: f32,
    /// Raw reading of a saturated plate.
    pub wet_raw: f32,
    /// Polarity the bounds were learned under; a record taken with the
    /// opposite wiring is useless and gets discarded on restore.
    pub lower_is_wetter: bool,
}

/// Dark offset and scale for the analog UV sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvCalibration {
    /// Output voltage with no UV exposure (V).
    pub dark_offset_v: f32,
    /// Index units per volt above the dark offset.
    pub scale: f32,
}

fn load<T, S>(storage: &S, key: &str) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
    S: StoragePort,
{
    let mut buf = [0u8; RECORD_BUF];
    let len = match storage.read(NAMESPACE, key, &mut buf) {
        Ok(len) => len,
        Err(StorageError::NotFound) => return None,
        Err(e) => {
            warn!("calibration read {NAMESPACE}/{key} failed: {e}");
            return None;
        }
    };
    match postcard::from_bytes(&buf[..len]) {
        Ok(record) => Some(record),
        Err(_) => {
            warn!("calibration record {NAMESPACE}/{key} undecodable, discarding");
            None
        }
    }
}

fn save<T, S>(storage: &mut S, key: &str, record: &T) -> Result<(), StorageError>
where
    T: Serialize,
    S: StoragePort,
{
    let mut buf = [0u8; RECORD_BUF];
    let used = postcard::to_slice(record, &mut buf).map_err(|_| StorageError::Full)?;
    storage.write(NAMESPACE, key, used)
}

pub fn load_gas<S: StoragePort>(storage: &S) -> Option<GasCalibration> {
    load(storage, KEY_GAS)
}

pub fn save_gas<S: StoragePort>(
    storage: &mut S,
    record: &GasCalibration,
) -> Result<(), StorageError> {
    save(storage, KEY_GAS, record)
}

pub fn load_moisture<S: StoragePort>(storage: &S) -> Option<MoistureCalibration> {
    load(storage, KEY_RAIN)
}

pub fn save_moisture<S: StoragePort>(
    storage: &mut S,
    record: &MoistureCalibration,
) -> Result<(), StorageError> {
    save(storage, KEY_RAIN, record)
}

pub fn load_uv<S: StoragePort>(storage: &S) -> Option<UvCalibration> {
    load(storage, KEY_UV)
}

pub fn save_uv<S: StoragePort>(
    storage: &mut S,
    record: &UvCalibration,
) -> Result<(), StorageError> {
    save(storage, KEY_UV, record)
}
