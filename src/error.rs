//! Unified error types for the meteonode firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling
//! uniform. All variants are `Copy` so they can be cheaply passed through the
//! control loop without allocation.
//!
//! The taxonomy mirrors how faults are actually handled:
//!
//! * [`Error::SensorNotFound`] — discovery failed; fatal to that sensor
//!   instance only, the hub substitutes placeholder readings.
//! * [`Error::InvalidReading`] — raw value outside its physical range;
//!   sanitized or replaced at the driver boundary, never propagated upward.
//! * [`Error::CalibrationUnavailable`] — lazy calibration pending or failed;
//!   transient, the estimator returns a neutral output until it succeeds.
//! * [`Error::LinkUnavailable`] — WiFi association failed within its bounded
//!   wait; the loop proceeds offline and retries later.
//! * [`Error::TransmitFailure`] — send failed or timed out; retried at the
//!   next gating interval, never escalated.

use core::fmt;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No sensor answered at any known bus address with the right chip id.
    SensorNotFound(&'static str),
    /// A raw reading was outside its physically plausible range.
    InvalidReading(&'static str),
    /// Calibration data is absent and could not be produced on the spot.
    CalibrationUnavailable(&'static str),
    /// The network link could not be established within its bounded wait.
    LinkUnavailable,
    /// A telemetry send failed or timed out.
    TransmitFailure(&'static str),
    /// A bus transaction (I2C read/write) failed.
    Bus(&'static str),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorNotFound(which) => write!(f, "sensor not found: {which}"),
            Self::InvalidReading(what) => write!(f, "invalid reading: {what}"),
            Self::CalibrationUnavailable(which) => {
                write!(f, "calibration unavailable: {which}")
            }
            Self::LinkUnavailable => write!(f, "network link unavailable"),
            Self::TransmitFailure(why) => write!(f, "transmit failure: {why}"),
            Self::Bus(what) => write!(f, "bus error: {what}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_sensor() {
        let e = Error::SensorNotFound("bme280");
        assert_eq!(e.to_string(), "sensor not found: bme280");
    }

    #[test]
    fn errors_are_copy() {
        let e = Error::LinkUnavailable;
        let f = e;
        assert_eq!(e, f);
    }
}
