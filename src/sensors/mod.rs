//! Sensor subsystem — individual drivers, estimators, and the aggregating
//! [`SensorHub`].
//!
//! The hub owns the climate driver and the three analog estimators and
//! produces a [`StationSnapshot`] each acquisition cycle.
//!
//! ## Dual-target design
//!
//! On ESP-IDF the analog channels come from ADC1 (initialised by hw_init)
//! and the detector lines from GPIO. On host/test they come from static
//! atomics with `sim_set_*` injectors.

pub mod climate;
pub mod gas;
pub mod moisture;
pub mod uv;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, StoragePort};
use crate::calibration;
use crate::config::StationConfig;
#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
use crate::error::Result;
#[cfg(target_os = "espidf")]
use crate::pins;
use climate::ClimateReading;
use gas::{GasEstimator, GasParams};
use moisture::MoistureEstimator;
use uv::UvEstimator;

/// ADC full scale (12-bit).
const ADC_MAX: f32 = 4095.0;
/// Supply rail used to convert counts to volts.
const ADC_REF_VOLTS: f32 = 3.3;
/// Samples in the boot-time moisture seeding burst.
const SEED_BURST: usize = 5;
/// Minimum spacing between moisture calibration flash writes (ms).
const MOISTURE_SAVE_INTERVAL_MS: u64 = 5_000;

/// Neutral values reported while the climate sensor is absent or failing.
pub const PLACEHOLDER_TEMP_C: f32 = 22.0;
pub const PLACEHOLDER_PRESSURE_HPA: f32 = 1013.25;
pub const PLACEHOLDER_HUMIDITY_PCT: f32 = 50.0;

// ── Host simulation injectors ─────────────────────────────────

#[cfg(not(target_os = "espidf"))]
static SIM_GAS_ADC: AtomicU16 = AtomicU16::new(0);
#[cfg(not(target_os = "espidf"))]
static SIM_MOISTURE_ADC: AtomicU16 = AtomicU16::new(0);
#[cfg(not(target_os = "espidf"))]
static SIM_UV_ADC: AtomicU16 = AtomicU16::new(0);
#[cfg(not(target_os = "espidf"))]
static SIM_GAS_ALERT: AtomicBool = AtomicBool::new(false);
#[cfg(not(target_os = "espidf"))]
static SIM_RAIN_DETECT: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_gas_adc(raw: u16) {
    SIM_GAS_ADC.store(raw, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_moisture_adc(raw: u16) {
    SIM_MOISTURE_ADC.store(raw, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_uv_adc(raw: u16) {
    SIM_UV_ADC.store(raw, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_gas_alert(tripped: bool) {
    SIM_GAS_ALERT.store(tripped, Ordering::Relaxed);
}

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_rain_detect(wet: bool) {
    SIM_RAIN_DETECT.store(wet, Ordering::Relaxed);
}

// ── Snapshot ──────────────────────────────────────────────────

/// One complete acquisition cycle's worth of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationSnapshot {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    pub gas_ppm: f32,
    pub surface_humidity_pct: f32,
    pub raining: bool,
    pub uv_index: f32,
}

// ── Climate seam ──────────────────────────────────────────────

/// Anything that can produce a compensated climate reading. The hub is
/// generic over this seam so tests can inject a scripted source.
pub trait ClimateSource {
    fn sample(&mut self) -> Result<ClimateReading>;
}

impl<I2C, D> ClimateSource for climate::ClimateSensor<I2C, D>
where
    I2C: embedded_hal::i2c::I2c,
    D: embedded_hal::delay::DelayNs,
{
    fn sample(&mut self) -> Result<ClimateReading> {
        self.read()
    }
}

// ── SensorHub ─────────────────────────────────────────────────

/// Aggregates the climate driver and the analog estimators.
pub struct SensorHub<C> {
    /// `None` when no climate sensor is fitted; the loop keeps running
    /// with placeholder climate values.
    climate: Option<C>,
    gas: GasEstimator,
    moisture: MoistureEstimator,
    uv: UvEstimator,
    temp_offset_c: f32,
    pressure_offset_hpa: f32,
    humidity_factor: f32,
    humidity_offset_pct: f32,
    last_moisture_save_ms: Option<u64>,
}

impl<C: ClimateSource> SensorHub<C> {
    /// Build the hub. `climate` is `None` when no sensor is fitted; every
    /// other sensor still works.
    pub fn new(config: &StationConfig, climate: Option<C>) -> Self {
        let mut hub = Self {
            climate,
            gas: GasEstimator::new(GasParams::from(config)),
            moisture: MoistureEstimator::new(
                config.rain_on_threshold_pct,
                config.rain_off_threshold_pct,
                config.rain_lower_is_wetter,
            ),
            uv: UvEstimator::new(config.uv_target_daytime_index),
            temp_offset_c: config.temp_offset_c,
            pressure_offset_hpa: config.pressure_offset_hpa,
            humidity_factor: config.humidity_factor,
            humidity_offset_pct: config.humidity_offset_pct,
            last_moisture_save_ms: None,
        };
        hub.seed_moisture();
        hub
    }

    /// Adopt persisted calibration records where they exist.
    pub fn restore_calibration<S: StoragePort>(&mut self, storage: &S) {
        if let Some(rec) = calibration::load_gas(storage) {
            self.gas.restore(rec);
        }
        if let Some(rec) = calibration::load_moisture(storage) {
            self.moisture.restore(rec);
        }
        if let Some(rec) = calibration::load_uv(storage) {
            self.uv.restore(rec);
        }
    }

    /// Read every sensor and return a unified snapshot.
    ///
    /// A climate read failure is logged and replaced with placeholder
    /// values — one flaky sensor must not stall the loop.
    pub fn read_all(&mut self) -> StationSnapshot {
        let climate = self.read_climate();

        let gas_raw = read_gas_adc();
        let gas_alert = gas_alert_tripped();
        let gas = self.gas.update(gas_raw, climate.temperature_c, gas_alert);

        let moisture_raw = read_moisture_adc();
        let rain_wet = rain_detect_wet();
        let moisture = self.moisture.update(moisture_raw, rain_wet);

        let uv_volts = f32::from(read_uv_adc()) / ADC_MAX * ADC_REF_VOLTS;
        let uv = self.uv.update(uv_volts);

        StationSnapshot {
            temperature_c: climate.temperature_c,
            humidity_pct: climate.humidity_pct,
            pressure_hpa: climate.pressure_hpa,
            gas_ppm: gas.ppm,
            surface_humidity_pct: moisture.surface_pct,
            raining: moisture.raining,
            uv_index: uv.index,
        }
    }

    /// Write back any calibration that changed, rate-limited per
    /// estimator so adaptive bounds cannot wear the flash.
    pub fn persist_dirty<S, E>(&mut self, storage: &mut S, sink: &mut E, now_ms: u64)
    where
        S: StoragePort,
        E: EventSink,
    {
        if let Some(rec) = self.gas.take_dirty() {
            match calibration::save_gas(storage, &rec) {
                Ok(()) => sink.emit(&AppEvent::CalibrationSaved("gas")),
                Err(e) => warn!("gas calibration save failed: {e}"),
            }
        }

        let moisture_due = match self.last_moisture_save_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= MOISTURE_SAVE_INTERVAL_MS,
        };
        if moisture_due {
            if let Some(rec) = self.moisture.take_dirty() {
                self.last_moisture_save_ms = Some(now_ms);
                match calibration::save_moisture(storage, &rec) {
                    Ok(()) => sink.emit(&AppEvent::CalibrationSaved("rain")),
                    Err(e) => warn!("moisture calibration save failed: {e}"),
                }
            }
        }

        if let Some(rec) = self.uv.take_dirty(now_ms) {
            match calibration::save_uv(storage, &rec) {
                Ok(()) => sink.emit(&AppEvent::CalibrationSaved("uv")),
                Err(e) => warn!("uv calibration save failed: {e}"),
            }
        }
    }

    pub fn climate_available(&self) -> bool {
        self.climate.is_some()
    }

    fn read_climate(&mut self) -> ClimateReading {
        let placeholder = ClimateReading {
            temperature_c: PLACEHOLDER_TEMP_C,
            pressure_hpa: PLACEHOLDER_PRESSURE_HPA,
            humidity_pct: PLACEHOLDER_HUMIDITY_PCT,
        };
        let Some(sensor) = self.climate.as_mut() else {
            return placeholder;
        };
        match sensor.sample() {
            Ok(r) => ClimateReading {
                temperature_c: r.temperature_c + self.temp_offset_c,
                pressure_hpa: r.pressure_hpa + self.pressure_offset_hpa,
                humidity_pct: (r.humidity_pct * self.humidity_factor + self.humidity_offset_pct)
                    .clamp(0.0, 100.0),
            },
            Err(e) => {
                warn!("climate read failed: {e}");
                placeholder
            }
        }
    }

    /// Average a short burst so the moisture bounds start from a stable
    /// dry-plate estimate instead of a single noisy count.
    fn seed_moisture(&mut self) {
        let mut sum = 0.0;
        for _ in 0..SEED_BURST {
            sum += f32::from(read_moisture_adc());
        }
        self.moisture.seed(sum / SEED_BURST as f32);
    }
}

// ── Raw channel access ────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn read_gas_adc() -> u16 {
    hw_init::adc1_read(pins::GAS_ADC_CHANNEL)
}

#[cfg(not(target_os = "espidf"))]
fn read_gas_adc() -> u16 {
    SIM_GAS_ADC.load(Ordering::Relaxed)
}

#[cfg(target_os = "espidf")]
fn read_moisture_adc() -> u16 {
    hw_init::adc1_read(pins::MOISTURE_ADC_CHANNEL)
}

#[cfg(not(target_os = "espidf"))]
fn read_moisture_adc() -> u16 {
    SIM_MOISTURE_ADC.load(Ordering::Relaxed)
}

#[cfg(target_os = "espidf")]
fn read_uv_adc() -> u16 {
    hw_init::adc1_read(pins::UV_ADC_CHANNEL)
}

#[cfg(not(target_os = "espidf"))]
fn read_uv_adc() -> u16 {
    SIM_UV_ADC.load(Ordering::Relaxed)
}

/// Comparator outputs are active-low.
#[cfg(target_os = "espidf")]
fn gas_alert_tripped() -> bool {
    !hw_init::gpio_read(pins::GAS_ALERT_GPIO)
}

#[cfg(not(target_os = "espidf"))]
fn gas_alert_tripped() -> bool {
    SIM_GAS_ALERT.load(Ordering::Relaxed)
}

#[cfg(target_os = "espidf")]
fn rain_detect_wet() -> bool {
    !hw_init::gpio_read(pins::RAIN_DETECT_GPIO)
}

#[cfg(not(target_os = "espidf"))]
fn rain_detect_wet() -> bool {
    SIM_RAIN_DETECT.load(Ordering::Relaxed)
}
