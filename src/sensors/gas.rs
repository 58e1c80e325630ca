//! MQ135 gas sensor — approximate CO2 concentration.
//!
//! The heater-driven resistive element is read through a voltage divider
//! (load resistance RL). The estimator converts the raw ADC count to the
//! sensor resistance Rs, applies a temperature correction for cold air,
//! and maps the Rs/R0 ratio through the datasheet power-law curve
//! `ppm = A·(Rs/R0)^B`.
//!
//! R0 (clean-air resistance at the reference concentration) is not known
//! at the factory: the estimator self-calibrates from the first window of
//! corrected samples and reports 0.0 ppm until that baseline exists.

use log::{debug, info};

use crate::calibration::GasCalibration;
use crate::error::{Error, Result};
use crate::history::BoundedHistory;

/// ADC full scale (12-bit oneshot reads).
const ADC_MAX: f32 = 4095.0;
/// Samples averaged for the clean-air baseline.
const CALIB_WINDOW: usize = 10;
/// Output smoothing window.
const SMOOTH_WINDOW: usize = 10;
/// Floor for the Rs/R0 ratio; the power law diverges at 0.
const MIN_RATIO: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct GasParams {
    /// Divider load resistance RL (Ω).
    pub load_resistance_ohms: f32,
    /// Sensor supply voltage (V).
    pub supply_volts: f32,
    /// Curve coefficient A in `ppm = A·(Rs/R0)^B`.
    pub curve_a: f32,
    /// Curve exponent B (negative).
    pub curve_b: f32,
    /// Concentration assumed present during baseline calibration (ppm).
    pub reference_ppm: f32,
}

impl From<&crate::config::StationConfig> for GasParams {
    fn from(c: &crate::config::StationConfig) -> Self {
        Self {
            load_resistance_ohms: c.gas_load_resistance_ohms,
            supply_volts: c.gas_supply_volts,
            curve_a: c.gas_curve_a,
            curve_b: c.gas_curve_b,
            reference_ppm: c.gas_reference_ppm,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GasReading {
    pub raw: u16,
    /// Smoothed concentration; 0.0 until the baseline exists.
    pub ppm: f32,
    /// Digital comparator output from the module (active when tripped).
    pub alert: bool,
}

pub struct GasEstimator {
    params: GasParams,
    r0_ohms: Option<f32>,
    baseline: BoundedHistory<CALIB_WINDOW>,
    smoothing: BoundedHistory<SMOOTH_WINDOW>,
    dirty: bool,
}

impl GasEstimator {
    pub fn new(params: GasParams) -> Self {
        Self {
            params,
            r0_ohms: None,
            baseline: BoundedHistory::new(),
            smoothing: BoundedHistory::new(),
            dirty: false,
        }
    }

    /// Adopt a previously persisted baseline, skipping self-calibration.
    pub fn restore(&mut self, record: GasCalibration) {
        if record.r0_ohms > 0.0 {
            self.r0_ohms = Some(record.r0_ohms);
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.r0_ohms.is_some()
    }

    /// The baseline to persist, if it changed since the last call.
    pub fn take_dirty(&mut self) -> Option<GasCalibration> {
        if self.dirty {
            self.dirty = false;
            self.r0_ohms.map(|r0_ohms| GasCalibration { r0_ohms })
        } else {
            None
        }
    }

    /// Process one sample. `temperature_c` feeds the cold-air correction;
    /// pass the current ambient reading (a fallback value is fine).
    pub fn update(&mut self, raw: u16, temperature_c: f32, alert: bool) -> GasReading {
        let ppm = match self.try_estimate(raw, temperature_c) {
            Ok(ppm) => ppm,
            Err(e) => {
                debug!("gas: {e}");
                0.0
            }
        };
        GasReading { raw, ppm, alert }
    }

    /// One estimation step as a result-bearing operation: a rail at zero
    /// or a missing baseline is a recoverable value, not a swallowed
    /// fault. The caller reports 0.0 ppm until it clears.
    fn try_estimate(&mut self, raw: u16, temperature_c: f32) -> Result<f32> {
        let rs = self
            .corrected_resistance(raw, temperature_c)
            .ok_or(Error::InvalidReading("gas output rail at zero"))?;
        let Some(r0) = self.r0_ohms else {
            self.accumulate_baseline(rs);
            return Err(Error::CalibrationUnavailable("gas"));
        };
        let ratio = (rs / r0).max(MIN_RATIO);
        let ppm = self.params.curve_a * ratio.powf(self.params.curve_b);
        self.smoothing.push(ppm);
        Ok(self.smoothing.mean())
    }

    /// Rs from the divider equation, corrected for cold air. `None` when
    /// the output rail reads zero (sensor still heating, or disconnected).
    /// A saturated code is pulled one count off full scale: Rs would
    /// otherwise hit exactly 0 and the strongest possible signal would
    /// read as clean air.
    fn corrected_resistance(&self, raw: u16, temperature_c: f32) -> Option<f32> {
        let raw = f32::from(raw).min(ADC_MAX - 1.0);
        let v_out = raw / ADC_MAX * self.params.supply_volts;
        if v_out <= 0.0 {
            return None;
        }
        let rs = self.params.load_resistance_ohms * (self.params.supply_volts / v_out - 1.0);
        if rs <= 0.0 {
            return None;
        }
        // Resistance rises in cold air; normalize below 20 °C.
        let rs = if temperature_c < 20.0 {
            rs / (1.0 + 0.01 * (20.0 - temperature_c))
        } else {
            rs
        };
        Some(rs)
    }

    /// Collect clean-air samples; once the window fills, derive R0 so that
    /// the current environment reads as the reference concentration.
    fn accumulate_baseline(&mut self, rs: f32) {
        self.baseline.push(rs);
        if self.baseline.len() < CALIB_WINDOW {
            return;
        }
        let ratio_at_ref =
            (self.params.reference_ppm / self.params.curve_a).powf(1.0 / self.params.curve_b);
        if ratio_at_ref <= 0.0 {
            return;
        }
        let r0 = self.baseline.mean() / ratio_at_ref;
        info!("gas baseline calibrated: R0 = {r0:.0} ohm");
        self.r0_ohms = Some(r0);
        self.dirty = true;
    }
}
