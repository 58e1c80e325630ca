//! Resistive rain plate — surface humidity and rain detection.
//!
//! The stock plate reads high when dry and low when wet, but some boards
//! buffer the signal through an inverting stage, so polarity is
//! configurable. Raw counts drift with plate corrosion and temperature,
//! so the estimator keeps adaptive wet/dry bounds: the wet bound snaps
//! immediately to new extremes on the wet side (rain is sudden), the dry
//! bound creeps toward extremes on the dry side (drying is slow).
//! Surface humidity is the filtered reading normalized into those bounds,
//! and a hysteresis band turns it into a stable rain flag.

use log::info;

use crate::calibration::MoistureCalibration;
use crate::filter::Ema;

const EMA_ALPHA: f32 = 0.2;
/// ADC full scale (12-bit).
const ADC_MAX: f32 = 4095.0;
/// Initial wet-bound guess offset from the boot-time average.
const INIT_WET_OFFSET: f32 = 500.0;
/// Dry-bound creep per sample toward a new extreme.
const DRY_CREEP: f32 = 0.01;
/// Minimum usable span between the bounds, in raw counts.
const MIN_SPAN: f32 = 62.0;

#[derive(Debug, Clone, Copy)]
pub struct MoistureReading {
    pub raw: u16,
    /// Normalized surface humidity, 0 (dry) to 100 (saturated).
    pub surface_pct: f32,
    /// Hysteresis-gated rain flag, OR'd with the digital detector.
    pub raining: bool,
}

pub struct MoistureEstimator {
    filter: Ema,
    dry_raw: f32,
    wet_raw: f32,
    lower_is_wetter: bool,
    raining: bool,
    on_threshold_pct: f32,
    off_threshold_pct: f32,
    seeded: bool,
    dirty: bool,
}

impl MoistureEstimator {
    pub fn new(on_threshold_pct: f32, off_threshold_pct: f32, lower_is_wetter: bool) -> Self {
        Self {
            filter: Ema::new(EMA_ALPHA),
            dry_raw: 0.0,
            wet_raw: 0.0,
            lower_is_wetter,
            raining: false,
            on_threshold_pct,
            off_threshold_pct,
            seeded: false,
            dirty: false,
        }
    }

    /// Seed from a boot-time burst average: assume the plate is dry right
    /// now and place the wet bound a fixed offset toward the wet side.
    /// The guessed bounds are marked for persistence so a quick power
    /// cycle does not restart from nothing.
    pub fn seed(&mut self, burst_avg_raw: f32) {
        if self.seeded {
            return;
        }
        self.filter.seed(burst_avg_raw);
        self.dry_raw = burst_avg_raw;
        self.wet_raw = if self.lower_is_wetter {
            (burst_avg_raw - INIT_WET_OFFSET).max(0.0)
        } else {
            (burst_avg_raw + INIT_WET_OFFSET).min(ADC_MAX)
        };
        self.seeded = true;
        self.dirty = true;
        info!(
            "moisture bounds seeded: dry={:.0} wet={:.0}",
            self.dry_raw, self.wet_raw
        );
    }

    /// Adopt persisted bounds instead of the boot-time guess. A record
    /// learned under the opposite polarity, or with inverted ordering,
    /// is discarded.
    pub fn restore(&mut self, record: MoistureCalibration) {
        if record.lower_is_wetter != self.lower_is_wetter {
            return;
        }
        let ordered = if self.lower_is_wetter {
            record.dry_raw > record.wet_raw
        } else {
            record.wet_raw > record.dry_raw
        };
        if ordered {
            self.dry_raw = record.dry_raw;
            self.wet_raw = record.wet_raw;
            self.seeded = true;
        }
    }

    /// Bounds to persist, if they moved since the last call.
    pub fn take_dirty(&mut self) -> Option<MoistureCalibration> {
        if self.dirty && self.seeded {
            self.dirty = false;
            Some(MoistureCalibration {
                dry_raw: self.dry_raw,
                wet_raw: self.wet_raw,
                lower_is_wetter: self.lower_is_wetter,
            })
        } else {
            None
        }
    }

    /// Process one sample. `digital_wet` is the module's comparator
    /// output; it can force the flag on but never clears it early.
    pub fn update(&mut self, raw: u16, digital_wet: bool) -> MoistureReading {
        if !self.seeded {
            self.seed(f32::from(raw));
        }
        let filtered = self.filter.update(f32::from(raw));

        // Wet bound snaps, dry bound creeps.
        let past_wet = if self.lower_is_wetter {
            filtered < self.wet_raw
        } else {
            filtered > self.wet_raw
        };
        if past_wet {
            self.wet_raw = filtered;
            self.dirty = true;
        }
        let past_dry = if self.lower_is_wetter {
            filtered > self.dry_raw
        } else {
            filtered < self.dry_raw
        };
        if past_dry {
            self.dry_raw += (filtered - self.dry_raw) * DRY_CREEP;
            self.dirty = true;
        }

        let span = (self.dry_raw - self.wet_raw).abs().max(MIN_SPAN);
        let toward_wet = if self.lower_is_wetter {
            self.dry_raw - filtered
        } else {
            filtered - self.dry_raw
        };
        let surface_pct = (toward_wet / span * 100.0).clamp(0.0, 100.0);

        if surface_pct >= self.on_threshold_pct {
            self.raining = true;
        } else if surface_pct <= self.off_threshold_pct {
            self.raining = false;
        }

        MoistureReading {
            raw,
            surface_pct,
            raining: self.raining || digital_wet,
        }
    }
}
