//! Analog UV sensor — self-scaling UV index estimate.
//!
//! The module outputs a voltage that sits at an unknown dark offset and
//! rises with UV exposure, with unit-to-unit gain spread. Rather than
//! trusting a datasheet transfer curve, the estimator learns both
//! parameters from the signal itself:
//!
//! * the 5th percentile of a long voltage history approximates the dark
//!   offset (nighttime readings dominate the low tail),
//! * the 95th percentile approximates the daytime peak, and the scale is
//!   nudged so that peak maps to a plausible daytime index.
//!
//! Both estimates move slowly (blended, rate-limited) so a cloudy week
//! cannot wreck the calibration.

use crate::calibration::UvCalibration;
use crate::filter::Ema;
use crate::history::BoundedHistory;

const EMA_ALPHA: f32 = 0.2;
/// Long-window capacity for the offset/scale percentiles.
const HISTORY_CAP: usize = 180;
/// Offset estimation needs this fraction of the window filled.
const OFFSET_FILL: f32 = 0.5;
/// Scale estimation needs this fraction of the window filled.
const SCALE_FILL: f32 = 0.7;
/// Minimum daytime span (V) worth deriving a scale from.
const MIN_SPAN_V: f32 = 0.05;
/// Per-update clamp on the scale candidate, relative to the current scale.
const SCALE_STEP: f32 = 0.10;
/// Output smoothing window.
const SMOOTH_WINDOW: usize = 8;
/// Ceiling on the reported index.
const INDEX_CAP: f32 = 12.0;
/// Scale drift that justifies a flash write.
const SAVE_DELTA: f32 = 0.05;
/// Minimum spacing between flash writes (ms).
const SAVE_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
pub struct UvReading {
    pub voltage: f32,
    /// Smoothed UV index, 0 to 12.
    pub index: f32,
}

pub struct UvEstimator {
    target_index: f32,
    filter: Ema,
    history: BoundedHistory<HISTORY_CAP>,
    index_window: BoundedHistory<SMOOTH_WINDOW>,
    dark_offset_v: Option<f32>,
    scale: f32,
    saved_scale: f32,
    last_save_ms: Option<u64>,
}

impl UvEstimator {
    pub fn new(target_index: f32) -> Self {
        // A 1 V daytime span is a reasonable prior for these modules;
        // the scale converges from there.
        let scale = target_index.max(1.0);
        Self {
            target_index,
            filter: Ema::new(EMA_ALPHA),
            history: BoundedHistory::new(),
            index_window: BoundedHistory::new(),
            dark_offset_v: None,
            scale,
            saved_scale: scale,
            last_save_ms: None,
        }
    }

    /// Adopt a persisted offset/scale pair.
    pub fn restore(&mut self, record: UvCalibration) {
        if record.scale > 0.0 {
            self.dark_offset_v = Some(record.dark_offset_v);
            self.scale = record.scale;
            self.saved_scale = record.scale;
        }
    }

    /// The calibration to persist, when the scale has drifted enough and
    /// the last write is old enough.
    pub fn take_dirty(&mut self, now_ms: u64) -> Option<UvCalibration> {
        let offset = self.dark_offset_v?;
        if (self.scale - self.saved_scale).abs() <= SAVE_DELTA {
            return None;
        }
        if let Some(last) = self.last_save_ms {
            if now_ms.saturating_sub(last) < SAVE_INTERVAL_MS {
                return None;
            }
        }
        self.saved_scale = self.scale;
        self.last_save_ms = Some(now_ms);
        Some(UvCalibration {
            dark_offset_v: offset,
            scale: self.scale,
        })
    }

    /// Process one voltage sample.
    pub fn update(&mut self, voltage: f32) -> UvReading {
        let v = self.filter.update(voltage);
        self.history.push(v);

        if self.history.fill_ratio() >= OFFSET_FILL {
            if let Some(p05) = self.history.percentile(0.05) {
                self.dark_offset_v = Some(match self.dark_offset_v {
                    None => p05,
                    Some(old) => 0.99 * old + 0.01 * p05,
                });
            }
        }
        if self.history.fill_ratio() >= SCALE_FILL {
            self.refine_scale();
        }

        let index = match self.dark_offset_v {
            None => 0.0,
            Some(offset) => ((v - offset) * self.scale).max(0.0),
        };
        self.index_window.push(index);
        UvReading {
            voltage: v,
            index: self.index_window.mean().min(INDEX_CAP),
        }
    }

    fn refine_scale(&mut self) {
        let (Some(offset), Some(p95)) = (self.dark_offset_v, self.history.percentile(0.95))
        else {
            return;
        };
        let span = p95 - offset;
        if span <= MIN_SPAN_V {
            // Flat history (night, long overcast): nothing to learn.
            return;
        }
        let candidate = (self.target_index / span).clamp(
            self.scale * (1.0 - SCALE_STEP),
            self.scale * (1.0 + SCALE_STEP),
        );
        self.scale = 0.9 * self.scale + 0.1 * candidate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(e: &mut UvEstimator, voltage: f32, n: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..n {
            last = e.update(voltage).index;
        }
        last
    }

    #[test]
    fn index_is_zero_before_offset_is_known() {
        let mut e = UvEstimator::new(8.0);
        // Fewer samples than half the window: no offset yet.
        let idx = run(&mut e, 1.5, HISTORY_CAP / 2 - 1);
        assert_eq!(idx, 0.0);
    }

    #[test]
    fn dark_input_converges_to_zero_index() {
        let mut e = UvEstimator::new(8.0);
        let idx = run(&mut e, 1.0, HISTORY_CAP * 2);
        assert!(idx < 0.5, "index was {idx}");
    }

    #[test]
    fn constant_input_settles_to_a_steady_index() {
        let mut e = UvEstimator::new(8.0);
        run(&mut e, 2.0, HISTORY_CAP);
        // With the estimator converged, the smoothed index over a fresh
        // window of identical samples must not wobble.
        let mut window: BoundedHistory<20> = BoundedHistory::new();
        let mut last = e.update(2.0);
        for _ in 0..20 {
            last = e.update(2.0);
            window.push(last.index);
        }
        assert!((last.voltage - 2.0).abs() < 1e-3, "EMA never settled");
        assert!(
            window.variance() < 1e-6,
            "index variance was {}",
            window.variance()
        );
    }

    #[test]
    fn index_never_exceeds_cap() {
        let mut e = UvEstimator::new(8.0);
        e.restore(UvCalibration {
            dark_offset_v: 0.0,
            scale: 100.0,
        });
        let idx = run(&mut e, 3.3, HISTORY_CAP * 2);
        assert!(idx <= INDEX_CAP);
    }

    #[test]
    fn index_is_never_negative() {
        let mut e = UvEstimator::new(8.0);
        e.restore(UvCalibration {
            dark_offset_v: 2.0,
            scale: 5.0,
        });
        let idx = run(&mut e, 0.5, 50);
        assert!(idx >= 0.0);
    }

    #[test]
    fn brighter_light_reads_higher() {
        let mut e = UvEstimator::new(8.0);
        // Learn a baseline, then compare two exposure levels.
        run(&mut e, 1.0, HISTORY_CAP);
        let low = run(&mut e, 1.3, 20);
        let high = run(&mut e, 2.0, 20);
        assert!(high > low, "expected {high} > {low}");
    }

    #[test]
    fn scale_moves_at_most_a_step_per_update() {
        let mut e = UvEstimator::new(8.0);
        e.restore(UvCalibration {
            dark_offset_v: 1.0,
            scale: 4.0,
        });
        // A narrow daytime span wants a much larger scale, but each
        // update may only move a fraction of the clamp step.
        run(&mut e, 3.0, HISTORY_CAP);
        let before = e.scale;
        e.update(3.0);
        let delta = (e.scale - before).abs();
        assert!(e.scale > 4.0, "scale never adapted");
        assert!(
            delta <= before * SCALE_STEP * 0.1 + 1e-6,
            "scale jumped by {delta} in one update"
        );
    }

    #[test]
    fn persistence_is_rate_limited() {
        let mut e = UvEstimator::new(8.0);
        e.restore(UvCalibration {
            dark_offset_v: 1.0,
            scale: 4.0,
        });
        // Drift the scale well past the save threshold.
        run(&mut e, 3.0, HISTORY_CAP * 2);
        assert!((e.scale - e.saved_scale).abs() > SAVE_DELTA);

        let first = e.take_dirty(100_000);
        assert!(first.is_some());
        // Drift again immediately: blocked by the save interval.
        run(&mut e, 0.2, HISTORY_CAP * 2);
        assert!(e.take_dirty(100_000 + SAVE_INTERVAL_MS / 2).is_none());
    }

    #[test]
    fn clean_estimator_has_nothing_to_save() {
        let mut e = UvEstimator::new(8.0);
        assert!(e.take_dirty(0).is_none());
        run(&mut e, 1.0, 10);
        assert!(e.take_dirty(10_000).is_none());
    }
}
