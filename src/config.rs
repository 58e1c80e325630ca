//! System configuration parameters
//!
//! All tunable parameters for the meteonode station.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    // --- Network ---
    /// WiFi SSID (station mode).
    pub wifi_ssid: heapless::String<32>,
    /// WiFi passphrase (empty = open network).
    pub wifi_password: heapless::String<64>,
    /// Regulatory country code for the radio (e.g. "FR").
    pub wifi_country: heapless::String<2>,
    /// Collector ingest endpoint (POST target).
    pub api_url: heapless::String<128>,
    /// Maximum wall-clock wait for one association attempt (milliseconds).
    pub connect_max_wait_ms: u32,
    /// Station-activation retries before giving up on one connect attempt.
    pub connect_retries: u8,
    /// HTTP request timeout (milliseconds).
    pub http_timeout_ms: u32,

    // --- Timing ---
    /// Sensor acquisition cadence (milliseconds).
    pub acquire_period_ms: u32,
    /// Telemetry send period (milliseconds) — gated independently of
    /// acquisition.
    pub send_period_ms: u32,

    // --- Climate corrections ---
    /// Additive temperature offset (°C).
    pub temp_offset_c: f32,
    /// Additive pressure offset (hPa).
    pub pressure_offset_hpa: f32,
    /// Multiplicative humidity correction.
    pub humidity_factor: f32,
    /// Additive humidity correction (%).
    pub humidity_offset_pct: f32,

    // --- Gas estimator ---
    /// Module load resistance RL (Ω), typically 10 kΩ.
    pub gas_load_resistance_ohms: f32,
    /// Sensor supply voltage (V).
    pub gas_supply_volts: f32,
    /// Power-law curve coefficient A in `ppm = A·(Rs/R0)^B`.
    pub gas_curve_a: f32,
    /// Power-law curve exponent B.
    pub gas_curve_b: f32,
    /// Reference concentration assumed during clean-air calibration (ppm).
    pub gas_reference_ppm: f32,

    // --- Rain estimator ---
    /// Surface humidity (%) above which the rain flag turns on.
    pub rain_on_threshold_pct: f32,
    /// Surface humidity (%) below which the rain flag turns off.
    pub rain_off_threshold_pct: f32,
    /// Plate polarity: true when a wetter plate reads a lower ADC count.
    pub rain_lower_is_wetter: bool,

    // --- UV estimator ---
    /// Plausible daytime UV index the auto-scale converges toward.
    pub uv_target_daytime_index: f32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            // Network — credentials are provisioned into NVS, not baked in.
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
            wifi_country: heapless::String::try_from("FR").unwrap_or_default(),
            api_url: heapless::String::try_from("http://192.168.1.10:5000/add")
                .unwrap_or_default(),
            connect_max_wait_ms: 30_000,
            connect_retries: 5,
            http_timeout_ms: 5_000,

            // Timing
            acquire_period_ms: 2_000, // 0.5 Hz
            send_period_ms: 30_000,   // 2/min

            // Climate corrections (identity by default)
            temp_offset_c: 0.0,
            pressure_offset_hpa: 0.0,
            humidity_factor: 1.0,
            humidity_offset_pct: 0.0,

            // Gas — CO2 approximation curve from the MQ135 datasheet fit
            gas_load_resistance_ohms: 10_000.0,
            gas_supply_volts: 3.3,
            gas_curve_a: 116.602_068_2,
            gas_curve_b: -2.769_034_857,
            gas_reference_ppm: 400.0,

            // Rain hysteresis; the stock plate pulls low when wet
            rain_on_threshold_pct: 20.0,
            rain_off_threshold_pct: 10.0,
            rain_lower_is_wetter: true,

            // UV
            uv_target_daytime_index: 8.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = StationConfig::default();
        assert!(c.rain_on_threshold_pct > c.rain_off_threshold_pct);
        assert!(c.acquire_period_ms > 0);
        assert!(c.send_period_ms > c.acquire_period_ms);
        assert!(c.gas_load_resistance_ohms > 0.0);
        assert!(c.gas_curve_b < 0.0, "curve must fall with rising Rs/R0");
        assert!(c.connect_max_wait_ms > 0);
    }

    #[test]
    fn serde_roundtrip() {
        let c = StationConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: StationConfig = serde_json::from_str(&json).unwrap();
        assert!((c.gas_curve_a - c2.gas_curve_a).abs() < 1e-6);
        assert_eq!(c.send_period_ms, c2.send_period_ms);
        assert_eq!(c.api_url, c2.api_url);
    }

    #[test]
    fn hysteresis_thresholds_invariant() {
        let c = StationConfig::default();
        assert!(
            c.rain_on_threshold_pct > c.rain_off_threshold_pct,
            "on threshold must sit above off threshold to prevent oscillation"
        );
    }

    #[test]
    fn timing_ratios_make_sense() {
        let c = StationConfig::default();
        assert!(
            c.acquire_period_ms < c.send_period_ms,
            "acquisition must run faster than the send gate"
        );
        assert!(c.send_period_ms % c.acquire_period_ms == 0);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = StationConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: StationConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.connect_retries, c2.connect_retries);
        assert!((c.uv_target_daytime_index - c2.uv_target_daytime_index).abs() < 1e-6);
    }
}
