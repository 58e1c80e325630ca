//! Telemetry payload — the wire contract with the collector.
//!
//! Field names are fixed by the collector's ingest schema (French keys,
//! legacy of the original deployment) and must not be renamed.

use serde::{Deserialize, Serialize};

use crate::sensors::StationSnapshot;

/// One immutable observation snapshot, assembled once per transmission
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Air temperature (°C).
    pub temperature: f32,
    /// Relative air humidity (%).
    pub humidite: f32,
    /// Barometric pressure (hPa).
    pub pression: f32,
    /// Approximate CO2 concentration (ppm).
    pub co2: f32,
    /// Normalized surface humidity from the rain plate (%).
    pub humidite_surface: f32,
    /// Rain flag (hysteresis-gated, OR'd with the digital detector).
    pub pluie_detectee: bool,
    /// UV index (0–12).
    pub indice_uv: f32,
}

impl From<&StationSnapshot> for TelemetryPayload {
    fn from(s: &StationSnapshot) -> Self {
        Self {
            temperature: s.temperature_c,
            humidite: s.humidity_pct,
            pression: s.pressure_hpa,
            co2: s.gas_ppm,
            humidite_surface: s.surface_humidity_pct,
            pluie_detectee: s.raining,
            indice_uv: s.uv_index,
        }
    }
}

/// Derive the collector health-check URL from the ingest URL by swapping
/// the write-path segment for the health segment.
pub fn build_health_url(api_url: &str) -> heapless::String<128> {
    let mut out = heapless::String::new();
    if let Some(idx) = api_url.find("/add") {
        let _ = out.push_str(&api_url[..idx]);
        let _ = out.push_str("/health");
        let _ = out.push_str(&api_url[idx + 4..]);
    } else if api_url.ends_with('/') {
        let _ = out.push_str(api_url);
        let _ = out.push_str("health");
    } else {
        let _ = out.push_str(api_url);
        let _ = out.push_str("/health");
    }
    out
}
