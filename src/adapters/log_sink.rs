//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A future display or MQTT adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | T={:.1}\u{00b0}C RH={:.0}% P={:.1}hPa | CO2={:.0}ppm | \
                     surf={:.0}% rain={} | UV={:.1}",
                    t.temperature,
                    t.humidite,
                    t.pression,
                    t.co2,
                    t.humidite_surface,
                    if t.pluie_detectee { "YES" } else { "no" },
                    t.indice_uv,
                );
            }
            AppEvent::LinkChanged { from, to } => {
                info!("LINK  | {from} -> {to}");
            }
            AppEvent::SensorFault(what) => {
                warn!("FAULT | {what}");
            }
            AppEvent::TransmitOk(status) => {
                info!("SEND  | accepted (HTTP {status})");
            }
            AppEvent::TransmitFailed => {
                warn!("SEND  | failed, will retry next cycle");
            }
            AppEvent::CalibrationSaved(which) => {
                info!("CALIB | {which} persisted");
            }
            AppEvent::Started(state) => {
                info!("START | link={state}");
            }
        }
    }
}
