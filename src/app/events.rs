//! Outbound application events.
//!
//! The [`StationService`](super::service::StationService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them — log to serial, drive a
//! status LED, feed a future local display, etc.

use crate::app::service::LinkState;
use crate::telemetry::TelemetryPayload;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The control loop has started (carries the initial link state).
    Started(LinkState),

    /// The network link changed state.
    LinkChanged { from: LinkState, to: LinkState },

    /// A fresh observation snapshot was acquired.
    Telemetry(TelemetryPayload),

    /// Sensor acquisition failed this cycle; the loop continues.
    SensorFault(&'static str),

    /// A payload was accepted by the collector (HTTP status).
    TransmitOk(u16),

    /// A transmission attempt failed; the send gate stays open.
    TransmitFailed,

    /// Updated calibration was written to persistent storage.
    CalibrationSaved(&'static str),
}
