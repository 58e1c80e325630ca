//! Application core: the acquisition / transmission control loop.
//!
//! [`StationService`] owns the link state machine and the send gate.  It
//! is deliberately hardware-free — every effect goes through a port trait,
//! and time is passed in as a millisecond tick, so the whole loop runs
//! under plain host tests with a simulated clock.
//!
//! ```text
//!  SensorHub ──▶ ┌────────────────────────┐ ──▶ EventSink
//!   (snapshot)   │     StationService      │
//!    LinkPort ◀──│  link FSM · send gate   │──▶ IngestPort
//!                └────────────────────────┘
//! ```

use log::{info, warn};

use crate::config::StationConfig;
use crate::error::Result;
use crate::sensors::StationSnapshot;
use crate::telemetry::TelemetryPayload;

use super::events::AppEvent;
use super::ports::{EventSink, IngestPort, LinkPort};

// ───────────────────────────────────────────────────────────────
// Link state machine
// ───────────────────────────────────────────────────────────────

/// Network link lifecycle.
///
/// `Transmitting` is only ever observed from within a tick; between ticks
/// the service rests in `LinkUp` or `LinkDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not associated. Acquisition continues, transmission is skipped.
    LinkDown,
    /// Associated and idle.
    LinkUp,
    /// A send attempt is in flight.
    Transmitting,
}

impl core::fmt::Display for LinkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LinkDown => write!(f, "link-down"),
            Self::LinkUp => write!(f, "link-up"),
            Self::Transmitting => write!(f, "transmitting"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// StationService
// ───────────────────────────────────────────────────────────────

/// The domain core. Generic over its ports; owns no hardware.
pub struct StationService {
    config: StationConfig,
    link_state: LinkState,
    /// Tick of the last *successful* send. `None` means no send has
    /// happened yet, so the first complete snapshot transmits immediately.
    last_send_ms: Option<u64>,
}

impl StationService {
    pub fn new(config: StationConfig) -> Self {
        Self {
            config,
            link_state: LinkState::LinkDown,
            last_send_ms: None,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    /// Bring the link up and probe the collector once. Failure of either
    /// step is non-fatal: the loop runs offline and retries at send time.
    pub fn startup<L, I, E>(&mut self, link: &mut L, ingest: &mut I, sink: &mut E)
    where
        L: LinkPort,
        I: IngestPort,
        E: EventSink,
    {
        match link.connect() {
            Ok(()) => {
                self.set_link_state(LinkState::LinkUp, sink);
                match ingest.check_health() {
                    Ok(status) => info!("collector health: HTTP {status}"),
                    Err(e) => warn!("collector health check failed: {e}"),
                }
            }
            Err(e) => {
                warn!("network unavailable, running offline: {e}");
                self.set_link_state(LinkState::LinkDown, sink);
            }
        }
        sink.emit(&AppEvent::Started(self.link_state));
    }

    /// One acquisition cycle.
    ///
    /// `snapshot` is `None` when this cycle's sensor read failed; the send
    /// gate is then left untouched and no transmission is attempted.
    /// Transmission happens when the gate is due: on the very first
    /// complete snapshot, then at most once per `send_period_ms`. A failed
    /// send leaves the gate open so the next cycle retries.
    pub fn tick<L, I, E>(
        &mut self,
        now_ms: u64,
        snapshot: Option<&StationSnapshot>,
        link: &mut L,
        ingest: &mut I,
        sink: &mut E,
    ) -> Result<()>
    where
        L: LinkPort,
        I: IngestPort,
        E: EventSink,
    {
        let Some(snapshot) = snapshot else {
            sink.emit(&AppEvent::SensorFault("acquisition failed"));
            return Ok(());
        };

        let payload = TelemetryPayload::from(snapshot);
        sink.emit(&AppEvent::Telemetry(payload));

        if !self.send_due(now_ms) {
            return Ok(());
        }

        // Reconnect (bounded) before giving up on this send window.
        if !link.is_connected() {
            self.set_link_state(LinkState::LinkDown, sink);
            match link.connect() {
                Ok(()) => self.set_link_state(LinkState::LinkUp, sink),
                Err(e) => {
                    warn!("reconnect failed, skipping send: {e}");
                    return Ok(());
                }
            }
        }

        self.set_link_state(LinkState::Transmitting, sink);
        match ingest.post_observation(&payload) {
            Ok(status) if (200..300).contains(&status) => {
                self.last_send_ms = Some(now_ms);
                sink.emit(&AppEvent::TransmitOk(status));
                info!("telemetry accepted: HTTP {status}");
            }
            Ok(status) => {
                sink.emit(&AppEvent::TransmitFailed);
                warn!("collector rejected telemetry: HTTP {status}");
            }
            Err(e) => {
                sink.emit(&AppEvent::TransmitFailed);
                warn!("telemetry send failed: {e}");
            }
        }
        let settled = if link.is_connected() {
            LinkState::LinkUp
        } else {
            LinkState::LinkDown
        };
        self.set_link_state(settled, sink);
        Ok(())
    }

    fn send_due(&self, now_ms: u64) -> bool {
        match self.last_send_ms {
            None => true,
            Some(t) => now_ms.saturating_sub(t) >= u64::from(self.config.send_period_ms),
        }
    }

    fn set_link_state<E: EventSink>(&mut self, to: LinkState, sink: &mut E) {
        if self.link_state != to {
            sink.emit(&AppEvent::LinkChanged {
                from: self.link_state,
                to,
            });
            self.link_state = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FakeLink {
        connected: bool,
        connect_ok: bool,
        connect_calls: u32,
    }

    impl FakeLink {
        fn up() -> Self {
            Self {
                connected: true,
                connect_ok: true,
                connect_calls: 0,
            }
        }

        fn down() -> Self {
            Self {
                connected: false,
                connect_ok: false,
                connect_calls: 0,
            }
        }
    }

    impl LinkPort for FakeLink {
        fn connect(&mut self) -> Result<()> {
            self.connect_calls += 1;
            if self.connect_ok {
                self.connected = true;
                Ok(())
            } else {
                Err(Error::LinkUnavailable)
            }
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct FakeIngest {
        status: core::result::Result<u16, ()>,
        posts: u32,
    }

    impl FakeIngest {
        fn accepting() -> Self {
            Self {
                status: Ok(200),
                posts: 0,
            }
        }
    }

    impl IngestPort for FakeIngest {
        fn post_observation(&mut self, _payload: &TelemetryPayload) -> Result<u16> {
            self.posts += 1;
            self.status.map_err(|_| Error::TransmitFailure("refused"))
        }

        fn check_health(&mut self) -> Result<u16> {
            Ok(200)
        }
    }

    struct NullSink;

    impl EventSink for NullSink {
        fn emit(&mut self, _event: &AppEvent) {}
    }

    fn snapshot() -> StationSnapshot {
        StationSnapshot {
            temperature_c: 21.0,
            humidity_pct: 50.0,
            pressure_hpa: 1013.0,
            gas_ppm: 420.0,
            surface_humidity_pct: 0.0,
            raining: false,
            uv_index: 2.0,
        }
    }

    fn service() -> StationService {
        StationService::new(StationConfig::default())
    }

    #[test]
    fn first_snapshot_sends_immediately() {
        let mut svc = service();
        let mut link = FakeLink::up();
        let mut ingest = FakeIngest::accepting();
        let snap = snapshot();

        svc.tick(0, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(ingest.posts, 1);
    }

    #[test]
    fn one_send_per_gate_period() {
        let mut svc = service();
        let mut link = FakeLink::up();
        let mut ingest = FakeIngest::accepting();
        let snap = snapshot();

        // 2 s cadence over 90 s: the gate opens at t = 0, 30 000, 60 000,
        // 90 000.
        let mut t = 0u64;
        while t <= 90_000 {
            svc.tick(t, Some(&snap), &mut link, &mut ingest, &mut NullSink)
                .unwrap();
            t += 2_000;
        }
        assert_eq!(ingest.posts, 4);
    }

    #[test]
    fn failed_acquisition_never_transmits() {
        let mut svc = service();
        let mut link = FakeLink::up();
        let mut ingest = FakeIngest::accepting();

        svc.tick(0, None, &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(ingest.posts, 0);
        assert!(svc.last_send_ms.is_none());
    }

    #[test]
    fn failed_send_leaves_gate_open() {
        let mut svc = service();
        let mut link = FakeLink::up();
        let mut ingest = FakeIngest {
            status: Err(()),
            posts: 0,
        };
        let snap = snapshot();

        svc.tick(0, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(ingest.posts, 1);
        assert!(svc.last_send_ms.is_none());

        // Next cycle retries without waiting out the full period.
        svc.tick(2_000, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(ingest.posts, 2);
    }

    #[test]
    fn non_2xx_status_counts_as_failure() {
        let mut svc = service();
        let mut link = FakeLink::up();
        let mut ingest = FakeIngest {
            status: Ok(500),
            posts: 0,
        };
        let snap = snapshot();

        svc.tick(0, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert!(svc.last_send_ms.is_none());
    }

    #[test]
    fn offline_tick_attempts_reconnect_then_skips() {
        let mut svc = service();
        let mut link = FakeLink::down();
        let mut ingest = FakeIngest::accepting();
        let snap = snapshot();

        svc.tick(0, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(link.connect_calls, 1);
        assert_eq!(ingest.posts, 0);
        assert_eq!(svc.link_state(), LinkState::LinkDown);
    }

    #[test]
    fn reconnect_success_sends_in_same_tick() {
        let mut svc = service();
        let mut link = FakeLink::down();
        link.connect_ok = true;
        let mut ingest = FakeIngest::accepting();
        let snap = snapshot();

        svc.tick(0, Some(&snap), &mut link, &mut ingest, &mut NullSink)
            .unwrap();
        assert_eq!(ingest.posts, 1);
        assert_eq!(svc.link_state(), LinkState::LinkUp);
    }

    #[test]
    fn startup_failure_falls_back_offline() {
        let mut svc = service();
        let mut link = FakeLink::down();
        let mut ingest = FakeIngest::accepting();

        svc.startup(&mut link, &mut ingest, &mut NullSink);
        assert_eq!(svc.link_state(), LinkState::LinkDown);
    }

    #[test]
    fn startup_success_probes_health() {
        let mut svc = service();
        let mut link = FakeLink::down();
        link.connect_ok = true;
        let mut ingest = FakeIngest::accepting();

        svc.startup(&mut link, &mut ingest, &mut NullSink);
        assert_eq!(svc.link_state(), LinkState::LinkUp);
    }
}
