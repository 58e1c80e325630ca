//! HTTP ingest adapter.
//!
//! Implements [`IngestPort`] — JSON POSTs to the collector's ingest
//! endpoint, plus the derived health probe.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: one short-lived `EspHttpConnection` per
//!   request, wrapped in the `embedded_svc` client. Connections are not
//!   pooled; at two requests a minute the handshake cost is irrelevant
//!   and a stale pooled socket after a WiFi drop is not.
//! - **all other targets**: a scriptable simulation that records what
//!   would have been sent.

use log::debug;

use crate::app::ports::IngestPort;
use crate::config::StationConfig;
use crate::error::{Error, Result};
use crate::telemetry::{build_health_url, TelemetryPayload};

#[cfg(target_os = "espidf")]
use embedded_svc::{http::client::Client, io::Write};
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};

pub struct HttpIngestAdapter {
    api_url: heapless::String<128>,
    health_url: heapless::String<128>,
    #[cfg(target_os = "espidf")]
    timeout_ms: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_responses: std::collections::VecDeque<core::result::Result<u16, ()>>,
    #[cfg(not(target_os = "espidf"))]
    sim_sent: Vec<TelemetryPayload>,
}

impl HttpIngestAdapter {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            health_url: build_health_url(&config.api_url),
            #[cfg(target_os = "espidf")]
            timeout_ms: config.http_timeout_ms,
            #[cfg(not(target_os = "espidf"))]
            sim_responses: std::collections::VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_sent: Vec::new(),
        }
    }

    /// Simulation: script the outcome of upcoming requests. When the
    /// queue is empty requests succeed with HTTP 200.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_response(&mut self, response: core::result::Result<u16, ()>) {
        self.sim_responses.push_back(response);
    }

    /// Simulation: payloads that were posted so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_sent(&self) -> &[TelemetryPayload] {
        &self.sim_sent
    }

    #[cfg(target_os = "espidf")]
    fn connection(&self) -> Result<EspHttpConnection> {
        EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(core::time::Duration::from_millis(u64::from(self.timeout_ms))),
            ..Default::default()
        })
        .map_err(|_| Error::TransmitFailure("http connection setup failed"))
    }

    #[cfg(not(target_os = "espidf"))]
    fn sim_next(&mut self) -> Result<u16> {
        match self.sim_responses.pop_front().unwrap_or(Ok(200)) {
            Ok(status) => Ok(status),
            Err(()) => Err(Error::TransmitFailure("simulated transport failure")),
        }
    }
}

impl IngestPort for HttpIngestAdapter {
    fn post_observation(&mut self, payload: &TelemetryPayload) -> Result<u16> {
        #[cfg(target_os = "espidf")]
        {
            let body = serde_json::to_vec(payload)
                .map_err(|_| Error::TransmitFailure("payload serialization failed"))?;
            let mut client = Client::wrap(self.connection()?);
            let headers = [("Content-Type", "application/json")];
            let mut request = client
                .post(self.api_url.as_str(), &headers)
                .map_err(|_| Error::TransmitFailure("request setup failed"))?;
            request
                .write_all(&body)
                .map_err(|_| Error::TransmitFailure("body write failed"))?;
            let response = request
                .submit()
                .map_err(|_| Error::TransmitFailure("request failed"))?;
            let status = response.status();
            debug!("POST {} -> {status}", self.api_url);
            Ok(status)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let status = self.sim_next()?;
            self.sim_sent.push(*payload);
            debug!("POST(sim) {} -> {status}", self.api_url);
            Ok(status)
        }
    }

    fn check_health(&mut self) -> Result<u16> {
        #[cfg(target_os = "espidf")]
        {
            let mut client = Client::wrap(self.connection()?);
            let request = client
                .get(self.health_url.as_str())
                .map_err(|_| Error::TransmitFailure("request setup failed"))?;
            let response = request
                .submit()
                .map_err(|_| Error::TransmitFailure("request failed"))?;
            let status = response.status();
            debug!("GET {} -> {status}", self.health_url);
            Ok(status)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let status = self.sim_next()?;
            debug!("GET(sim) {} -> {status}", self.health_url);
            Ok(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TelemetryPayload {
        TelemetryPayload {
            temperature: 20.0,
            humidite: 40.0,
            pression: 1010.0,
            co2: 400.0,
            humidite_surface: 0.0,
            pluie_detectee: false,
            indice_uv: 1.0,
        }
    }

    #[test]
    fn health_url_derived_from_ingest_url() {
        let config = StationConfig {
            api_url: heapless::String::try_from("http://host:5000/add").unwrap(),
            ..Default::default()
        };
        let a = HttpIngestAdapter::new(&config);
        assert_eq!(a.health_url.as_str(), "http://host:5000/health");
    }

    #[test]
    fn post_records_payload_and_returns_status() {
        let mut a = HttpIngestAdapter::new(&StationConfig::default());
        let status = a.post_observation(&payload()).unwrap();
        assert_eq!(status, 200);
        assert_eq!(a.sim_sent().len(), 1);
    }

    #[test]
    fn scripted_failure_surfaces_as_transmit_error() {
        let mut a = HttpIngestAdapter::new(&StationConfig::default());
        a.sim_push_response(Err(()));
        assert!(matches!(
            a.post_observation(&payload()),
            Err(Error::TransmitFailure(_))
        ));
        // Nothing recorded for the failed attempt.
        assert!(a.sim_sent().is_empty());
    }

    #[test]
    fn scripted_statuses_are_returned_in_order() {
        let mut a = HttpIngestAdapter::new(&StationConfig::default());
        a.sim_push_response(Ok(500));
        a.sim_push_response(Ok(201));
        assert_eq!(a.post_observation(&payload()).unwrap(), 500);
        assert_eq!(a.post_observation(&payload()).unwrap(), 201);
        assert_eq!(a.check_health().unwrap(), 200);
    }
}
