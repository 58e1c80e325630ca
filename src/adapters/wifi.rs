//! WiFi station-mode adapter.
//!
//! Implements [`LinkPort`] — the hexagonal boundary for network
//! connectivity.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via
//!   `esp_idf_svc::wifi::BlockingWifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Association policy
//!
//! One `connect()` call performs the full bring-up: regulatory country
//! code, station-only mode (any AP role dropped), a scan to warm the RF
//! front end, then bounded association attempts with a fixed pause
//! between them. The call returns
//! [`Error::LinkUnavailable`](crate::error::Error::LinkUnavailable) once
//! the retry budget is spent — it never blocks indefinitely.

use log::{info, warn};

use crate::app::ports::LinkPort;
use crate::config::StationConfig;
use crate::error::{Error, Result};

#[cfg(target_os = "espidf")]
use esp_idf_hal::delay::FreeRtos;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

/// Fixed pause between association attempts (ms).
#[cfg(target_os = "espidf")]
const CONNECT_BACKOFF_MS: u32 = 1_000;

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    country: heapless::String<2>,
    retries: u8,
    #[cfg(target_os = "espidf")]
    max_wait_ms: u32,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
    /// Simulation: number of upcoming connect attempts that fail.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>, config: &StationConfig) -> Self {
        Self {
            ssid: config.wifi_ssid.clone(),
            password: config.wifi_password.clone(),
            country: config.wifi_country.clone(),
            retries: config.connect_retries,
            max_wait_ms: config.connect_max_wait_ms,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(config: &StationConfig) -> Self {
        Self {
            ssid: config.wifi_ssid.clone(),
            password: config.wifi_password.clone(),
            country: config.wifi_country.clone(),
            retries: config.connect_retries,
            sim_connected: false,
            sim_fail_next: 0,
        }
    }

    /// Simulation: make the next `n` connect attempts fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_connects(&mut self, n: u32) {
        self.sim_fail_next = n;
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<()> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| Error::Init("wifi configuration rejected"))?;

        self.wifi
            .start()
            .map_err(|_| Error::Init("wifi start failed"))?;

        self.set_country();

        // A scan before associating noticeably improves first-attempt
        // success on these boards.
        if let Err(e) = self.wifi.scan() {
            warn!("pre-connect scan failed: {e}");
        }

        for attempt in 1..=self.retries {
            // Start association without blocking so the wait below stays
            // under our own bound.
            match self.wifi.wifi_mut().connect() {
                Ok(()) => {
                    if self.wait_associated() {
                        match self.wifi.wait_netif_up() {
                            Ok(()) => {
                                info!("wifi associated to '{}' (attempt {attempt})", self.ssid);
                                return Ok(());
                            }
                            Err(e) => warn!("netif bring-up failed (attempt {attempt}): {e}"),
                        }
                    } else {
                        warn!(
                            "association timed out after {} ms (attempt {attempt})",
                            self.max_wait_ms
                        );
                    }
                }
                Err(e) => warn!("association failed (attempt {attempt}): {e}"),
            }
            FreeRtos::delay_ms(CONNECT_BACKOFF_MS);
            // Another scan sometimes unsticks a radio that missed the AP.
            let _ = self.wifi.scan();
        }
        Err(Error::LinkUnavailable)
    }

    /// Poll for association up to the configured maximum wait, with one
    /// rescan at the halfway mark when the connection is slow.
    #[cfg(target_os = "espidf")]
    fn wait_associated(&mut self) -> bool {
        const POLL_MS: u32 = 250;
        let mut waited: u32 = 0;
        let mut rescanned = false;
        while waited < self.max_wait_ms {
            if self.wifi.is_connected().unwrap_or(false) {
                return true;
            }
            if !rescanned && waited >= self.max_wait_ms / 2 {
                rescanned = true;
                let _ = self.wifi.scan();
            }
            FreeRtos::delay_ms(POLL_MS);
            waited += POLL_MS;
        }
        false
    }

    #[cfg(target_os = "espidf")]
    fn set_country(&mut self) {
        let mut code = [0u8; 3];
        let bytes = self.country.as_bytes();
        let len = bytes.len().min(2);
        code[..len].copy_from_slice(&bytes[..len]);
        // SAFETY: code is a NUL-terminated 2-letter country string; the
        // driver copies it before returning.
        let ret = unsafe {
            esp_idf_svc::sys::esp_wifi_set_country_code(code.as_ptr() as *const _, true)
        };
        if ret != esp_idf_svc::sys::ESP_OK {
            warn!("country code rejected (rc={ret})");
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<()> {
        for attempt in 1..=self.retries {
            if self.sim_fail_next > 0 {
                self.sim_fail_next -= 1;
                warn!("wifi(sim): association failed (attempt {attempt})");
                continue;
            }
            self.sim_connected = true;
            info!(
                "wifi(sim): associated to '{}' ({}, attempt {attempt})",
                self.ssid, self.country
            );
            return Ok(());
        }
        Err(Error::LinkUnavailable)
    }
}

impl LinkPort for WifiAdapter {
    fn connect(&mut self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(Error::Config("wifi ssid not provisioned"));
        }
        info!("wifi: connecting to '{}'", self.ssid);
        self.platform_connect()
    }

    fn is_connected(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.wifi.is_connected().unwrap_or(false)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_connected
        }
    }
}
