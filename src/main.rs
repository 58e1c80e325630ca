//! Meteonode Firmware — Main Entry Point
//!
//! Hexagonal architecture around a fixed-cadence acquisition loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter     HttpIngestAdapter   NvsAdapter   Esp32Time    │
//! │  (LinkPort)      (IngestPort)        (Config+NVS) (clock)      │
//! │  LogEventSink                                                  │
//! │  (EventSink)                                                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            StationService (pure logic)                 │    │
//! │  │  link FSM · send gate                                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  SensorHub (BME280 · MQ135 · rain plate · UV photodiode)      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod config;
mod calibration;
mod error;
mod filter;
mod history;
mod pins;
mod telemetry;

pub mod app;
mod adapters;
mod drivers;
mod sensors;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{info, warn};

use esp_idf_hal::delay::{Delay, FreeRtos};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::FromValueType;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use adapters::http::HttpIngestAdapter;
use adapters::log_sink::LogEventSink;
use adapters::nvs::NvsAdapter;
use adapters::time::Esp32TimeAdapter;
use adapters::wifi::WifiAdapter;
use app::ports::ConfigPort;
use app::service::StationService;
use config::StationConfig;
use sensors::climate::ClimateSensor;
use sensors::SensorHub;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Meteonode v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    info!(
        "pins: gas=GPIO{} moisture=GPIO{} uv=GPIO{} alert=GPIO{} rain=GPIO{} i2c=GPIO{}/{}",
        pins::GAS_ADC_GPIO,
        pins::MOISTURE_ADC_GPIO,
        pins::UV_ADC_GPIO,
        pins::GAS_ALERT_GPIO,
        pins::RAIN_DETECT_GPIO,
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
    );

    // ── 1b. Initialise hardware peripherals ───────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            // Continue without NVS — calibration will not survive reboot.
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            StationConfig::default()
        }
    };

    // ── 3. Claim peripherals ──────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let time = Esp32TimeAdapter::new();

    // ── 4. Climate sensor (I²C) ───────────────────────────────
    // A missing or dead BME280 must not stop the station: the hub
    // substitutes placeholder climate values, and the driver re-probes
    // on later reads so a hot-plugged part is picked up.
    let i2c_cfg = I2cConfig::new().baudrate(pins::I2C_FREQ_HZ.Hz());
    // The HAL wants concrete pin types, so these cannot be looked up
    // through the constants: gpio14/gpio15 are pins::I2C_SDA_GPIO and
    // pins::I2C_SCL_GPIO.
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio14,
        peripherals.pins.gpio15,
        &i2c_cfg,
    )?;
    let mut climate = ClimateSensor::new(i2c, Delay::new_default());
    if let Err(e) = climate.init() {
        warn!("climate sensor unavailable: {} — using placeholders", e);
    }

    // ── 5. Sensor hub + persisted calibration ─────────────────
    let mut hub = SensorHub::new(&config, Some(climate));
    hub.restore_calibration(&nvs);

    // ── 6. Network adapters ───────────────────────────────────
    let wifi_driver = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), None)?,
        sysloop,
    )?;
    let mut link = WifiAdapter::new(wifi_driver, &config);
    let mut ingest = HttpIngestAdapter::new(&config);
    let mut sink = LogEventSink::new();

    // ── 7. Control loop ───────────────────────────────────────
    let mut service = StationService::new(config.clone());
    service.startup(&mut link, &mut ingest, &mut sink);

    info!(
        "System ready. Acquiring every {} ms, sending every {} ms.",
        config.acquire_period_ms, config.send_period_ms
    );

    loop {
        FreeRtos::delay_ms(config.acquire_period_ms);

        let snapshot = hub.read_all();
        let now_ms = time.uptime_ms();
        if let Err(e) = service.tick(now_ms, Some(&snapshot), &mut link, &mut ingest, &mut sink) {
            warn!("tick failed: {}", e);
        }
        hub.persist_dirty(&mut nvs, &mut sink, now_ms);
    }
}
