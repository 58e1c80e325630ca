//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements | Connects to                |
//! |------------|------------|----------------------------|
//! | `http`     | IngestPort | Collector HTTP endpoint    |
//! | `log_sink` | EventSink  | Serial log output          |
//! | `nvs`      | ConfigPort | NVS / in-memory store      |
//! |            | StoragePort|                            |
//! | `time`     | —          | ESP32 system timer         |
//! | `wifi`     | LinkPort   | ESP-IDF WiFi STA           |

pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
