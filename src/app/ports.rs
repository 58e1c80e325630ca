//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ StationService (domain)
//! ```
//!
//! Driven adapters (network link, ingest client, event sinks, storage)
//! implement these traits. The [`StationService`](super::service::StationService)
//! consumes them via generics, so the domain core never touches hardware or
//! sockets directly.

use crate::config::StationConfig;
use crate::error::Result;
use crate::telemetry::TelemetryPayload;

// ───────────────────────────────────────────────────────────────
// Network link port (driven adapter: domain → radio)
// ───────────────────────────────────────────────────────────────

/// Station-mode network link. Every operation is bounded — `connect` must
/// return within the configured maximum wait, never block indefinitely.
pub trait LinkPort {
    /// Establish the link: configure the radio region, drop any AP role,
    /// activate station mode with bounded retries, associate.
    ///
    /// Returns [`Error::LinkUnavailable`](crate::error::Error::LinkUnavailable)
    /// if association does not complete within the bounded wait. Callers
    /// proceed offline on failure.
    fn connect(&mut self) -> Result<()>;

    /// Current association state.
    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Ingest port (driven adapter: domain → collector)
// ───────────────────────────────────────────────────────────────

/// HTTP client facing the remote collector. Best-effort: a failed send is
/// reported, never retried internally.
pub trait IngestPort {
    /// POST one telemetry payload. Returns the HTTP status code on a
    /// completed exchange; transport-level failures map to
    /// [`Error::TransmitFailure`](crate::error::Error::TransmitFailure).
    fn post_observation(&mut self, payload: &TelemetryPayload) -> Result<u16>;

    /// GET the collector health endpoint (derived from the ingest URL).
    /// Diagnostic only — the result never affects control flow.
    fn check_health(&mut self) -> Result<u16>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, future
/// local display, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting. Invalid
/// ranges are rejected with [`ConfigError::ValidationFailed`], not silently
/// clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`StationConfig::default()`] if no stored config exists.
    fn load(&self) -> core::result::Result<StationConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &StationConfig) -> core::result::Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for calibration records and credentials.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> core::result::Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(
        &mut self,
        namespace: &str,
        key: &str,
        data: &[u8],
    ) -> core::result::Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> core::result::Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
