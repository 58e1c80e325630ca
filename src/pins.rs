//! GPIO / peripheral pin assignments for the meteonode main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Sensors — Analog (ADC1)
// ---------------------------------------------------------------------------

/// MQ135 air-quality sensor — analog voltage across the load resistor.
/// ADC1 channel 4 (GPIO 5 on ESP32-S3).
pub const GAS_ADC_GPIO: i32 = 5;
/// ADC1 channel for the MQ135.
pub const GAS_ADC_CHANNEL: u32 = 4;

/// Resistive rain plate — analog, lower voltage when wetter.
/// ADC1 channel 6 (GPIO 7 on ESP32-S3).
pub const MOISTURE_ADC_GPIO: i32 = 7;
/// ADC1 channel for the rain plate.
pub const MOISTURE_ADC_CHANNEL: u32 = 6;

/// GUVA-S12SD UV photodiode — analog voltage proportional to UV power.
/// ADC1 channel 8 (GPIO 9 on ESP32-S3).
pub const UV_ADC_GPIO: i32 = 9;
/// ADC1 channel for the UV photodiode.
pub const UV_ADC_CHANNEL: u32 = 8;

// ---------------------------------------------------------------------------
// Sensors — Digital
// ---------------------------------------------------------------------------

/// MQ135 module threshold comparator output. LOW = threshold exceeded.
pub const GAS_ALERT_GPIO: i32 = 6;

/// Rain plate comparator output. LOW = rain detected.
pub const RAIN_DETECT_GPIO: i32 = 10;

// ---------------------------------------------------------------------------
// I²C bus (BME280 climate sensor)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 14;
pub const I2C_SCL_GPIO: i32 = 15;
/// I²C bus frequency. The BME280 tolerates up to 3.4 MHz; 100 kHz is the
/// conservative default that also works over long leads.
pub const I2C_FREQ_HZ: u32 = 100_000;
