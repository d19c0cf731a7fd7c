//! Sensor manager parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sensor manager parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Background poll rate in Hertz. Clamped into [0.5, 2.0] by validation,
    /// telemetry requests are cheap but not free on a BLE link.
    pub poll_rate_hz: f64,

    /// Maximum age in seconds a reading may have before it is reported as
    /// unavailable.
    pub max_age_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            poll_rate_hz: 2.0,
            max_age_s: 2.0,
        }
    }
}
