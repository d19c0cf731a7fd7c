//! # Raw Rover Telemetry

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One telemetry frame as reported by a rover endpoint.
///
/// Individual readings are optional, a rover with a faulted sensor reports
/// `None` for that reading rather than dropping the whole frame. The exec's
/// sensor manager turns these into validity-tagged snapshot fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawTelemetry {
    /// UTC timestamp at which the frame was acquired by the endpoint.
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Ultrasonic obstacle distance in centimeters. The sensor saturates at
    /// its maximum range, reported as `None` by well-behaved endpoints.
    pub ultrasonic_cm: Option<f64>,

    /// Battery charge in percent.
    pub battery_percent: Option<f64>,

    /// Battery voltage in volts.
    pub battery_voltage: Option<f64>,

    /// Pitch/roll tilt of the body in degrees from upright.
    pub tilt_deg: Option<f64>,

    /// True if the IMU reports the rover upside down.
    pub is_flipped: Option<bool>,

    /// Left infrared reflectance reading.
    pub ir_left: Option<f64>,

    /// Right infrared reflectance reading.
    pub ir_right: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RawTelemetry {
    /// An empty frame stamped now, used when an endpoint has nothing to
    /// report yet.
    pub fn empty_now() -> Self {
        Self {
            timestamp: Utc::now(),
            ultrasonic_cm: None,
            battery_percent: None,
            battery_voltage: None,
            tilt_deg: None,
            is_flipped: None,
            ir_left: None,
            ir_right: None,
        }
    }
}
