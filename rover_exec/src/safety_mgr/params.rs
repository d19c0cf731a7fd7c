//! Safety manager parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Safety manager parameters.
///
/// The thresholds are deliberately configuration, not constants: different
/// rovers and rooms want different margins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Obstacle distance in centimeters below which the Warning state is
    /// entered and forward motion is inhibited.
    pub warn_distance_cm: f64,

    /// Obstacle distance in centimeters below which an emergency stop is
    /// triggered.
    pub critical_distance_cm: f64,

    /// Body tilt in degrees beyond which an emergency stop is triggered.
    pub max_tilt_deg: f64,

    /// Battery percentage below which an emergency stop is triggered.
    pub critical_battery_percent: f64,

    /// Seconds of lost transport link before an emergency stop is triggered.
    pub link_loss_timeout_s: f64,

    /// Lower limit of the motor speed range. Demands are clamped here before
    /// any other rule is applied.
    pub min_speed: f64,

    /// Upper limit of the motor speed range.
    pub max_speed: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            warn_distance_cm: 20.0,
            critical_distance_cm: 8.0,
            max_tilt_deg: 45.0,
            critical_battery_percent: 20.0,
            link_loss_timeout_s: 5.0,
            min_speed: -50.0,
            max_speed: 50.0,
        }
    }
}
