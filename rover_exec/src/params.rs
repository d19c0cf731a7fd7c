//! # Executable parameters
//!
//! One JSON configuration document covers the whole executable, split into
//! per-module sections. Every key has a default, a missing or malformed file
//! degrades to defaults with a warning, and [`RoverExecParams::validate`]
//! repairs individually-bad values the same way. A cosmetic config mistake
//! must never be a hard crash.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Internal
use crate::{gesture, safety_mgr, sensor_mgr};
use rover_if::endpoint::ConnectionTarget;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All parameters of the rover executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverExecParams {
    /// Target used when the command line does not specify one.
    pub default_target: ConnectionTarget,

    /// Address used when the command line does not specify one. Pairing code
    /// for physical, host:port for simulator.
    pub default_address: String,

    /// Networking timeouts and retry budget.
    pub net: NetParams,

    /// Keyboard/dashboard drive speeds.
    pub drive: DriveParams,

    /// Sensor manager section.
    pub sensors: sensor_mgr::Params,

    /// Safety manager section.
    pub safety: safety_mgr::Params,

    /// Gesture pipeline section.
    pub gesture: gesture::Params,

    /// LED palette.
    pub leds: LedParams,
}

/// Networking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Per-attempt BLE bridge connect timeout in milliseconds.
    pub ble_connect_timeout_ms: u64,

    /// Total BLE connect attempts, including the first.
    pub ble_connect_attempts: u32,

    /// Backoff step between BLE connect attempts in milliseconds.
    pub ble_connect_backoff_ms: u64,

    /// Simulator connect timeout in milliseconds. One attempt only.
    pub sim_connect_timeout_ms: u64,

    /// Timeout for one demand/response exchange in milliseconds.
    pub request_timeout_ms: u64,
}

/// Drive speeds used by the keyboard and dashboard interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveParams {
    /// Wheel speed for forward/backward driving.
    pub drive_speed: f64,

    /// Wheel speed for on-the-spot turns.
    pub turn_speed: f64,
}

/// LED palette entries cycled by the interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedParams {
    pub palette: Vec<PaletteEntry>,
}

/// One named palette colour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub name: String,
    pub rgb: [u8; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RoverExecParams {
    fn default() -> Self {
        Self {
            default_target: ConnectionTarget::Simulator,
            default_address: "127.0.0.1:9000".into(),
            net: NetParams::default(),
            drive: DriveParams::default(),
            sensors: sensor_mgr::Params::default(),
            safety: safety_mgr::Params::default(),
            gesture: gesture::Params::default(),
            leds: LedParams::default(),
        }
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            ble_connect_timeout_ms: 10_000,
            ble_connect_attempts: 3,
            ble_connect_backoff_ms: 1_000,
            sim_connect_timeout_ms: 2_000,
            request_timeout_ms: 1_000,
        }
    }
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            drive_speed: 30.0,
            turn_speed: 30.0,
        }
    }
}

impl Default for LedParams {
    fn default() -> Self {
        let named = [
            ("RED", [255, 0, 0]),
            ("GREEN", [0, 255, 0]),
            ("BLUE", [0, 0, 255]),
            ("YELLOW", [255, 255, 0]),
            ("CYAN", [0, 255, 255]),
            ("MAGENTA", [255, 0, 255]),
            ("WHITE", [255, 255, 255]),
            ("ORANGE", [255, 165, 0]),
            ("PURPLE", [128, 0, 128]),
            ("LIME", [0, 255, 128]),
            ("PINK", [255, 192, 203]),
        ];

        Self {
            palette: named
                .iter()
                .map(|(name, rgb)| PaletteEntry {
                    name: (*name).into(),
                    rgb: *rgb,
                })
                .collect(),
        }
    }
}

impl RoverExecParams {
    /// Load the config file, falling back to defaults with a warning if it
    /// is missing or malformed, then repair any individually-invalid values.
    pub fn load(config_path: &Path) -> Self {
        let mut params: RoverExecParams = util::params::load_or_default(config_path);
        params.validate();
        params
    }

    /// Repair invalid values in place, warning about each one.
    ///
    /// The config file is operator-edited; a bad threshold degrades to its
    /// default rather than aborting the run.
    pub fn validate(&mut self) {
        let defaults = RoverExecParams::default();

        if self.safety.max_speed <= self.safety.min_speed {
            warn!(
                "Config: max_speed ({}) must exceed min_speed ({}), using defaults",
                self.safety.max_speed, self.safety.min_speed
            );
            self.safety.min_speed = defaults.safety.min_speed;
            self.safety.max_speed = defaults.safety.max_speed;
        }

        if self.safety.critical_distance_cm >= self.safety.warn_distance_cm {
            warn!(
                "Config: critical_distance_cm ({}) must be below warn_distance_cm ({}), using defaults",
                self.safety.critical_distance_cm, self.safety.warn_distance_cm
            );
            self.safety.critical_distance_cm = defaults.safety.critical_distance_cm;
            self.safety.warn_distance_cm = defaults.safety.warn_distance_cm;
        }

        if !(0.0..=100.0).contains(&self.safety.critical_battery_percent) {
            warn!(
                "Config: critical_battery_percent ({}) outside [0, 100], using default",
                self.safety.critical_battery_percent
            );
            self.safety.critical_battery_percent = defaults.safety.critical_battery_percent;
        }

        if !(0.5..=2.0).contains(&self.sensors.poll_rate_hz) {
            warn!(
                "Config: poll_rate_hz ({}) outside [0.5, 2.0], using default",
                self.sensors.poll_rate_hz
            );
            self.sensors.poll_rate_hz = defaults.sensors.poll_rate_hz;
        }

        if self.sensors.max_age_s <= 0.0 {
            warn!(
                "Config: max_age_s ({}) must be positive, using default",
                self.sensors.max_age_s
            );
            self.sensors.max_age_s = defaults.sensors.max_age_s;
        }

        if !(0.0..=1.0).contains(&self.gesture.confidence_threshold) {
            warn!(
                "Config: confidence_threshold ({}) outside [0, 1], using default",
                self.gesture.confidence_threshold
            );
            self.gesture.confidence_threshold = defaults.gesture.confidence_threshold;
        }

        if self.gesture.window_length == 0 {
            warn!("Config: window_length must be at least 1, using default");
            self.gesture.window_length = defaults.gesture.window_length;
        }

        if self.gesture.majority > self.gesture.window_length {
            warn!(
                "Config: majority ({}) cannot exceed window_length ({}), clamping",
                self.gesture.majority, self.gesture.window_length
            );
            self.gesture.majority = self.gesture.window_length;
        }

        if self.net.ble_connect_attempts == 0 {
            warn!("Config: ble_connect_attempts must be at least 1, using default");
            self.net.ble_connect_attempts = defaults.net.ble_connect_attempts;
        }
    }

    /// The default config document, pretty-printed, for `--config-wizard`.
    pub fn default_json() -> String {
        serde_json::to_string_pretty(&RoverExecParams::default())
            .expect("default params always serialise")
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        // A document with one recognised key leaves everything else at its
        // default
        let params: RoverExecParams =
            serde_json::from_str(r#"{ "safety": { "warn_distance_cm": 35.0 } }"#).unwrap();

        assert_eq!(params.safety.warn_distance_cm, 35.0);
        assert_eq!(params.safety.critical_distance_cm, 8.0);
        assert_eq!(params.sensors.poll_rate_hz, 2.0);
        assert_eq!(params.default_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_repairs_bad_values() {
        let mut params = RoverExecParams::default();
        params.safety.min_speed = 50.0;
        params.safety.max_speed = -50.0;
        params.sensors.poll_rate_hz = 100.0;
        params.gesture.confidence_threshold = 3.0;
        params.gesture.majority = 9;

        params.validate();

        assert!(params.safety.max_speed > params.safety.min_speed);
        assert_eq!(params.sensors.poll_rate_hz, 2.0);
        assert_eq!(params.gesture.confidence_threshold, 0.7);
        assert!(params.gesture.majority <= params.gesture.window_length);
    }

    #[test]
    fn test_default_json_round_trips() {
        let parsed: RoverExecParams = serde_json::from_str(&RoverExecParams::default_json()).unwrap();
        assert_eq!(parsed.safety.warn_distance_cm, 20.0);
        assert_eq!(parsed.leds.palette.len(), 11);
    }
}
