//! # Rover executable library
//!
//! Control library for the MicroMelon rover. The library is split into the
//! modules below; the `rover_exec` binary wires them together behind the
//! command line interface.
//!
//! - `transport`: the adapter over the rover link (BLE bridge or simulator)
//! - `sensor_mgr`: background telemetry polling and the cached snapshot
//! - `safety_mgr`: the safety supervision state machine
//! - `rover_ctrl`: the controller aggregate used by every interface mode
//! - `gesture`: the hand-gesture control pipeline
//! - `interfaces`: the user-facing control loops
//! - `record`: session recording of commands and snapshots

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod gesture;
pub mod interfaces;
pub mod params;
pub mod record;
pub mod rover_ctrl;
pub mod safety_mgr;
pub mod sensor_mgr;
pub mod transport;
