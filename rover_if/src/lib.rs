//! # Rover interface crate.
//!
//! Provides the wire-level vocabulary and networking layer shared between the
//! rover executable and the rover endpoints (BLE bridge, simulator, vision
//! process).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Rover endpoint addressing
pub mod endpoint;

/// Demand and telemetry definitions for rover equipment
pub mod eqpt;

/// Network module
pub mod net;
