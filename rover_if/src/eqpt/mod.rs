//! # Equipment Interface
//!
//! This module defines the demand and telemetry structures exchanged with the
//! rover endpoints. Both the BLE bridge daemon and the simulator speak this
//! protocol, which is what lets the exec treat them identically.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod led;
pub mod motor;
pub mod telem;
pub mod vision;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use led::LedDems;
use motor::MotorDems;
use telem::RawTelemetry;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A demand sent from the exec to a rover endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum RoverDemand {
    /// Open a session with the rover. Carries the pairing code for the BLE
    /// bridge; the simulator accepts any code.
    StartSession { rover_code: Option<u16> },

    /// Set the wheel motor speeds.
    Motors(MotorDems),

    /// Set the LED state.
    Leds(LedDems),

    /// Read a full telemetry frame.
    ReadTelemetry,

    /// Close the session, stopping the rover.
    EndSession,
}

/// The endpoint's reply to a [`RoverDemand`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum RoverResponse {
    /// Demand was valid and will be executed.
    DemsOk,

    /// Demand was invalid and has been rejected.
    DemsInvalid,

    /// The rover equipment is in a state where demands cannot be actuated.
    EqptInvalid,

    /// Telemetry frame in response to a read demand.
    Telemetry(RawTelemetry),
}
