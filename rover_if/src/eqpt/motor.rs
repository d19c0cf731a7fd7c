//! # Motor Equipment Demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demanded speeds for the two wheel motors.
///
/// Speeds are signed, in the rover's native motor units. The safety layer in
/// the exec is responsible for keeping these inside the configured limits,
/// the wire type carries whatever it is given.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct MotorDems {
    /// Demanded speed of the left wheel.
    pub left: f64,

    /// Demanded speed of the right wheel.
    pub right: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorDems {
    /// The all-stop demand.
    pub fn zero() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
        }
    }

    /// True if both wheels are demanded stopped.
    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// True if either wheel is demanded in the forward direction.
    pub fn has_forward_component(&self) -> bool {
        self.left > 0.0 || self.right > 0.0
    }
}

impl Default for MotorDems {
    fn default() -> Self {
        Self::zero()
    }
}
