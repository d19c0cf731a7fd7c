//! # Interface modes
//!
//! The user-facing control loops. All three modes drive the rover through
//! the same [`crate::rover_ctrl::RoverController`] contract and emit the same
//! intent vocabulary; they differ only in where the intent comes from:
//!
//! - `keyboard`: an interactive console, commands typed at a prompt
//! - `dashboard`: the console commands plus a live status panel ("gui" mode)
//! - `gesture`: hand gestures from the vision pipeline

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod dashboard;
pub mod gesture;
pub mod keyboard;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::gesture::{ModelError, VisionError};
use crate::sensor_mgr::Reading;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors that end an interface mode.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("Console error: {0}")]
    Console(String),

    #[error("Gesture model error: {0}")]
    Model(ModelError),

    #[error("Vision failure: {0}")]
    Vision(VisionError),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Format a numeric reading for display, `n/a` when unavailable.
pub fn fmt_reading(reading: &Reading<f64>) -> String {
    match reading.value() {
        Some(v) => format!("{:.1}", v),
        None => "n/a".into(),
    }
}

/// Format a boolean reading for display.
pub fn fmt_flag(reading: &Reading<bool>, yes: &str, no: &str) -> String {
    match reading.value() {
        Some(true) => yes.into(),
        Some(false) => no.into(),
        None => "n/a".into(),
    }
}
