//! # Vision Equipment Messages
//!
//! The camera capture and hand-landmark model run in a separate vision
//! process, which publishes one [`LandmarkFrame`] per inference cycle. The
//! exec subscribes to this stream in gesture mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of hand landmarks produced per frame by the landmark model.
pub const NUM_LANDMARKS: usize = 21;

/// Landmark index of the wrist reference point.
pub const WRIST_LANDMARK: usize = 0;

/// Landmark index of the middle-finger knuckle, used with the wrist to
/// measure the palm span.
pub const PALM_LANDMARK: usize = 9;

/// Landmark indices of the five fingertips.
pub const FINGERTIP_LANDMARKS: [usize; 5] = [4, 8, 12, 16, 20];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One hand-landmark frame published by the vision process.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LandmarkFrame {
    /// UTC timestamp at which the source camera frame was captured.
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The 21 landmark points in image-normalised coordinates, or `None` if
    /// no hand was detected in the frame.
    pub landmarks: Option<[[f64; 3]; NUM_LANDMARKS]>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LandmarkFrame {
    /// A no-hand frame stamped now.
    pub fn no_hand_now() -> Self {
        Self {
            timestamp: Utc::now(),
            landmarks: None,
        }
    }
}
