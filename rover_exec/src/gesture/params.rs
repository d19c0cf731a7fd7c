//! Gesture pipeline parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Gesture pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Path to the trained classifier artifact, relative to the software
    /// root.
    pub model_path: String,

    /// zmq endpoint the vision process publishes landmark frames on.
    pub landmark_endpoint: String,

    /// Predictions below this confidence count as neutral.
    pub confidence_threshold: f64,

    /// Length of the temporal smoothing window, in predictions.
    pub window_length: usize,

    /// Number of agreeing predictions within the window needed before a
    /// label is trusted.
    pub majority: usize,

    /// Seconds without a detected hand before the pipeline falls back to
    /// neutral rather than holding the last command.
    pub no_hand_grace_s: f64,

    /// Seconds without any landmark frame at all before the vision process is
    /// considered dead and gesture mode shuts down.
    pub vision_timeout_s: f64,

    /// Rate of the gesture control loop in Hertz.
    pub tick_rate_hz: f64,

    /// Motor demands each stable gesture maps to.
    pub motor_map: MotorMap,

    /// Training parameters for `--train-gestures`.
    pub train: TrainParams,
}

/// The fixed gesture-to-motors mapping, `[left, right]` per label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorMap {
    pub forward: [f64; 2],
    pub backward: [f64; 2],
    pub turn_right: [f64; 2],
    pub turn_left: [f64; 2],
    pub neutral: [f64; 2],
}

/// Classifier training parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Samples to collect per gesture. Fewer than ~100 rarely generalises.
    pub samples_per_gesture: usize,

    /// Minimum seconds between two captured samples, so one pose does not
    /// flood the set with near-duplicates.
    pub min_capture_interval_s: f64,

    /// Number of trees in the forest.
    pub num_trees: usize,

    /// Maximum tree depth.
    pub max_depth: usize,

    /// Minimum samples a node needs before it may split further.
    pub min_samples_split: usize,

    /// Fraction of the data held out for the accuracy report.
    pub test_fraction: f64,

    /// RNG seed for bootstrap and feature sampling, so training is
    /// reproducible.
    pub seed: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            model_path: "gesture_model.json".into(),
            landmark_endpoint: "tcp://127.0.0.1:4210".into(),
            confidence_threshold: 0.7,
            window_length: 5,
            majority: 3,
            no_hand_grace_s: 1.0,
            vision_timeout_s: 5.0,
            tick_rate_hz: 20.0,
            motor_map: MotorMap::default(),
            train: TrainParams::default(),
        }
    }
}

impl Default for MotorMap {
    fn default() -> Self {
        Self {
            forward: [30.0, 30.0],
            backward: [-20.0, -20.0],
            turn_right: [5.0, 10.0],
            turn_left: [10.0, 5.0],
            neutral: [0.0, 0.0],
        }
    }
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            samples_per_gesture: 100,
            min_capture_interval_s: 0.3,
            num_trees: 50,
            max_depth: 12,
            min_samples_split: 5,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}
