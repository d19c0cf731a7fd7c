//! # Gesture Pipeline
//!
//! Turns hand poses into motor demands:
//!
//! ```text
//! vision process -> LandmarkClient -> features -> classifier -> smoother -> motor map
//!    (external)      (newest frame)    (pure)       (forest)     (majority)
//! ```
//!
//! Every stage between the two I/O boundaries is a pure transformation, and
//! the classifier is an external artifact behind a narrow interface, so each
//! piece tests and retrains independently.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod classifier;
mod features;
mod landmark_client;
mod params;
mod smoother;
pub mod train;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Internal
pub use classifier::{GestureModel, GesturePrediction, ModelError, Node, Tree};
pub use features::{extract_features, NUM_FEATURES};
pub use landmark_client::{LandmarkClient, VisionError};
pub use params::{MotorMap, Params, TrainParams};
pub use smoother::Smoother;

use rover_if::eqpt::{motor::MotorDems, vision::LandmarkFrame};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The fixed set of gestures the system recognises.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GestureLabel {
    Forward,
    Backward,
    TurnRight,
    TurnLeft,
    Neutral,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The pure part of the pipeline: classifier, smoother, and motor map.
///
/// Frames go in, demands come out. The landmark client and the rover
/// controller stay outside, which is what keeps this testable without a
/// camera or a rover.
pub struct GesturePipeline {
    model: GestureModel,
    smoother: Smoother,
    motor_map: MotorMap,

    stable: GestureLabel,
    last_prediction: Option<GesturePrediction>,
}

/// What one processed frame produced, for status displays and logs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOutput {
    /// The raw per-frame prediction, `None` for a no-hand frame.
    pub prediction: Option<GesturePrediction>,

    /// The smoothed stable label.
    pub stable: GestureLabel,

    /// The demand the stable label maps to.
    pub dems: MotorDems,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GestureLabel {
    /// All labels, in vote-tiebreak order. Neutral first: when in doubt,
    /// don't move.
    pub const ALL: [GestureLabel; 5] = [
        GestureLabel::Neutral,
        GestureLabel::Forward,
        GestureLabel::Backward,
        GestureLabel::TurnRight,
        GestureLabel::TurnLeft,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GestureLabel::Forward => "forward",
            GestureLabel::Backward => "backward",
            GestureLabel::TurnRight => "turn-right",
            GestureLabel::TurnLeft => "turn-left",
            GestureLabel::Neutral => "neutral",
        }
    }
}

impl GesturePipeline {
    /// Load the trained model and build the pipeline.
    pub fn new(params: &Params) -> Result<Self, ModelError> {
        let model_path = resolve_model_path(&params.model_path);
        let model = GestureModel::load(&model_path)?;

        Ok(Self::from_model(model, params))
    }

    /// Build the pipeline around an already-loaded model.
    pub fn from_model(model: GestureModel, params: &Params) -> Self {
        Self {
            model,
            smoother: Smoother::new(params),
            motor_map: params.motor_map.clone(),
            stable: GestureLabel::Neutral,
            last_prediction: None,
        }
    }

    /// Process one landmark frame into a motor demand.
    pub fn process_frame(&mut self, frame: &LandmarkFrame, now: DateTime<Utc>) -> PipelineOutput {
        let prediction = frame
            .landmarks
            .as_ref()
            .map(|lm| self.model.predict(&extract_features(lm)));

        self.stable = self.smoother.push(prediction, now);
        self.last_prediction = prediction;

        self.output(prediction)
    }

    /// A tick with no fresh frame: re-emit the current stable demand.
    ///
    /// Stream loss long enough to matter is handled above this layer by the
    /// vision timeout; a single missed frame should not twitch the motors.
    pub fn idle_tick(&mut self, now: DateTime<Utc>) -> PipelineOutput {
        self.stable = self.smoother.push(None, now);
        self.output(self.last_prediction)
    }

    fn output(&self, prediction: Option<GesturePrediction>) -> PipelineOutput {
        PipelineOutput {
            prediction,
            stable: self.stable,
            dems: label_to_dems(self.stable, &self.motor_map),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map a stable gesture label to its fixed motor demand.
pub fn label_to_dems(label: GestureLabel, map: &MotorMap) -> MotorDems {
    let [left, right] = match label {
        GestureLabel::Forward => map.forward,
        GestureLabel::Backward => map.backward,
        GestureLabel::TurnRight => map.turn_right,
        GestureLabel::TurnLeft => map.turn_left,
        GestureLabel::Neutral => map.neutral,
    };

    MotorDems { left, right }
}

/// Resolve the model path against the software root.
pub fn resolve_model_path(model_path: &str) -> std::path::PathBuf {
    let path = Path::new(model_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        match util::host::get_melon_sw_root() {
            Ok(root) => root.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;
    use rover_if::eqpt::vision::{LandmarkFrame, FINGERTIP_LANDMARKS, NUM_LANDMARKS};

    /// A landmark set whose fingertips sit at `tip_spread` palm spans from
    /// the wrist. Open hand = large spread, fist = small spread.
    fn hand_with_spread(tip_spread: f64) -> [[f64; 3]; NUM_LANDMARKS] {
        let mut lm = [[0.0; 3]; NUM_LANDMARKS];

        // Wrist at origin, palm landmark one unit up: palm span of 1
        lm[9] = [0.0, 1.0, 0.0];

        for &tip in FINGERTIP_LANDMARKS.iter() {
            lm[tip] = [0.0, tip_spread, 0.0];
        }

        lm
    }

    /// A one-stump forest: open hand (thumb far from wrist) means forward.
    fn stump_model() -> GestureModel {
        // Feature 63 is the first fingertip distance
        GestureModel {
            labels: vec![GestureLabel::Neutral, GestureLabel::Forward],
            num_features: NUM_FEATURES,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 63,
                        threshold: 1.5,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf { label: 0 },
                    Node::Leaf { label: 1 },
                ],
            }],
        }
    }

    fn frame(landmarks: Option<[[f64; 3]; NUM_LANDMARKS]>) -> LandmarkFrame {
        LandmarkFrame {
            timestamp: Utc::now(),
            landmarks,
        }
    }

    #[test]
    fn test_open_hand_drives_forward_after_window() {
        let params = Params::default();
        let mut pipeline = GesturePipeline::from_model(stump_model(), &params);
        let t0 = Utc::now();

        let mut out = pipeline.process_frame(&frame(Some(hand_with_spread(2.0))), t0);
        // One frame is not enough, the smoother needs its majority
        assert_eq!(out.stable, GestureLabel::Neutral);

        for i in 1..5 {
            out = pipeline.process_frame(
                &frame(Some(hand_with_spread(2.0))),
                t0 + Duration::milliseconds(i * 50),
            );
        }

        assert_eq!(out.stable, GestureLabel::Forward);
        assert_eq!(
            (out.dems.left, out.dems.right),
            (params.motor_map.forward[0], params.motor_map.forward[1])
        );
    }

    #[test]
    fn test_lost_hand_maps_to_neutral_after_grace() {
        let params = Params::default();
        let mut pipeline = GesturePipeline::from_model(stump_model(), &params);
        let t0 = Utc::now();

        for i in 0..5 {
            pipeline.process_frame(
                &frame(Some(hand_with_spread(2.0))),
                t0 + Duration::milliseconds(i * 50),
            );
        }

        // No-hand frames past the grace period pull the demand to zero
        let out = pipeline.process_frame(&frame(None), t0 + Duration::seconds(5));
        assert_eq!(out.stable, GestureLabel::Neutral);
        assert!(out.dems.is_zero());
    }

    #[test]
    fn test_fist_stays_neutral() {
        let params = Params::default();
        let mut pipeline = GesturePipeline::from_model(stump_model(), &params);
        let t0 = Utc::now();

        for i in 0..10 {
            let out = pipeline.process_frame(
                &frame(Some(hand_with_spread(0.5))),
                t0 + Duration::milliseconds(i * 50),
            );
            assert_eq!(out.stable, GestureLabel::Neutral);
        }
    }
}
