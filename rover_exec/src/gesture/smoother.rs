//! # Temporal prediction smoothing
//!
//! A single camera frame is a bad reason to drive a rover. The smoother
//! keeps a short rolling history of per-frame predictions and only lets a
//! label through once it holds a majority of the window, which suppresses
//! single-frame misclassifications and hand jitter.
//!
//! Losing the hand entirely is handled with a grace period: within it the
//! last stable label is held (the hand usually reappears a frame later),
//! beyond it the smoother falls back to neutral. It never holds the last
//! motion command indefinitely on a lost hand.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use super::{GestureLabel, GesturePrediction, Params};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Majority-vote smoother over a rolling prediction window.
pub struct Smoother {
    window_length: usize,
    majority: usize,
    confidence_threshold: f64,
    grace: Duration,

    window: VecDeque<GestureLabel>,
    stable: GestureLabel,
    last_hand_at: Option<DateTime<Utc>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Smoother {
    pub fn new(params: &Params) -> Self {
        // A majority larger than the window could never be reached
        let majority = params.majority.min(params.window_length).max(1);

        Self {
            window_length: params.window_length.max(1),
            majority,
            confidence_threshold: params.confidence_threshold,
            grace: Duration::milliseconds((params.no_hand_grace_s * 1000.0) as i64),
            window: VecDeque::new(),
            stable: GestureLabel::Neutral,
            last_hand_at: None,
        }
    }

    /// Feed one frame's prediction (or `None` for "no hand") and get the
    /// current stable label.
    pub fn push(&mut self, prediction: Option<GesturePrediction>, now: DateTime<Utc>) -> GestureLabel {
        match prediction {
            Some(p) => {
                self.last_hand_at = Some(now);

                // A low-confidence prediction is treated as neutral, not as
                // a vote for whatever the forest leaned towards
                let label = if p.confidence >= self.confidence_threshold {
                    p.label
                } else {
                    GestureLabel::Neutral
                };

                self.window.push_back(label);
                while self.window.len() > self.window_length {
                    self.window.pop_front();
                }

                if let Some(winner) = self.majority_label() {
                    self.stable = winner;
                }
            }
            None => {
                let grace_expired = match self.last_hand_at {
                    Some(t) => now - t > self.grace,
                    None => true,
                };

                if grace_expired {
                    self.window.clear();
                    self.stable = GestureLabel::Neutral;
                }
            }
        }

        self.stable
    }

    /// The label holding a majority of the window, if any.
    fn majority_label(&self) -> Option<GestureLabel> {
        for candidate in GestureLabel::ALL.iter() {
            let count = self.window.iter().filter(|l| *l == candidate).count();
            if count >= self.majority {
                return Some(*candidate);
            }
        }

        None
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> Params {
        Params {
            window_length: 5,
            majority: 3,
            confidence_threshold: 0.7,
            no_hand_grace_s: 1.0,
            ..Params::default()
        }
    }

    fn confident(label: GestureLabel) -> Option<GesturePrediction> {
        Some(GesturePrediction {
            label,
            confidence: 0.9,
        })
    }

    #[test]
    fn test_alternating_stream_never_emits_forward() {
        let mut smoother = Smoother::new(&params());
        let t0 = Utc::now();

        // neutral/forward alternation keeps forward below the majority
        for i in 0..20 {
            let label = if i % 2 == 0 {
                GestureLabel::Neutral
            } else {
                GestureLabel::Forward
            };
            let stable = smoother.push(confident(label), t0 + Duration::milliseconds(i * 50));
            assert_ne!(stable, GestureLabel::Forward);
        }
    }

    #[test]
    fn test_held_gesture_is_emitted() {
        let mut smoother = Smoother::new(&params());
        let t0 = Utc::now();

        let mut stable = GestureLabel::Neutral;
        for i in 0..5 {
            stable = smoother.push(
                confident(GestureLabel::Forward),
                t0 + Duration::milliseconds(i * 50),
            );
        }
        assert_eq!(stable, GestureLabel::Forward);
    }

    #[test]
    fn test_low_confidence_counts_as_neutral() {
        let mut smoother = Smoother::new(&params());
        let t0 = Utc::now();

        for i in 0..5 {
            let stable = smoother.push(
                Some(GesturePrediction {
                    label: GestureLabel::Backward,
                    confidence: 0.3,
                }),
                t0 + Duration::milliseconds(i * 50),
            );
            assert_eq!(stable, GestureLabel::Neutral);
        }
    }

    #[test]
    fn test_no_hand_grace_period() {
        let mut smoother = Smoother::new(&params());
        let t0 = Utc::now();

        // Establish a stable forward
        for i in 0..5 {
            smoother.push(confident(GestureLabel::Forward), t0 + Duration::milliseconds(i * 50));
        }

        // Hand lost: within the grace period the stable label holds
        let stable = smoother.push(None, t0 + Duration::milliseconds(500));
        assert_eq!(stable, GestureLabel::Forward);

        // Beyond the grace period the smoother falls back to neutral
        let stable = smoother.push(None, t0 + Duration::milliseconds(2000));
        assert_eq!(stable, GestureLabel::Neutral);

        // And stays there, it does not hold the last command
        let stable = smoother.push(None, t0 + Duration::milliseconds(3000));
        assert_eq!(stable, GestureLabel::Neutral);
    }
}
