//! # Landmark feature extraction
//!
//! Turns one raw 21-point hand landmark frame into the feature vector the
//! classifier was trained on. The transformation makes the features
//! translation and scale invariant: landmarks are re-expressed relative to
//! the wrist and divided by the palm span, so the same pose held closer to
//! the camera or off to one side produces (nearly) the same vector.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rover_if::eqpt::vision::{FINGERTIP_LANDMARKS, NUM_LANDMARKS, PALM_LANDMARK, WRIST_LANDMARK};
use util::maths::norm;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of the extracted feature vector: 21 wrist-relative 3D points plus
/// the five fingertip distances.
pub const NUM_FEATURES: usize = NUM_LANDMARKS * 3 + FINGERTIP_LANDMARKS.len();

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Extract the feature vector from one landmark frame.
///
/// - Translate all landmarks so the wrist is the origin.
/// - Scale by the wrist-to-middle-knuckle palm span. A degenerate (zero)
///   span leaves the values unscaled rather than dividing by zero.
/// - Append each fingertip's distance from the wrist as shape features.
pub fn extract_features(landmarks: &[[f64; 3]; NUM_LANDMARKS]) -> Vec<f64> {
    let wrist = landmarks[WRIST_LANDMARK];

    let palm_span = norm(&landmarks[WRIST_LANDMARK], &landmarks[PALM_LANDMARK])
        .unwrap_or(0.0);
    let scale = if palm_span > 0.0 { palm_span } else { 1.0 };

    let mut features = Vec::with_capacity(NUM_FEATURES);

    for point in landmarks.iter() {
        features.push((point[0] - wrist[0]) / scale);
        features.push((point[1] - wrist[1]) / scale);
        features.push((point[2] - wrist[2]) / scale);
    }

    for &tip in FINGERTIP_LANDMARKS.iter() {
        let distance = norm(&landmarks[tip], &wrist).unwrap_or(0.0);
        features.push(distance / scale);
    }

    features
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// A synthetic open-hand landmark set.
    fn hand() -> [[f64; 3]; NUM_LANDMARKS] {
        let mut lm = [[0.0; 3]; NUM_LANDMARKS];
        for (i, point) in lm.iter_mut().enumerate() {
            point[0] = 0.3 + (i as f64) * 0.01;
            point[1] = 0.5 - (i as f64) * 0.02;
            point[2] = (i as f64) * 0.001;
        }
        lm
    }

    #[test]
    fn test_feature_vector_length() {
        assert_eq!(extract_features(&hand()).len(), NUM_FEATURES);
        assert_eq!(NUM_FEATURES, 68);
    }

    #[test]
    fn test_translation_invariance() {
        let base = hand();

        let mut shifted = base;
        for point in shifted.iter_mut() {
            point[0] += 0.2;
            point[1] -= 0.1;
        }

        let a = extract_features(&base);
        let b = extract_features(&shifted);

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scale_invariance() {
        let base = hand();

        // Scale the whole hand about the wrist by 2.5x, as if it moved
        // closer to the camera
        let wrist = base[WRIST_LANDMARK];
        let mut scaled = base;
        for point in scaled.iter_mut() {
            for axis in 0..3 {
                point[axis] = wrist[axis] + (point[axis] - wrist[axis]) * 2.5;
            }
        }

        let a = extract_features(&base);
        let b = extract_features(&scaled);

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_degenerate_palm_span() {
        // All landmarks in one spot: no scaling, no NaNs
        let lm = [[0.5; 3]; NUM_LANDMARKS];
        let features = extract_features(&lm);

        assert!(features.iter().all(|f| f.is_finite()));
    }
}
