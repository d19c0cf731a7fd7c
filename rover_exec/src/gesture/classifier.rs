//! # Gesture classifier
//!
//! A trained random-forest artifact behind a narrow interface: load it, ask
//! it for `(label, confidence)`. The pipeline around it neither knows nor
//! cares how the prediction is made, so the model can be retrained or
//! replaced without touching anything else.
//!
//! The artifact is a JSON document holding the label set, the expected
//! feature count, and the forest itself. It is produced by the trainer in
//! [`super::train`] and validated on load so inference never indexes out of
//! bounds.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::GestureLabel;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One gesture prediction from the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GesturePrediction {
    pub label: GestureLabel,

    /// Fraction of trees that voted for the label.
    pub confidence: f64,
}

/// The serialised classifier artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct GestureModel {
    /// The labels the forest was trained on; leaf indices point in here.
    pub labels: Vec<GestureLabel>,

    /// Feature vector length the forest expects.
    pub num_features: usize,

    /// The trees of the forest.
    pub trees: Vec<Tree>,
}

/// One decision tree, nodes in a flat array with index links.
#[derive(Debug, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One node of a decision tree.
#[derive(Debug, Serialize, Deserialize)]
pub enum Node {
    /// Go left if `features[feature] <= threshold`, otherwise right.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },

    /// A vote for `labels[label]`.
    Leaf { label: usize },
}

/// Errors raised loading, saving, or validating a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Cannot read the model file: {0}")]
    FileError(std::io::Error),

    #[error("Cannot parse the model file: {0}")]
    ParseError(serde_json::Error),

    #[error("Cannot serialise the model: {0}")]
    SerialiseError(serde_json::Error),

    #[error("The model artifact is invalid: {0}")]
    Invalid(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Tree {
    /// Walk the tree for one feature vector, returning the leaf's label
    /// index.
    fn predict(&self, features: &[f64]) -> usize {
        let mut idx = 0;

        loop {
            match self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
                Node::Leaf { label } => return label,
            }
        }
    }
}

impl GestureModel {
    /// Load and validate a model artifact.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model_str = fs::read_to_string(path).map_err(ModelError::FileError)?;

        let model: GestureModel =
            serde_json::from_str(&model_str).map_err(ModelError::ParseError)?;

        model.validate()?;

        Ok(model)
    }

    /// Save the artifact as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let model_str =
            serde_json::to_string_pretty(self).map_err(ModelError::SerialiseError)?;

        fs::write(path, model_str).map_err(ModelError::FileError)
    }

    /// Check the artifact's internal consistency, so that inference can walk
    /// the trees without bounds checks failing at control time.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.labels.is_empty() {
            return Err(ModelError::Invalid("no labels".into()));
        }
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("no trees".into()));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Invalid(format!("tree {} is empty", t)));
            }

            for (n, node) in tree.nodes.iter().enumerate() {
                match *node {
                    Node::Split {
                        feature,
                        left,
                        right,
                        ..
                    } => {
                        if feature >= self.num_features {
                            return Err(ModelError::Invalid(format!(
                                "tree {} node {} splits on feature {} of {}",
                                t, n, feature, self.num_features
                            )));
                        }
                        // Children must point forwards in the array, which
                        // also rules out cycles
                        if left <= n || right <= n || left >= tree.nodes.len()
                            || right >= tree.nodes.len()
                        {
                            return Err(ModelError::Invalid(format!(
                                "tree {} node {} has bad child links",
                                t, n
                            )));
                        }
                    }
                    Node::Leaf { label } => {
                        if label >= self.labels.len() {
                            return Err(ModelError::Invalid(format!(
                                "tree {} node {} votes for label {} of {}",
                                t, n, label, self.labels.len()
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Predict a gesture from one feature vector.
    ///
    /// Majority vote over the forest; the confidence is the winning label's
    /// vote fraction. A vector of the wrong length predicts neutral with
    /// zero confidence rather than panicking mid-drive.
    pub fn predict(&self, features: &[f64]) -> GesturePrediction {
        if features.len() != self.num_features {
            return GesturePrediction {
                label: GestureLabel::Neutral,
                confidence: 0.0,
            };
        }

        let mut votes = vec![0usize; self.labels.len()];
        for tree in self.trees.iter() {
            votes[tree.predict(features)] += 1;
        }

        let (best_idx, best_votes) = votes
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .unwrap_or((0, &0));

        GesturePrediction {
            label: self.labels[best_idx],
            confidence: *best_votes as f64 / self.trees.len() as f64,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// A two-tree forest splitting on feature 0 at 0.5, with one dissenting
    /// stump.
    fn model() -> GestureModel {
        GestureModel {
            labels: vec![GestureLabel::Neutral, GestureLabel::Forward],
            num_features: 2,
            trees: vec![
                Tree {
                    nodes: vec![
                        Node::Split {
                            feature: 0,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                        },
                        Node::Leaf { label: 0 },
                        Node::Leaf { label: 1 },
                    ],
                },
                Tree {
                    nodes: vec![
                        Node::Split {
                            feature: 0,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                        },
                        Node::Leaf { label: 0 },
                        Node::Leaf { label: 1 },
                    ],
                },
                Tree {
                    nodes: vec![Node::Leaf { label: 0 }],
                },
            ],
        }
    }

    #[test]
    fn test_majority_vote_and_confidence() {
        let model = model();

        let p = model.predict(&[1.0, 0.0]);
        assert_eq!(p.label, GestureLabel::Forward);
        assert!((p.confidence - 2.0 / 3.0).abs() < 1e-9);

        let p = model.predict(&[0.0, 0.0]);
        assert_eq!(p.label, GestureLabel::Neutral);
        assert!((p.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_feature_count_predicts_neutral() {
        let p = model().predict(&[1.0]);
        assert_eq!(p.label, GestureLabel::Neutral);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_links() {
        let mut bad = model();
        bad.trees[0].nodes[0] = Node::Split {
            feature: 0,
            threshold: 0.5,
            left: 0,
            right: 2,
        };
        assert!(bad.validate().is_err());

        let mut bad = model();
        bad.trees[1].nodes[2] = Node::Leaf { label: 7 };
        assert!(bad.validate().is_err());

        let mut bad = model();
        bad.trees[0].nodes[0] = Node::Split {
            feature: 5,
            threshold: 0.5,
            left: 1,
            right: 2,
        };
        assert!(bad.validate().is_err());
    }
}
