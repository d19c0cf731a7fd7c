//! # Gesture classifier training
//!
//! Collects labelled landmark samples from the vision stream and fits the
//! random forest the gesture mode drives with. Training is deliberately
//! reproducible: all randomness (bootstrap draws, feature subsampling,
//! train/test split) comes from one seeded generator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::thread;
use std::time::Duration;

// Internal
use super::{
    extract_features, resolve_model_path, GestureLabel, GestureModel, LandmarkClient, ModelError,
    Node, Params, TrainParams, Tree, VisionError,
};
use rover_if::net::zmq;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The result of a training run.
pub struct TrainReport {
    pub model: GestureModel,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub num_train: usize,
    pub num_test: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised during sample collection or training.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Vision stream failure: {0}")]
    Vision(VisionError),

    #[error("Not enough samples for {0:?}: got {1}, need at least {2}")]
    NotEnoughSamples(GestureLabel, usize, usize),

    #[error("Samples have inconsistent feature counts ({0} vs {1})")]
    InconsistentFeatures(usize, usize),

    #[error("Model artifact error: {0}")]
    Model(ModelError),

    #[error("Training aborted by the operator")]
    Aborted,
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The fewest samples per gesture training will accept at all. Well below
/// what generalises, the configured target should be much higher.
const MIN_SAMPLES_HARD_FLOOR: usize = 10;

/// Poll interval while waiting for landmark frames during collection.
const COLLECT_POLL_MS: u64 = 50;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Interactive training session: collect samples for every gesture from the
/// landmark stream, fit the forest, report accuracy, save the artifact.
pub fn run_training(ctx: &zmq::Context, params: &Params) -> Result<TrainReport, TrainError> {
    let client =
        LandmarkClient::start(ctx, &params.landmark_endpoint).map_err(TrainError::Vision)?;

    let mut rl = rustyline::DefaultEditor::new().map_err(|_| TrainError::Aborted)?;

    println!("Gesture training: {} samples per gesture.", params.train.samples_per_gesture);
    println!("Hold each gesture steady and vary distance/angle as you go.");
    println!("Press ENTER to start each gesture, or type q to abort.\n");

    let mut samples: Vec<(GestureLabel, Vec<f64>)> = Vec::new();

    for label in GestureLabel::ALL.iter() {
        let prompt = format!("Collect '{}' - ENTER to start, q to abort: ", label.name());
        match rl.readline(&prompt) {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => return Err(TrainError::Aborted),
            Ok(_) => (),
            Err(_) => return Err(TrainError::Aborted),
        }

        let collected = collect_samples(&client, *label, params)?;
        info!(
            "Collected {} samples for {}",
            collected.len(),
            label.name()
        );
        samples.extend(collected.into_iter().map(|f| (*label, f)));
    }

    let report = train_forest(&samples, &params.train)?;

    println!(
        "\nTraining accuracy: {:.1}% ({} samples)",
        report.train_accuracy * 100.0,
        report.num_train
    );
    println!(
        "Testing accuracy:  {:.1}% ({} samples)",
        report.test_accuracy * 100.0,
        report.num_test
    );

    if report.train_accuracy - report.test_accuracy > 0.15 {
        warn!("Large train/test gap suggests overfitting, collect more varied samples");
    } else if report.test_accuracy > 0.9 {
        println!("Accuracy looks good.");
    } else {
        println!("Consider collecting more diverse samples.");
    }

    let model_path = resolve_model_path(&params.model_path);
    report.model.save(&model_path).map_err(TrainError::Model)?;
    info!("Model saved to {:?}", model_path);

    Ok(report)
}

/// Collect feature vectors for one gesture from the landmark stream.
///
/// Frames without a hand are skipped; captures are spaced by the configured
/// interval so one pose does not produce a run of near-duplicates.
pub fn collect_samples(
    client: &LandmarkClient,
    label: GestureLabel,
    params: &Params,
) -> Result<Vec<Vec<f64>>, TrainError> {
    let target = params.train.samples_per_gesture;
    let interval = Duration::from_millis((params.train.min_capture_interval_s * 1000.0) as u64);

    let mut collected = Vec::with_capacity(target);
    let mut last_capture = std::time::Instant::now() - interval;

    while collected.len() < target {
        // A silent stream means the vision process died mid-collection
        if let Some(age) = client.seconds_since_last_frame(Utc::now()) {
            if age > params.vision_timeout_s {
                return Err(TrainError::Vision(VisionError::StreamLost(age)));
            }
        }

        match client.take_latest() {
            Some(frame) => {
                if let Some(ref landmarks) = frame.landmarks {
                    if last_capture.elapsed() >= interval {
                        collected.push(extract_features(landmarks));
                        last_capture = std::time::Instant::now();

                        if collected.len() % 10 == 0 {
                            println!("  {} {}/{}", label.name(), collected.len(), target);
                        }
                    }
                }
            }
            None => thread::sleep(Duration::from_millis(COLLECT_POLL_MS)),
        }
    }

    Ok(collected)
}

/// Fit a random forest to labelled feature vectors.
pub fn train_forest(
    samples: &[(GestureLabel, Vec<f64>)],
    params: &TrainParams,
) -> Result<TrainReport, TrainError> {
    // The label set is whatever is present, in canonical order
    let labels: Vec<GestureLabel> = GestureLabel::ALL
        .iter()
        .copied()
        .filter(|l| samples.iter().any(|(sl, _)| sl == l))
        .collect();

    if labels.is_empty() {
        return Err(TrainError::NotEnoughSamples(
            GestureLabel::Neutral,
            0,
            MIN_SAMPLES_HARD_FLOOR,
        ));
    }

    let num_features = samples[0].1.len();
    for (_, f) in samples.iter() {
        if f.len() != num_features {
            return Err(TrainError::InconsistentFeatures(num_features, f.len()));
        }
    }

    // Index samples per class and enforce the floor
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); labels.len()];
    for (i, (label, _)) in samples.iter().enumerate() {
        let class = labels.iter().position(|l| l == label).unwrap();
        by_class[class].push(i);
    }
    for (class, indices) in by_class.iter().enumerate() {
        if indices.len() < MIN_SAMPLES_HARD_FLOOR {
            return Err(TrainError::NotEnoughSamples(
                labels[class],
                indices.len(),
                MIN_SAMPLES_HARD_FLOOR,
            ));
        }
    }

    let mut rng = StdRng::seed_from_u64(params.seed);

    // Stratified train/test split
    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();
    for indices in by_class.iter_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64) * params.test_fraction).round() as usize;
        let n_test = n_test.min(indices.len() - 1).max(1);
        test_idx.extend_from_slice(&indices[..n_test]);
        train_idx.extend_from_slice(&indices[n_test..]);
    }

    // Class index per sample, once
    let class_of: Vec<usize> = samples
        .iter()
        .map(|(label, _)| labels.iter().position(|l| l == label).unwrap())
        .collect();

    // Grow the forest on bootstrap draws of the training set
    let mut trees = Vec::with_capacity(params.num_trees);
    for _ in 0..params.num_trees.max(1) {
        let bootstrap: Vec<usize> = (0..train_idx.len())
            .map(|_| train_idx[rng.gen_range(0..train_idx.len())])
            .collect();

        let mut nodes = Vec::new();
        grow_tree(
            samples,
            &class_of,
            labels.len(),
            num_features,
            &bootstrap,
            0,
            params,
            &mut rng,
            &mut nodes,
        );
        trees.push(Tree { nodes });
    }

    let model = GestureModel {
        labels,
        num_features,
        trees,
    };
    model.validate().map_err(TrainError::Model)?;

    let train_accuracy = accuracy(&model, samples, &train_idx);
    let test_accuracy = accuracy(&model, samples, &test_idx);

    Ok(TrainReport {
        model,
        train_accuracy,
        test_accuracy,
        num_train: train_idx.len(),
        num_test: test_idx.len(),
    })
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Grow one subtree over `indices`, appending nodes and returning the root's
/// node index. Children always land at higher indices than their parent.
fn grow_tree(
    samples: &[(GestureLabel, Vec<f64>)],
    class_of: &[usize],
    num_classes: usize,
    num_features: usize,
    indices: &[usize],
    depth: usize,
    params: &TrainParams,
    rng: &mut StdRng,
    nodes: &mut Vec<Node>,
) -> usize {
    let counts = class_counts(class_of, num_classes, indices);
    let majority = majority_class(&counts);

    let is_pure = counts.iter().filter(|c| **c > 0).count() <= 1;
    if depth >= params.max_depth || indices.len() < params.min_samples_split || is_pure {
        nodes.push(Node::Leaf { label: majority });
        return nodes.len() - 1;
    }

    let split = match best_split(samples, class_of, num_classes, num_features, indices, rng) {
        Some(s) => s,
        None => {
            nodes.push(Node::Leaf { label: majority });
            return nodes.len() - 1;
        }
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| samples[i].1[split.feature] <= split.threshold);

    // Reserve the parent slot, grow the children behind it, then patch
    nodes.push(Node::Leaf { label: majority });
    let me = nodes.len() - 1;

    let left = grow_tree(
        samples, class_of, num_classes, num_features, &left_idx, depth + 1, params, rng, nodes,
    );
    let right = grow_tree(
        samples, class_of, num_classes, num_features, &right_idx, depth + 1, params, rng, nodes,
    );

    nodes[me] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
    };

    me
}

struct Split {
    feature: usize,
    threshold: f64,
    gini: f64,
}

/// Find the best Gini split over a random subset of features.
fn best_split(
    samples: &[(GestureLabel, Vec<f64>)],
    class_of: &[usize],
    num_classes: usize,
    num_features: usize,
    indices: &[usize],
    rng: &mut StdRng,
) -> Option<Split> {
    // Standard forest heuristic: consider sqrt(F) features per node
    let k = ((num_features as f64).sqrt().ceil() as usize).max(1);
    let mut features: Vec<usize> = (0..num_features).collect();
    features.shuffle(rng);
    features.truncate(k);

    let parent_gini = gini(&class_counts(class_of, num_classes, indices), indices.len());

    let mut best: Option<Split> = None;

    for &feature in features.iter() {
        let mut values: Vec<f64> = indices.iter().map(|&i| samples[i].1[feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        if values.len() < 2 {
            continue;
        }

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;

            let mut left_counts = vec![0usize; num_classes];
            let mut right_counts = vec![0usize; num_classes];
            for &i in indices.iter() {
                if samples[i].1[feature] <= threshold {
                    left_counts[class_of[i]] += 1;
                } else {
                    right_counts[class_of[i]] += 1;
                }
            }

            let n_left: usize = left_counts.iter().sum();
            let n_right: usize = right_counts.iter().sum();
            if n_left == 0 || n_right == 0 {
                continue;
            }

            let weighted = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / indices.len() as f64;

            if weighted < parent_gini
                && best.as_ref().map(|b| weighted < b.gini).unwrap_or(true)
            {
                best = Some(Split {
                    feature,
                    threshold,
                    gini: weighted,
                });
            }
        }
    }

    best
}

fn class_counts(class_of: &[usize], num_classes: usize, indices: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; num_classes];
    for &i in indices.iter() {
        counts[class_of[i]] += 1;
    }
    counts
}

fn majority_class(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| **c)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Gini impurity of a class count vector.
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let mut sum = 0.0;
    for &c in counts.iter() {
        let p = c as f64 / total as f64;
        sum += p * p;
    }

    1.0 - sum
}

fn accuracy(model: &GestureModel, samples: &[(GestureLabel, Vec<f64>)], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }

    let correct = indices
        .iter()
        .filter(|&&i| model.predict(&samples[i].1).label == samples[i].0)
        .count();

    correct as f64 / indices.len() as f64
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Cleanly separable two-class data along feature 0.
    fn separable_samples() -> Vec<(GestureLabel, Vec<f64>)> {
        let mut samples = Vec::new();
        for i in 0..30 {
            let jitter = i as f64 * 0.003;
            samples.push((
                GestureLabel::Neutral,
                vec![0.1 + jitter, 0.5, 1.0 - jitter, 0.2],
            ));
            samples.push((
                GestureLabel::Forward,
                vec![0.9 - jitter, 0.5, 0.3 + jitter, 0.2],
            ));
        }
        samples
    }

    #[test]
    fn test_train_on_separable_data() {
        let params = TrainParams {
            num_trees: 15,
            ..TrainParams::default()
        };

        let report = train_forest(&separable_samples(), &params).unwrap();

        assert!(report.test_accuracy > 0.95);
        assert!(report.num_test > 0);

        // The fitted model separates fresh points from either side
        let p = report.model.predict(&[0.05, 0.5, 1.0, 0.2]);
        assert_eq!(p.label, GestureLabel::Neutral);
        let p = report.model.predict(&[0.95, 0.5, 0.3, 0.2]);
        assert_eq!(p.label, GestureLabel::Forward);
    }

    #[test]
    fn test_training_is_reproducible() {
        let params = TrainParams {
            num_trees: 5,
            ..TrainParams::default()
        };

        let a = train_forest(&separable_samples(), &params).unwrap();
        let b = train_forest(&separable_samples(), &params).unwrap();

        assert_eq!(a.test_accuracy, b.test_accuracy);
        assert_eq!(a.model.trees.len(), b.model.trees.len());
    }

    #[test]
    fn test_too_few_samples_is_an_error() {
        let samples = vec![
            (GestureLabel::Neutral, vec![0.0, 0.0]),
            (GestureLabel::Forward, vec![1.0, 1.0]),
        ];

        match train_forest(&samples, &TrainParams::default()) {
            Err(TrainError::NotEnoughSamples(_, _, _)) => (),
            other => panic!("expected NotEnoughSamples, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_inconsistent_features_is_an_error() {
        let mut samples = separable_samples();
        samples.push((GestureLabel::Forward, vec![1.0]));

        match train_forest(&samples, &TrainParams::default()) {
            Err(TrainError::InconsistentFeatures(_, _)) => (),
            other => panic!("expected InconsistentFeatures, got {:?}", other.map(|_| ())),
        }
    }
}
