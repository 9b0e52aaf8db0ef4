//! Train/test splitting and cross-validation

use crate::error::{Result, WizardError};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single train/test partition of row indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Shuffle `0..n_samples` with the seed and hold out `ceil(test_size * n)` rows.
///
/// The same seed always yields the same partition.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<CVSplit> {
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(WizardError::InvalidInput(format!(
            "{} rows cannot be split with test_size {}: both sides need at least one row",
            n_samples, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(n_test);
    Ok(CVSplit {
        train_indices,
        test_indices: indices,
        fold_idx: 0,
    })
}

/// Stratified k-fold without shuffling.
///
/// Rows are grouped by class (ascending class code, then row order) and dealt
/// round-robin into folds, so fold sizes differ by at most one and every
/// class is spread as evenly as its count allows.
pub fn stratified_k_fold(y: &Array1<f64>, n_splits: usize) -> Result<Vec<CVSplit>> {
    let n_samples = y.len();
    if n_splits < 2 {
        return Err(WizardError::InvalidParameter {
            name: "cv_folds".to_string(),
            value: n_splits.to_string(),
            reason: "must be at least 2".to_string(),
        });
    }
    if n_samples < n_splits {
        return Err(WizardError::InvalidParameter {
            name: "cv_folds".to_string(),
            value: n_splits.to_string(),
            reason: format!("cannot exceed the number of rows ({})", n_samples),
        });
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        by_class.entry(label.round() as i64).or_default().push(i);
    }

    let mut fold_of = vec![0usize; n_samples];
    for (position, &row) in by_class.values().flatten().enumerate() {
        fold_of[row] = position % n_splits;
    }

    Ok((0..n_splits)
        .map(|fold_idx| {
            let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                (0..n_samples).partition(|&i| fold_of[i] == fold_idx);
            CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            }
        })
        .collect())
}

/// Cross-validation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    /// Score of each fold, in fold order
    pub scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation of the fold scores
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let n = n_folds.max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_train_test_split_sizes_and_determinism() {
        let split = train_test_split(10, 0.25, 42).unwrap();
        assert_eq!(split.test_indices.len(), 3);
        assert_eq!(split.train_indices.len(), 7);

        let mut all: Vec<usize> = split.train_indices.iter().chain(&split.test_indices).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(split, train_test_split(10, 0.25, 42).unwrap());
    }

    #[test]
    fn test_train_test_split_too_small() {
        assert!(train_test_split(1, 0.2, 42).is_err());
        assert!(train_test_split(0, 0.2, 42).is_err());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let splits = stratified_k_fold(&y, 2).unwrap();
        assert_eq!(splits.len(), 2);

        // class 0 rows {0, 2, 4} then class 1 rows {1, 3, 5, 6, 7}, dealt alternately
        assert_eq!(splits[0].test_indices, vec![0, 3, 4, 6]);
        assert_eq!(splits[1].test_indices, vec![1, 2, 5, 7]);
        assert_eq!(splits[0].train_indices, splits[1].test_indices);
    }

    #[test]
    fn test_stratified_k_fold_rejects_too_many_folds() {
        let y = array![0.0, 1.0];
        assert!(matches!(
            stratified_k_fold(&y, 3),
            Err(WizardError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_cv_results_population_std() {
        let results = CVResults::from_scores(vec![0.5, 1.0]);
        assert_eq!(results.mean_score, 0.75);
        assert_eq!(results.std_score, 0.25);
        assert_eq!(results.n_folds, 2);
    }
}
