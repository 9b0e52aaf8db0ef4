//! Decision tree (CART)

use crate::error::{Result, WizardError};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Variance (regression)
    MSE,
}

/// Decision tree over class codes (`0..k`) or continuous targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered at each split; all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    /// Seed for the per-split feature subset
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    is_classification: bool,
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self::with_task(true)
    }

    pub fn new_regressor() -> Self {
        Self::with_task(false)
    }

    fn with_task(is_classification: bool) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: if is_classification { Criterion::Gini } else { Criterion::MSE },
            random_state: 42,
            n_features: 0,
            feature_importances: None,
            is_classification,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the tree. Fewer than `min_samples_split` rows gives a single leaf.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(WizardError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(WizardError::TrainingError("cannot fit a tree on zero rows".to_string()));
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure(&y_subset);

        let leaf = || TreeNode::Leaf {
            value: self.leaf_value(&y_subset),
            n_samples,
        };
        if should_stop {
            return leaf();
        }

        let features = self.candidate_features(x.ncols(), rng);
        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, &features) else {
            return leaf();
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        importances[feature] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(m) if m < n_features => {
                let mut picked = sample(rng, n_features, m).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Best (feature, threshold, impurity decrease) over the candidate features
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let total = SplitStats::from_values(indices.iter().map(|&i| y[i]));
        let parent_impurity = self.impurity(&total);
        let n = indices.len();

        // Each feature scans its thresholds independently
        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left = SplitStats::default();
                let mut best: Option<(f64, f64)> = None;
                for split in 1..n {
                    left.push(y[order[split - 1]]);
                    if split < self.min_samples_leaf || n - split < self.min_samples_leaf {
                        continue;
                    }
                    let lo = x[[order[split - 1], feature_idx]];
                    let hi = x[[order[split], feature_idx]];
                    if lo == hi {
                        continue;
                    }

                    let right = total.minus(&left);
                    let weighted = (split as f64 * self.impurity(&left)
                        + (n - split) as f64 * self.impurity(&right))
                        / n as f64;
                    let gain = parent_impurity - weighted;

                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (lo + hi) / 2.0));
                    }
                }
                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        // Earliest feature wins ties
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
    }

    fn impurity(&self, stats: &SplitStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        let n = stats.count as f64;
        match self.criterion {
            Criterion::Gini => 1.0 - stats.classes.values().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -stats
                .classes
                .values()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    /// Majority class (smallest code on ties) or mean target
    fn leaf_value(&self, y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        if self.is_classification {
            let mut best = (0i64, 0usize);
            for (class, count) in class_counts(y) {
                if count > best.1 {
                    best = (class, count);
                }
            }
            best.0 as f64
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(WizardError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(WizardError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x
            .rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(sample) => predict_row(root, sample),
                None => predict_row(root, &row.to_vec()),
            })
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }
}

fn predict_row(node: &TreeNode, sample: &[f64]) -> f64 {
    let mut node = node;
    loop {
        match node {
            TreeNode::Leaf { value, .. } => return *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                node = if sample[*feature_idx] <= *threshold { left } else { right };
            }
        }
    }
}

/// Running sums for one side of a candidate split
#[derive(Debug, Clone, Default)]
struct SplitStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    classes: BTreeMap<i64, usize>,
}

impl SplitStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        for v in values {
            stats.push(v);
        }
        stats
    }

    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sq_sum += v * v;
        *self.classes.entry(v.round() as i64).or_insert(0) += 1;
    }

    fn minus(&self, other: &SplitStats) -> SplitStats {
        let mut classes = self.classes.clone();
        for (class, count) in &other.classes {
            if let Some(c) = classes.get_mut(class) {
                *c -= count;
            }
        }
        SplitStats {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sq_sum: self.sq_sum - other.sq_sum,
            classes,
        }
    }
}

fn class_counts(y: &[f64]) -> BTreeMap<i64, usize> {
    SplitStats::from_values(y.iter().copied()).classes
}

fn is_pure(y: &[f64]) -> bool {
    y.first().map_or(true, |&first| y.iter().all(|&v| (v - first).abs() < 1e-10))
}
