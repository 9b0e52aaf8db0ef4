//! Evaluation metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Fraction of exact matches between class codes
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Root mean squared error
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mse = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64;
    mse.sqrt()
}

/// Coefficient of determination; undefined when the targets have zero variance
pub fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Option<f64> {
    let mean = y_true.mean()?;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Precision, recall and F1 for one class (or an average)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class breakdown with macro and weighted averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Build the report for class codes `0..labels.len()`.
    /// Undefined ratios (no predictions, no support) count as zero.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, labels: &[String]) -> Self {
        let k = labels.len();
        let mut tp = vec![0usize; k];
        let mut predicted = vec![0usize; k];
        let mut support = vec![0usize; k];

        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let (t, p) = (t.round() as usize, p.round() as usize);
            if t < k {
                support[t] += 1;
            }
            if p < k {
                predicted[p] += 1;
            }
            if t == p && t < k {
                tp[t] += 1;
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let classes: Vec<ClassMetrics> = (0..k)
            .map(|c| {
                let precision = ratio(tp[c], predicted[c]);
                let recall = ratio(tp[c], support[c]);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: labels[c].clone(),
                    precision,
                    recall,
                    f1_score,
                    support: support[c],
                }
            })
            .collect();

        let total: usize = support.iter().sum();
        let average = |label: &str, weight: &dyn Fn(&ClassMetrics) -> f64, norm: f64| ClassMetrics {
            label: label.to_string(),
            precision: classes.iter().map(|m| weight(m) * m.precision).sum::<f64>() / norm,
            recall: classes.iter().map(|m| weight(m) * m.recall).sum::<f64>() / norm,
            f1_score: classes.iter().map(|m| weight(m) * m.f1_score).sum::<f64>() / norm,
            support: total,
        };
        let macro_avg = average("macro avg", &|_| 1.0, k.max(1) as f64);
        let weighted_avg = average("weighted avg", &|m| m.support as f64, total.max(1) as f64);

        Self {
            accuracy: accuracy(y_true, y_pred),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.0, 2.0, 3.0, 6.0];
        assert_eq!(rmse(&y_true, &y_pred), 1.0);
        assert!((r2(&y_true, &y_pred).unwrap() - (1.0 - 4.0 / 5.0)).abs() < 1e-12);
        assert_eq!(r2(&array![2.0, 2.0], &array![1.0, 3.0]), None);
    }

    #[test]
    fn test_classification_report() {
        let y_true = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0, 0.0];
        let labels = vec!["no".to_string(), "yes".to_string()];
        let report = ClassificationReport::compute(&y_true, &y_pred, &labels);

        assert_eq!(report.accuracy, 0.6);
        let no = &report.classes[0];
        assert_eq!((no.precision, no.recall, no.support), (0.5, 0.5, 2));
        let yes = &report.classes[1];
        assert!((yes.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((yes.recall - 2.0 / 3.0).abs() < 1e-12);

        assert!((report.macro_avg.recall - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((report.weighted_avg.recall - 0.6).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 5);
    }

    #[test]
    fn test_class_never_predicted_scores_zero() {
        let report = ClassificationReport::compute(
            &array![0.0, 1.0],
            &array![0.0, 0.0],
            &["a".to_string(), "b".to_string()],
        );
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1_score, 0.0);
    }
}
