//! Multinomial logistic regression trained by batch gradient descent.
//!
//! Small feature count and a few thousand training rows make full-batch
//! descent with L2 regularization entirely adequate here. Class weights are
//! balanced so the dominant FOR class does not drown out the others.

use super::features::FEATURE_NAMES;

const EPOCHS: usize = 300;
const LEARNING_RATE: f64 = 0.1;
const L2: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    /// weights[class][feature]
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
    n_classes: usize,
    n_features: usize,
}

impl SoftmaxRegression {
    /// Fit on rows `x` with class labels `y` in `0..n_classes`.
    pub fn fit(x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Self {
        let n_features = x.first().map(|row| row.len()).unwrap_or(0);
        let n = x.len();
        let class_weights = balanced_class_weights(y, n_classes);

        let mut model = Self {
            weights: vec![vec![0.0; n_features]; n_classes],
            biases: vec![0.0; n_classes],
            n_classes,
            n_features,
        };
        if n == 0 || n_features == 0 {
            return model;
        }

        let mut grad_w = vec![vec![0.0; n_features]; n_classes];
        let mut grad_b = vec![0.0; n_classes];

        for _ in 0..EPOCHS {
            for row in grad_w.iter_mut() {
                row.iter_mut().for_each(|g| *g = 0.0);
            }
            grad_b.iter_mut().for_each(|g| *g = 0.0);

            let mut weight_total = 0.0;
            for (row, &label) in x.iter().zip(y) {
                let probs = model.predict_proba(row);
                let sample_weight = class_weights[label];
                weight_total += sample_weight;
                for class in 0..n_classes {
                    let target = if class == label { 1.0 } else { 0.0 };
                    let err = (probs[class] - target) * sample_weight;
                    for (g, &value) in grad_w[class].iter_mut().zip(row) {
                        *g += err * value;
                    }
                    grad_b[class] += err;
                }
            }

            if weight_total == 0.0 {
                break;
            }
            for class in 0..n_classes {
                for feature in 0..n_features {
                    let grad = grad_w[class][feature] / weight_total
                        + L2 * model.weights[class][feature];
                    model.weights[class][feature] -= LEARNING_RATE * grad;
                }
                model.biases[class] -= LEARNING_RATE * grad_b[class] / weight_total;
            }
        }
        model
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = (0..self.n_classes)
            .map(|class| {
                self.biases[class]
                    + self.weights[class]
                        .iter()
                        .zip(row)
                        .map(|(w, v)| w * v)
                        .sum::<f64>()
            })
            .collect();
        softmax(&scores)
    }

    /// Mean absolute weight per feature, normalized to sum to 1.
    pub fn importances(&self) -> Vec<(String, f64)> {
        let mut raw = vec![0.0; self.n_features];
        for class_weights in &self.weights {
            for (acc, w) in raw.iter_mut().zip(class_weights) {
                *acc += w.abs();
            }
        }
        normalize_importances(&raw)
    }
}

/// Inverse-frequency class weights: a class seen half as often counts
/// twice as much per sample. Unseen classes get weight 0.
pub fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count();
    if present == 0 {
        return vec![0.0; n_classes];
    }
    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                0.0
            } else {
                y.len() as f64 / (present as f64 * c as f64)
            }
        })
        .collect()
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

pub(super) fn normalize_importances(raw: &[f64]) -> Vec<(String, f64)> {
    let total: f64 = raw.iter().sum();
    FEATURE_NAMES
        .iter()
        .zip(raw)
        .map(|(name, value)| {
            let share = if total > 0.0 { value / total } else { 0.0 };
            ((*name).to_string(), share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        // Class 0 clusters high on the first feature, class 1 low
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let jitter = (i % 5) as f64 * 0.02;
            x.push(vec![0.9 - jitter, 0.1 + jitter]);
            y.push(0);
            x.push(vec![0.1 + jitter, 0.9 - jitter]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn learns_linearly_separable_classes() {
        let (x, y) = separable_data();
        let model = SoftmaxRegression::fit(&x, &y, 2);
        assert_eq!(model.predict(&[0.95, 0.05]), 0);
        assert_eq!(model.predict(&[0.05, 0.95]), 1);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (x, y) = separable_data();
        let model = SoftmaxRegression::fit(&x, &y, 3);
        let probs = model.predict_proba(&[0.5, 0.5]);
        assert_eq!(probs.len(), 3);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probs.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn balanced_weights_invert_frequency() {
        let y = vec![0, 0, 0, 1];
        let w = balanced_class_weights(&y, 3);
        // 4 samples, 2 classes present: 4/(2*3) and 4/(2*1)
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-9);
        assert!((w[1] - 2.0).abs() < 1e-9);
        assert_eq!(w[2], 0.0);
    }

    #[test]
    fn empty_training_set_is_inert() {
        let model = SoftmaxRegression::fit(&[], &[], 3);
        assert_eq!(model.predict_proba(&[]).len(), 3);
    }

    #[test]
    fn importances_cover_all_features() {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_NAMES.len()];
                row[0] = if i % 2 == 0 { 1.0 } else { 0.0 };
                row
            })
            .collect();
        let y: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let model = SoftmaxRegression::fit(&x, &y, 2);
        let imp = model.importances();
        assert_eq!(imp.len(), FEATURE_NAMES.len());
        // The only informative feature dominates
        assert!(imp[0].1 > 0.5);
    }
}
