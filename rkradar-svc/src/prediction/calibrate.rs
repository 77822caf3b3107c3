//! Probability calibration on a held-out slice.
//!
//! Per-class Platt scaling (a logistic fit on the model's raw class
//! probability), with isotonic regression via pool-adjacent-violators as
//! the fallback when the sigmoid fit is degenerate. Calibrated per-class
//! outputs are renormalized to a distribution.

/// Sigmoid `1 / (1 + exp(a*s + b))` fitted to binary targets by gradient
/// descent on log loss.
#[derive(Debug, Clone)]
pub struct PlattScaler {
    a: f64,
    b: f64,
}

impl PlattScaler {
    /// `None` when the slice carries a single outcome or the fit diverges.
    pub fn fit(scores: &[f64], targets: &[bool]) -> Option<Self> {
        let n = scores.len();
        let positives = targets.iter().filter(|t| **t).count();
        if n == 0 || positives == 0 || positives == n {
            return None;
        }

        // Platt's smoothed targets guard against overconfident endpoints
        let hi = (positives as f64 + 1.0) / (positives as f64 + 2.0);
        let lo = 1.0 / ((n - positives) as f64 + 2.0);

        let mut a = -1.0;
        let mut b = 0.0;
        let lr = 0.5;
        for _ in 0..200 {
            let mut grad_a = 0.0;
            let mut grad_b = 0.0;
            for (&s, &t) in scores.iter().zip(targets) {
                let target = if t { hi } else { lo };
                let p = sigmoid(a * s + b);
                let err = p - target;
                grad_a += err * s;
                grad_b += err;
            }
            a -= lr * grad_a / n as f64;
            b -= lr * grad_b / n as f64;
        }
        if !a.is_finite() || !b.is_finite() {
            return None;
        }
        Some(Self { a, b })
    }

    pub fn apply(&self, score: f64) -> f64 {
        sigmoid(self.a * score + self.b)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Monotone non-decreasing score-to-probability map fitted by
/// pool-adjacent-violators.
#[derive(Debug, Clone)]
pub struct IsotonicRegression {
    /// Sorted breakpoints: (score, calibrated value)
    points: Vec<(f64, f64)>,
}

impl IsotonicRegression {
    pub fn fit(scores: &[f64], targets: &[bool]) -> Self {
        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .zip(targets)
            .map(|(&s, &t)| (s, if t { 1.0 } else { 0.0 }))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Blocks of (score, mean value, weight) merged while out of order
        let mut blocks: Vec<(f64, f64, f64)> = Vec::with_capacity(pairs.len());
        for (score, value) in pairs {
            blocks.push((score, value, 1.0));
            while blocks.len() >= 2 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.1 <= last.1 {
                    break;
                }
                blocks.pop();
                blocks.pop();
                let weight = prev.2 + last.2;
                let value = (prev.1 * prev.2 + last.1 * last.2) / weight;
                blocks.push((last.0, value, weight));
            }
        }
        Self {
            points: blocks.into_iter().map(|(s, v, _)| (s, v)).collect(),
        }
    }

    /// Step-function lookup: the fitted value of the last breakpoint at or
    /// below the score; scores below every breakpoint clamp to the first.
    pub fn apply(&self, score: f64) -> f64 {
        let mut value = match self.points.first() {
            Some(first) => first.1,
            None => return score,
        };
        for &(s, v) in &self.points {
            if s <= score {
                value = v;
            } else {
                break;
            }
        }
        value
    }
}

#[derive(Debug, Clone)]
enum ClassCalibrator {
    Platt(PlattScaler),
    Isotonic(IsotonicRegression),
    /// Class absent from the calibration slice; probabilities pass through
    Identity,
}

impl ClassCalibrator {
    fn apply(&self, score: f64) -> f64 {
        match self {
            ClassCalibrator::Platt(p) => p.apply(score),
            ClassCalibrator::Isotonic(i) => i.apply(score),
            ClassCalibrator::Identity => score,
        }
    }
}

/// Per-class calibration over a multiclass probability vector.
#[derive(Debug, Clone)]
pub struct Calibrator {
    classes: Vec<ClassCalibrator>,
}

impl Calibrator {
    /// Fit one calibrator per class from raw probability vectors and true
    /// labels on the held-out slice.
    pub fn fit(probas: &[Vec<f64>], labels: &[usize], n_classes: usize) -> Self {
        let mut classes = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let scores: Vec<f64> = probas.iter().map(|p| p[class]).collect();
            let targets: Vec<bool> = labels.iter().map(|&l| l == class).collect();
            let calibrator = match PlattScaler::fit(&scores, &targets) {
                Some(platt) => ClassCalibrator::Platt(platt),
                None if targets.iter().any(|t| *t) => {
                    ClassCalibrator::Isotonic(IsotonicRegression::fit(&scores, &targets))
                }
                None => ClassCalibrator::Identity,
            };
            classes.push(calibrator);
        }
        Self { classes }
    }

    /// Calibrate each class probability, then renormalize.
    pub fn apply(&self, probas: &[f64]) -> Vec<f64> {
        let calibrated: Vec<f64> = probas
            .iter()
            .zip(&self.classes)
            .map(|(&p, c)| c.apply(p).clamp(0.0, 1.0))
            .collect();
        let sum: f64 = calibrated.iter().sum();
        if sum > 0.0 {
            calibrated.iter().map(|p| p / sum).collect()
        } else {
            probas.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platt_maps_overconfident_scores_down() {
        // Model says 0.9 but is right only ~60% of the time
        let scores: Vec<f64> = (0..50).map(|_| 0.9).chain((0..50).map(|_| 0.1)).collect();
        let targets: Vec<bool> = (0..50)
            .map(|i| i % 5 < 3)
            .chain((0..50).map(|i| i % 5 == 0))
            .collect();
        let platt = PlattScaler::fit(&scores, &targets).unwrap();
        let high = platt.apply(0.9);
        let low = platt.apply(0.1);
        assert!(high < 0.9);
        assert!(high > low);
    }

    #[test]
    fn platt_rejects_single_outcome_slice() {
        let scores = vec![0.2, 0.5, 0.8];
        assert!(PlattScaler::fit(&scores, &[true, true, true]).is_none());
        assert!(PlattScaler::fit(&scores, &[false, false, false]).is_none());
        assert!(PlattScaler::fit(&[], &[]).is_none());
    }

    #[test]
    fn isotonic_is_monotone() {
        let scores = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let targets = vec![false, false, true, false, true, true, false, true];
        let iso = IsotonicRegression::fit(&scores, &targets);
        let mut prev = f64::NEG_INFINITY;
        for s in [0.0, 0.15, 0.35, 0.55, 0.75, 0.95] {
            let v = iso.apply(s);
            assert!(v >= prev, "isotonic output decreased at {s}");
            prev = v;
        }
    }

    #[test]
    fn calibrated_vector_stays_a_distribution() {
        let probas: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    vec![0.7, 0.2, 0.1]
                } else {
                    vec![0.2, 0.6, 0.2]
                }
            })
            .collect();
        let labels: Vec<usize> = (0..30).map(|i| i % 2).collect();
        let calibrator = Calibrator::fit(&probas, &labels, 3);
        let out = calibrator.apply(&[0.5, 0.3, 0.2]);
        assert_eq!(out.len(), 3);
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
