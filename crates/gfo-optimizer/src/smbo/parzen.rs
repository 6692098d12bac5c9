//! Parzen density-ratio surrogate used by the tree-structured Parzen
//! strategy.

use gfo_types::{surrogate_error, GfoResult};

use super::surrogate::{check_training, Prediction, Standardizer, Surrogate};

/// Smallest kernel bandwidth on standardized features.
const MIN_BANDWIDTH: f64 = 0.05;

/// Gaussian kernel density over standardized rows with a Scott's-rule
/// bandwidth per column.
#[derive(Debug, Clone, Default)]
struct Kde {
    rows: Vec<Vec<f64>>,
    bandwidth: Vec<f64>,
}

impl Kde {
    fn fit(rows: Vec<Vec<f64>>) -> Self {
        let n = rows.len();
        let d = rows.first().map_or(0, Vec::len);
        let factor = (n.max(1) as f64).powf(-1.0 / (d as f64 + 4.0));
        let bandwidth = (0..d)
            .map(|j| {
                let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n.max(1) as f64;
                let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n.max(1) as f64;
                (var.sqrt() * factor).max(MIN_BANDWIDTH)
            })
            .collect();
        Self { rows, bandwidth }
    }

    /// `log p(x)` up to a constant shared by every `Kde` of the same
    /// dimensionality.
    fn log_density(&self, x: &[f64]) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let log_norm: f64 = self.bandwidth.iter().map(|h| h.ln()).sum();
        let terms: Vec<f64> = self
            .rows
            .iter()
            .map(|r| {
                -0.5 * r
                    .iter()
                    .zip(x)
                    .zip(&self.bandwidth)
                    .map(|((a, b), h)| ((a - b) / h).powi(2))
                    .sum::<f64>()
            })
            .collect();
        let peak = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = terms.iter().map(|t| (t - peak).exp()).sum();
        peak + sum.ln() - (self.rows.len() as f64).ln() - log_norm
    }
}

/// Splits the observations into the best `gamma` fraction and the rest and
/// predicts `log l(x) - log g(x)`. The ratio carries no uncertainty, so it
/// is paired with the mean acquisition.
#[derive(Debug, Clone)]
pub struct ParzenEstimator {
    gamma: f64,
    scaler: Standardizer,
    good: Kde,
    bad: Kde,
    fitted: bool,
}

impl ParzenEstimator {
    pub fn new(gamma: f64) -> Self {
        Self {
            gamma: gamma.clamp(f64::EPSILON, 1.0),
            scaler: Standardizer::default(),
            good: Kde::default(),
            bad: Kde::default(),
            fitted: false,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Default for ParzenEstimator {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl Surrogate for ParzenEstimator {
    fn name(&self) -> &str {
        "parzen_estimator"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()> {
        check_training(features, targets)?;
        let n = targets.len();
        let n_good = ((self.gamma * n as f64).ceil() as usize).clamp(1, n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            targets[b]
                .partial_cmp(&targets[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.scaler = Standardizer::fit(features);
        let rows = |idx: &[usize]| -> Vec<Vec<f64>> {
            idx.iter().map(|&i| self.scaler.transform(&features[i])).collect()
        };
        let (good, bad) = order.split_at(n_good);
        self.good = Kde::fit(rows(good));
        self.bad = Kde::fit(rows(bad));
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>> {
        if !self.fitted {
            return Err(surrogate_error!("parzen estimator used before fit"));
        }
        Ok(features
            .iter()
            .map(|x| {
                let x = self.scaler.transform(x);
                Prediction {
                    mean: self.good.log_density(&x) - self.bad.log_density(&x),
                    std: 0.0,
                }
            })
            .collect())
    }
}
