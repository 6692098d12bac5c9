use serde::{Deserialize, Serialize};

use super::surrogate::Prediction;

/// How predictions are turned into a score to maximize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Acquisition {
    /// Expected improvement over the best observed target, with
    /// exploration margin `xi`.
    ExpectedImprovement { xi: f64 },
    /// The predicted mean itself (density ratios, pure exploitation).
    Mean,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::ExpectedImprovement { xi: 0.03 }
    }
}

impl Acquisition {
    pub fn score(&self, prediction: &Prediction, best: f64) -> f64 {
        match *self {
            Self::ExpectedImprovement { xi } => {
                expected_improvement(prediction.mean, prediction.std, best, xi)
            }
            Self::Mean => prediction.mean,
        }
    }
}

fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Zelen & Severo polynomial approximation).
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let upper = norm_pdf(x.abs()) * poly;
    if x >= 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

/// `EI = (μ - f* - ξ) Φ(z) + σ φ(z)` with `z = (μ - f* - ξ) / σ`, for
/// maximization.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = mean - best - xi;
    if !(std > 1e-12) {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}
