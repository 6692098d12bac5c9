//! Gaussian-process regression with an RBF kernel.

use nalgebra::{linalg::Cholesky, DMatrix, DVector, Dyn};

use gfo_types::{surrogate_error, GfoResult};

use super::surrogate::{check_training, Prediction, Standardizer, Surrogate};

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-0.5 * d2 / (length_scale * length_scale)).exp()
}

#[derive(Debug, Clone)]
struct Fitted {
    scaler: Standardizer,
    rows: Vec<Vec<f64>>,
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    y_mean: f64,
    y_std: f64,
}

/// GP regressor on standardized features and targets.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scale: f64,
    noise: f64,
    fitted: Option<Fitted>,
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            noise: 1e-6,
            fitted: None,
        }
    }
}

impl GaussianProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_length_scale(mut self, length_scale: f64) -> Self {
        self.length_scale = length_scale;
        self
    }

    /// Diagonal noise added to the kernel matrix.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }
}

impl Surrogate for GaussianProcess {
    fn name(&self) -> &str {
        "gaussian_process"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()> {
        check_training(features, targets)?;
        if !(self.length_scale > 0.0) {
            return Err(surrogate_error!("length scale must be positive"));
        }
        let n = targets.len();
        let scaler = Standardizer::fit(features);
        let rows: Vec<Vec<f64>> = features.iter().map(|r| scaler.transform(r)).collect();

        let y_mean = targets.iter().sum::<f64>() / n as f64;
        let y_var = targets.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if y_var.sqrt() > 1e-12 { y_var.sqrt() } else { 1.0 };
        let y = DVector::from_iterator(n, targets.iter().map(|t| (t - y_mean) / y_std));

        let k = DMatrix::from_fn(n, n, |i, j| {
            let v = rbf(&rows[i], &rows[j], self.length_scale);
            if i == j {
                v + self.noise
            } else {
                v
            }
        });
        let cholesky = Cholesky::new(k)
            .ok_or_else(|| surrogate_error!("kernel matrix is not positive definite"))?;
        let alpha = cholesky.solve(&y);

        self.fitted = Some(Fitted {
            scaler,
            rows,
            cholesky,
            alpha,
            y_mean,
            y_std,
        });
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| surrogate_error!("gaussian process used before fit"))?;
        Ok(features
            .iter()
            .map(|x| {
                let x = fitted.scaler.transform(x);
                let k_star = DVector::from_iterator(
                    fitted.rows.len(),
                    fitted.rows.iter().map(|r| rbf(r, &x, self.length_scale)),
                );
                let mean = k_star.dot(&fitted.alpha);
                let v = fitted.cholesky.solve(&k_star);
                let var = (1.0 - k_star.dot(&v)).max(0.0);
                Prediction {
                    mean: mean * fitted.y_std + fitted.y_mean,
                    std: var.sqrt() * fitted.y_std,
                }
            })
            .collect())
    }
}
