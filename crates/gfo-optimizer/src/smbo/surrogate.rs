//! Surrogate models: the trait plus the non-GP regressors.

use gfo_types::{surrogate_error, GfoResult};

/// Predicted mean and standard deviation at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub mean: f64,
    pub std: f64,
}

/// A regression model over feature vectors. Targets follow the internal
/// convention: higher is better.
pub trait Surrogate: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()>;

    fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>>;
}

/// Per-column mean and scale, used to put features on a common footing.
#[derive(Debug, Clone, Default)]
pub(crate) struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n = rows.len().max(1) as f64;
        let d = rows.first().map_or(0, Vec::len);
        let mean: Vec<f64> = (0..d)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let scale = (0..d)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - mean[j]).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 1e-12 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// Non-empty, aligned and finite.
pub(crate) fn check_training(features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()> {
    if features.is_empty() {
        return Err(surrogate_error!("cannot fit on an empty training set"));
    }
    if features.len() != targets.len() {
        return Err(surrogate_error!(
            "{} feature rows but {} targets",
            features.len(),
            targets.len()
        ));
    }
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(surrogate_error!("training targets must be finite"));
    }
    Ok(())
}

// ---- k-nearest neighbours ----

/// Mean of the `k` nearest training targets; their spread is the
/// uncertainty.
#[derive(Debug, Clone)]
pub struct KNeighborsRegressor {
    k: usize,
    scaler: Standardizer,
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KNeighborsRegressor {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            scaler: Standardizer::default(),
            rows: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Default for KNeighborsRegressor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Surrogate for KNeighborsRegressor {
    fn name(&self) -> &str {
        "k_neighbors"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()> {
        check_training(features, targets)?;
        self.scaler = Standardizer::fit(features);
        self.rows = features.iter().map(|r| self.scaler.transform(r)).collect();
        self.targets = targets.to_vec();
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>> {
        if self.rows.is_empty() {
            return Err(surrogate_error!("k-neighbours model used before fit"));
        }
        let k = self.k.min(self.rows.len());
        Ok(features
            .iter()
            .map(|x| {
                let x = self.scaler.transform(x);
                let mut dist: Vec<(f64, f64)> = self
                    .rows
                    .iter()
                    .zip(&self.targets)
                    .map(|(r, &t)| {
                        let d2: f64 = r.iter().zip(&x).map(|(a, b)| (a - b).powi(2)).sum();
                        (d2, t)
                    })
                    .collect();
                dist.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                let nearest: Vec<f64> = dist.iter().take(k).map(|(_, t)| *t).collect();
                let mean = nearest.iter().sum::<f64>() / k as f64;
                let var = nearest.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / k as f64;
                Prediction {
                    mean,
                    std: var.sqrt(),
                }
            })
            .collect())
    }
}

// ---- Ensemble ----

/// Averages member predictions; the disagreement between members is the
/// uncertainty.
pub struct EnsembleRegressor {
    members: Vec<Box<dyn Surrogate>>,
}

impl EnsembleRegressor {
    pub fn new(members: Vec<Box<dyn Surrogate>>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl std::fmt::Debug for EnsembleRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleRegressor")
            .field("members", &self.members.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Surrogate for EnsembleRegressor {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> GfoResult<()> {
        if self.members.is_empty() {
            return Err(surrogate_error!("ensemble has no members"));
        }
        for member in &mut self.members {
            member.fit(features, targets)?;
        }
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> GfoResult<Vec<Prediction>> {
        let per_member = self
            .members
            .iter()
            .map(|m| m.predict(features))
            .collect::<GfoResult<Vec<_>>>()?;
        let m = per_member.len() as f64;
        Ok((0..features.len())
            .map(|i| {
                let means: Vec<f64> = per_member.iter().map(|p| p[i].mean).collect();
                let mean = means.iter().sum::<f64>() / m;
                let spread = means.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / m;
                Prediction {
                    mean,
                    std: spread.sqrt(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn line() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        (x, y)
    }

    #[test]
    fn knn_interpolates_locally() {
        let (x, y) = line();
        let mut knn = KNeighborsRegressor::new(1);
        knn.fit(&x, &y).unwrap();
        let p = knn.predict(&[vec![4.1]]).unwrap();
        assert_abs_diff_eq!(p[0].mean, 8.0);
        assert_abs_diff_eq!(p[0].std, 0.0);
    }

    #[test]
    fn knn_spread_reflects_neighbour_disagreement() {
        let (x, y) = line();
        let mut knn = KNeighborsRegressor::new(3);
        knn.fit(&x, &y).unwrap();
        let p = knn.predict(&[vec![5.0]]).unwrap();
        assert_abs_diff_eq!(p[0].mean, 10.0);
        assert!(p[0].std > 0.0);
    }

    #[test]
    fn fit_rejects_bad_training_sets() {
        let mut knn = KNeighborsRegressor::default();
        assert!(knn.fit(&[], &[]).is_err());
        assert!(knn.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(knn.fit(&[vec![1.0]], &[f64::NEG_INFINITY]).is_err());
        assert!(knn.predict(&[vec![0.0]]).unwrap_err().is_recoverable());
    }

    #[test]
    fn ensemble_averages_members() {
        let (x, y) = line();
        let mut ensemble = EnsembleRegressor::new(vec![
            Box::new(KNeighborsRegressor::new(1)),
            Box::new(KNeighborsRegressor::new(3)),
        ]);
        ensemble.fit(&x, &y).unwrap();
        let p = ensemble.predict(&[vec![0.0]]).unwrap();
        // k=1 predicts 0, k=3 predicts mean(0, 2, 4) = 2.
        assert_abs_diff_eq!(p[0].mean, 1.0);
        assert_abs_diff_eq!(p[0].std, 1.0);
    }

    #[test]
    fn empty_ensemble_fails_to_fit() {
        let mut ensemble = EnsembleRegressor::new(Vec::new());
        assert!(ensemble.fit(&[vec![0.0]], &[0.0]).is_err());
    }
}
