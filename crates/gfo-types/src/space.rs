//! Discretized search space definitions.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{GfoError, GfoResult};
use crate::invalid_space;
use crate::position::Position;
use crate::value::{ParamValue, Parameters};

/// Default number of points used to discretize a continuous range.
pub const DEFAULT_RESOLUTION: usize = 100;

/// Most values a generated range may expand to.
pub const MAX_DIMENSION_SIZE: usize = 10_000_000;

/// A single dimension definition, as found in run configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDef {
    /// Human-readable dimension name (e.g. "learning_rate").
    pub name: String,
    /// How the ordered values of the dimension are produced.
    pub kind: DimensionKind,
}

/// Describes how a dimension's candidate values are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    /// Integers `low..=high` in increments of `step`.
    IntRange {
        low: i64,
        high: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    /// Continuous range `[low, high]` discretized into `resolution` points.
    FloatRange {
        low: f64,
        high: f64,
        #[serde(default = "default_resolution")]
        resolution: usize,
    },
    /// Explicit ordered numeric values.
    Values { values: Vec<f64> },
    /// Unordered labels.
    Categorical { values: Vec<serde_json::Value> },
}

fn default_step() -> i64 {
    1
}

fn default_resolution() -> usize {
    DEFAULT_RESOLUTION
}

/// One discretized axis of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDimension")]
pub struct Dimension {
    name: String,
    values: Vec<ParamValue>,
    categorical: bool,
}

/// Unchecked wire form of [`Dimension`].
#[derive(Deserialize)]
struct RawDimension {
    name: String,
    values: Vec<ParamValue>,
    #[serde(default)]
    categorical: bool,
}

impl TryFrom<RawDimension> for Dimension {
    type Error = GfoError;

    fn try_from(raw: RawDimension) -> GfoResult<Self> {
        let mut dim = Self::new(raw.name, raw.values)?;
        dim.categorical |= raw.categorical;
        Ok(dim)
    }
}

impl Dimension {
    /// Build a dimension from explicit values.
    ///
    /// Fails with [`GfoError::InvalidSearchSpace`] when `values` is empty.
    pub fn new(name: impl Into<String>, values: Vec<ParamValue>) -> GfoResult<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(invalid_space!("dimension '{name}' has no values"));
        }
        if let Some(bad) = values
            .iter()
            .filter_map(ParamValue::as_f64)
            .find(|v| !v.is_finite())
        {
            return Err(invalid_space!("dimension '{name}' contains non-finite value {bad}"));
        }
        let categorical = values.iter().any(|v| !v.is_numeric());
        Ok(Self {
            name,
            values,
            categorical,
        })
    }

    pub fn int_range(name: impl Into<String>, low: i64, high: i64, step: i64) -> GfoResult<Self> {
        let name = name.into();
        if step <= 0 {
            return Err(invalid_space!("dimension '{name}' has non-positive step {step}"));
        }
        let count = (i128::from(high) - i128::from(low)) / i128::from(step) + 1;
        if count > MAX_DIMENSION_SIZE as i128 {
            return Err(invalid_space!(
                "dimension '{name}' expands to {count} values, above the limit of {MAX_DIMENSION_SIZE}"
            ));
        }
        let values = (low..=high)
            .step_by(step as usize)
            .map(ParamValue::Int)
            .collect();
        Self::new(name, values)
    }

    pub fn float_range(
        name: impl Into<String>,
        low: f64,
        high: f64,
        resolution: usize,
    ) -> GfoResult<Self> {
        let name = name.into();
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(invalid_space!(
                "dimension '{name}' has invalid bounds [{low}, {high}]"
            ));
        }
        if resolution == 0 {
            return Err(invalid_space!("dimension '{name}' has zero resolution"));
        }
        if resolution > MAX_DIMENSION_SIZE {
            return Err(invalid_space!(
                "dimension '{name}' resolution {resolution} is above the limit of {MAX_DIMENSION_SIZE}"
            ));
        }
        let values = if resolution == 1 || low == high {
            vec![ParamValue::Float(low)]
        } else {
            (0..resolution)
                .map(|i| {
                    let t = i as f64 / (resolution - 1) as f64;
                    ParamValue::Float(low + t * (high - low))
                })
                .collect()
        };
        Self::new(name, values)
    }

    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> GfoResult<Self> {
        Self::new(name, values.into_iter().map(ParamValue::Float).collect())
    }

    pub fn categorical(name: impl Into<String>, values: Vec<serde_json::Value>) -> GfoResult<Self> {
        let mut dim = Self::new(name, values.into_iter().map(ParamValue::Json).collect())?;
        dim.categorical = true;
        Ok(dim)
    }

    pub fn from_def(def: &DimensionDef) -> GfoResult<Self> {
        match &def.kind {
            DimensionKind::IntRange { low, high, step } => {
                Self::int_range(def.name.clone(), *low, *high, *step)
            }
            DimensionKind::FloatRange {
                low,
                high,
                resolution,
            } => Self::float_range(def.name.clone(), *low, *high, *resolution),
            DimensionKind::Values { values } => Self::numeric(def.name.clone(), values.clone()),
            DimensionKind::Categorical { values } => {
                Self::categorical(def.name.clone(), values.clone())
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; construction rejects empty dimensions.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    /// Numeric feature for surrogate models: the value itself, or the index
    /// for categorical labels.
    pub fn feature(&self, index: usize) -> f64 {
        if self.categorical {
            return index as f64;
        }
        self.values
            .get(index)
            .and_then(ParamValue::as_f64)
            .unwrap_or(index as f64)
    }

    /// Index of the slot closest to `value` (exact match for categoricals).
    pub fn nearest_index(&self, value: &ParamValue) -> Option<usize> {
        if self.categorical {
            return self.values.iter().position(|v| v == value);
        }
        let target = value.as_f64()?;
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_f64().map(|x| (i, (x - target).abs())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

/// Shape of the random step used by climbing moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDistribution {
    #[default]
    Normal,
    Laplace,
    Logistic,
}

impl StepDistribution {
    /// Draw a zero-centred step with the given scale.
    pub fn sample<R: Rng + ?Sized>(&self, scale: f64, rng: &mut R) -> f64 {
        match self {
            Self::Normal => {
                let z: f64 = rng.sample(StandardNormal);
                z * scale
            }
            Self::Laplace => {
                let u: f64 = rng.gen::<f64>() - 0.5;
                let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
                -scale * u.signum() * tail.ln()
            }
            Self::Logistic => {
                let u: f64 = rng.gen::<f64>().clamp(1e-12, 1.0 - 1e-12);
                scale * (u / (1.0 - u)).ln()
            }
        }
    }
}

/// The full search space: an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSearchSpace")]
pub struct SearchSpace {
    dimensions: Vec<Dimension>,
}

#[derive(Deserialize)]
struct RawSearchSpace {
    dimensions: Vec<Dimension>,
}

impl TryFrom<RawSearchSpace> for SearchSpace {
    type Error = GfoError;

    fn try_from(raw: RawSearchSpace) -> GfoResult<Self> {
        Self::new(raw.dimensions)
    }
}

impl SearchSpace {
    /// Validates that there is at least one dimension and names are unique.
    pub fn new(dimensions: Vec<Dimension>) -> GfoResult<Self> {
        if dimensions.is_empty() {
            return Err(invalid_space!("search space has no dimensions"));
        }
        let mut seen = HashSet::new();
        for dim in &dimensions {
            if !seen.insert(dim.name()) {
                return Err(invalid_space!("duplicate dimension name '{}'", dim.name()));
            }
        }
        Ok(Self { dimensions })
    }

    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    pub fn from_defs(defs: &[DimensionDef]) -> GfoResult<Self> {
        let dimensions = defs
            .iter()
            .map(Dimension::from_def)
            .collect::<GfoResult<Vec<_>>>()?;
        Self::new(dimensions)
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, dim: usize) -> Option<&Dimension> {
        self.dimensions.get(dim)
    }

    /// Number of slots in dimension `dim`.
    ///
    /// # Panics
    /// When `dim >= dimension_count()`.
    pub fn size_of(&self, dim: usize) -> usize {
        self.dimensions[dim].len()
    }

    pub fn value_at(&self, dim: usize, index: usize) -> Option<&ParamValue> {
        self.dimensions.get(dim).and_then(|d| d.value(index))
    }

    /// Total number of positions (`None` on overflow).
    pub fn size(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len()))
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.len() == self.dimensions.len()
            && position
                .iter()
                .zip(self.dimensions.iter())
                .all(|(&i, d)| i < d.len())
    }

    /// Round and clamp a float coordinate vector into a valid position.
    pub fn clamp(&self, coords: &[f64]) -> Position {
        let indices = coords
            .iter()
            .zip(self.dimensions.iter())
            .map(|(&c, d)| {
                let max = (d.len() - 1) as f64;
                let c = if c.is_finite() { c.round() } else { 0.0 };
                c.clamp(0.0, max) as usize
            })
            .collect();
        Position::new(indices)
    }

    /// Uniform sample over the Cartesian product.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let indices = self
            .dimensions
            .iter()
            .map(|d| rng.gen_range(0..d.len()))
            .collect();
        Position::new(indices)
    }

    /// Perturb each coordinate by a step scaled with `epsilon` and the
    /// dimension's extent, then clamp into range.
    pub fn neighbor<R: Rng + ?Sized>(
        &self,
        position: &Position,
        epsilon: f64,
        distribution: StepDistribution,
        rng: &mut R,
    ) -> Position {
        let coords: Vec<f64> = position
            .iter()
            .zip(self.dimensions.iter())
            .map(|(&i, d)| {
                let scale = (d.len() - 1) as f64 * epsilon;
                i as f64 + distribution.sample(scale, rng)
            })
            .collect();
        self.clamp(&coords)
    }

    /// Resolve a position into dimension values.
    pub fn parameters(&self, position: &Position) -> Parameters {
        position
            .iter()
            .zip(self.dimensions.iter())
            .filter_map(|(&i, d)| d.value(i).map(|v| (d.name().to_string(), v.clone())))
            .collect()
    }

    /// Map values back to the nearest position (used for warm starts).
    pub fn position_of(&self, params: &Parameters) -> GfoResult<Position> {
        let indices = self
            .dimensions
            .iter()
            .map(|d| {
                let value = params.get(d.name()).ok_or_else(|| {
                    invalid_space!("warm start is missing dimension '{}'", d.name())
                })?;
                d.nearest_index(value).ok_or_else(|| {
                    invalid_space!("value {value} is not part of dimension '{}'", d.name())
                })
            })
            .collect::<GfoResult<Vec<_>>>()?;
        Ok(Position::new(indices))
    }

    /// Value-space feature vector used by surrogate models.
    pub fn features(&self, position: &Position) -> Vec<f64> {
        position
            .iter()
            .zip(self.dimensions.iter())
            .map(|(&i, d)| d.feature(i))
            .collect()
    }

    /// Up to `n` positions spread evenly over a regular grid.
    pub fn grid_positions(&self, n: usize) -> Vec<Position> {
        if n == 0 {
            return Vec::new();
        }
        let d = self.dimensions.len() as f64;
        let per_dim = (n as f64).powf(1.0 / d).ceil().max(1.0) as usize;
        let axes: Vec<Vec<usize>> = self
            .dimensions
            .iter()
            .map(|dim| {
                let k = per_dim.min(dim.len());
                if k <= 1 {
                    vec![(dim.len() - 1) / 2]
                } else {
                    (0..k).map(|j| j * (dim.len() - 1) / (k - 1)).collect()
                }
            })
            .collect();

        let mut positions = Vec::with_capacity(n);
        let mut counter = vec![0usize; axes.len()];
        'outer: loop {
            positions.push(Position::new(
                counter.iter().zip(axes.iter()).map(|(&c, a)| a[c]).collect(),
            ));
            if positions.len() >= n {
                break;
            }
            for (slot, axis) in counter.iter_mut().zip(axes.iter()) {
                *slot += 1;
                if *slot < axis.len() {
                    continue 'outer;
                }
                *slot = 0;
            }
            break;
        }
        positions
    }

    /// Up to `n` corners of the index hypercube.
    pub fn vertex_positions(&self, n: usize) -> Vec<Position> {
        let dims = self.dimensions.len();
        let corners = if dims >= usize::BITS as usize {
            usize::MAX
        } else {
            1usize << dims
        };
        (0..n.min(corners))
            .map(|mask| {
                let indices = self
                    .dimensions
                    .iter()
                    .enumerate()
                    .map(|(k, d)| {
                        if k < usize::BITS as usize && (mask >> k) & 1 == 1 {
                            d.len() - 1
                        } else {
                            0
                        }
                    })
                    .collect();
                Position::new(indices)
            })
            .collect()
    }

    /// Every position in the space, or `None` when there are more than `limit`.
    pub fn enumerate(&self, limit: usize) -> Option<Vec<Position>> {
        let total = self.size()?;
        if total > limit {
            return None;
        }
        let mut positions = Vec::with_capacity(total);
        let mut counter = vec![0usize; self.dimensions.len()];
        'outer: loop {
            positions.push(Position::new(counter.clone()));
            for (slot, dim) in counter.iter_mut().zip(self.dimensions.iter()) {
                *slot += 1;
                if *slot < dim.len() {
                    continue 'outer;
                }
                *slot = 0;
            }
            break;
        }
        Some(positions)
    }
}

/// Incremental construction of a [`SearchSpace`]; errors surface in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct SearchSpaceBuilder {
    dimensions: Vec<GfoResult<Dimension>>,
}

impl SearchSpaceBuilder {
    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.dimensions.push(Dimension::int_range(name, low, high, 1));
        self
    }

    pub fn add_int_step(mut self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        self.dimensions.push(Dimension::int_range(name, low, high, step));
        self
    }

    pub fn add_float(
        mut self,
        name: impl Into<String>,
        low: f64,
        high: f64,
        resolution: usize,
    ) -> Self {
        self.dimensions
            .push(Dimension::float_range(name, low, high, resolution));
        self
    }

    pub fn add_values(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.dimensions.push(Dimension::numeric(name, values));
        self
    }

    pub fn add_categorical(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.dimensions.push(Dimension::categorical(name, values));
        self
    }

    pub fn add_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(Ok(dimension));
        self
    }

    pub fn build(self) -> GfoResult<SearchSpace> {
        let dimensions = self
            .dimensions
            .into_iter()
            .collect::<Result<Vec<_>, GfoError>>()?;
        SearchSpace::new(dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_space() -> SearchSpace {
        SearchSpace::builder()
            .add_int("x", -1, 6)
            .add_float("y", -5.0, 5.0, 11)
            .add_categorical(
                "kernel",
                vec![
                    serde_json::json!("linear"),
                    serde_json::json!("rbf"),
                    serde_json::json!("poly"),
                ],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn mixed_dimensions_share_index_interface() {
        let space = sample_space();
        assert_eq!(space.dimension_count(), 3);
        assert_eq!(space.size_of(0), 8);
        assert_eq!(space.size_of(1), 11);
        assert_eq!(space.size_of(2), 3);
        assert_eq!(space.value_at(0, 0), Some(&ParamValue::Int(-1)));
        assert_eq!(space.value_at(1, 5), Some(&ParamValue::Float(0.0)));
        assert_eq!(space.value_at(2, 1), Some(&ParamValue::from("rbf")));
        assert_eq!(space.value_at(2, 3), None);
        assert_eq!(space.size(), Some(8 * 11 * 3));
        assert!(space.dimension(2).unwrap().is_categorical());
    }

    #[test]
    fn empty_dimension_is_rejected() {
        let err = Dimension::new("empty", Vec::new()).unwrap_err();
        assert!(matches!(err, GfoError::InvalidSearchSpace { .. }));

        let err = SearchSpace::builder()
            .add_int("x", 0, 3)
            .add_values("nothing", Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, GfoError::InvalidSearchSpace { .. }));

        assert!(Dimension::int_range("backwards", 5, 1, 1).is_err());
        assert!(SearchSpace::new(Vec::new()).is_err());
    }

    #[test]
    fn oversized_ranges_are_rejected() {
        let err = Dimension::int_range("huge", i64::MIN, i64::MAX, 1).unwrap_err();
        assert!(matches!(err, GfoError::InvalidSearchSpace { .. }));
        assert!(Dimension::int_range("strided", i64::MIN, i64::MAX, i64::MAX).is_ok());
        assert!(Dimension::float_range("fine", 0.0, 1.0, MAX_DIMENSION_SIZE + 1).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let space = sample_space();
        let json = serde_json::to_string(&space).unwrap();
        let back: SearchSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, space);
        assert!(back.dimension(2).unwrap().is_categorical());

        let empty = r#"{"name": "x", "values": [], "categorical": false}"#;
        assert!(serde_json::from_str::<Dimension>(empty).is_err());
        let duplicate = r#"{"dimensions": [
            {"name": "x", "values": [1, 2]},
            {"name": "x", "values": [3]}
        ]}"#;
        assert!(serde_json::from_str::<SearchSpace>(duplicate).is_err());
        assert!(serde_json::from_str::<SearchSpace>(r#"{"dimensions": []}"#).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = SearchSpace::builder()
            .add_int("x", 0, 3)
            .add_int("x", 0, 5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn random_positions_stay_in_range() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            assert!(space.contains(&space.random_position(&mut rng)));
        }
    }

    #[test]
    fn neighbors_are_clamped() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let corner = Position::new(vec![7, 10, 2]);
        for dist in [
            StepDistribution::Normal,
            StepDistribution::Laplace,
            StepDistribution::Logistic,
        ] {
            for _ in 0..200 {
                let n = space.neighbor(&corner, 0.5, dist, &mut rng);
                assert!(space.contains(&n), "{n} escaped with {dist:?}");
            }
        }
    }

    #[test]
    fn zero_epsilon_does_not_move() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let pos = Position::new(vec![3, 4, 1]);
        assert_eq!(space.neighbor(&pos, 0.0, StepDistribution::Normal, &mut rng), pos);
    }

    #[test]
    fn parameters_round_trip_through_position_of() {
        let space = sample_space();
        let pos = Position::new(vec![2, 7, 0]);
        let params = space.parameters(&pos);
        assert_eq!(params.get("x"), Some(&ParamValue::Int(1)));
        assert_eq!(params.get("kernel"), Some(&ParamValue::from("linear")));
        assert_eq!(space.position_of(&params).unwrap(), pos);
    }

    #[test]
    fn position_of_snaps_to_nearest_value() {
        let space = SearchSpace::builder().add_float("y", 0.0, 1.0, 11).build().unwrap();
        let mut params = Parameters::new();
        params.insert("y".into(), ParamValue::Float(0.33));
        assert_eq!(space.position_of(&params).unwrap(), Position::new(vec![3]));

        params.clear();
        assert!(space.position_of(&params).is_err());
    }

    #[test]
    fn grid_and_vertices() {
        let space = SearchSpace::builder()
            .add_int("a", 0, 10)
            .add_int("b", 0, 4)
            .build()
            .unwrap();

        let grid = space.grid_positions(4);
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|p| space.contains(p)));
        assert_eq!(grid[0], Position::new(vec![0, 0]));
        assert_eq!(grid[3], Position::new(vec![10, 4]));

        let vertices = space.vertex_positions(10);
        assert_eq!(vertices.len(), 4);
        assert!(vertices.contains(&Position::new(vec![10, 0])));
        assert!(vertices.contains(&Position::new(vec![0, 4])));
    }

    #[test]
    fn enumerate_respects_limit() {
        let space = SearchSpace::builder()
            .add_int("a", 0, 2)
            .add_int("b", 0, 1)
            .build()
            .unwrap();
        let all = space.enumerate(100).unwrap();
        assert_eq!(all.len(), 6);
        assert!(space.enumerate(5).is_none());
    }

    #[test]
    fn features_use_values_and_category_indices() {
        let space = sample_space();
        let pos = Position::new(vec![0, 10, 2]);
        assert_eq!(space.features(&pos), vec![-1.0, 5.0, 2.0]);
    }

    #[test]
    fn defs_deserialize_from_json() {
        let json = serde_json::json!([
            {"name": "x", "kind": {"int_range": {"low": -5, "high": 5}}},
            {"name": "lr", "kind": {"float_range": {"low": 0.0, "high": 1.0, "resolution": 5}}},
            {"name": "act", "kind": {"categorical": {"values": ["relu", "tanh"]}}}
        ]);
        let defs: Vec<DimensionDef> = serde_json::from_value(json).unwrap();
        let space = SearchSpace::from_defs(&defs).unwrap();
        assert_eq!(space.size_of(0), 11);
        assert_eq!(space.size_of(1), 5);
        assert_eq!(space.size_of(2), 2);
    }
}
