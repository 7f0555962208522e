//! Typed hyperparameter search spaces.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::SearchError;
use super::models::ModelKind;

/// Distribution of a single searched parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamSpec {
    /// Uniform over `[low, high)`.
    Continuous { low: f64, high: f64 },
    /// Uniform over `[low, high]`.
    Integer { low: i64, high: i64 },
    /// Uniform choice among named options.
    Categorical { choices: Vec<String> },
}

impl ParamSpec {
    fn validate(&self, name: &str) -> Result<(), SearchError> {
        let ok = match self {
            Self::Continuous { low, high } => low.is_finite() && high.is_finite() && low <= high,
            Self::Integer { low, high } => low <= high,
            Self::Categorical { choices } => !choices.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(SearchError::InvalidSpace(format!("{}: {:?}", name, self)))
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Self::Continuous { low, high } if low < high => ParamValue::Float(rng.gen_range(*low..*high)),
            Self::Continuous { low, .. } => ParamValue::Float(*low),
            Self::Integer { low, high } => ParamValue::Int(rng.gen_range(*low..=*high)),
            Self::Categorical { choices } => {
                ParamValue::Str(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.6}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// One concrete draw from a search space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn require(&self, name: &str) -> Result<&ParamValue, SearchError> {
        self.get(name)
            .ok_or_else(|| SearchError::MissingParam(name.to_string()))
    }

    pub fn f64(&self, name: &str) -> Result<f64, SearchError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| SearchError::invalid_param(name, "expected a number"))
    }

    pub fn i64(&self, name: &str) -> Result<i64, SearchError> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| SearchError::invalid_param(name, "expected an integer"))
    }

    pub fn str(&self, name: &str) -> Result<&str, SearchError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| SearchError::invalid_param(name, "expected a string"))
    }

    /// Compact single-line representation for logs.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Searched and fixed parameters for one model family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub fixed: ParamSet,
    /// Model family whose cross-parameter constraints apply after sampling.
    #[serde(default)]
    pub model: Option<ModelKind>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(mut self, name: &str, low: f64, high: f64) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::Continuous { low, high });
        self
    }

    pub fn int(mut self, name: &str, low: i64, high: i64) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::Integer { low, high });
        self
    }

    pub fn categorical(mut self, name: &str, choices: &[&str]) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec::Categorical {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    pub fn fixed(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.fixed.insert(name, value);
        self
    }

    pub fn for_model(mut self, model: ModelKind) -> Self {
        self.model = Some(model);
        self
    }

    /// Check every distribution is well formed.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.params.is_empty() {
            return Err(SearchError::InvalidSpace(
                "search space has no searched parameters".to_string(),
            ));
        }
        for (name, spec) in &self.params {
            spec.validate(name)?;
        }
        Ok(())
    }

    /// Number of searched parameters.
    pub fn dimensions(&self) -> usize {
        self.params.len()
    }

    /// Draw one parameter set.
    ///
    /// Parameters are drawn in name order so a seeded RNG reproduces draws.
    /// The space must have passed [`validate`](Self::validate).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamSet {
        let mut set = self.fixed.clone();
        for (name, spec) in &self.params {
            set.0.insert(name.clone(), spec.sample(rng));
        }
        if let Some(model) = self.model {
            model.apply_constraints(&mut set);
        }
        set
    }

    /// Pin parameters to a previous study's best values.
    ///
    /// Names in `resample` stay searched; every other searched parameter
    /// present in `best` becomes fixed.
    pub fn warm_started(&self, best: &ParamSet, resample: &[String]) -> Self {
        let mut space = self.clone();
        for (name, value) in best.iter() {
            if resample.iter().any(|r| r == name) {
                continue;
            }
            space.params.remove(name);
            space.fixed.0.insert(name.clone(), value.clone());
        }
        space
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .uniform("lr", 1e-4, 1e-1)
            .int("depth", 5, 30)
            .categorical("boosting", &["gbdt", "goss", "rf"])
            .fixed("objective", "regression")
    }

    #[test]
    fn test_sample_within_bounds() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let p = space.sample(&mut rng);
            let lr = p.f64("lr").unwrap();
            assert!((1e-4..1e-1).contains(&lr));
            let depth = p.i64("depth").unwrap();
            assert!((5..=30).contains(&depth));
            assert!(["gbdt", "goss", "rf"].contains(&p.str("boosting").unwrap()));
            assert_eq!(p.str("objective").unwrap(), "regression");
        }
    }

    #[test]
    fn test_seeded_sampling_reproducible() {
        let space = space();
        let a = space.sample(&mut StdRng::seed_from_u64(42));
        let b = space.sample(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate() {
        assert!(space().validate().is_ok());
        assert!(SearchSpace::new().validate().is_err());
        assert!(SearchSpace::new().uniform("x", 1.0, 0.0).validate().is_err());
        assert!(SearchSpace::new().int("x", 3, 2).validate().is_err());
        assert!(SearchSpace::new().categorical("x", &[]).validate().is_err());
    }

    #[test]
    fn test_degenerate_continuous_range() {
        let space = SearchSpace::new().uniform("x", 0.5, 0.5);
        let p = space.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(p.f64("x").unwrap(), 0.5);
    }

    #[test]
    fn test_typed_accessors() {
        let mut p = ParamSet::new();
        p.insert("depth", 6_i64);
        p.insert("name", "gbdt");

        assert_eq!(p.f64("depth").unwrap(), 6.0);
        assert!(matches!(p.i64("name"), Err(SearchError::InvalidParam { .. })));
        assert!(matches!(p.f64("missing"), Err(SearchError::MissingParam(_))));
        assert_eq!(p.key(), "depth=6,name=gbdt");
    }

    #[test]
    fn test_warm_started() {
        let space = space();
        let mut best = ParamSet::new();
        best.insert("lr", 0.01);
        best.insert("depth", 12_i64);
        best.insert("boosting", "gbdt");

        let warm = space.warm_started(&best, &["boosting".to_string()]);
        assert_eq!(warm.dimensions(), 1);

        let p = warm.sample(&mut StdRng::seed_from_u64(3));
        assert_eq!(p.f64("lr").unwrap(), 0.01);
        assert_eq!(p.i64("depth").unwrap(), 12);
    }

    #[test]
    fn test_param_set_json() {
        let mut p = ParamSet::new();
        p.insert("lr", 0.5);
        p.insert("depth", 3_i64);
        p.insert("embedding", true);
        p.insert("boosting", "goss");

        let json = serde_json::to_string(&p).unwrap();
        let back: ParamSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
