//! Model families, their preset search spaces and typed parameter views.
//!
//! The tree-boosting and neural families are trained by external engines;
//! this module only describes what gets searched and decodes a sampled
//! [`ParamSet`] into the typed values those engines expect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SearchError;
use super::space::{ParamSet, SearchSpace};

/// Boosting rounds passed to tree engines.
pub const NUM_BOOST_ROUND: usize = 500;
/// Early stopping patience for tree engines.
pub const EARLY_STOPPING_ROUNDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    XGBoost,
    LightGBM,
    ResNet,
    Linear,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [Self::XGBoost, Self::LightGBM, Self::ResNet, Self::Linear];

    pub fn name(&self) -> &'static str {
        match self {
            Self::XGBoost => "xgboost",
            Self::LightGBM => "lightgbm",
            Self::ResNet => "resnet",
            Self::Linear => "linear",
        }
    }

    /// Default search space for this family.
    pub fn search_space(&self) -> SearchSpace {
        let space = match self {
            Self::XGBoost => SearchSpace::new()
                .uniform("learning_rate", 1e-4, 1e-1)
                .int("max_depth", 5, 30)
                .int("max_leaves", 5, 50)
                .uniform("subsample", 0.3, 1.0)
                .uniform("colsample_bytree", 0.3, 1.0)
                .int("min_child_weight", 5, 100)
                .uniform("lambda", 0.05, 0.2)
                .uniform("alpha", 0.05, 0.2)
                .fixed("objective", "reg:squarederror")
                .fixed("booster", "gbtree")
                .fixed("tree_method", "hist")
                .fixed("verbosity", 1_i64)
                .fixed("n_jobs", 4_i64)
                .fixed("eval_metric", "rmse"),
            Self::LightGBM => SearchSpace::new()
                .uniform("learning_rate", 1e-4, 1e-1)
                .int("max_leaves", 5, 100)
                .uniform("bagging_fraction", 0.3, 0.99)
                .int("bagging_freq", 1, 10)
                .uniform("feature_fraction", 0.3, 0.99)
                .int("min_data_in_leaf", 50, 1000)
                .uniform("lambda_l1", 0.005, 0.05)
                .uniform("lambda_l2", 0.005, 0.05)
                .categorical("boosting", &["gbdt", "goss", "rf"])
                .fixed("objective", "regression")
                .fixed("verbose", 1_i64)
                .fixed("n_jobs", 4_i64)
                .fixed("metric", "rmse"),
            Self::ResNet => SearchSpace::new()
                .int("dim_1", 500, 2000)
                .int("dim_2", 1000, 3000)
                .int("dim_3", 1000, 3000)
                .int("dim_4", 500, 1000)
                .int("dim_5", 100, 250)
                .categorical("activation", Activation::NAMES)
                .uniform("dropout", 0.1, 0.5)
                .uniform("lr", 0.00005, 0.05)
                .int("batch_size", 8000, 15000)
                .fixed("loss", "mse")
                .fixed("embedding", true),
            Self::Linear => SearchSpace::new()
                .uniform("learning_rate", 1e-4, 1e-1)
                .uniform("l2", 0.0, 0.1)
                .int("epochs", 5, 50),
        };
        space.for_model(*self)
    }

    /// Enforce cross-parameter rules after sampling.
    pub fn apply_constraints(&self, params: &mut ParamSet) {
        // GOSS does its own sampling, so bagging is switched off.
        if *self == Self::LightGBM && params.get("boosting").and_then(|v| v.as_str()) == Some("goss") {
            params.insert("bagging_freq", 0_i64);
            params.insert("bagging_fraction", 1.0);
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SearchError::invalid_param("model", &format!("unknown model '{}'", s)))
    }
}

/// Hidden-layer activation for the neural family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    LeakyRelu,
    Gelu,
    Silu,
}

const ACTIVATIONS: [(&str, Activation); 4] = [
    ("relu", Activation::Relu),
    ("leaky_relu", Activation::LeakyRelu),
    ("gelu", Activation::Gelu),
    ("silu", Activation::Silu),
];

impl Activation {
    pub const NAMES: &'static [&'static str] = &["relu", "leaky_relu", "gelu", "silu"];

    pub fn name(&self) -> &'static str {
        ACTIVATIONS
            .iter()
            .find(|(_, a)| a == self)
            .map(|(n, _)| *n)
            .unwrap_or("relu")
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::Relu => x.max(0.0),
            Self::LeakyRelu => {
                if x >= 0.0 {
                    x
                } else {
                    0.01 * x
                }
            }
            // tanh approximation
            Self::Gelu => {
                let c = (2.0 / std::f64::consts::PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
            }
            Self::Silu => x / (1.0 + (-x).exp()),
        }
    }
}

impl FromStr for Activation {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ACTIVATIONS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, a)| *a)
            .ok_or_else(|| {
                SearchError::invalid_param("activation", &format!("unknown activation '{}'", s))
            })
    }
}

/// Parameters for an XGBoost `train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgbParams {
    pub learning_rate: f64,
    pub max_depth: i64,
    pub max_leaves: i64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: i64,
    pub lambda: f64,
    pub alpha: f64,
    pub num_boost_round: usize,
    pub early_stopping_rounds: usize,
}

impl XgbParams {
    pub fn from_params(p: &ParamSet) -> Result<Self, SearchError> {
        Ok(Self {
            learning_rate: p.f64("learning_rate")?,
            max_depth: p.i64("max_depth")?,
            max_leaves: p.i64("max_leaves")?,
            subsample: p.f64("subsample")?,
            colsample_bytree: p.f64("colsample_bytree")?,
            min_child_weight: p.i64("min_child_weight")?,
            lambda: p.f64("lambda")?,
            alpha: p.f64("alpha")?,
            num_boost_round: NUM_BOOST_ROUND,
            early_stopping_rounds: EARLY_STOPPING_ROUNDS,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boosting {
    Gbdt,
    Goss,
    Rf,
}

impl FromStr for Boosting {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gbdt" => Ok(Self::Gbdt),
            "goss" => Ok(Self::Goss),
            "rf" => Ok(Self::Rf),
            other => Err(SearchError::invalid_param(
                "boosting",
                &format!("unknown boosting type '{}'", other),
            )),
        }
    }
}

/// Parameters for a LightGBM `train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LgbParams {
    pub learning_rate: f64,
    pub max_leaves: i64,
    pub bagging_fraction: f64,
    pub bagging_freq: i64,
    pub feature_fraction: f64,
    pub min_data_in_leaf: i64,
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub boosting: Boosting,
    pub num_boost_round: usize,
    pub early_stopping_rounds: usize,
}

impl LgbParams {
    pub fn from_params(p: &ParamSet) -> Result<Self, SearchError> {
        let boosting: Boosting = p.str("boosting")?.parse()?;
        let (bagging_fraction, bagging_freq) = match boosting {
            Boosting::Goss => (1.0, 0),
            _ => (p.f64("bagging_fraction")?, p.i64("bagging_freq")?),
        };

        Ok(Self {
            learning_rate: p.f64("learning_rate")?,
            max_leaves: p.i64("max_leaves")?,
            bagging_fraction,
            bagging_freq,
            feature_fraction: p.f64("feature_fraction")?,
            min_data_in_leaf: p.i64("min_data_in_leaf")?,
            lambda_l1: p.f64("lambda_l1")?,
            lambda_l2: p.f64("lambda_l2")?,
            boosting,
            num_boost_round: NUM_BOOST_ROUND,
            early_stopping_rounds: EARLY_STOPPING_ROUNDS,
        })
    }
}

/// Parameters for the residual MLP classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralParams {
    pub hidden_dims: [usize; 5],
    pub activation: Activation,
    pub dropout: f64,
    pub lr: f64,
    pub batch_size: usize,
    pub label_smoothing: f64,
    pub embedding: bool,
}

impl NeuralParams {
    /// Fallback for studies that predate the fifth hidden layer.
    pub const DEFAULT_DIM_5: usize = 75;
    pub const DEFAULT_LABEL_SMOOTHING: f64 = 0.094;

    pub fn from_params(p: &ParamSet) -> Result<Self, SearchError> {
        let dim = |name: &str| -> Result<usize, SearchError> {
            let v = p.i64(name)?;
            usize::try_from(v).map_err(|_| SearchError::invalid_param(name, "must be non-negative"))
        };

        let dim_5 = if p.contains("dim_5") {
            dim("dim_5")?
        } else {
            Self::DEFAULT_DIM_5
        };
        let label_smoothing = if p.contains("label_smoothing") {
            p.f64("label_smoothing")?
        } else {
            Self::DEFAULT_LABEL_SMOOTHING
        };
        let embedding = p.get("embedding").and_then(|v| v.as_bool()).unwrap_or(true);

        Ok(Self {
            hidden_dims: [dim("dim_1")?, dim("dim_2")?, dim("dim_3")?, dim("dim_4")?, dim_5],
            activation: p.str("activation")?.parse()?,
            dropout: p.f64("dropout")?,
            lr: p.f64("lr")?,
            batch_size: dim("batch_size")?,
            label_smoothing,
            embedding,
        })
    }
}

/// Parameters for the built-in linear baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub learning_rate: f64,
    pub l2: f64,
    pub epochs: usize,
}

impl LinearParams {
    pub fn from_params(p: &ParamSet) -> Result<Self, SearchError> {
        let epochs = usize::try_from(p.i64("epochs")?)
            .map_err(|_| SearchError::invalid_param("epochs", "must be non-negative"))?;
        Ok(Self {
            learning_rate: p.f64("learning_rate")?,
            l2: p.f64("l2")?,
            epochs,
        })
    }
}
