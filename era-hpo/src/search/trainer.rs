//! Training seam between the objective and model engines.

use crate::data::FoldData;

use super::error::SearchError;
use super::models::LinearParams;
use super::space::ParamSet;

/// Fits a model on one fold and predicts its validation rows.
///
/// Implementations own whatever engine-specific structures they build from
/// the fold data; those are dropped when `fit_predict` returns.
pub trait Trainer: Send + Sync {
    fn name(&self) -> &str;

    fn fit_predict(
        &self,
        params: &ParamSet,
        train: &FoldData,
        validation: &FoldData,
    ) -> Result<Vec<f64>, SearchError>;
}

/// Ridge-penalized linear regression fit by full-batch gradient descent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrainer;

impl LinearTrainer {
    fn fit(params: &LinearParams, train: &FoldData) -> (Vec<f64>, f64) {
        let n = train.len() as f64;
        let mut weights = vec![0.0; train.n_features()];
        let mut bias = train.target.iter().sum::<f64>() / n;

        for _ in 0..params.epochs {
            let mut grad_w = vec![0.0; weights.len()];
            let mut grad_b = 0.0;

            for (row, &y) in train.features.iter().zip(&train.target) {
                let err = predict_row(&weights, bias, row) - y;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * (g / n + params.l2 * *w);
            }
            bias -= params.learning_rate * grad_b / n;
        }

        (weights, bias)
    }
}

impl Trainer for LinearTrainer {
    fn name(&self) -> &str {
        "linear"
    }

    fn fit_predict(
        &self,
        params: &ParamSet,
        train: &FoldData,
        validation: &FoldData,
    ) -> Result<Vec<f64>, SearchError> {
        if train.is_empty() {
            return Err(SearchError::Training("empty training set".to_string()));
        }
        if !validation.is_empty() && validation.n_features() != train.n_features() {
            return Err(SearchError::Training(format!(
                "feature count mismatch: train {}, validation {}",
                train.n_features(),
                validation.n_features()
            )));
        }

        let params = LinearParams::from_params(params)?;
        let (weights, bias) = Self::fit(&params, train);

        Ok(validation
            .features
            .iter()
            .map(|row| predict_row(&weights, bias, row))
            .collect())
    }
}

fn predict_row(weights: &[f64], bias: f64, row: &[f64]) -> f64 {
    bias + weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(xs: &[f64]) -> FoldData {
        FoldData {
            features: xs.iter().map(|&x| vec![x]).collect(),
            target: xs.iter().map(|&x| 2.0 * x + 1.0).collect(),
            eras: vec![1; xs.len()],
        }
    }

    fn params(lr: f64, epochs: i64) -> ParamSet {
        let mut p = ParamSet::new();
        p.insert("learning_rate", lr);
        p.insert("l2", 0.0);
        p.insert("epochs", epochs);
        p
    }

    #[test]
    fn test_learns_linear_relation() {
        let train = fold(&[0.0, 0.25, 0.5, 0.75, 1.0]);
        let validation = fold(&[0.1, 0.9]);

        let preds = LinearTrainer
            .fit_predict(&params(0.5, 2000), &train, &validation)
            .unwrap();

        assert!((preds[0] - 1.2).abs() < 1e-2);
        assert!((preds[1] - 2.8).abs() < 1e-2);
    }

    #[test]
    fn test_zero_epochs_predicts_mean() {
        let train = fold(&[0.0, 1.0]);
        let validation = fold(&[5.0]);

        let preds = LinearTrainer
            .fit_predict(&params(0.1, 0), &train, &validation)
            .unwrap();
        assert_eq!(preds, vec![2.0]);
    }

    #[test]
    fn test_rejects_empty_train() {
        let err = LinearTrainer
            .fit_predict(&params(0.1, 1), &FoldData::default(), &fold(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, SearchError::Training(_)));
    }
}
