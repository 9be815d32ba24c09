use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use super::{sigmoid, Classifier};

pub const N_ESTIMATORS: usize = 100;
pub const LEARNING_RATE: f64 = 0.1;
pub const MAX_DEPTH: usize = 3;

const PROBA_EPS: f64 = 1e-15;

/// Log-loss gradient boosting over shallow regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    init_raw: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
}

impl GradientBoostingClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, random_state: u64) -> Self {
        Self::fit_with(x, y, random_state, N_ESTIMATORS)
    }

    pub fn fit_with(x: &Array2<f64>, y: &Array1<f64>, random_state: u64, n_estimators: usize) -> Self {
        let n = x.nrows();
        let rows: Vec<usize> = (0..n).collect();
        let params = TreeParams { max_depth: Some(MAX_DEPTH), ..TreeParams::default() };
        let mut rng = StdRng::seed_from_u64(random_state);

        let prior = (y.sum() / n.max(1) as f64).clamp(PROBA_EPS, 1.0 - PROBA_EPS);
        let init_raw = (prior / (1.0 - prior)).ln();
        let mut raw = Array1::from_elem(n, init_raw);
        let mut stages = Vec::with_capacity(n_estimators);

        for _ in 0..n_estimators {
            let proba = raw.mapv(sigmoid);
            let residual = y - &proba;
            let mut tree = RegressionTree::fit(x, &residual, &rows, &params, &mut rng);

            // one Newton step per leaf: sum(residual) / sum(p * (1 - p))
            let mut numerator = vec![0.0; tree.node_count()];
            let mut denominator = vec![0.0; tree.node_count()];
            let leaves: Vec<usize> = x.rows().into_iter().map(|row| tree.leaf_index(row)).collect();
            for (r, &leaf) in leaves.iter().enumerate() {
                numerator[leaf] += residual[r];
                denominator[leaf] += proba[r] * (1.0 - proba[r]);
            }
            let steps: Vec<f64> = numerator
                .iter()
                .zip(&denominator)
                .map(|(num, den)| if den.abs() < 1e-150 { 0.0 } else { num / den })
                .collect();
            for (leaf, &step) in steps.iter().enumerate() {
                tree.set_leaf_value(leaf, step);
            }
            for (r, &leaf) in leaves.iter().enumerate() {
                raw[r] += LEARNING_RATE * steps[leaf];
            }
            stages.push(tree);
        }

        Self { init_raw, learning_rate: LEARNING_RATE, stages }
    }

    fn raw_scores(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.init_raw
                    + self.learning_rate * self.stages.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect()
    }
}

impl Classifier for GradientBoostingClassifier {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.raw_scores(x).mapv(sigmoid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_boosting_fits_an_interval() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0], [9.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let model = GradientBoostingClassifier::fit(&x, &y, 42);
        assert_eq!(model.predict(x.view()).to_vec(), y.to_vec());
        assert_eq!(model.stages.len(), N_ESTIMATORS);
    }

    #[test]
    fn test_zero_stages_predicts_prior() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 1.0, 1.0];
        let model = GradientBoostingClassifier::fit_with(&x, &y, 0, 0);
        let proba = model.predict_proba(x.view());
        assert!(proba.iter().all(|p| (p - 0.75).abs() < 1e-12));
    }
}
