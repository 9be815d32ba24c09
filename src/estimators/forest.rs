use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use super::Classifier;

pub const N_ESTIMATORS: usize = 100;

/// Bagged CART trees with `sqrt(n_features)` candidates per split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<RegressionTree>,
}

impl RandomForestClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, random_state: u64) -> Self {
        Self::fit_with(x, y, random_state, N_ESTIMATORS)
    }

    pub fn fit_with(x: &Array2<f64>, y: &Array1<f64>, random_state: u64, n_estimators: usize) -> Self {
        let n = x.nrows();
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);
        let params = TreeParams { max_features: Some(max_features), ..TreeParams::default() };

        let mut rng = StdRng::seed_from_u64(random_state);
        let trees = (0..n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let rows: Vec<usize> = (0..n).map(|_| tree_rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &rows, &params, &mut tree_rng)
            })
            .collect();
        Self { trees }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForestClassifier {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let n_trees = self.trees.len().max(1) as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect()
    }
}
