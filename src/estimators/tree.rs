use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::Classifier;

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per node; `None` considers all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self { max_depth: None, min_samples_split: 2, min_samples_leaf: 1, max_features: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

struct Split {
    feature: usize,
    threshold: f64,
    sse: f64,
}

/// Binary tree minimising the summed squared error of its leaves.
///
/// On 0/1 targets the squared error is proportional to Gini impurity, so
/// the same tree serves as a classification tree whose leaf value is the
/// positive-class fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `x`; rows may repeat (bootstrap samples).
    pub fn fit(
        x: &Array2<f64>,
        targets: &Array1<f64>,
        rows: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, targets, rows.to_vec(), 0, params, rng);
        tree
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        targets: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        let value = rows.iter().map(|&r| targets[r]).sum::<f64>() / rows.len().max(1) as f64;
        self.nodes.push(Node::Leaf { value });

        let splittable = rows.len() >= params.min_samples_split.max(2)
            && rows.len() >= 2 * params.min_samples_leaf
            && params.max_depth.map_or(true, |max| depth < max);
        if !splittable {
            return id;
        }
        let Some(split) = best_split(x, targets, &rows, params, rng) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| x[[r, split.feature]] <= split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return id;
        }
        let left = self.grow(x, targets, left_rows, depth + 1, params, rng);
        let right = self.grow(x, targets, right_rows, depth + 1, params, rng);
        self.nodes[id] = Node::Split { feature: split.feature, threshold: split.threshold, left, right };
        id
    }

    /// Index of the leaf `row` falls into.
    pub fn leaf_index(&self, row: ArrayView1<f64>) -> usize {
        let mut id = 0;
        while let Some(Node::Split { feature, threshold, left, right }) = self.nodes.get(id) {
            id = if row[*feature] <= *threshold { *left } else { *right };
        }
        id
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self.nodes.get(self.leaf_index(row)) {
            Some(Node::Leaf { value }) => *value,
            _ => 0.0,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Overwrite a leaf value; split nodes are left untouched.
    pub fn set_leaf_value(&mut self, id: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(id) {
            *value = new_value;
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes.get(id) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

fn best_split(
    x: &Array2<f64>,
    targets: &Array1<f64>,
    rows: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<Split> {
    let n = rows.len() as f64;
    let total_sum: f64 = rows.iter().map(|&r| targets[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| targets[r] * targets[r]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n;
    if parent_sse <= MIN_IMPURITY_DECREASE {
        return None;
    }

    let n_features = x.ncols();
    let features: Vec<usize> = match params.max_features {
        Some(k) if k < n_features => sample(rng, n_features, k).into_vec(),
        _ => (0..n_features).collect(),
    };

    let min_leaf = params.min_samples_leaf.max(1);
    let mut best: Option<Split> = None;
    let mut order = rows.to_vec();
    for feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for i in 0..order.len() - 1 {
            let t = targets[order[i]];
            left_sum += t;
            left_sq += t * t;

            let current = x[[order[i], feature]];
            let next = x[[order[i + 1], feature]];
            if !current.is_finite() || !next.is_finite() || next <= current {
                continue;
            }
            let n_left = i + 1;
            let n_right = order.len() - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);
            if best.as_ref().map_or(true, |b| sse < b.sse) {
                let mid = current / 2.0 + next / 2.0;
                let threshold = if mid >= next { current } else { mid };
                best = Some(Split { feature, threshold, sse });
            }
        }
    }

    best.filter(|s| s.sse < parent_sse - MIN_IMPURITY_DECREASE)
}

/// Fully grown CART classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    tree: RegressionTree,
}

impl DecisionTreeClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, random_state: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(random_state);
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let tree = RegressionTree::fit(x, y, &rows, &TreeParams::default(), &mut rng);
        Self { tree }
    }
}

impl Classifier for DecisionTreeClassifier {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.tree.predict_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tree_separates_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = DecisionTreeClassifier::fit(&x, &y, 0);
        assert_eq!(model.predict_proba(x.view()).to_vec(), y.to_vec());
        assert_eq!(model.tree.depth(), 1);
        assert_eq!(model.predict(array![[6.4]].view()).to_vec(), vec![0.0]);
    }

    #[test]
    fn test_constant_targets_make_a_leaf() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 1.0];
        let model = DecisionTreeClassifier::fit(&x, &y, 0);
        assert_eq!(model.tree.node_count(), 1);
    }

    #[test]
    fn test_nan_feature_does_not_recurse_forever() {
        let x = array![[1.0], [2.0], [f64::NAN], [3.0], [f64::NAN], [4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let model = DecisionTreeClassifier::fit(&x, &y, 0);
        assert!(model.tree.node_count() < 2 * x.nrows());
        assert!(model.predict_proba(x.view()).iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let params = TreeParams { max_depth: Some(1), ..TreeParams::default() };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = RegressionTree::fit(&x, &y, &[0, 1, 2, 3], &params, &mut rng);
        assert!(tree.depth() <= 1);
    }
}
