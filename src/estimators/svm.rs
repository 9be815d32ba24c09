use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::Classifier;

/// Box constraint on the dual coefficients.
pub const C: f64 = 1.0;
pub const PROBABILITY_FOLDS: usize = 5;

const STOP_EPS: f64 = 1e-3;
const TAU: f64 = 1e-12;

/// C-SVC with an RBF kernel and Platt-scaled probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorClassifier {
    gamma: f64,
    support_vectors: Vec<Vec<f64>>,
    /// `alpha_i * y_i` for each support vector.
    dual_coef: Vec<f64>,
    rho: f64,
    prob_a: f64,
    prob_b: f64,
}

struct DualSolution {
    alpha: Vec<f64>,
    rho: f64,
}

impl SupportVectorClassifier {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, random_state: u64) -> Self {
        let gamma = scale_gamma(x);
        let signs: Vec<f64> = y.iter().map(|&v| if v > 0.5 { 1.0 } else { -1.0 }).collect();
        let rows: Vec<usize> = (0..x.nrows()).collect();

        let solution = solve_dual(x, &rows, &signs, gamma);
        let mut model = Self::from_solution(x, &rows, &signs, &solution, gamma);
        debug!("SVM fitted with {} support vectors", model.support_vectors.len());

        let decision = cross_validated_decisions(x, &signs, gamma, random_state);
        let (a, b) = platt_sigmoid(&decision, &signs);
        model.prob_a = a;
        model.prob_b = b;
        model
    }

    fn from_solution(x: &Array2<f64>, rows: &[usize], signs: &[f64], solution: &DualSolution, gamma: f64) -> Self {
        let mut support_vectors = Vec::new();
        let mut dual_coef = Vec::new();
        for (t, &alpha) in solution.alpha.iter().enumerate() {
            if alpha > 0.0 {
                support_vectors.push(x.row(rows[t]).to_vec());
                dual_coef.push(alpha * signs[t]);
            }
        }
        Self { gamma, support_vectors, dual_coef, rho: solution.rho, prob_a: 0.0, prob_b: 0.0 }
    }

    fn decision_row(&self, row: ArrayView1<f64>) -> f64 {
        let sum: f64 = self
            .support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * rbf(row.iter().copied(), sv.iter().copied(), self.gamma))
            .sum();
        sum - self.rho
    }

    pub fn decision_function(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.decision_row(row)).collect()
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.len()
    }
}

impl Classifier for SupportVectorClassifier {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.decision_function(x).mapv(|d| platt_predict(d, self.prob_a, self.prob_b))
    }

    /// Class 1 when the decision value is positive, independent of the
    /// probability calibration.
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.decision_function(x).mapv(|d| if d > 0.0 { 1.0 } else { 0.0 })
    }
}

/// `1 / (n_features * var(X))`, or 1.0 for a constant matrix.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let count = x.len() as f64;
    if count == 0.0 {
        return 1.0;
    }
    let mean = x.sum() / count;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

fn rbf(a: impl Iterator<Item = f64>, b: impl Iterator<Item = f64>, gamma: f64) -> f64 {
    let dist: f64 = a.zip(b).map(|(u, v)| (u - v) * (u - v)).sum();
    (-gamma * dist).exp()
}

/// SMO over the rows `rows` of `x` with second-order working-set selection.
fn solve_dual(x: &Array2<f64>, rows: &[usize], signs: &[f64], gamma: f64) -> DualSolution {
    let n = rows.len();
    let kernel_row = |i: usize| -> Vec<f64> {
        let a = x.row(rows[i]);
        rows.iter().map(|&r| rbf(a.iter().copied(), x.row(r).iter().copied(), gamma)).collect()
    };

    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let max_iter = (100 * n).max(100_000);
    let mut iterations = 0;

    while iterations < max_iter {
        iterations += 1;

        let mut g_max = f64::NEG_INFINITY;
        let mut selected_i = None;
        for t in 0..n {
            if signs[t] > 0.0 {
                if alpha[t] < C && -grad[t] >= g_max {
                    g_max = -grad[t];
                    selected_i = Some(t);
                }
            } else if alpha[t] > 0.0 && grad[t] >= g_max {
                g_max = grad[t];
                selected_i = Some(t);
            }
        }
        let Some(i) = selected_i else { break };
        let k_i = kernel_row(i);

        let mut g_max2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut selected_j = None;
        for t in 0..n {
            let grad_diff = if signs[t] > 0.0 {
                if alpha[t] <= 0.0 {
                    continue;
                }
                g_max2 = g_max2.max(grad[t]);
                g_max + grad[t]
            } else {
                if alpha[t] >= C {
                    continue;
                }
                g_max2 = g_max2.max(-grad[t]);
                g_max - grad[t]
            };
            if grad_diff > 0.0 {
                // K(i,i) == K(t,t) == 1 for the RBF kernel
                let quad = positive_or_tau(2.0 - 2.0 * k_i[t]);
                let obj = -(grad_diff * grad_diff) / quad;
                if obj <= obj_min {
                    obj_min = obj;
                    selected_j = Some(t);
                }
            }
        }
        let Some(j) = selected_j else { break };
        if g_max + g_max2 < STOP_EPS {
            break;
        }
        let k_j = kernel_row(j);

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let quad = positive_or_tau(2.0 - 2.0 * k_i[j]);
        if signs[i] != signs[j] {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > C {
                    alpha[i] = C;
                    alpha[j] = C - diff;
                }
            } else if alpha[j] > C {
                alpha[j] = C;
                alpha[i] = C + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > C {
                if alpha[i] > C {
                    alpha[i] = C;
                    alpha[j] = sum - C;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > C {
                if alpha[j] > C {
                    alpha[j] = C;
                    alpha[i] = sum - C;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (delta_i, delta_j) = (alpha[i] - old_i, alpha[j] - old_j);
        for t in 0..n {
            grad[t] += signs[t] * (signs[i] * k_i[t] * delta_i + signs[j] * k_j[t] * delta_j);
        }
    }
    if iterations >= max_iter {
        warn!("SMO stopped after {} iterations without reaching tolerance", max_iter);
    }

    DualSolution { rho: compute_rho(&alpha, &grad, signs), alpha }
}

fn positive_or_tau(quad: f64) -> f64 {
    if quad > 0.0 {
        quad
    } else {
        TAU
    }
}

fn compute_rho(alpha: &[f64], grad: &[f64], signs: &[f64]) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0usize;
    for t in 0..alpha.len() {
        let yg = signs[t] * grad[t];
        if alpha[t] >= C {
            if signs[t] < 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if signs[t] > 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            free_count += 1;
            free_sum += yg;
        }
    }
    if free_count > 0 {
        free_sum / free_count as f64
    } else {
        (upper + lower) / 2.0
    }
}

/// Out-of-fold decision values used to calibrate probabilities.
fn cross_validated_decisions(x: &Array2<f64>, signs: &[f64], gamma: f64, random_state: u64) -> Vec<f64> {
    let n = signs.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(random_state));

    let mut decision = vec![0.0; n];
    let folds = PROBABILITY_FOLDS.min(n.max(1));
    for fold in 0..folds {
        let begin = fold * n / folds;
        let end = (fold + 1) * n / folds;
        let held_out = &order[begin..end];
        let train: Vec<usize> = order[..begin].iter().chain(&order[end..]).copied().collect();
        let train_signs: Vec<f64> = train.iter().map(|&r| signs[r]).collect();

        let positives = train_signs.iter().filter(|&&s| s > 0.0).count();
        let negatives = train_signs.len() - positives;
        if positives == 0 || negatives == 0 {
            let constant = match (positives, negatives) {
                (0, 0) => 0.0,
                (_, 0) => 1.0,
                _ => -1.0,
            };
            for &r in held_out {
                decision[r] = constant;
            }
            continue;
        }

        let solution = solve_dual(x, &train, &train_signs, gamma);
        let fold_model = SupportVectorClassifier::from_solution(x, &train, &train_signs, &solution, gamma);
        for &r in held_out {
            decision[r] = fold_model.decision_row(x.row(r));
        }
    }
    decision
}

/// Fit `P(y=1|f) = 1 / (1 + exp(A f + B))` by regularised maximum likelihood.
fn platt_sigmoid(decision: &[f64], signs: &[f64]) -> (f64, f64) {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    let prior1 = signs.iter().filter(|&&s| s > 0.0).count() as f64;
    let prior0 = signs.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = signs.iter().map(|&s| if s > 0.0 { hi_target } else { lo_target }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decision
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let fapb = f * a + b;
                if fapb >= 0.0 {
                    t * fapb + (-fapb).exp().ln_1p()
                } else {
                    (t - 1.0) * fapb + fapb.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..MAX_ITER {
        let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
        let (mut g1, mut g2) = (0.0, 0.0);
        for (&f, &t) in decision.iter().zip(&targets) {
            let fapb = f * a + b;
            let (p, q) = if fapb >= 0.0 {
                let e = (-fapb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = fapb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < EPS && g2.abs() < EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= MIN_STEP {
            let (new_a, new_b) = (a + step * da, b + step * db);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < MIN_STEP {
            debug!("Platt scaling line search failed");
            break;
        }
    }
    (a, b)
}

fn platt_predict(decision: f64, a: f64, b: f64) -> f64 {
    let fapb = decision * a + b;
    if fapb >= 0.0 {
        let e = (-fapb).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + fapb.exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.2], [0.3, 0.1], [0.2, 0.5], [0.5, 0.3], [0.1, 0.4], [0.4, 0.0],
            [3.0, 3.2], [3.3, 2.9], [2.8, 3.1], [3.1, 3.4], [2.9, 2.7], [3.4, 3.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_svm_separates_blobs() {
        let (x, y) = blobs();
        let model = SupportVectorClassifier::fit(&x, &y, 42);
        assert!(model.n_support() > 0);
        assert_eq!(model.predict(x.view()).to_vec(), y.to_vec());
        let decision = model.decision_function(x.view());
        assert!(decision.iter().take(6).all(|&d| d < 0.0));
        assert!(decision.iter().skip(6).all(|&d| d > 0.0));
    }

    #[test]
    fn test_probabilities_rank_like_decisions() {
        let (x, y) = blobs();
        let model = SupportVectorClassifier::fit(&x, &y, 42);
        let proba = model.predict_proba(x.view());
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        let mean_neg = proba.iter().take(6).sum::<f64>() / 6.0;
        let mean_pos = proba.iter().skip(6).sum::<f64>() / 6.0;
        assert!(mean_pos > mean_neg);
    }

    #[test]
    fn test_gamma_scale() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // var of {0, 2, 2, 0} is 1
        assert!((scale_gamma(&x) - 0.5).abs() < 1e-12);
        assert_eq!(scale_gamma(&array![[1.0], [1.0]]), 1.0);
    }

    #[test]
    fn test_platt_prefers_positive_decisions() {
        let decision = [-2.0, -1.5, -1.0, 1.0, 1.5, 2.0];
        let signs = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        let (a, b) = platt_sigmoid(&decision, &signs);
        assert!(a < 0.0);
        assert!(platt_predict(2.0, a, b) > 0.5);
        assert!(platt_predict(-2.0, a, b) < 0.5);
    }
}
