use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::{sigmoid, Classifier};
use crate::core::error::JobError;

/// Inverse L2 regularisation strength.
pub const C: f64 = 1.0;
pub const MAX_ITER: usize = 1000;
/// Correction pairs kept by L-BFGS.
const HISTORY: usize = 10;
const GRADIENT_TOL: f64 = 1e-4;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 50;

/// L2-penalised logistic regression fitted with L-BFGS.
///
/// Minimises `sum(log_loss) + ||w||^2 / (2C)`; the intercept is not
/// penalised. Each iteration costs `O(n * p)`, so wide one-hot inputs stay
/// cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self, JobError> {
        let p = x.ncols();
        let objective = Objective { x, y };
        let w = minimize(&objective, Array1::zeros(p + 1))?;
        Ok(Self { coefficients: w.slice(s![..p]).to_vec(), intercept: w[p] })
    }
}

impl Classifier for LogisticRegression {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let z: f64 = row.iter().zip(&self.coefficients).map(|(a, b)| a * b).sum::<f64>() + self.intercept;
                sigmoid(z)
            })
            .collect()
    }
}

/// Penalised log-loss over `w`, the coefficients followed by the intercept.
struct Objective<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
}

impl Objective<'_> {
    fn evaluate(&self, w: &Array1<f64>) -> (f64, Array1<f64>) {
        let p = self.x.ncols();
        let coef = w.slice(s![..p]);
        let z = self.x.dot(&coef) + w[p];

        let data: f64 = z.iter().zip(self.y.iter()).map(|(&z, &yi)| softplus(z) - yi * z).sum();
        let penalty = coef.dot(&coef) / (2.0 * C);

        let residual = z.mapv(sigmoid) - self.y;
        let mut gradient: Array1<f64> = Array1::zeros(p + 1);
        gradient.slice_mut(s![..p]).assign(&(self.x.t().dot(&residual) + &coef / C));
        gradient[p] = residual.sum();
        (data + penalty, gradient)
    }
}

fn minimize(objective: &Objective, mut w: Array1<f64>) -> Result<Array1<f64>, JobError> {
    let (mut value, mut gradient) = objective.evaluate(&w);
    if !value.is_finite() {
        return Err(JobError::Estimator("logistic loss is not finite at the starting point".to_string()));
    }
    // (s, y, 1 / s.y) pairs, oldest first
    let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> = VecDeque::with_capacity(HISTORY);

    for iteration in 0..MAX_ITER {
        if max_abs(&gradient) < GRADIENT_TOL {
            debug!("logistic regression converged after {} iterations", iteration);
            return Ok(w);
        }

        let mut direction = two_loop(&gradient, &history);
        let mut slope = gradient.dot(&direction);
        if slope >= 0.0 {
            history.clear();
            direction = gradient.mapv(|g| -g);
            slope = -gradient.dot(&gradient);
        }

        let mut step = if history.is_empty() { (1.0 / gradient.dot(&gradient).sqrt()).min(1.0) } else { 1.0 };
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate = &w + &(&direction * step);
            let (candidate_value, candidate_gradient) = objective.evaluate(&candidate);
            if candidate_value <= value + ARMIJO * step * slope {
                accepted = Some((candidate, candidate_value, candidate_gradient));
                break;
            }
            step /= 2.0;
        }
        let Some((candidate, candidate_value, candidate_gradient)) = accepted else {
            debug!("line search stalled after {} iterations", iteration);
            return Ok(w);
        };

        let s = &candidate - &w;
        let y = &candidate_gradient - &gradient;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }
        w = candidate;
        value = candidate_value;
        gradient = candidate_gradient;
    }

    warn!("logistic regression stopped after {} iterations without converging", MAX_ITER);
    Ok(w)
}

/// `-H * g` for the inverse Hessian approximation held in `history`.
fn two_loop(gradient: &Array1<f64>, history: &VecDeque<(Array1<f64>, Array1<f64>, f64)>) -> Array1<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * s.dot(&q);
        q.scaled_add(-alpha, y);
        alphas.push(alpha);
    }
    if let Some((s, y, _)) = history.back() {
        q *= s.dot(y) / y.dot(y);
    }
    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * y.dot(&q);
        q.scaled_add(alpha - beta, s);
    }
    q.mapv_into(|v| -v)
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}
