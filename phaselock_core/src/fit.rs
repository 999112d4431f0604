//! Levenberg–Marquardt least squares over a [`CurveModel`].
//!
//! Normal equations `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr` are solved with nalgebra
//! (Cholesky, LU fallback). Parameters outside the free mask stay fixed.
use crate::error::FitError;
use crate::model::CurveModel;
use nalgebra::{DMatrix, DVector};

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
const DIAG_FLOOR: f64 = 1e-30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Upper bound on model evaluations (each evaluation covers all points).
    pub max_evaluations: usize,
    /// Relative cost reduction at which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size at which the solver counts as converged.
    pub xtol: f64,
    /// Scaled gradient norm at which the solver counts as converged.
    pub gtol: f64,
    pub initial_damping: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub params: Vec<f64>,
    pub iterations: usize,
    pub evaluations: usize,
    /// ½·Σr² at the solution.
    pub cost: f64,
    pub r_squared: f64,
}

struct Problem<'a, M> {
    model: &'a M,
    x: &'a [f64],
    y: &'a [f64],
    free: Vec<usize>,
}

struct Linearization {
    residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
    cost: f64,
}

impl<M: CurveModel> Problem<'_, M> {
    /// Residuals `y − f` and the Jacobian of `f` over the free parameters.
    fn linearize(&self, params: &[f64]) -> Result<Linearization, FitError> {
        let n = self.x.len();
        let mut residuals = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, self.free.len());
        let mut grad = vec![0.0; params.len()];
        for (i, (&xi, &yi)) in self.x.iter().zip(self.y).enumerate() {
            let f = self.model.value_and_gradient(xi, params, &mut grad);
            let r = yi - f;
            if !r.is_finite() {
                return Err(FitError::NonFinite);
            }
            residuals[i] = r;
            for (col, &p) in self.free.iter().enumerate() {
                if !grad[p].is_finite() {
                    return Err(FitError::NonFinite);
                }
                jacobian[(i, col)] = grad[p];
            }
        }
        let cost = 0.5 * residuals.norm_squared();
        Ok(Linearization {
            residuals,
            jacobian,
            cost,
        })
    }
}

fn solve(normal: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    normal
        .clone()
        .cholesky()
        .map(|c| c.solve(rhs))
        .or_else(|| normal.clone().lu().solve(rhs))
        .filter(|d| d.iter().all(|v| v.is_finite()))
}

fn r_squared(y: &[f64], cost: f64) -> f64 {
    let n = y.len() as f64;
    let mean = y.iter().sum::<f64>() / n;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res = 2.0 * cost;
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Fit `model` to `(x, y)` starting from `initial`, varying only the
/// parameters whose `free` flag is set.
pub fn levenberg_marquardt<M: CurveModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    free: &[bool],
    opts: &FitOptions,
) -> Result<FitReport, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    debug_assert_eq!(initial.len(), model.param_count());
    debug_assert_eq!(free.len(), model.param_count());

    let problem = Problem {
        model,
        x,
        y,
        free: free
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect(),
    };
    let m = problem.free.len();
    let needed = m.max(1);
    if x.len() < needed {
        return Err(FitError::InsufficientData {
            needed,
            got: x.len(),
        });
    }

    let mut params = initial.to_vec();
    let mut lin = problem.linearize(&params)?;
    let mut evaluations = 1;
    let mut iterations = 0;
    let mut lambda = opts.initial_damping;

    let finish = |params: Vec<f64>, lin: &Linearization, iterations, evaluations| FitReport {
        r_squared: r_squared(y, lin.cost),
        params,
        iterations,
        evaluations,
        cost: lin.cost,
    };

    if m == 0 {
        return Ok(finish(params, &lin, iterations, evaluations));
    }

    loop {
        if lin.cost == 0.0 {
            return Ok(finish(params, &lin, iterations, evaluations));
        }
        iterations += 1;
        let jtj = lin.jacobian.tr_mul(&lin.jacobian);
        let jtr = lin.jacobian.tr_mul(&lin.residuals);

        // Cosine between residual and Jacobian columns.
        let rnorm = lin.residuals.norm();
        let gnorm = (0..m)
            .map(|j| {
                let col = jtj[(j, j)].sqrt();
                if col > 0.0 { (jtr[j] / (col * rnorm)).abs() } else { 0.0 }
            })
            .fold(0.0, f64::max);
        if gnorm <= opts.gtol {
            tracing::trace!(iterations, evaluations, "converged on gradient");
            return Ok(finish(params, &lin, iterations, evaluations));
        }

        let pnorm = problem
            .free
            .iter()
            .map(|&p| params[p] * params[p])
            .sum::<f64>()
            .sqrt();

        loop {
            if evaluations >= opts.max_evaluations {
                return Err(FitError::NoConvergence { evaluations });
            }
            if lambda > LAMBDA_MAX {
                return Err(FitError::Stalled);
            }

            let mut damped = jtj.clone();
            for j in 0..m {
                damped[(j, j)] += lambda * jtj[(j, j)].max(DIAG_FLOOR);
            }
            let Some(delta) = solve(&damped, &jtr) else {
                lambda *= 10.0;
                continue;
            };
            let step_small = delta.norm() <= opts.xtol * (pnorm + opts.xtol);

            let mut trial = params.clone();
            for (col, &p) in problem.free.iter().enumerate() {
                trial[p] += delta[col];
            }
            evaluations += 1;
            let candidate = match problem.linearize(&trial) {
                Ok(c) if c.cost < lin.cost => Some(c),
                Ok(_) | Err(FitError::NonFinite) => None,
                Err(e) => return Err(e),
            };

            match candidate {
                Some(next) => {
                    let reduction = (lin.cost - next.cost) / lin.cost;
                    params = trial;
                    lin = next;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    if reduction <= opts.ftol || step_small {
                        tracing::trace!(iterations, evaluations, "converged on cost/step");
                        return Ok(finish(params, &lin, iterations, evaluations));
                    }
                    break;
                }
                None if step_small => {
                    // Cannot improve even with a vanishing step: at the minimum.
                    tracing::trace!(iterations, evaluations, "converged on step size");
                    return Ok(finish(params, &lin, iterations, evaluations));
                }
                None => lambda *= 10.0,
            }
        }
    }
}
