//! Box-constrained nonlinear least squares.
//!
//! Minimizes `0.5 * ||f(x)||^2` subject to `lower <= x <= upper` with a
//! projected Levenberg-Marquardt iteration:
//!
//! ```text
//! (J_F^T J_F + λ D) δ = -J_F^T r      F = free variables
//! x ← clamp(x + δ, lower, upper)
//! ```
//!
//! A variable sitting on a bound whose gradient points out of the box is
//! held fixed for the step. Every trial point is projected onto the box
//! before `f` is evaluated, so `f` never sees an infeasible `x`.

use crate::error::ModelError;
use faer::{Mat, linalg::solvers::Solve};
use serde::Serialize;

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;

/// Options for the bounded least squares solver.
#[derive(Debug, Clone)]
pub struct LeastSquaresOptions {
    /// Maximum number of outer iterations (Jacobian evaluations)
    pub max_iter: usize,
    /// Relative cost reduction below which the fit is converged
    pub f_tol: f64,
    /// Relative step size below which the fit is converged
    pub x_tol: f64,
    /// Projected gradient (inf-norm) below which the fit is converged
    pub g_tol: f64,
    /// Relative step for the forward-difference Jacobian
    pub diff_step: f64,
    /// Initial Levenberg-Marquardt damping
    pub initial_damping: f64,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            f_tol: 1e-8,
            x_tol: 1e-8,
            g_tol: 1e-8,
            diff_step: f64::EPSILON.sqrt(),
            initial_damping: 1e-3,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ZeroResidual,
    GradientTolerance,
    CostTolerance,
    StepTolerance,
    MaxIterations,
    /// No damping level produced a cost decrease.
    Stalled,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        !matches!(self, Self::MaxIterations | Self::Stalled)
    }
}

/// Result from bounded least squares.
#[derive(Debug, Clone)]
pub struct LeastSquaresResult {
    /// Best parameters found, always within the bounds
    pub x: Vec<f64>,
    /// Residual vector at `x`
    pub residuals: Vec<f64>,
    /// `0.5 * sum(residuals^2)`
    pub cost: f64,
    pub iterations: usize,
    /// Number of residual evaluations
    pub nfev: usize,
    pub converged: bool,
    pub status: Termination,
}

/// Solve `min 0.5 * ||fun(x)||^2` subject to `lower <= x <= upper`.
///
/// `x0` is projected onto the box first. Non-convergence is reported through
/// [`LeastSquaresResult::converged`]; errors only come from invalid input or
/// from `fun` itself.
pub fn least_squares<F>(
    mut fun: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &LeastSquaresOptions,
) -> Result<LeastSquaresResult, ModelError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, ModelError>,
{
    let n = x0.len();
    if n == 0 {
        return Err(ModelError::EmptyModel);
    }
    for len in [lower.len(), upper.len()] {
        if len != n {
            return Err(ModelError::ParameterLengthMismatch {
                expected: n,
                actual: len,
            });
        }
    }
    for (index, (&lo, &hi)) in lower.iter().zip(upper).enumerate() {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(ModelError::InvalidBounds {
                index,
                lower: lo,
                upper: hi,
            });
        }
    }

    let mut x: Vec<f64> = x0
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect();
    let mut r = fun(&x)?;
    let mut nfev = 1;
    let mut cost = half_squared_norm(&r);
    let mut damping = options.initial_damping;
    let mut iterations = 0;

    let mut status = if cost == 0.0 {
        Some(Termination::ZeroResidual)
    } else {
        None
    };

    while status.is_none() && iterations < options.max_iter {
        iterations += 1;

        let jac = forward_jacobian(&mut fun, &x, &r, lower, upper, options.diff_step, &mut nfev)?;
        let grad: Vec<f64> = jac.iter().map(|col| dot(col, &r)).collect();

        let free: Vec<usize> = (0..n)
            .filter(|&j| !pinned(x[j], grad[j], lower[j], upper[j]))
            .collect();
        let projected_grad = free.iter().map(|&j| grad[j].abs()).fold(0.0, f64::max);
        if projected_grad <= options.g_tol {
            status = Some(Termination::GradientTolerance);
            break;
        }

        let k = free.len();
        let mut normal = Mat::<f64>::zeros(k, k);
        for (a, &ja) in free.iter().enumerate() {
            for (b, &jb) in free.iter().enumerate().skip(a) {
                let value = dot(&jac[ja], &jac[jb]);
                normal[(a, b)] = value;
                normal[(b, a)] = value;
            }
        }
        let mut rhs = Mat::<f64>::zeros(k, 1);
        for (a, &j) in free.iter().enumerate() {
            rhs[(a, 0)] = -grad[j];
        }

        // Marquardt scaling; zero columns get unit scale so the system stays regular.
        let max_diag = (0..k).map(|a| normal[(a, a)]).fold(0.0, f64::max);
        let floor = if max_diag > 0.0 {
            max_diag * 1e-12
        } else {
            1.0
        };
        let scale: Vec<f64> = (0..k).map(|a| normal[(a, a)].max(floor)).collect();

        let mut settled = false;
        while damping <= MAX_DAMPING {
            let mut lhs = normal.clone();
            for (a, s) in scale.iter().enumerate() {
                lhs[(a, a)] += damping * s;
            }
            let step = lhs.as_ref().full_piv_lu().solve(&rhs);

            let mut candidate = x.clone();
            let mut finite = true;
            for (a, &j) in free.iter().enumerate() {
                let delta = step[(a, 0)];
                finite &= delta.is_finite();
                candidate[j] = (x[j] + delta).clamp(lower[j], upper[j]);
            }
            if !finite {
                damping *= 10.0;
                continue;
            }

            let step_norm = distance(&candidate, &x);
            let x_norm = norm(&x);
            let small_step = step_norm <= options.x_tol * (options.x_tol + x_norm);

            let candidate_r = fun(&candidate)?;
            nfev += 1;
            let candidate_cost = half_squared_norm(&candidate_r);
            if candidate_cost.is_finite() && candidate_cost < cost {
                let reduction = cost - candidate_cost;
                let previous_cost = cost;

                x = candidate;
                r = candidate_r;
                cost = candidate_cost;
                damping = (damping * 0.1).max(MIN_DAMPING);
                settled = true;

                if cost == 0.0 {
                    status = Some(Termination::ZeroResidual);
                } else if reduction <= options.f_tol * previous_cost {
                    status = Some(Termination::CostTolerance);
                } else if small_step {
                    status = Some(Termination::StepTolerance);
                }
                break;
            }
            if small_step {
                // Damping has shrunk the step below tolerance without a decrease.
                status = Some(Termination::StepTolerance);
                settled = true;
                break;
            }
            damping *= 10.0;
        }

        if !settled {
            status = Some(Termination::Stalled);
        }
    }

    let status = status.unwrap_or(Termination::MaxIterations);
    Ok(LeastSquaresResult {
        x,
        residuals: r,
        cost,
        iterations,
        nfev,
        converged: status.is_converged(),
        status,
    })
}

/// Forward-difference Jacobian, one column per parameter. Steps point into
/// the box when a forward step would leave it.
fn forward_jacobian<F>(
    fun: &mut F,
    x: &[f64],
    r: &[f64],
    lower: &[f64],
    upper: &[f64],
    rel_step: f64,
    nfev: &mut usize,
) -> Result<Vec<Vec<f64>>, ModelError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, ModelError>,
{
    let mut columns = Vec::with_capacity(x.len());
    let mut probe = x.to_vec();
    for j in 0..x.len() {
        let mut h = rel_step * x[j].abs().max(1.0);
        if x[j] + h > upper[j] {
            h = if x[j] - h >= lower[j] {
                -h
            } else if upper[j] - x[j] >= x[j] - lower[j] {
                upper[j] - x[j]
            } else {
                lower[j] - x[j]
            };
        }
        if h == 0.0 {
            columns.push(vec![0.0; r.len()]);
            continue;
        }

        probe[j] = x[j] + h;
        let shifted = fun(&probe)?;
        *nfev += 1;
        probe[j] = x[j];

        if shifted.len() != r.len() {
            return Err(ModelError::ParameterLengthMismatch {
                expected: r.len(),
                actual: shifted.len(),
            });
        }
        columns.push(shifted.iter().zip(r).map(|(a, b)| (a - b) / h).collect());
    }
    Ok(columns)
}

fn pinned(x: f64, grad: f64, lower: f64, upper: f64) -> bool {
    (x <= lower && grad > 0.0) || (x >= upper && grad < 0.0)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn half_squared_norm(r: &[f64]) -> f64 {
    0.5 * dot(r, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn linear_fit(x: &[f64]) -> Result<Vec<f64>, ModelError> {
        // y = 2 t + 1 sampled at t = 0..5
        Ok((0..5)
            .map(|t| {
                let t = t as f64;
                (2.0 * t + 1.0) - (x[0] * t + x[1])
            })
            .collect())
    }

    #[test]
    fn recovers_unconstrained_linear_fit() -> Result<(), ModelError> {
        let inf = f64::INFINITY;
        let result = least_squares(
            linear_fit,
            &[0.0, 0.0],
            &[-inf, -inf],
            &[inf, inf],
            &LeastSquaresOptions::default(),
        )?;

        assert!(result.converged);
        assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn recovers_exponential_decay() -> Result<(), ModelError> {
        let ts: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 2.0 * (-0.5 * t).exp()).collect();
        let fun = |p: &[f64]| -> Result<Vec<f64>, ModelError> {
            Ok(ts
                .iter()
                .zip(&ys)
                .map(|(&t, &y)| y - p[0] * (-p[1] * t).exp())
                .collect())
        };

        let result = least_squares(
            fun,
            &[1.0, 1.0],
            &[0.0, 0.0],
            &[10.0, 10.0],
            &LeastSquaresOptions::default(),
        )?;

        assert!(result.converged);
        assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(result.x[1], 0.5, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn active_bound_holds_solution_on_the_box() -> Result<(), ModelError> {
        // Unconstrained optimum is x = -3; the box forces x >= 0.
        let fun = |x: &[f64]| -> Result<Vec<f64>, ModelError> { Ok(vec![x[0] + 3.0]) };

        let result = least_squares(
            fun,
            &[1.0],
            &[0.0],
            &[f64::INFINITY],
            &LeastSquaresOptions::default(),
        )?;

        assert_eq!(result.x[0], 0.0);
        assert!(result.converged);
        assert_eq!(result.status, Termination::GradientTolerance);
        assert_abs_diff_eq!(result.cost, 4.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn evaluations_never_leave_the_box() -> Result<(), ModelError> {
        let mut seen_outside = false;
        let fun = |x: &[f64]| -> Result<Vec<f64>, ModelError> {
            if x[0] < -1.0 || x[0] > 1.0 || x[1] < 0.0 {
                seen_outside = true;
            }
            Ok(vec![x[0] - 5.0, x[1] + 2.0, x[0] * x[1] - 1.0])
        };

        let result = least_squares(
            fun,
            &[0.9, 0.1],
            &[-1.0, 0.0],
            &[1.0, f64::INFINITY],
            &LeastSquaresOptions::default(),
        )?;

        assert!(!seen_outside);
        assert!(result.x[0] <= 1.0 && result.x[0] >= -1.0);
        assert!(result.x[1] >= 0.0);
        Ok(())
    }

    #[test]
    fn initial_guess_is_projected() -> Result<(), ModelError> {
        let fun = |x: &[f64]| -> Result<Vec<f64>, ModelError> { Ok(vec![x[0] - 0.5]) };

        let result = least_squares(
            fun,
            &[7.0],
            &[-1.0],
            &[1.0],
            &LeastSquaresOptions::default(),
        )?;

        assert_abs_diff_eq!(result.x[0], 0.5, epsilon = 1e-8);
        Ok(())
    }

    #[test]
    fn iteration_budget_reports_non_convergence() -> Result<(), ModelError> {
        let inf = f64::INFINITY;
        let fun = |p: &[f64]| -> Result<Vec<f64>, ModelError> {
            // Rosenbrock
            Ok(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        };
        let options = LeastSquaresOptions {
            max_iter: 1,
            ..LeastSquaresOptions::default()
        };

        let result = least_squares(fun, &[-1.2, 1.0], &[-inf, -inf], &[inf, inf], &options)?;

        assert_eq!(result.iterations, 1);
        assert_eq!(result.status, Termination::MaxIterations);
        assert!(!result.converged);
        Ok(())
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let fun = |x: &[f64]| -> Result<Vec<f64>, ModelError> { Ok(x.to_vec()) };

        let result = least_squares(
            fun,
            &[0.0],
            &[1.0],
            &[-1.0],
            &LeastSquaresOptions::default(),
        );

        assert!(matches!(
            result,
            Err(ModelError::InvalidBounds { index: 0, .. })
        ));
    }

    #[test]
    fn empty_parameter_vector_is_rejected() {
        let fun = |_: &[f64]| -> Result<Vec<f64>, ModelError> { Ok(vec![1.0]) };

        let result = least_squares(fun, &[], &[], &[], &LeastSquaresOptions::default());

        assert!(matches!(result, Err(ModelError::EmptyModel)));
    }
}
