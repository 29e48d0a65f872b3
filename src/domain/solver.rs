//! Bounded minimum-variance QP on top of the clarabel interior-point solver.
//!
//! minimize  wᵀΣw
//! subject to  Σw = 1,  lower ≤ wᵢ ≤ upper,  μᵀw ≥ target
//!
//! Σ only has to be positive semidefinite.

use crate::domain::error::PortfolioError;
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FEASIBILITY_TOL: f64 = 1e-10;
const SPARSITY_TOL: f64 = 1e-14;

/// Iteration and wall-clock budget for one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub timeout: Duration,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QpProblem<'a> {
    pub covariance: &'a [Vec<f64>],
    pub expected_returns: &'a [f64],
    pub lower: f64,
    pub upper: f64,
    pub target_return: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    pub weights: Vec<f64>,
    pub variance: f64,
    pub expected_return: f64,
    pub iterations: usize,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Largest expected return attainable on the box/budget polytope, and the
/// vertex that attains it: every weight at `lower`, the remaining budget poured
/// into the highest-return instruments up to `upper`.
pub fn max_return_vertex(mu: &[f64], lower: f64, upper: f64) -> (Vec<f64>, f64) {
    let n = mu.len();
    let mut w = vec![lower; n];
    let mut remaining = 1.0 - lower * n as f64;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| mu[b].total_cmp(&mu[a]));
    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let add = (upper - lower).min(remaining);
        w[i] += add;
        remaining -= add;
    }
    let ret = dot(&w, mu);
    (w, ret)
}

/// Upper triangle of `2Σ` in compressed-column form.
fn quadratic_term(sigma: &[Vec<f64>]) -> CscMatrix<f64> {
    let n = sigma.len();
    let mut data = Vec::new();
    let mut indices = Vec::new();
    let mut indptr = vec![0];
    for j in 0..n {
        for (i, row) in sigma.iter().enumerate().take(j + 1) {
            let val = 2.0 * row[j];
            if val.abs() > SPARSITY_TOL {
                data.push(val);
                indices.push(i);
            }
        }
        indptr.push(data.len());
    }
    CscMatrix::new(n, n, indptr, indices, data)
}

/// Constraint rows, in cone order:
///
/// ```text
/// row 0            1ᵀw        = 1        (zero cone)
/// rows 1..=n      -wᵢ        ≤ -lower    (nonnegative cone)
/// rows n+1..=2n    wᵢ        ≤ upper
/// row 2n+1        -μᵀw       ≤ -target
/// ```
fn constraint_rows(problem: &QpProblem<'_>) -> (CscMatrix<f64>, Vec<f64>) {
    let mu = problem.expected_returns;
    let n = mu.len();
    let mut data = Vec::new();
    let mut indices = Vec::new();
    let mut indptr = vec![0];
    for (j, m) in mu.iter().enumerate() {
        data.push(1.0);
        indices.push(0);
        data.push(-1.0);
        indices.push(1 + j);
        data.push(1.0);
        indices.push(1 + n + j);
        if m.abs() > SPARSITY_TOL {
            data.push(-m);
            indices.push(2 * n + 1);
        }
        indptr.push(data.len());
    }
    let a = CscMatrix::new(2 * n + 2, n, indptr, indices, data);

    let mut b = Vec::with_capacity(2 * n + 2);
    b.push(1.0);
    b.extend(std::iter::repeat_n(-problem.lower, n));
    b.extend(std::iter::repeat_n(problem.upper, n));
    b.push(-problem.target_return);
    (a, b)
}

pub fn solve_min_variance(
    problem: &QpProblem<'_>,
    settings: &SolverSettings,
) -> Result<QpSolution, PortfolioError> {
    let sigma = problem.covariance;
    let mu = problem.expected_returns;
    let n = mu.len();
    let (lo, hi, target) = (problem.lower, problem.upper, problem.target_return);

    if n == 0 {
        return Err(PortfolioError::Computation {
            reason: "empty problem".into(),
        });
    }
    if sigma.len() != n || sigma.iter().any(|row| row.len() != n) {
        return Err(PortfolioError::Computation {
            reason: format!("covariance matrix is not {n}x{n}"),
        });
    }
    if sigma.iter().flatten().chain(mu).any(|v| !v.is_finite()) {
        return Err(PortfolioError::Computation {
            reason: "non-finite moment estimate".into(),
        });
    }
    if lo * n as f64 > 1.0 + FEASIBILITY_TOL {
        return Err(PortfolioError::InfeasibleConstraints {
            reason: format!("min_weight {lo} x {n} instruments exceeds full allocation"),
        });
    }
    if hi * (n as f64) < 1.0 - FEASIBILITY_TOL {
        return Err(PortfolioError::InfeasibleConstraints {
            reason: format!("max_weight {hi} x {n} instruments cannot reach full allocation"),
        });
    }
    let (_, r_max) = max_return_vertex(mu, lo, hi);
    if r_max < target - FEASIBILITY_TOL {
        return Err(PortfolioError::InfeasibleConstraints {
            reason: format!(
                "target return {target:.4} exceeds the best attainable {r_max:.4} within the weight bounds"
            ),
        });
    }

    // The box has no interior; every instrument sits at the same bound.
    if hi - lo < FEASIBILITY_TOL {
        return Ok(finish(vec![1.0 / n as f64; n], sigma, mu, 0));
    }

    let p = quadratic_term(sigma);
    let q = vec![0.0; n];
    let (a, b) = constraint_rows(problem);
    let cones = [ZeroConeT(1), NonnegativeConeT(2 * n + 1)];

    let solver_settings = DefaultSettingsBuilder::default()
        .max_iter(u32::try_from(settings.max_iterations).unwrap_or(u32::MAX))
        .time_limit(settings.timeout.as_secs_f64())
        .verbose(false)
        .build()
        .map_err(|e| PortfolioError::Computation {
            reason: format!("solver settings: {e}"),
        })?;
    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, solver_settings).map_err(
        |e| PortfolioError::Computation {
            reason: format!("solver setup: {e:?}"),
        },
    )?;

    let started = Instant::now();
    solver.solve();
    let iterations = solver.solution.iterations as usize;

    match solver.solution.status {
        SolverStatus::Solved => {
            debug!(iterations, "minimum-variance solve converged");
            Ok(finish(solver.solution.x.clone(), sigma, mu, iterations))
        }
        SolverStatus::AlmostSolved => {
            warn!(iterations, "solver stopped at reduced accuracy");
            Ok(finish(solver.solution.x.clone(), sigma, mu, iterations))
        }
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            Err(PortfolioError::InfeasibleConstraints {
                reason: "no weight vector satisfies the bounds, budget and return target".into(),
            })
        }
        SolverStatus::MaxIterations | SolverStatus::MaxTime => {
            Err(PortfolioError::OptimizationTimeout {
                iterations,
                elapsed_ms: started.elapsed().as_millis(),
            })
        }
        status => Err(PortfolioError::Computation {
            reason: format!("solver stopped with status {status:?}"),
        }),
    }
}

fn finish(weights: Vec<f64>, sigma: &[Vec<f64>], mu: &[f64], iterations: usize) -> QpSolution {
    let variance = dot(&weights, &mat_vec(sigma, &weights));
    let expected_return = dot(&weights, mu);
    QpSolution {
        weights,
        variance,
        expected_return,
        iterations,
    }
}
