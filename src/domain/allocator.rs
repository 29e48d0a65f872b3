//! Minimum-variance allocation over a PriceSet.

use crate::domain::allocation::{Allocation, AllocationConstraints, Weight};
use crate::domain::analyzer::TRADING_DAYS_PER_YEAR;
use crate::domain::error::PortfolioError;
use crate::domain::price_set::PriceSet;
use crate::domain::solver::{QpProblem, SolverSettings, solve_min_variance};
use tracing::{debug, info};

/// Annualized expected returns and covariance of daily simple returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub expected_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

/// Estimates annualized moments from the aligned price columns.
///
/// Needs at least two daily returns per instrument (three dates).
pub fn estimate_moments(price_set: &PriceSet) -> Result<Moments, PortfolioError> {
    if price_set.len() < 3 {
        return Err(PortfolioError::InsufficientHistory {
            reason: format!(
                "{} aligned dates; at least 3 are needed to estimate covariance",
                price_set.len()
            ),
        });
    }

    let returns: Vec<Vec<f64>> = (0..price_set.instrument_count())
        .map(|i| price_set.returns_at(i))
        .collect();
    let periods = returns[0].len() as f64;
    let means: Vec<f64> = returns
        .iter()
        .map(|r| r.iter().sum::<f64>() / periods)
        .collect();

    let n = returns.len();
    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let cov = returns[i]
                .iter()
                .zip(&returns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum::<f64>()
                / (periods - 1.0)
                * TRADING_DAYS_PER_YEAR;
            covariance[i][j] = cov;
            covariance[j][i] = cov;
        }
    }

    Ok(Moments {
        expected_returns: means.iter().map(|m| m * TRADING_DAYS_PER_YEAR).collect(),
        covariance,
    })
}

/// Computes the long-only minimum-variance weights for every instrument in
/// `price_set` subject to `constraints`.
///
/// `risk_free_rate` only feeds the ex-ante Sharpe ratio that is logged.
pub fn allocate(
    price_set: &PriceSet,
    constraints: &AllocationConstraints,
    risk_free_rate: f64,
    settings: &SolverSettings,
) -> Result<Allocation, PortfolioError> {
    constraints.validate()?;
    let codes: Vec<String> = price_set.codes().map(str::to_string).collect();

    if codes.len() == 1 {
        debug!(code = %codes[0], "single instrument, allocating full weight");
        return Allocation::new(vec![Weight {
            code: codes[0].clone(),
            weight: 1.0,
        }]);
    }
    check_budget_feasible(codes.len(), constraints)?;

    let moments = estimate_moments(price_set)?;
    let allocation = allocate_with_moments(&codes, &moments, constraints, settings)?;

    let weights: Vec<f64> = allocation.weights().iter().map(|w| w.weight).collect();
    let expected: f64 = weights
        .iter()
        .zip(&moments.expected_returns)
        .map(|(w, m)| w * m)
        .sum();
    let variance: f64 = (0..weights.len())
        .map(|i| {
            (0..weights.len())
                .map(|j| weights[i] * moments.covariance[i][j] * weights[j])
                .sum::<f64>()
        })
        .sum();
    let ex_ante_sharpe = if variance > 0.0 {
        (expected - risk_free_rate) / variance.sqrt()
    } else {
        0.0
    };
    info!(
        instruments = weights.len(),
        expected_return = expected,
        volatility = variance.max(0.0).sqrt(),
        ex_ante_sharpe,
        "allocation computed"
    );
    Ok(allocation)
}

/// Solves the allocation for pre-computed moments. `codes[i]` names row `i`.
pub fn allocate_with_moments(
    codes: &[String],
    moments: &Moments,
    constraints: &AllocationConstraints,
    settings: &SolverSettings,
) -> Result<Allocation, PortfolioError> {
    constraints.validate()?;
    if codes.is_empty() || codes.len() != moments.expected_returns.len() {
        return Err(PortfolioError::Computation {
            reason: format!(
                "{} codes for {} moment rows",
                codes.len(),
                moments.expected_returns.len()
            ),
        });
    }
    if codes.len() == 1 {
        return Allocation::new(vec![Weight {
            code: codes[0].clone(),
            weight: 1.0,
        }]);
    }
    check_budget_feasible(codes.len(), constraints)?;

    let solution = solve_min_variance(
        &QpProblem {
            covariance: &moments.covariance,
            expected_returns: &moments.expected_returns,
            lower: constraints.min_weight,
            upper: constraints.max_weight,
            target_return: constraints.target_return,
        },
        settings,
    )?;
    debug!(iterations = solution.iterations, "solver finished");

    let mut weights = solution.weights;
    clip_and_rebalance(
        &mut weights,
        constraints.min_weight,
        constraints.max_weight,
    );

    Allocation::new(
        codes
            .iter()
            .zip(weights)
            .map(|(code, weight)| Weight {
                code: code.clone(),
                weight,
            })
            .collect(),
    )
}

fn check_budget_feasible(
    n: usize,
    constraints: &AllocationConstraints,
) -> Result<(), PortfolioError> {
    let n_f = n as f64;
    if constraints.min_weight * n_f > 1.0 + 1e-12 {
        return Err(PortfolioError::InfeasibleConstraints {
            reason: format!(
                "min_weight {} x {n} instruments exceeds full allocation",
                constraints.min_weight
            ),
        });
    }
    if constraints.max_weight * n_f < 1.0 - 1e-12 {
        return Err(PortfolioError::InfeasibleConstraints {
            reason: format!(
                "max_weight {} x {n} instruments cannot reach full allocation",
                constraints.max_weight
            ),
        });
    }
    Ok(())
}

/// Clips to `[lower, upper]` and spreads any residual over the remaining slack
/// so that the weights sum to one without leaving the box.
fn clip_and_rebalance(weights: &mut [f64], lower: f64, upper: f64) {
    for w in weights.iter_mut() {
        *w = w.clamp(lower, upper);
    }
    let residual = 1.0 - weights.iter().sum::<f64>();
    if residual == 0.0 {
        return;
    }
    let slack: Vec<f64> = weights
        .iter()
        .map(|w| if residual > 0.0 { upper - w } else { w - lower })
        .collect();
    let total: f64 = slack.iter().sum();
    if total <= 0.0 {
        return;
    }
    for (w, s) in weights.iter_mut().zip(slack) {
        *w += residual * s / total;
    }
}
