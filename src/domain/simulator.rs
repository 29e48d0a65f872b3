//! Buy-and-hold simulation of an allocation against the benchmark.

use crate::domain::allocation::Allocation;
use crate::domain::error::PortfolioError;
use crate::domain::price_set::PriceSet;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

/// Daily values of the portfolio and the capital-scaled benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub dates: Vec<NaiveDate>,
    pub portfolio: Vec<f64>,
    pub benchmark: Vec<f64>,
    /// Units bought on the first date, in allocation order.
    #[serde(skip)]
    pub units: Vec<(String, f64)>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn final_portfolio_value(&self) -> Option<f64> {
        self.portfolio.last().copied()
    }

    pub fn final_benchmark_value(&self) -> Option<f64> {
        self.benchmark.last().copied()
    }
}

/// Buys `capital * weight / price` units of each instrument on the first date,
/// holds them to the end, and scales the benchmark to the same capital.
pub fn run(price_set: &PriceSet, allocation: &Allocation) -> Result<Trajectory, PortfolioError> {
    if price_set.len() < 2 {
        return Err(PortfolioError::InsufficientHistory {
            reason: format!(
                "{} aligned dates; a simulation needs at least 2",
                price_set.len()
            ),
        });
    }
    let capital = price_set.initial_capital();

    let mut holdings: Vec<(&[f64], f64)> = Vec::with_capacity(allocation.len());
    let mut units = Vec::with_capacity(allocation.len());
    for w in allocation.weights() {
        let column = price_set.column(&w.code).ok_or_else(|| {
            PortfolioError::InconsistentAllocation {
                code: w.code.clone(),
            }
        })?;
        let qty = capital * w.weight / column[0];
        holdings.push((column, qty));
        units.push((w.code.clone(), qty));
    }

    let portfolio: Vec<f64> = (0..price_set.len())
        .map(|t| holdings.iter().map(|(col, qty)| qty * col[t]).sum())
        .collect();

    let bench = price_set.benchmark();
    let base = bench[0];
    let benchmark: Vec<f64> = bench.iter().map(|b| capital * b / base).collect();

    debug!(
        days = portfolio.len(),
        final_value = portfolio.last().copied().unwrap_or(capital),
        "simulation complete"
    );

    Ok(Trajectory {
        dates: price_set.dates().to_vec(),
        portfolio,
        benchmark,
        units,
    })
}
