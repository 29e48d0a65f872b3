//! Performance metrics for a simulated run.

use crate::domain::allocation::Allocation;
use crate::domain::error::PortfolioError;
use crate::domain::price_set::{PriceSet, simple_returns};
use crate::domain::simulator::Trajectory;
use serde::{Deserialize, Serialize};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Statistics computed identically for any value series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub final_value: f64,
    pub total_return: f64,
    pub annual_volatility: f64,
    /// Zero when the series has no volatility.
    pub sharpe_ratio: f64,
    /// Worst peak-to-trough decline; never positive.
    pub max_drawdown: f64,
    pub win_rate: f64,
}

impl SeriesStats {
    pub fn compute(values: &[f64], risk_free_rate: f64) -> Self {
        let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
            return Self {
                final_value: 0.0,
                total_return: 0.0,
                annual_volatility: 0.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
                win_rate: 0.0,
            };
        };
        let total_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };

        let returns = simple_returns(values);
        let (mean, stddev) = mean_and_sample_stddev(&returns);
        let annual_volatility = stddev * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe_ratio = if annual_volatility > 0.0 {
            (mean * TRADING_DAYS_PER_YEAR - risk_free_rate) / annual_volatility
        } else {
            0.0
        };

        let win_rate = if returns.is_empty() {
            0.0
        } else {
            returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
        };

        Self {
            final_value: last,
            total_return,
            annual_volatility,
            sharpe_ratio,
            max_drawdown: max_drawdown(values),
            win_rate,
        }
    }
}

fn mean_and_sample_stddev(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    if returns.len() < 2 {
        return (mean, 0.0);
    }
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.min(v / peak - 1.0);
        }
    }
    worst
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionEntry {
    pub code: String,
    pub name: String,
    pub weight: f64,
    pub dividend_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub composition: Vec<CompositionEntry>,
    pub final_value: f64,
    pub total_return: f64,
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub final_value: f64,
    pub total_return: f64,
    pub annual_volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualStock {
    pub code: String,
    pub name: String,
    #[serde(rename = "return")]
    pub total_return: f64,
    pub volatility: f64,
}

/// Terminal result of a run, serialized as-is to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub portfolio: PortfolioMetrics,
    pub benchmark: BenchmarkMetrics,
    pub individual_stocks: Vec<IndividualStock>,
}

pub fn summarize(
    price_set: &PriceSet,
    allocation: &Allocation,
    trajectory: &Trajectory,
    risk_free_rate: f64,
) -> Result<Metrics, PortfolioError> {
    let composition = allocation
        .weights()
        .iter()
        .map(|w| {
            let info = price_set.info(&w.code).ok_or_else(|| {
                PortfolioError::InconsistentAllocation {
                    code: w.code.clone(),
                }
            })?;
            Ok(CompositionEntry {
                code: info.code.clone(),
                name: info.name.clone(),
                weight: w.weight,
                dividend_yield: info.dividend_yield,
            })
        })
        .collect::<Result<Vec<_>, PortfolioError>>()?;

    let p = SeriesStats::compute(&trajectory.portfolio, risk_free_rate);
    let b = SeriesStats::compute(&trajectory.benchmark, risk_free_rate);

    let individual_stocks = price_set
        .instruments()
        .iter()
        .enumerate()
        .map(|(i, info)| {
            let s = SeriesStats::compute(price_set.column_at(i), risk_free_rate);
            IndividualStock {
                code: info.code.clone(),
                name: info.name.clone(),
                total_return: s.total_return,
                volatility: s.annual_volatility,
            }
        })
        .collect();

    Ok(Metrics {
        portfolio: PortfolioMetrics {
            composition,
            final_value: p.final_value,
            total_return: p.total_return,
            annual_volatility: p.annual_volatility,
            sharpe_ratio: p.sharpe_ratio,
            max_drawdown: p.max_drawdown,
            win_rate: p.win_rate,
        },
        benchmark: BenchmarkMetrics {
            final_value: b.final_value,
            total_return: b.total_return,
            annual_volatility: b.annual_volatility,
        },
        individual_stocks,
    })
}
