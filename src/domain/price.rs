//! Dated close prices and static instrument attributes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One adjusted close observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// A usable close is strictly positive and finite.
    pub fn is_valid(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

/// Static per-instrument attributes from the `stock_analysis` table.
///
/// Rates are fractions; `liquidity` is average daily traded value in currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub code: String,
    pub name: String,
    pub annual_return: f64,
    pub volatility: f64,
    pub dividend_yield: f64,
    pub liquidity: f64,
}

/// Sort by date and collapse duplicate dates, keeping the last observation.
pub fn normalize_series(mut points: Vec<PricePoint>) -> Vec<PricePoint> {
    points.sort_by_key(|p| p.date);
    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        match out.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => out.push(point),
        }
    }
    out
}
