#![allow(dead_code)]

use chrono::NaiveDate;
use portfolio_backtester::domain::error::PortfolioError;
pub use portfolio_backtester::domain::price::{InstrumentInfo, PricePoint};
use portfolio_backtester::domain::screening::CandidateFilter;
use portfolio_backtester::ports::data_port::{
    CandidateRow, DataPort, check_all_found, order_by_names,
};
use std::collections::HashMap;

pub const SERIES_LEN: usize = 120;

pub struct MockDataPort {
    pub instruments: Vec<InstrumentInfo>,
    pub prices: HashMap<String, Vec<PricePoint>>,
    pub benchmark: Vec<PricePoint>,
    pub errors: HashMap<String, String>,
    pub benchmark_error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
            prices: HashMap::new(),
            benchmark: Vec::new(),
            errors: HashMap::new(),
            benchmark_error: None,
        }
    }

    pub fn with_instrument(mut self, info: InstrumentInfo, points: Vec<PricePoint>) -> Self {
        self.prices.insert(info.code.clone(), points);
        self.instruments.push(info);
        self
    }

    /// Listed in `stock_analysis` but without any price rows.
    pub fn with_listing(mut self, info: InstrumentInfo) -> Self {
        self.instruments.push(info);
        self
    }

    pub fn with_benchmark(mut self, points: Vec<PricePoint>) -> Self {
        self.benchmark = points;
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn with_benchmark_error(mut self, reason: &str) -> Self {
        self.benchmark_error = Some(reason.to_string());
        self
    }
}

fn in_window(points: &[PricePoint], start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
    points
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .copied()
        .collect()
}

impl DataPort for MockDataPort {
    fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateRow>, PortfolioError> {
        let mut rows: Vec<CandidateRow> = self
            .instruments
            .iter()
            .filter(|r| {
                r.dividend_yield >= filter.min_dividend
                    && r.liquidity >= filter.min_liquidity
                    && r.volatility <= filter.max_volatility
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.annual_return.total_cmp(&a.annual_return));
        rows.truncate(filter.limit);
        Ok(rows)
    }

    fn fetch_by_names(&self, names: &[String]) -> Result<Vec<CandidateRow>, PortfolioError> {
        let rows: Vec<CandidateRow> = self
            .instruments
            .iter()
            .filter(|r| names.contains(&r.name))
            .cloned()
            .collect();
        check_all_found(names, &rows)?;
        Ok(order_by_names(names, rows))
    }

    fn fetch_price_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(PortfolioError::PriceUnavailable {
                code: code.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .prices
            .get(code)
            .map(|p| in_window(p, start_date, end_date))
            .unwrap_or_default())
    }

    fn fetch_benchmark(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        if let Some(reason) = &self.benchmark_error {
            return Err(PortfolioError::Database {
                reason: reason.clone(),
            });
        }
        Ok(in_window(&self.benchmark, start_date, end_date))
    }

    fn search_names(&self, fragment: &str) -> Result<Vec<CandidateRow>, PortfolioError> {
        let mut rows: Vec<CandidateRow> = self
            .instruments
            .iter()
            .filter(|r| r.name.contains(fragment))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn list_names(&self) -> Result<Vec<String>, PortfolioError> {
        let mut names: Vec<String> = self.instruments.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn start() -> NaiveDate {
    date("2023-01-02")
}

pub fn end() -> NaiveDate {
    start() + chrono::Duration::days(SERIES_LEN as i64 - 1)
}

/// Compounded daily series: `r_i = drift + amp * sin(freq * i + phase)`.
pub fn series(base: f64, drift: f64, amp: f64, freq: f64, phase: f64) -> Vec<PricePoint> {
    let mut close = base;
    (0..SERIES_LEN)
        .map(|i| {
            if i > 0 {
                close *= 1.0 + drift + amp * (freq * i as f64 + phase).sin();
            }
            PricePoint::new(start() + chrono::Duration::days(i as i64), close)
        })
        .collect()
}

pub fn instrument(code: &str, name: &str, annual_return: f64, dividend_yield: f64) -> InstrumentInfo {
    InstrumentInfo {
        code: code.to_string(),
        name: name.to_string(),
        annual_return,
        volatility: 0.10,
        dividend_yield,
        liquidity: 1.0e12,
    }
}

pub fn alpha() -> (InstrumentInfo, Vec<PricePoint>) {
    (
        instrument("A001", "Alpha", 0.20, 0.030),
        series(10_000.0, 0.0012, 0.010, 0.70, 0.0),
    )
}

pub fn beta() -> (InstrumentInfo, Vec<PricePoint>) {
    (
        instrument("B002", "Beta", 0.15, 0.025),
        series(52_000.0, 0.0008, 0.012, 1.30, 0.4),
    )
}

pub fn gamma() -> (InstrumentInfo, Vec<PricePoint>) {
    (
        instrument("C003", "Gamma", 0.10, 0.040),
        series(3_500.0, 0.0005, 0.006, 2.10, 1.1),
    )
}

pub fn benchmark_series() -> Vec<PricePoint> {
    series(2_500.0, 0.0004, 0.008, 0.90, 0.3)
}

/// Three healthy instruments and a benchmark over the whole window.
pub fn standard_port() -> MockDataPort {
    let (a, ap) = alpha();
    let (b, bp) = beta();
    let (c, cp) = gamma();
    MockDataPort::new()
        .with_instrument(a, ap)
        .with_instrument(b, bp)
        .with_instrument(c, cp)
        .with_benchmark(benchmark_series())
}
