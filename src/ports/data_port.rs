//! Data access port trait: instrument screening, price history and benchmark.

use crate::domain::error::PortfolioError;
use crate::domain::price::{InstrumentInfo, PricePoint};
use crate::domain::screening::CandidateFilter;
use chrono::NaiveDate;

/// One row of the `stock_analysis` table.
pub type CandidateRow = InstrumentInfo;

/// Every backend (SQLite, PostgreSQL, CSV, test mocks) implements this trait.
///
/// Implementations must be safe for concurrent readers; the pipeline never
/// writes through it.
pub trait DataPort {
    /// Rows with `dividend_yield >= min_dividend`, `liquidity >= min_liquidity` and
    /// `volatility <= max_volatility`, best `annual_return` first, at most `limit`.
    ///
    /// An empty result is `Ok(vec![])`; the pipeline turns it into `NoCandidates`.
    fn fetch_candidates(&self, filter: &CandidateFilter)
    -> Result<Vec<CandidateRow>, PortfolioError>;

    /// Rows for the given instrument names, in the order given.
    ///
    /// Fails with `Validation` naming every name that has no row.
    fn fetch_by_names(&self, names: &[String]) -> Result<Vec<CandidateRow>, PortfolioError>;

    /// Daily closes for `code` within `[start_date, end_date]`, in date order.
    fn fetch_price_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError>;

    /// Daily benchmark index levels within `[start_date, end_date]`, in date order.
    fn fetch_benchmark(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError>;

    /// Rows whose name contains `fragment`.
    fn search_names(&self, fragment: &str) -> Result<Vec<CandidateRow>, PortfolioError>;

    /// Distinct instrument names, sorted.
    fn list_names(&self) -> Result<Vec<String>, PortfolioError>;
}

/// Reports names in `requested` with no matching row, as the error `fetch_by_names` returns.
pub fn check_all_found(requested: &[String], rows: &[CandidateRow]) -> Result<(), PortfolioError> {
    let missing: Vec<&str> = requested
        .iter()
        .filter(|name| !rows.iter().any(|r| &r.name == *name))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PortfolioError::validation(
            "names",
            format!("instruments not found: {}", missing.join(", ")),
        ))
    }
}

/// Orders `rows` to follow `requested`.
pub fn order_by_names(requested: &[String], mut rows: Vec<CandidateRow>) -> Vec<CandidateRow> {
    rows.sort_by_key(|r| {
        requested
            .iter()
            .position(|n| n == &r.name)
            .unwrap_or(usize::MAX)
    });
    rows
}
