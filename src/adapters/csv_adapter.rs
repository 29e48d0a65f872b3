//! CSV file data adapter.
//!
//! Directory layout:
//!
//! ```text
//! <base>/stock_analysis.csv   code,name,annual_return,volatility,dividend_yield,liquidity
//! <base>/prices/<code>.csv    date,close
//! <base>/benchmark.csv        date,close
//! ```

use crate::domain::error::PortfolioError;
use crate::domain::price::{InstrumentInfo, PricePoint, normalize_series};
use crate::domain::screening::CandidateFilter;
use crate::ports::data_port::{CandidateRow, DataPort, check_all_found, order_by_names};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CloseRecord {
    date: NaiveDate,
    close: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn price_path(&self, code: &str) -> PathBuf {
        self.base_path.join("prices").join(format!("{code}.csv"))
    }

    fn load_instruments(&self) -> Result<Vec<InstrumentInfo>, PortfolioError> {
        let path = self.base_path.join("stock_analysis.csv");
        let content = fs::read_to_string(&path).map_err(|e| PortfolioError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for result in rdr.deserialize::<InstrumentInfo>() {
            rows.push(result.map_err(|e| PortfolioError::DatabaseQuery {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?);
        }
        Ok(rows)
    }
}

fn load_closes(
    path: &Path,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<PricePoint>, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut points = Vec::new();
    for result in rdr.deserialize::<CloseRecord>() {
        let record = result.map_err(|e| format!("CSV parse error: {e}"))?;
        if record.date < start_date || record.date > end_date {
            continue;
        }
        points.push(PricePoint::new(record.date, record.close));
    }
    Ok(normalize_series(points))
}

impl DataPort for CsvAdapter {
    fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateRow>, PortfolioError> {
        let mut rows: Vec<CandidateRow> = self
            .load_instruments()?
            .into_iter()
            .filter(|r| {
                r.dividend_yield >= filter.min_dividend
                    && r.liquidity >= filter.min_liquidity
                    && r.volatility <= filter.max_volatility
            })
            .collect();
        rows.sort_by(|a, b| b.annual_return.total_cmp(&a.annual_return));
        rows.truncate(filter.limit);
        Ok(rows)
    }

    fn fetch_by_names(&self, names: &[String]) -> Result<Vec<CandidateRow>, PortfolioError> {
        let rows: Vec<CandidateRow> = self
            .load_instruments()?
            .into_iter()
            .filter(|r| names.contains(&r.name))
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
        load_closes(&self.price_path(code), start_date, end_date).map_err(|reason| {
            PortfolioError::PriceUnavailable {
                code: code.to_string(),
                reason,
            }
        })
    }

    fn fetch_benchmark(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        load_closes(&self.base_path.join("benchmark.csv"), start_date, end_date)
            .map_err(|reason| PortfolioError::BenchmarkUnavailable { reason })
    }

    fn search_names(&self, fragment: &str) -> Result<Vec<CandidateRow>, PortfolioError> {
        let fragment = fragment.trim();
        let mut rows: Vec<CandidateRow> = self
            .load_instruments()?
            .into_iter()
            .filter(|r| r.name.contains(fragment))
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn list_names(&self) -> Result<Vec<String>, PortfolioError> {
        let mut names: Vec<String> = self
            .load_instruments()?
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
