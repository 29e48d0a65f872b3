//! Report output port trait.

use crate::domain::error::PortfolioError;
use crate::domain::pipeline::BacktestReport;

/// Port for persisting a finished backtest.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), PortfolioError>;
}
