//! JSON report adapter implementing ReportPort.
//!
//! The top-level `portfolio`, `benchmark` and `individual_stocks` keys carry the
//! [`Metrics`] response schema unchanged; `trajectory`, `monthly_returns` and
//! `dropped` are appended for offline inspection.

use std::collections::BTreeMap;
use std::fs;

use crate::domain::analyzer::Metrics;
use crate::domain::error::PortfolioError;
use crate::domain::pipeline::BacktestReport;
use crate::domain::simulator::Trajectory;
use crate::ports::report_port::ReportPort;
use chrono::Datelike;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct MonthlyReturn {
    year: i32,
    month: u32,
    portfolio: f64,
    benchmark: f64,
}

#[derive(Debug, Serialize)]
struct DroppedEntry<'a> {
    code: &'a str,
    name: &'a str,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    metrics: &'a Metrics,
    trajectory: &'a Trajectory,
    monthly_returns: Vec<MonthlyReturn>,
    dropped: Vec<DroppedEntry<'a>>,
}

/// Month-over-month returns, measured from the last value of the previous month
/// (or the first value for the first month).
fn compute_monthly_returns(trajectory: &Trajectory) -> Vec<MonthlyReturn> {
    let mut last_in_month: BTreeMap<(i32, u32), (f64, f64)> = BTreeMap::new();
    for ((date, p), b) in trajectory
        .dates
        .iter()
        .zip(&trajectory.portfolio)
        .zip(&trajectory.benchmark)
    {
        last_in_month.insert((date.year(), date.month()), (*p, *b));
    }

    let (Some(&p0), Some(&b0)) = (trajectory.portfolio.first(), trajectory.benchmark.first())
    else {
        return Vec::new();
    };

    let mut prev = (p0, b0);
    last_in_month
        .into_iter()
        .map(|((year, month), (p, b))| {
            let row = MonthlyReturn {
                year,
                month,
                portfolio: p / prev.0 - 1.0,
                benchmark: b / prev.1 - 1.0,
            };
            prev = (p, b);
            row
        })
        .collect()
}

pub fn render(report: &BacktestReport) -> Result<String, PortfolioError> {
    let doc = ReportDocument {
        metrics: &report.metrics,
        trajectory: &report.trajectory,
        monthly_returns: compute_monthly_returns(&report.trajectory),
        dropped: report
            .dropped
            .iter()
            .map(|d| DroppedEntry {
                code: &d.code,
                name: &d.name,
                reason: d.reason.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| PortfolioError::Computation {
        reason: format!("failed to serialize report: {e}"),
    })
}

pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), PortfolioError> {
        let content = render(report)?;
        fs::write(output_path, content)?;
        info!(path = output_path, "report written");
        Ok(())
    }
}
