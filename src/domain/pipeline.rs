//! Backtest pipeline: PriceSet → Allocation → Trajectory → Metrics.
//!
//! Each run walks a one-way state machine. Any stage error moves the run to
//! [`PipelineState::Failed`], which absorbs every further transition; there is
//! no partial result.

use crate::domain::allocation::{Allocation, AllocationConstraints};
use crate::domain::allocator;
use crate::domain::analyzer::{self, Metrics};
use crate::domain::error::PortfolioError;
use crate::domain::price_set::{DropReason, DroppedInstrument, PriceSet, PriceSetBuilder};
use crate::domain::screening::CandidateFilter;
use crate::domain::selection;
use crate::domain::simulator::{self, Trajectory};
use crate::domain::solver::SolverSettings;
use crate::ports::data_port::{CandidateRow, DataPort};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000_000.0;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

/// How the instruments of a run are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Screen(CandidateFilter),
    Explicit(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub selection: Selection,
    pub constraints: AllocationConstraints,
    pub risk_free_rate: f64,
    pub initial_capital: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub solver: SolverSettings,
}

impl BacktestRequest {
    /// A request with default capital, risk-free rate, constraints and solver budget.
    pub fn new(selection: Selection, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            selection,
            constraints: AllocationConstraints::default(),
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            start_date,
            end_date,
            solver: SolverSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), PortfolioError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(PortfolioError::validation(
                "initial_capital",
                "must be a positive amount",
            ));
        }
        if self.start_date >= self.end_date {
            return Err(PortfolioError::validation(
                "start_date",
                format!(
                    "start_date {} must be before end_date {}",
                    self.start_date, self.end_date
                ),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortfolioError::validation(
                "risk_free_rate",
                "must be a finite number",
            ));
        }
        if self.solver.max_iterations == 0 {
            return Err(PortfolioError::validation(
                "max_iterations",
                "must be positive",
            ));
        }
        self.constraints.validate()?;
        match &self.selection {
            Selection::Screen(filter) => filter.validate(),
            Selection::Explicit(names) => selection::names_from(names).map(|_| ()),
        }
    }
}

/// Successful result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub metrics: Metrics,
    pub trajectory: Trajectory,
    /// Instruments removed while building the PriceSet.
    pub dropped: Vec<DroppedInstrument>,
}

/// Parameters consumed by the stages after the PriceSet is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    pub constraints: AllocationConstraints,
    pub risk_free_rate: f64,
    pub solver: SolverSettings,
}

#[derive(Debug)]
pub enum PipelineState {
    Built {
        price_set: PriceSet,
        dropped: Vec<DroppedInstrument>,
    },
    Allocated {
        price_set: PriceSet,
        dropped: Vec<DroppedInstrument>,
        allocation: Allocation,
    },
    Simulated {
        price_set: PriceSet,
        dropped: Vec<DroppedInstrument>,
        allocation: Allocation,
        trajectory: Trajectory,
    },
    Summarized(BacktestReport),
    Failed(PortfolioError),
}

impl PipelineState {
    pub fn new(price_set: PriceSet, dropped: Vec<DroppedInstrument>) -> Self {
        PipelineState::Built { price_set, dropped }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Built { .. } => "BUILT",
            PipelineState::Allocated { .. } => "ALLOCATED",
            PipelineState::Simulated { .. } => "SIMULATED",
            PipelineState::Summarized(_) => "SUMMARIZED",
            PipelineState::Failed(_) => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Summarized(_) | PipelineState::Failed(_)
        )
    }

    /// Performs one transition. Terminal states return themselves.
    pub fn advance(self, params: &RunParams) -> Self {
        let from = self.name();
        let next = match self {
            PipelineState::Built { price_set, dropped } => {
                match allocator::allocate(
                    &price_set,
                    &params.constraints,
                    params.risk_free_rate,
                    &params.solver,
                ) {
                    Ok(allocation) => PipelineState::Allocated {
                        price_set,
                        dropped,
                        allocation,
                    },
                    Err(e) => PipelineState::Failed(e),
                }
            }
            PipelineState::Allocated {
                price_set,
                dropped,
                allocation,
            } => match simulator::run(&price_set, &allocation) {
                Ok(trajectory) => PipelineState::Simulated {
                    price_set,
                    dropped,
                    allocation,
                    trajectory,
                },
                Err(e) => PipelineState::Failed(e),
            },
            PipelineState::Simulated {
                price_set,
                dropped,
                allocation,
                trajectory,
            } => match analyzer::summarize(
                &price_set,
                &allocation,
                &trajectory,
                params.risk_free_rate,
            ) {
                Ok(metrics) => PipelineState::Summarized(BacktestReport {
                    metrics,
                    trajectory,
                    dropped,
                }),
                Err(e) => PipelineState::Failed(e),
            },
            terminal => return terminal,
        };
        match &next {
            PipelineState::Failed(e) => warn!(from, kind = e.kind(), error = %e, "pipeline failed"),
            _ => debug!(from, to = next.name(), "pipeline transition"),
        }
        next
    }

    /// Advances until a terminal state.
    pub fn finish(mut self, params: &RunParams) -> Result<BacktestReport, PortfolioError> {
        while !self.is_terminal() {
            self = self.advance(params);
        }
        match self {
            PipelineState::Summarized(report) => Ok(report),
            PipelineState::Failed(e) => Err(e),
            other => Err(PortfolioError::Computation {
                reason: format!("pipeline stopped in non-terminal state {}", other.name()),
            }),
        }
    }
}

/// Selects instruments, builds the PriceSet and runs every stage.
pub fn execute(
    data_port: &dyn DataPort,
    request: &BacktestRequest,
) -> Result<BacktestReport, PortfolioError> {
    request.validate()?;

    let rows = select_instruments(data_port, &request.selection)?;
    info!(
        instruments = rows.len(),
        start = %request.start_date,
        end = %request.end_date,
        "instruments selected"
    );

    let (price_set, dropped) = build_price_set(data_port, request, rows)?;
    info!(
        instruments = price_set.instrument_count(),
        dropped = dropped.len(),
        dates = price_set.len(),
        "price set built"
    );

    let params = RunParams {
        constraints: request.constraints,
        risk_free_rate: request.risk_free_rate,
        solver: request.solver,
    };
    let report = PipelineState::new(price_set, dropped).finish(&params)?;
    info!(
        final_value = report.metrics.portfolio.final_value,
        total_return = report.metrics.portfolio.total_return,
        "backtest complete"
    );
    Ok(report)
}

fn select_instruments(
    data_port: &dyn DataPort,
    selection: &Selection,
) -> Result<Vec<CandidateRow>, PortfolioError> {
    match selection {
        Selection::Screen(filter) => {
            let rows = data_port.fetch_candidates(filter)?;
            if rows.is_empty() {
                return Err(PortfolioError::NoCandidates {
                    filter: filter.to_string(),
                });
            }
            for row in &rows {
                debug!(code = %row.code, name = %row.name, dividend_yield = row.dividend_yield, "candidate");
            }
            Ok(rows)
        }
        Selection::Explicit(names) => {
            let names = selection::names_from(names)?;
            data_port.fetch_by_names(&names)
        }
    }
}

fn build_price_set(
    data_port: &dyn DataPort,
    request: &BacktestRequest,
    rows: Vec<CandidateRow>,
) -> Result<(PriceSet, Vec<DroppedInstrument>), PortfolioError> {
    let benchmark = data_port
        .fetch_benchmark(request.start_date, request.end_date)
        .map_err(|e| match e {
            PortfolioError::BenchmarkUnavailable { .. } => e,
            other => PortfolioError::BenchmarkUnavailable {
                reason: other.to_string(),
            },
        })?;

    let mut builder = PriceSetBuilder::new(
        request.start_date,
        request.end_date,
        request.initial_capital,
    )
    .benchmark(benchmark);

    for row in rows {
        match data_port.fetch_price_history(&row.code, request.start_date, request.end_date) {
            Ok(points) if points.is_empty() => {
                builder.drop_instrument(
                    &row,
                    DropReason::PriceUnavailable("no prices in range".into()),
                );
            }
            Ok(points) => builder.add_instrument(row, points),
            Err(e) => builder.drop_instrument(&row, DropReason::PriceUnavailable(e.to_string())),
        }
    }

    builder.build()
}
