//! PriceSet: aligned historical prices for one backtest run.
//!
//! All instrument columns and the benchmark share one gap-free date index.
//! [`PriceSetBuilder`] performs the alignment and drops instruments whose gaps
//! cannot be recovered; a finished [`PriceSet`] is immutable.

use crate::domain::error::PortfolioError;
use crate::domain::price::{InstrumentInfo, PricePoint, normalize_series};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Largest number of leading calendar rows an instrument may be missing
/// before it is treated as unrecoverable.
pub const MAX_LEADING_GAP: usize = 5;

#[derive(Debug, Clone)]
pub struct PriceSet {
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_capital: f64,
    dates: Vec<NaiveDate>,
    instruments: Vec<InstrumentInfo>,
    prices: Vec<Vec<f64>>,
    benchmark: Vec<f64>,
    column_index: HashMap<String, usize>,
}

impl PriceSet {
    /// Builds a PriceSet from already-aligned columns, checking every invariant.
    ///
    /// `prices[i]` is the column for `instruments[i]` and must have one value per date.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_capital: f64,
        dates: Vec<NaiveDate>,
        instruments: Vec<InstrumentInfo>,
        prices: Vec<Vec<f64>>,
        benchmark: Vec<f64>,
    ) -> Result<Self, PortfolioError> {
        if !(initial_capital.is_finite() && initial_capital > 0.0) {
            return Err(PortfolioError::validation(
                "initial_capital",
                "must be a positive amount",
            ));
        }
        if start_date > end_date {
            return Err(PortfolioError::validation(
                "start_date",
                "start_date must not be after end_date",
            ));
        }
        if instruments.is_empty() {
            return Err(PortfolioError::InsufficientHistory {
                reason: "no instruments with usable price history".into(),
            });
        }
        if instruments.len() != prices.len() {
            return Err(PortfolioError::Computation {
                reason: format!(
                    "{} instruments but {} price columns",
                    instruments.len(),
                    prices.len()
                ),
            });
        }
        if benchmark.len() != dates.len() {
            return Err(PortfolioError::Computation {
                reason: format!(
                    "benchmark has {} values for {} dates",
                    benchmark.len(),
                    dates.len()
                ),
            });
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PortfolioError::Computation {
                reason: "date index is not strictly increasing".into(),
            });
        }

        let mut column_index = HashMap::with_capacity(instruments.len());
        for (i, (info, column)) in instruments.iter().zip(&prices).enumerate() {
            if column.len() != dates.len() {
                return Err(PortfolioError::Computation {
                    reason: format!(
                        "column {} has {} values for {} dates",
                        info.code,
                        column.len(),
                        dates.len()
                    ),
                });
            }
            if column.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
                return Err(PortfolioError::Computation {
                    reason: format!("column {} contains a missing or non-positive price", info.code),
                });
            }
            if column_index.insert(info.code.clone(), i).is_some() {
                return Err(PortfolioError::Computation {
                    reason: format!("duplicate instrument {}", info.code),
                });
            }
        }
        if benchmark.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(PortfolioError::BenchmarkUnavailable {
                reason: "benchmark contains a missing or non-positive level".into(),
            });
        }

        Ok(Self {
            start_date,
            end_date,
            initial_capital,
            dates,
            instruments,
            prices,
            benchmark,
            column_index,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of rows in the date index.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    pub fn instruments(&self) -> &[InstrumentInfo] {
        &self.instruments
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().map(|i| i.code.as_str())
    }

    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.column_index.get(code).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.column_index.contains_key(code)
    }

    pub fn info(&self, code: &str) -> Option<&InstrumentInfo> {
        self.index_of(code).map(|i| &self.instruments[i])
    }

    pub fn column(&self, code: &str) -> Option<&[f64]> {
        self.index_of(code).map(|i| self.prices[i].as_slice())
    }

    pub fn column_at(&self, index: usize) -> &[f64] {
        &self.prices[index]
    }

    pub fn benchmark(&self) -> &[f64] {
        &self.benchmark
    }

    /// Period-over-period simple returns for the column at `index`.
    pub fn returns_at(&self, index: usize) -> Vec<f64> {
        simple_returns(&self.prices[index])
    }
}

/// `r_t = v_t / v_{t-1} - 1` for every consecutive pair.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    PriceUnavailable(String),
    InvalidPrice,
    NoOverlap,
    LateStart { missing_rows: usize },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::PriceUnavailable(reason) => write!(f, "price unavailable: {reason}"),
            DropReason::InvalidPrice => write!(f, "missing or non-positive close"),
            DropReason::NoOverlap => write!(f, "no prices inside the trading calendar"),
            DropReason::LateStart { missing_rows } => write!(
                f,
                "first price {missing_rows} rows after window start (limit {MAX_LEADING_GAP})"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedInstrument {
    pub code: String,
    pub name: String,
    pub reason: DropReason,
}

/// Collects raw series and aligns them onto the benchmark's trading calendar.
#[derive(Debug)]
pub struct PriceSetBuilder {
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_capital: f64,
    benchmark: Vec<PricePoint>,
    series: Vec<(InstrumentInfo, Vec<PricePoint>)>,
    dropped: Vec<DroppedInstrument>,
}

impl PriceSetBuilder {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_capital: f64) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital,
            benchmark: Vec::new(),
            series: Vec::new(),
            dropped: Vec::new(),
        }
    }

    pub fn benchmark(mut self, points: Vec<PricePoint>) -> Self {
        self.benchmark = points;
        self
    }

    pub fn add_instrument(&mut self, info: InstrumentInfo, points: Vec<PricePoint>) {
        self.series.push((info, points));
    }

    /// Records an instrument whose history could not be fetched at all.
    pub fn drop_instrument(&mut self, info: &InstrumentInfo, reason: DropReason) {
        warn!(code = %info.code, name = %info.name, %reason, "dropping instrument");
        self.dropped.push(DroppedInstrument {
            code: info.code.clone(),
            name: info.name.clone(),
            reason,
        });
    }

    fn in_window(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Aligns every series onto the benchmark calendar.
    ///
    /// Returns the finished PriceSet together with every instrument that was dropped.
    pub fn build(mut self) -> Result<(PriceSet, Vec<DroppedInstrument>), PortfolioError> {
        let benchmark: Vec<PricePoint> = normalize_series(std::mem::take(&mut self.benchmark))
            .into_iter()
            .filter(|p| self.in_window(p.date) && p.is_valid())
            .collect();
        if benchmark.is_empty() {
            return Err(PortfolioError::BenchmarkUnavailable {
                reason: format!(
                    "no benchmark levels between {} and {}",
                    self.start_date, self.end_date
                ),
            });
        }
        let calendar: Vec<NaiveDate> = benchmark.iter().map(|p| p.date).collect();

        let mut kept: Vec<(InstrumentInfo, Vec<Option<f64>>, usize)> = Vec::new();
        for (info, raw) in std::mem::take(&mut self.series) {
            let points: Vec<PricePoint> = normalize_series(raw)
                .into_iter()
                .filter(|p| self.in_window(p.date))
                .collect();
            if points.iter().any(|p| !p.is_valid()) {
                self.drop_instrument(&info, DropReason::InvalidPrice);
                continue;
            }
            let aligned = forward_fill_onto(&calendar, &points);
            let Some(first_row) = aligned.iter().position(Option::is_some) else {
                self.drop_instrument(&info, DropReason::NoOverlap);
                continue;
            };
            if first_row > MAX_LEADING_GAP {
                self.drop_instrument(
                    &info,
                    DropReason::LateStart {
                        missing_rows: first_row,
                    },
                );
                continue;
            }
            kept.push((info, aligned, first_row));
        }

        if kept.is_empty() {
            return Err(PortfolioError::InsufficientHistory {
                reason: "every candidate instrument was dropped".into(),
            });
        }

        let trim = kept.iter().map(|(_, _, first)| *first).max().unwrap_or(0);
        if trim > 0 {
            debug!(rows = trim, "trimming leading calendar rows");
        }

        let dates = calendar[trim..].to_vec();
        let bench: Vec<f64> = benchmark[trim..].iter().map(|p| p.close).collect();
        let mut instruments = Vec::with_capacity(kept.len());
        let mut prices = Vec::with_capacity(kept.len());
        for (info, aligned, _) in kept {
            prices.push(aligned[trim..].iter().map(|v| v.unwrap_or(f64::NAN)).collect());
            instruments.push(info);
        }

        let set = PriceSet::new(
            self.start_date,
            self.end_date,
            self.initial_capital,
            dates,
            instruments,
            prices,
            bench,
        )?;
        Ok((set, self.dropped))
    }
}

/// Maps `points` onto `calendar`, carrying the last observed close forward.
/// Rows before the first observation are `None`.
fn forward_fill_onto(calendar: &[NaiveDate], points: &[PricePoint]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(calendar.len());
    let mut cursor = 0;
    let mut last = None;
    for date in calendar {
        while cursor < points.len() && points[cursor].date <= *date {
            last = Some(points[cursor].close);
            cursor += 1;
        }
        out.push(last);
    }
    out
}
