//! Configuration validation and typed run settings.
//!
//! Validates every config field before a run starts, then turns the INI
//! sections into the domain's request types.

use crate::domain::allocation::AllocationConstraints;
use crate::domain::error::PortfolioError;
use crate::domain::pipeline::{
    BacktestRequest, DEFAULT_INITIAL_CAPITAL, DEFAULT_RISK_FREE_RATE, Selection,
};
use crate::domain::screening::{
    CandidateFilter, DEFAULT_CANDIDATE_LIMIT, DEFAULT_MIN_LIQUIDITY_MILLIONS, InvestmentStyle,
};
use crate::domain::solver::SolverSettings;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::time::Duration;

pub const DEFAULT_START_DATE: &str = "2020-01-01";
pub const DEFAULT_END_DATE: &str = "2023-12-31";

/// Run parameters shared by every backtest started from one config file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub constraints: AllocationConstraints,
    pub solver: SolverSettings,
}

impl RunSettings {
    pub fn request(&self, selection: Selection) -> BacktestRequest {
        BacktestRequest {
            selection,
            constraints: self.constraints,
            risk_free_rate: self.risk_free_rate,
            initial_capital: self.initial_capital,
            start_date: self.start_date,
            end_date: self.end_date,
            solver: self.solver,
        }
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let min = config.get_double("portfolio", "min_weight", 0.05);
    let max = config.get_double("portfolio", "max_weight", 0.90);
    if !(0.0..=1.0).contains(&min) {
        return Err(invalid("portfolio", "min_weight", "min_weight must be between 0 and 1"));
    }
    if !(0.0..=1.0).contains(&max) {
        return Err(invalid("portfolio", "max_weight", "max_weight must be between 0 and 1"));
    }
    if min > max {
        return Err(invalid(
            "portfolio",
            "min_weight",
            "min_weight must not exceed max_weight",
        ));
    }
    let target = config.get_double("portfolio", "target_return", 0.05);
    if !target.is_finite() {
        return Err(invalid("portfolio", "target_return", "target_return must be a number"));
    }
    Ok(())
}

pub fn validate_screening_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    if config.get_int("screening", "n_stocks", DEFAULT_CANDIDATE_LIMIT as i64) < 1 {
        return Err(invalid("screening", "n_stocks", "n_stocks must be at least 1"));
    }
    if config.get_double("screening", "min_dividend", 0.0) < 0.0 {
        return Err(invalid(
            "screening",
            "min_dividend",
            "min_dividend must be non-negative",
        ));
    }
    if config.get_double("screening", "min_liquidity", DEFAULT_MIN_LIQUIDITY_MILLIONS) < 0.0 {
        return Err(invalid(
            "screening",
            "min_liquidity",
            "min_liquidity must be non-negative",
        ));
    }
    if config.get_double("screening", "max_volatility", 0.15) <= 0.0 {
        return Err(invalid(
            "screening",
            "max_volatility",
            "max_volatility must be positive",
        ));
    }
    if let Some(style) = config.get_string("screening", "investment_style") {
        style
            .parse::<InvestmentStyle>()
            .map_err(|e| invalid("screening", "investment_style", &e.to_string()))?;
    }
    Ok(())
}

pub fn validate_solver_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    if config.get_int("solver", "max_iterations", 500) < 1 {
        return Err(invalid(
            "solver",
            "max_iterations",
            "max_iterations must be at least 1",
        ));
    }
    if config.get_int("solver", "timeout_ms", 5_000) < 1 {
        return Err(invalid("solver", "timeout_ms", "timeout_ms must be at least 1"));
    }
    Ok(())
}

/// Validates `[backtest]`, `[portfolio]` and `[solver]` and builds the settings.
///
/// A configured `[screening] investment_style` overrides `target_return`.
pub fn load_run_settings(config: &dyn ConfigPort) -> Result<RunSettings, PortfolioError> {
    validate_backtest_config(config)?;
    validate_portfolio_config(config)?;
    validate_solver_config(config)?;
    validate_screening_config(config)?;

    let (start_date, end_date) = dates(config)?;
    let target_return = match style(config)? {
        Some(style) => style.target_return(),
        None => config.get_double("portfolio", "target_return", 0.05),
    };

    Ok(RunSettings {
        start_date,
        end_date,
        initial_capital: config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE),
        constraints: AllocationConstraints {
            min_weight: config.get_double("portfolio", "min_weight", 0.05),
            max_weight: config.get_double("portfolio", "max_weight", 0.90),
            target_return,
        },
        solver: SolverSettings {
            max_iterations: config.get_int("solver", "max_iterations", 500) as usize,
            timeout: Duration::from_millis(config.get_int("solver", "timeout_ms", 5_000) as u64),
        },
    })
}

/// Builds the `[screening]` candidate filter.
///
/// `min_dividend` is read in percent and `min_liquidity` in millions.
pub fn load_candidate_filter(config: &dyn ConfigPort) -> Result<CandidateFilter, PortfolioError> {
    validate_screening_config(config)?;
    let max_volatility = match style(config)? {
        Some(style) => style.max_volatility(),
        None => config.get_double("screening", "max_volatility", 0.15),
    };
    Ok(CandidateFilter {
        limit: config.get_int("screening", "n_stocks", DEFAULT_CANDIDATE_LIMIT as i64) as usize,
        min_dividend: config.get_double("screening", "min_dividend", 0.0) / 100.0,
        min_liquidity: config.get_double("screening", "min_liquidity", DEFAULT_MIN_LIQUIDITY_MILLIONS)
            * 1_000_000.0,
        max_volatility,
    })
}

fn style(config: &dyn ConfigPort) -> Result<Option<InvestmentStyle>, PortfolioError> {
    config
        .get_string("screening", "investment_style")
        .map(|s| {
            s.parse::<InvestmentStyle>()
                .map_err(|e| invalid("screening", "investment_style", &e.to_string()))
        })
        .transpose()
}

fn invalid(section: &str, key: &str, reason: &str) -> PortfolioError {
    PortfolioError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let value = config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let value = config.get_double("backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let (start_date, end_date) = dates(config)?;
    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), PortfolioError> {
    let start = config
        .get_string("backtest", "start_date")
        .unwrap_or_else(|| DEFAULT_START_DATE.to_string());
    let end = config
        .get_string("backtest", "end_date")
        .unwrap_or_else(|| DEFAULT_END_DATE.to_string());
    Ok((parse_date(&start, "start_date")?, parse_date(&end, "end_date")?))
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, PortfolioError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        invalid(
            "backtest",
            field,
            &format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = make_config("[backtest]\n");
        let settings = load_run_settings(&config).unwrap();
        assert_eq!(settings.initial_capital, 100_000_000.0);
        assert_eq!(settings.risk_free_rate, 0.03);
        assert_eq!(settings.constraints, AllocationConstraints::default());
        assert_eq!(settings.solver, SolverSettings::default());
        assert_eq!(
            settings.start_date,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert_eq!(
            settings.end_date,
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }

    #[test]
    fn full_config_is_read() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 5000000
risk_free_rate = 0.02
start_date = 2021-01-01
end_date = 2022-06-30

[portfolio]
min_weight = 0.1
max_weight = 0.6
target_return = 0.07

[solver]
max_iterations = 50
timeout_ms = 250
"#,
        );
        let s = load_run_settings(&config).unwrap();
        assert_eq!(s.initial_capital, 5_000_000.0);
        assert_eq!(s.constraints.min_weight, 0.1);
        assert_eq!(s.constraints.target_return, 0.07);
        assert_eq!(s.solver.max_iterations, 50);
        assert_eq!(s.solver.timeout, Duration::from_millis(250));
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = make_config("[backtest]\nrisk_free_rate = 1.5\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "risk_free_rate")
        );
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn min_weight_above_max_fails() {
        let config = make_config("[portfolio]\nmin_weight = 0.5\nmax_weight = 0.4\n");
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "min_weight"));
    }

    #[test]
    fn max_weight_above_one_fails() {
        let config = make_config("[portfolio]\nmax_weight = 1.2\n");
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "max_weight"));
    }

    #[test]
    fn zero_iterations_fails() {
        let config = make_config("[solver]\nmax_iterations = 0\n");
        let err = validate_solver_config(&config).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "max_iterations")
        );
    }

    #[test]
    fn candidate_filter_converts_units() {
        let config = make_config(
            "[screening]\nn_stocks = 8\nmin_dividend = 2.5\nmin_liquidity = 100\nmax_volatility = 0.2\n",
        );
        let f = load_candidate_filter(&config).unwrap();
        assert_eq!(f.limit, 8);
        assert!((f.min_dividend - 0.025).abs() < 1e-12);
        assert_eq!(f.min_liquidity, 100_000_000.0);
        assert_eq!(f.max_volatility, 0.2);
    }

    #[test]
    fn investment_style_overrides_presets() {
        let config = make_config(
            "[screening]\ninvestment_style = 위험회피형\nmax_volatility = 0.5\n\n[portfolio]\ntarget_return = 0.2\n",
        );
        let f = load_candidate_filter(&config).unwrap();
        assert_eq!(f.max_volatility, 0.03);
        let s = load_run_settings(&config).unwrap();
        assert_eq!(s.constraints.target_return, 0.03);
    }

    #[test]
    fn unknown_style_fails() {
        let config = make_config("[screening]\ninvestment_style = reckless\n");
        let err = validate_screening_config(&config).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "investment_style")
        );
    }

    #[test]
    fn settings_build_requests() {
        let config = make_config("[backtest]\ninitial_capital = 1000\n");
        let s = load_run_settings(&config).unwrap();
        let req = s.request(Selection::Explicit(vec!["A".into()]));
        assert_eq!(req.initial_capital, 1000.0);
        assert!(req.validate().is_ok());
    }
}
