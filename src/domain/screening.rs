//! Screening conditions: investment style presets, backtesting periods and the
//! candidate filter handed to the data port.

use crate::domain::error::PortfolioError;
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Earliest year with listed price history.
pub const FIRST_LISTING_YEAR: i32 = 1966;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;
/// Minimum average daily traded value, in millions.
pub const DEFAULT_MIN_LIQUIDITY_MILLIONS: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStyle {
    Aggressive,
    Active,
    Neutral,
    Conservative,
    Stable,
}

impl InvestmentStyle {
    pub const ALL: [InvestmentStyle; 5] = [
        InvestmentStyle::Aggressive,
        InvestmentStyle::Active,
        InvestmentStyle::Neutral,
        InvestmentStyle::Conservative,
        InvestmentStyle::Stable,
    ];

    /// Ceiling on an instrument's annual volatility.
    pub fn max_volatility(self) -> f64 {
        match self {
            InvestmentStyle::Aggressive => 0.15,
            InvestmentStyle::Active => 0.10,
            InvestmentStyle::Neutral => 0.07,
            InvestmentStyle::Conservative => 0.03,
            InvestmentStyle::Stable => 0.01,
        }
    }

    /// Annual return target handed to the allocator.
    pub fn target_return(self) -> f64 {
        match self {
            InvestmentStyle::Aggressive => 0.06,
            InvestmentStyle::Active => 0.05,
            InvestmentStyle::Neutral => 0.04,
            InvestmentStyle::Conservative => 0.03,
            InvestmentStyle::Stable => 0.02,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InvestmentStyle::Aggressive => "공격투자형",
            InvestmentStyle::Active => "적극투자형",
            InvestmentStyle::Neutral => "위험중립형",
            InvestmentStyle::Conservative => "위험회피형",
            InvestmentStyle::Stable => "안전추구형",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            InvestmentStyle::Aggressive => "aggressive",
            InvestmentStyle::Active => "active",
            InvestmentStyle::Neutral => "neutral",
            InvestmentStyle::Conservative => "conservative",
            InvestmentStyle::Stable => "stable",
        }
    }
}

impl fmt::Display for InvestmentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for InvestmentStyle {
    type Err = PortfolioError;

    /// Accepts the English key (any case) or the Korean label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        InvestmentStyle::ALL
            .into_iter()
            .find(|style| style.key().eq_ignore_ascii_case(s) || style.label() == s)
            .ok_or_else(|| {
                PortfolioError::validation(
                    "investment_style",
                    format!("unknown investment style '{s}'"),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestingPeriod {
    pub start_year: i32,
    pub start_month: u32,
    pub end_year: i32,
    pub end_month: u32,
}

impl BacktestingPeriod {
    pub fn validate(&self) -> Result<(), PortfolioError> {
        self.validate_at(Local::now().year())
    }

    /// Validates against an explicit current year.
    pub fn validate_at(&self, current_year: i32) -> Result<(), PortfolioError> {
        let year_range = FIRST_LISTING_YEAR..=current_year;
        if self.start_year <= 0 {
            return Err(PortfolioError::validation("start_year", "must be provided"));
        }
        if !year_range.contains(&self.start_year) {
            return Err(PortfolioError::validation(
                "start_year",
                format!("must be between {FIRST_LISTING_YEAR} and {current_year}"),
            ));
        }
        if !(1..=12).contains(&self.start_month) {
            return Err(PortfolioError::validation(
                "start_month",
                "must be between 1 and 12",
            ));
        }
        if self.end_year <= 0 {
            return Err(PortfolioError::validation("end_year", "must be provided"));
        }
        if !year_range.contains(&self.end_year) {
            return Err(PortfolioError::validation(
                "end_year",
                format!("must be between {FIRST_LISTING_YEAR} and {current_year}"),
            ));
        }
        if !(1..=12).contains(&self.end_month) {
            return Err(PortfolioError::validation(
                "end_month",
                "must be between 1 and 12",
            ));
        }
        if (self.end_year, self.end_month) < (self.start_year, self.start_month) {
            return Err(PortfolioError::validation(
                "end_month",
                "backtesting period ends before it starts",
            ));
        }
        Ok(())
    }

    /// First day of the start month.
    pub fn start_date(&self) -> Result<NaiveDate, PortfolioError> {
        NaiveDate::from_ymd_opt(self.start_year, self.start_month, 1)
            .ok_or_else(|| PortfolioError::validation("start_month", "not a calendar month"))
    }

    /// Last day of the end month.
    pub fn end_date(&self) -> Result<NaiveDate, PortfolioError> {
        let (year, month) = if self.end_month == 12 {
            (self.end_year + 1, 1)
        } else {
            (self.end_year, self.end_month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first_of_next| first_of_next.pred_opt())
            .ok_or_else(|| PortfolioError::validation("end_month", "not a calendar month"))
    }
}

/// User-facing screening request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub n_stock: i64,
    /// Minimum dividend yield in percent.
    pub min_dividend: f64,
    pub investment_style: String,
    pub backtesting_period: BacktestingPeriod,
}

/// A validated [`Condition`] with its style preset resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCondition {
    pub condition: Condition,
    pub max_volatility: f64,
    pub target_return: f64,
}

impl Condition {
    pub fn resolve(&self) -> Result<ResolvedCondition, PortfolioError> {
        self.resolve_at(Local::now().year())
    }

    pub fn resolve_at(&self, current_year: i32) -> Result<ResolvedCondition, PortfolioError> {
        if self.n_stock <= 0 {
            return Err(PortfolioError::validation(
                "n_stock",
                "select at least one instrument",
            ));
        }
        if !(self.min_dividend.is_finite() && self.min_dividend > 0.0) {
            return Err(PortfolioError::validation(
                "min_dividend",
                "must be a positive percentage",
            ));
        }
        let style: InvestmentStyle = self.investment_style.parse()?;
        self.backtesting_period.validate_at(current_year)?;
        Ok(ResolvedCondition {
            condition: self.clone(),
            max_volatility: style.max_volatility(),
            target_return: style.target_return(),
        })
    }
}

impl ResolvedCondition {
    pub fn candidate_filter(&self) -> CandidateFilter {
        CandidateFilter {
            limit: self.condition.n_stock as usize,
            min_dividend: self.condition.min_dividend / 100.0,
            max_volatility: self.max_volatility,
            ..CandidateFilter::default()
        }
    }
}

/// Row filter applied to the `stock_analysis` table.
///
/// Rates are fractions; `min_liquidity` is in currency units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub limit: usize,
    pub min_dividend: f64,
    pub min_liquidity: f64,
    pub max_volatility: f64,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CANDIDATE_LIMIT,
            min_dividend: 0.0,
            min_liquidity: DEFAULT_MIN_LIQUIDITY_MILLIONS * 1_000_000.0,
            max_volatility: InvestmentStyle::Aggressive.max_volatility(),
        }
    }
}

impl CandidateFilter {
    pub fn validate(&self) -> Result<(), PortfolioError> {
        if self.limit == 0 {
            return Err(PortfolioError::validation("n_stocks", "must be positive"));
        }
        if !(self.min_dividend.is_finite() && self.min_dividend >= 0.0) {
            return Err(PortfolioError::validation(
                "min_dividend",
                "must be a non-negative number",
            ));
        }
        if !(self.min_liquidity.is_finite() && self.min_liquidity >= 0.0) {
            return Err(PortfolioError::validation(
                "min_liquidity",
                "must be a non-negative number",
            ));
        }
        if !(self.max_volatility.is_finite() && self.max_volatility > 0.0) {
            return Err(PortfolioError::validation(
                "max_volatility",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for CandidateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "limit={}, dividend>={:.4}, liquidity>={:.0}, volatility<={:.4}",
            self.limit, self.min_dividend, self.min_liquidity, self.max_volatility
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(sy: i32, sm: u32, ey: i32, em: u32) -> BacktestingPeriod {
        BacktestingPeriod {
            start_year: sy,
            start_month: sm,
            end_year: ey,
            end_month: em,
        }
    }

    fn condition(style: &str) -> Condition {
        Condition {
            n_stock: 5,
            min_dividend: 2.0,
            investment_style: style.to_string(),
            backtesting_period: period(2020, 1, 2023, 12),
        }
    }

    #[test]
    fn style_parses_english_and_korean() {
        assert_eq!(
            "aggressive".parse::<InvestmentStyle>().unwrap(),
            InvestmentStyle::Aggressive
        );
        assert_eq!(
            "Stable".parse::<InvestmentStyle>().unwrap(),
            InvestmentStyle::Stable
        );
        assert_eq!(
            "위험중립형".parse::<InvestmentStyle>().unwrap(),
            InvestmentStyle::Neutral
        );
        assert!("yolo".parse::<InvestmentStyle>().is_err());
    }

    #[test]
    fn presets_match_table() {
        assert_eq!(InvestmentStyle::Aggressive.max_volatility(), 0.15);
        assert_eq!(InvestmentStyle::Active.target_return(), 0.05);
        assert_eq!(InvestmentStyle::Conservative.max_volatility(), 0.03);
        assert_eq!(InvestmentStyle::Stable.target_return(), 0.02);
    }

    #[test]
    fn period_dates_cover_whole_months() {
        let p = period(2020, 2, 2024, 2);
        assert_eq!(p.start_date().unwrap(), NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(p.end_date().unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let p = period(2020, 1, 2023, 12);
        assert_eq!(p.end_date().unwrap(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn period_rejects_out_of_range_years() {
        assert!(period(1965, 1, 2020, 1).validate_at(2024).is_err());
        assert!(period(2020, 1, 2025, 1).validate_at(2024).is_err());
        assert!(period(0, 1, 2020, 1).validate_at(2024).is_err());
        assert!(period(2020, 1, 2021, 1).validate_at(2024).is_ok());
    }

    #[test]
    fn period_rejects_bad_months_and_order() {
        assert!(period(2020, 0, 2021, 1).validate_at(2024).is_err());
        assert!(period(2020, 1, 2021, 13).validate_at(2024).is_err());
        assert!(period(2021, 1, 2020, 1).validate_at(2024).is_err());
        assert!(period(2021, 6, 2021, 5).validate_at(2024).is_err());
        assert!(period(2021, 6, 2021, 6).validate_at(2024).is_ok());
    }

    #[test]
    fn condition_resolves_preset() {
        let resolved = condition("적극투자형").resolve_at(2024).unwrap();
        assert_eq!(resolved.max_volatility, 0.10);
        assert_eq!(resolved.target_return, 0.05);
        let filter = resolved.candidate_filter();
        assert_eq!(filter.limit, 5);
        assert!((filter.min_dividend - 0.02).abs() < 1e-12);
        assert_eq!(filter.min_liquidity, 500_000_000.0);
    }

    #[test]
    fn condition_rejects_non_positive_inputs() {
        let mut c = condition("neutral");
        c.n_stock = 0;
        assert!(matches!(
            c.resolve_at(2024),
            Err(PortfolioError::Validation { field, .. }) if field == "n_stock"
        ));
        let mut c = condition("neutral");
        c.min_dividend = 0.0;
        assert!(c.resolve_at(2024).is_err());
        assert!(condition("unknown").resolve_at(2024).is_err());
    }

    #[test]
    fn filter_validation() {
        assert!(CandidateFilter::default().validate().is_ok());
        let bad = CandidateFilter {
            limit: 0,
            ..CandidateFilter::default()
        };
        assert!(bad.validate().is_err());
    }
}
