//! Allocation: the weight vector produced by the allocator.

use crate::domain::error::PortfolioError;

/// Tolerance on `Σ weight = 1`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Bounds and return target handed to the allocator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationConstraints {
    pub min_weight: f64,
    pub max_weight: f64,
    /// Minimum annualized expected return.
    pub target_return: f64,
}

impl Default for AllocationConstraints {
    fn default() -> Self {
        Self {
            min_weight: 0.05,
            max_weight: 0.90,
            target_return: 0.05,
        }
    }
}

impl AllocationConstraints {
    /// Checks `0 <= min_weight <= max_weight <= 1`.
    pub fn validate(&self) -> Result<(), PortfolioError> {
        if !self.min_weight.is_finite() || self.min_weight < 0.0 {
            return Err(PortfolioError::validation(
                "min_weight",
                "must be a non-negative number",
            ));
        }
        if !self.max_weight.is_finite() || self.max_weight > 1.0 {
            return Err(PortfolioError::validation(
                "max_weight",
                "must be a number no greater than 1",
            ));
        }
        if self.min_weight > self.max_weight {
            return Err(PortfolioError::validation(
                "min_weight",
                "must not exceed max_weight",
            ));
        }
        if !self.target_return.is_finite() {
            return Err(PortfolioError::validation(
                "target_return",
                "must be a finite number",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Weight {
    pub code: String,
    pub weight: f64,
}

/// Instrument code → weight. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    weights: Vec<Weight>,
}

impl Allocation {
    /// Wraps `(code, weight)` pairs, rejecting duplicates, non-finite weights and
    /// weights that do not sum to one.
    pub fn new(weights: Vec<Weight>) -> Result<Self, PortfolioError> {
        if weights.is_empty() {
            return Err(PortfolioError::Computation {
                reason: "allocation has no instruments".into(),
            });
        }
        for (i, w) in weights.iter().enumerate() {
            if !w.weight.is_finite() {
                return Err(PortfolioError::Computation {
                    reason: format!("non-finite weight for {}", w.code),
                });
            }
            if weights[..i].iter().any(|other| other.code == w.code) {
                return Err(PortfolioError::Computation {
                    reason: format!("duplicate weight for {}", w.code),
                });
            }
        }
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PortfolioError::Computation {
                reason: format!("weights sum to {total}, expected 1"),
            });
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.code == code)
            .map(|w| w.weight)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }
}
