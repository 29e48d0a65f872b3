//! Domain error types.

/// Top-level error type. Every pipeline stage fails fast with one of these.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no candidates match the screening filter ({filter})")]
    NoCandidates { filter: String },

    #[error("price history unavailable for {code}: {reason}")]
    PriceUnavailable { code: String, reason: String },

    #[error("benchmark unavailable: {reason}")]
    BenchmarkUnavailable { reason: String },

    #[error("infeasible allocation constraints: {reason}")]
    InfeasibleConstraints { reason: String },

    #[error("allocation references unknown instrument {code}")]
    InconsistentAllocation { code: String },

    #[error("insufficient history: {reason}")]
    InsufficientHistory { reason: String },

    #[error("optimization did not converge within {iterations} iterations ({elapsed_ms} ms)")]
    OptimizationTimeout { iterations: usize, elapsed_ms: u128 },

    #[error("computation error: {reason}")]
    Computation { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PortfolioError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short tag naming the error kind, stable across messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PortfolioError::Validation { .. } => "ValidationError",
            PortfolioError::NoCandidates { .. } => "NoCandidates",
            PortfolioError::PriceUnavailable { .. } => "PriceUnavailable",
            PortfolioError::BenchmarkUnavailable { .. } => "BenchmarkUnavailable",
            PortfolioError::InfeasibleConstraints { .. } => "InfeasibleConstraints",
            PortfolioError::InconsistentAllocation { .. } => "InconsistentAllocation",
            PortfolioError::InsufficientHistory { .. } => "InsufficientHistory",
            PortfolioError::OptimizationTimeout { .. } => "OptimizationTimeout",
            PortfolioError::Computation { .. } => "ComputationError",
            PortfolioError::Database { .. } | PortfolioError::DatabaseQuery { .. } => {
                "DatabaseError"
            }
            PortfolioError::ConfigParse { .. }
            | PortfolioError::ConfigMissing { .. }
            | PortfolioError::ConfigInvalid { .. } => "ConfigError",
            PortfolioError::Io(_) => "IoError",
        }
    }
}

impl From<&PortfolioError> for std::process::ExitCode {
    fn from(err: &PortfolioError) -> Self {
        let code: u8 = match err {
            PortfolioError::Io(_) => 1,
            PortfolioError::ConfigParse { .. }
            | PortfolioError::ConfigMissing { .. }
            | PortfolioError::ConfigInvalid { .. }
            | PortfolioError::Validation { .. } => 2,
            PortfolioError::Database { .. } | PortfolioError::DatabaseQuery { .. } => 3,
            PortfolioError::NoCandidates { .. }
            | PortfolioError::PriceUnavailable { .. }
            | PortfolioError::BenchmarkUnavailable { .. }
            | PortfolioError::InsufficientHistory { .. } => 5,
            PortfolioError::InfeasibleConstraints { .. }
            | PortfolioError::InconsistentAllocation { .. } => 6,
            PortfolioError::OptimizationTimeout { .. } | PortfolioError::Computation { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
