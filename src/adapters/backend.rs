//! Explicit data backend selection from `[database] backend`.

use crate::domain::error::PortfolioError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackend {
    Sqlite,
    Postgres,
    Csv,
}

impl FromStr for DataBackend {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DataBackend::Sqlite),
            "postgres" | "postgresql" => Ok(DataBackend::Postgres),
            "csv" => Ok(DataBackend::Csv),
            other => Err(PortfolioError::ConfigInvalid {
                section: "database".into(),
                key: "backend".into(),
                reason: format!("unknown backend '{other}' (expected sqlite, postgres or csv)"),
            }),
        }
    }
}

impl fmt::Display for DataBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataBackend::Sqlite => "sqlite",
            DataBackend::Postgres => "postgres",
            DataBackend::Csv => "csv",
        })
    }
}

impl DataBackend {
    /// Reads `[database] backend`; the key is required.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        config
            .get_string("database", "backend")
            .ok_or_else(|| PortfolioError::ConfigMissing {
                section: "database".into(),
                key: "backend".into(),
            })?
            .parse()
    }

    /// Opens the selected backend. The returned handle owns its pool.
    pub fn open(
        self,
        config: &dyn ConfigPort,
    ) -> Result<Box<dyn DataPort + Send + Sync>, PortfolioError> {
        info!(backend = %self, "opening data backend");
        match self {
            DataBackend::Csv => {
                let dir = config.get_string("database", "csv_dir").ok_or_else(|| {
                    PortfolioError::ConfigMissing {
                        section: "database".into(),
                        key: "csv_dir".into(),
                    }
                })?;
                Ok(Box::new(crate::adapters::csv_adapter::CsvAdapter::new(
                    PathBuf::from(dir),
                )))
            }
            #[cfg(feature = "sqlite")]
            DataBackend::Sqlite => Ok(Box::new(
                crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?,
            )),
            #[cfg(feature = "postgres")]
            DataBackend::Postgres => Ok(Box::new(
                crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?,
            )),
            #[allow(unreachable_patterns)]
            other => Err(PortfolioError::ConfigInvalid {
                section: "database".into(),
                key: "backend".into(),
                reason: format!("backend '{other}' is not compiled into this build"),
            }),
        }
    }
}

/// Reads the backend selection and opens it.
pub fn open_data_port(
    config: &dyn ConfigPort,
) -> Result<Box<dyn DataPort + Send + Sync>, PortfolioError> {
    DataBackend::from_config(config)?.open(config)
}
