//! Concrete adapter implementations for ports.

pub mod backend;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_report;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "web")]
pub mod web;
