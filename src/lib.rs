//! portfolio-backtester: mean-variance allocation and buy-and-hold backtesting.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], command surface in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
