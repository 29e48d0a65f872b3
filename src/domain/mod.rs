//! Core domain types and logic.
//!
//! Data flows one way: [`price_set`] → [`allocator`] → [`simulator`] →
//! [`analyzer`], orchestrated by [`pipeline`].

pub mod allocation;
pub mod allocator;
pub mod analyzer;
pub mod config_validation;
pub mod error;
pub mod pipeline;
pub mod price;
pub mod price_set;
pub mod screening;
pub mod selection;
pub mod simulator;
pub mod solver;
