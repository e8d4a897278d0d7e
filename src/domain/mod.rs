//! Core domain types and logic.

pub mod aggregator;
pub mod batch;
pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod indicator;
pub mod live;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod signal;
pub mod sizing;
pub mod strategy;
