//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod event_sink;
pub mod file_config_adapter;
pub mod paper_broker;
pub mod replay_feed;
