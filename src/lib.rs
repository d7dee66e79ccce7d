//! # Signal Desk
//! Intraday and swing equity signals with execution advice and fill-quality
//! coaching.
//!
//! A scan discovers a universe, fetches bars through a fail-fast provider
//! chain, scores each symbol and turns qualifying ones into bracketed
//! [`signal::Signal`]s. Advice and fill analysis consume those signals on
//! demand.

pub use crate::utils::error::{Error, Result};

pub mod cache;
pub mod config;
pub mod execution;
pub mod features;
pub mod indicators;
pub mod maintenance;
pub mod market_data;
pub mod metrics;
pub mod microstructure;
pub mod performance;
pub mod persistence;
pub mod pipeline;
pub mod risk;
pub mod scoring;
pub mod service;
pub mod signal;
pub mod universe;
pub mod utils;

pub use service::{DayPicksResponse, SignalDesk, SwingPicksResponse};
