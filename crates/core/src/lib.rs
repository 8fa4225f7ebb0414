//! # vigil-core
//!
//! Shared types, configuration, and logging for the Vigil anomaly
//! detection platform.
//!
//! This crate provides the foundational building blocks used across all
//! other crates in the workspace: the OHLCV candle type consumed by the
//! feature pipeline, the layered application configuration, and the
//! tracing setup.

pub mod config;
pub mod logging;
pub mod types;
