//! Donor analytics core: feature synthesis, giving metrics, propensity
//! deciles, campaign simulation, and the data quality checks around them.

pub mod config;
pub mod error;
pub mod features;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod records;
pub mod rng;
pub mod scoring;
pub mod segments;
pub mod simulator;
pub mod stats;
pub mod store;
pub mod types;
