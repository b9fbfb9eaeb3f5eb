//! featuregate - contract validation and drift monitoring for batches of
//! value-prop interaction records
//!
//! A run ingests a window of records, validates them against a versioned
//! contract, summarizes their distributions, compares them against the
//! stored baseline, derives features and writes the dataset.

pub mod baseline;
pub mod cli;
pub mod config;
pub mod contract;
pub mod drift;
pub mod journal;
pub mod observability;
pub mod pipeline;
pub mod record;
pub mod stats;
pub mod transform;
pub mod validation;
