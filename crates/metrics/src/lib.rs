//! Metrics for the wabridge WhatsApp Business client.
//!
//! Library crates record through the `metrics` facade re-exported here, using
//! the names in this crate's definition modules. With the `prometheus`
//! feature enabled, [`init_metrics`] installs a Prometheus recorder whose
//! output can be rendered on demand.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wabridge_metrics::{counter, dispatch, labels};
//!
//! counter!(dispatch::SENDS_TOTAL, labels::OUTCOME => "success").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
