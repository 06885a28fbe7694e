//! Top-level fraud-risk engine.
//!
//! This crate wires the subsystem crates into one facade:
//! - [`Engine`]: explicit per-instance context, no globals
//! - standard validators bridging rules and the ensemble into consensus
//! - feedback routed to both the learner and the calibrator
//! - JSON snapshots with versioned model parameters
//! - a background retrain monitor with explicit shutdown
//!
//! Predictors are always rebuilt through a [`PredictorRegistry`], never
//! deserialized as opaque state.

pub mod engine;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod snapshot;
pub mod validators;

pub use engine::Engine;
pub use error::EngineError;
pub use monitor::RetrainMonitor;
pub use registry::PredictorRegistry;
pub use snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
pub use validators::{EnsembleValidator, RuleCatalogValidator, FRAUD, LEGIT};
