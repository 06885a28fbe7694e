//! Shared primitives for the fraud-risk engine.
//!
//! This crate holds what every other layer depends on:
//! - [`feature`]: flexible per-record feature maps with lenient numeric coercion
//! - [`metrics`]: confusion counts, classification metrics and percentiles
//! - [`config`]: typed configuration with environment overrides
//!
//! Nothing here holds locks or spawns tasks.

pub mod config;
pub mod feature;
pub mod metrics;

pub use config::{
    load_dotenv, CalibratorConfig, ConsensusConfig, DriftConfig, EngineConfig, RetrainConfig,
    ScorerConfig,
};
pub use feature::*;
pub use metrics::*;
