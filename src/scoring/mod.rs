//! Composite scoring module
//!
//! Turns a feature vector into a bounded, explainable momentum score.

mod engine;
mod types;

pub use engine::ScoringEngine;
pub use types::{
    ClusterTag, Contribution, FeatureBounds, FusionSignals, RiskFlag, ScoredResult, ScoringError,
    Weights,
};
