//! Feature extraction
//!
//! Pure numeric indicators plus the per-asset feature vector consumed by the
//! scoring engine.

mod indicators;
mod synthetic;
mod vector;

pub use indicators::{
    clamp, ema, ema_cross, median, normalize, rsi, trailing_return, trailing_returns,
    volatility, volume_ratio,
};
pub use synthetic::synthetic_vector;
pub use vector::{FeatureKind, FeatureVector, Technicals};
