//! # Mathematical Functions
//!
//! Concentrated liquidity conversions between ticks, sqrt prices and token
//! amounts, all in the Q64.96 convention of [`crate::constants`].

pub mod liquidity_math;
pub mod tick_math;

// Re-export commonly used functions
pub use liquidity_math::*;
pub use tick_math::*;
