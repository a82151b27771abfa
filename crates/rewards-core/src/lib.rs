//! # Rewards Core - Liquidity Mining Replay
//!
//! Deterministic replay of a liquidity mining campaign. It provides:
//!
//! - Concentrated liquidity position valuation
//! - Staking weights backed by user debt
//! - The reward accrual engine and its ledger
//! - Consistency checks run after every event
//!
//! The crate performs no I/O. Event data and starting state are assembled
//! by the caller; the redemption price is read through
//! [`oracle::RedemptionPriceSource`].

pub mod constants;
pub mod engine;
pub mod errors;
pub mod math;
pub mod oracle;
pub mod types;
pub mod valuation;
pub mod weight;

// Re-export commonly used items
pub use constants::*;
pub use engine::{replay, check_invariants, ReplayParams, ReplaySummary, RewardEngine};
pub use errors::{ConsistencyError, CoreResult, ReplayError, ReplayResult};
pub use oracle::{FixedRedemptionPrice, RedemptionPriceSchedule, RedemptionPriceSource, SourceError};
pub use types::*;
pub use valuation::{get_position_amounts, PriceContext, TokenAmounts};
pub use weight::{get_staking_weight, staking_weight, weight_breakdown, WeightBreakdown};
