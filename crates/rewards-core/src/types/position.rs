//! Concentrated liquidity positions

use serde::{Deserialize, Serialize};

use crate::errors::{ConsistencyError, CoreResult};
use crate::math::is_tick_valid;

/// NFT id of a liquidity position
pub type TokenId = u64;

/// A tick-range liquidity position.
///
/// Tick bounds are fixed when the position is first observed; only
/// `liquidity` changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpPosition {
    pub token_id: TokenId,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity: f64,
}

impl LpPosition {
    pub fn new(token_id: TokenId, lower_tick: i32, upper_tick: i32, liquidity: f64) -> Self {
        Self {
            token_id,
            lower_tick,
            upper_tick,
            liquidity,
        }
    }

    /// Reject empty or out-of-range tick bounds and negative liquidity
    pub fn validate(&self) -> CoreResult<()> {
        if self.lower_tick >= self.upper_tick
            || !is_tick_valid(self.lower_tick)
            || !is_tick_valid(self.upper_tick)
        {
            return Err(ConsistencyError::InvalidTickRange {
                token_id: self.token_id,
                lower: self.lower_tick,
                upper: self.upper_tick,
            });
        }

        if !self.liquidity.is_finite() || self.liquidity < 0.0 {
            return Err(ConsistencyError::InvalidLiquidity {
                token_id: self.token_id,
                liquidity: self.liquidity,
            });
        }

        Ok(())
    }

    /// Whether two observations share tick bounds
    pub fn same_bounds(&self, other: &LpPosition) -> bool {
        self.lower_tick == other.lower_tick && self.upper_tick == other.upper_tick
    }

    /// Calculate position width in ticks
    pub fn width_ticks(&self) -> u32 {
        self.upper_tick.abs_diff(self.lower_tick)
    }
}
