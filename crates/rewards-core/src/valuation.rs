//! # Position Valuation
//!
//! Token amounts a range position would return if withdrawn at a given
//! market price, and the reference-price range test used for weighting.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TICK_SPACING;
use crate::errors::{ConsistencyError, CoreResult};
use crate::math::{
    floor_to_tick_spacing, get_amount_0_delta, get_amount_1_delta, get_sqrt_price_at_tick,
    get_tick_at_sqrt_price, price_to_sqrt_price,
};
use crate::types::LpPosition;

/// Withdrawable token amounts of a position, in whole tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenAmounts {
    pub amount0: f64,
    pub amount1: f64,
}

/// Prices a weight is evaluated against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceContext {
    /// Q64.96 market sqrt price of the pool
    pub sqrt_price: f64,
    /// Protocol redemption price, in token1 per token0
    pub redemption_price: f64,
    /// Pool tick spacing
    pub tick_spacing: i32,
}

impl PriceContext {
    pub fn new(sqrt_price: f64, redemption_price: f64) -> Self {
        Self {
            sqrt_price,
            redemption_price,
            tick_spacing: DEFAULT_TICK_SPACING,
        }
    }

    pub fn with_tick_spacing(mut self, tick_spacing: i32) -> Self {
        self.tick_spacing = tick_spacing;
        self
    }

    /// Tick of the redemption price, floored to the tick spacing
    pub fn reference_tick(&self) -> Option<i32> {
        reference_tick(self.redemption_price, self.tick_spacing)
    }
}

/// Value a position at a Q64.96 market sqrt price.
///
/// Fails on a sqrt price that is not positive and finite.
pub fn get_position_amounts(position: &LpPosition, sqrt_price_x96: f64) -> CoreResult<TokenAmounts> {
    let tick = get_tick_at_sqrt_price(sqrt_price_x96).ok_or(ConsistencyError::InvalidSqrtPrice(sqrt_price_x96))?;
    let sqrt_lower = get_sqrt_price_at_tick(position.lower_tick);
    let sqrt_upper = get_sqrt_price_at_tick(position.upper_tick);

    let amounts = if tick < position.lower_tick {
        // Below range: everything sits in token0
        TokenAmounts {
            amount0: get_amount_0_delta(sqrt_lower, sqrt_upper, position.liquidity),
            amount1: 0.0,
        }
    } else if tick < position.upper_tick {
        TokenAmounts {
            amount0: get_amount_0_delta(sqrt_price_x96, sqrt_upper, position.liquidity),
            amount1: get_amount_1_delta(sqrt_lower, sqrt_price_x96, position.liquidity),
        }
    } else {
        // Above range: everything sits in token1
        TokenAmounts {
            amount0: 0.0,
            amount1: get_amount_1_delta(sqrt_lower, sqrt_upper, position.liquidity),
        }
    };
    Ok(amounts)
}

/// Tick of a plain reference price, floored to a multiple of the tick spacing
pub fn reference_tick(reference_price: f64, tick_spacing: i32) -> Option<i32> {
    let sqrt_price = price_to_sqrt_price(reference_price)?;
    let tick = get_tick_at_sqrt_price(sqrt_price)?;
    Some(floor_to_tick_spacing(tick, tick_spacing.max(1)))
}

/// Whether a position covers the reference tick (both bounds inclusive)
pub fn is_reference_in_range(position: &LpPosition, reference_tick: i32) -> bool {
    position.lower_tick <= reference_tick && reference_tick <= position.upper_tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_amounts_in_price_range() {
        let position = LpPosition::new(123, -68_280, -65_460, 6_669_887_711_769_083_335_609.0);
        let amounts = get_position_amounts(&position, 2_952_324_728_441_008_265_762_276_596.0).unwrap();

        assert_abs_diff_eq!(amounts.amount0, 2_999.999_999_999_999_999_932, epsilon = 1e-4);
        assert_abs_diff_eq!(amounts.amount1, 29.005_071_564_000_383_981, epsilon = 1e-4);
    }

    #[test]
    fn test_amounts_above_price_range() {
        let position = LpPosition::new(123, -68_760, -65_520, 707_857_153_197_436_338_506.0);
        let amounts = get_position_amounts(&position, 3_006_355_430_238_031_041_338_241_866.0).unwrap();

        assert_eq!(amounts.amount0, 0.0);
        assert_abs_diff_eq!(amounts.amount1, 4.000_000_000_001_034, epsilon = 1e-4);
    }

    #[test]
    fn test_amounts_below_price_range() {
        let position = LpPosition::new(123, -50, -20, 7_911_135_800_609_390_384_613.0);
        let amounts = get_position_amounts(&position, 13_719_007_701_227_188_922_991_784_751.0).unwrap();

        assert_abs_diff_eq!(amounts.amount0, 11.886_894_353_325_49, epsilon = 1e-4);
        assert_eq!(amounts.amount1, 0.0);
    }

    #[test]
    fn test_amounts_reject_invalid_sqrt_price() {
        let position = LpPosition::new(123, -50, -20, 1e21);

        for sqrt_price in [f64::NAN, 0.0, -5.0, f64::INFINITY] {
            assert!(matches!(
                get_position_amounts(&position, sqrt_price),
                Err(ConsistencyError::InvalidSqrtPrice(_))
            ));
        }
    }

    #[test]
    fn test_reference_tick_is_floored_to_spacing() {
        // price 3.0 sits at tick 10986.67
        assert_eq!(reference_tick(3.0, 10), Some(10_980));
        assert_eq!(reference_tick(3.0, 1), Some(10_986));
        // price below 1 floors away from zero
        assert_eq!(reference_tick(0.5, 10), Some(-6_940));
        assert_eq!(reference_tick(0.0, 10), None);
    }

    #[test]
    fn test_reference_range_bounds_are_inclusive() {
        let position = LpPosition::new(1, 10_900, 11_000, 1.0);

        assert!(is_reference_in_range(&position, 10_900));
        assert!(is_reference_in_range(&position, 11_000));
        assert!(!is_reference_in_range(&position, 10_890));
        assert!(!is_reference_in_range(&position, 11_010));
    }
}
