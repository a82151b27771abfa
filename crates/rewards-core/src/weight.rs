//! # Staking Weight
//!
//! A user's weight is the liquidity of their positions that cover the
//! reference price, discounted linearly when their debt does not back the
//! debt-token value of those positions.

use crate::errors::CoreResult;
use crate::types::LpPosition;
use crate::valuation::{get_position_amounts, is_reference_in_range, PriceContext};

/// Liquidity and debt-token value of the reference-in-range positions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightBreakdown {
    pub total_liquidity: f64,
    pub total_backed_value: f64,
    pub weight: f64,
}

/// Compute a user's staking weight with the full breakdown
pub fn weight_breakdown<'a>(
    debt: f64,
    positions: impl IntoIterator<Item = &'a LpPosition>,
    prices: &PriceContext,
) -> CoreResult<WeightBreakdown> {
    let Some(reference_tick) = prices.reference_tick() else {
        return Ok(WeightBreakdown::default());
    };

    let mut total_liquidity = 0.0;
    let mut total_backed_value = 0.0;
    for position in positions {
        if !is_reference_in_range(position, reference_tick) {
            continue;
        }
        total_liquidity += position.liquidity;
        total_backed_value += get_position_amounts(position, prices.sqrt_price)?.amount0;
    }

    let weight = if total_liquidity <= 0.0 || total_backed_value <= 0.0 {
        // Nothing in range, or nothing the debt could back
        0.0
    } else if debt >= total_backed_value {
        total_liquidity
    } else {
        total_liquidity * (debt.max(0.0) / total_backed_value)
    };

    Ok(WeightBreakdown {
        total_liquidity,
        total_backed_value,
        weight,
    })
}

/// Compute a user's staking weight
pub fn staking_weight<'a>(
    debt: f64,
    positions: impl IntoIterator<Item = &'a LpPosition>,
    prices: &PriceContext,
) -> CoreResult<f64> {
    Ok(weight_breakdown(debt, positions, prices)?.weight)
}

/// Compute a staking weight at the default pool tick spacing
pub fn get_staking_weight(debt: f64, positions: &[LpPosition], sqrt_price: f64, redemption_price: f64) -> CoreResult<f64> {
    staking_weight(debt, positions, &PriceContext::new(sqrt_price, redemption_price))
}
