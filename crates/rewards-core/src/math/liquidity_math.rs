//! # Liquidity Math
//!
//! Token amounts held by a concentrated liquidity range, in whole
//! (18-decimal) tokens, from Q64.96 sqrt prices.

use crate::constants::{SQRT_PRICE_SCALE, WAD};

/// Calculate the token0 amount spanned by liquidity between two sqrt prices
pub fn get_amount_0_delta(sqrt_ratio_a_x96: f64, sqrt_ratio_b_x96: f64, liquidity: f64) -> f64 {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        return get_amount_0_delta(sqrt_ratio_b_x96, sqrt_ratio_a_x96, liquidity);
    }

    let inverse_a = SQRT_PRICE_SCALE / sqrt_ratio_a_x96;
    let inverse_b = SQRT_PRICE_SCALE / sqrt_ratio_b_x96;
    liquidity * (inverse_a - inverse_b) / WAD
}

/// Calculate the token1 amount spanned by liquidity between two sqrt prices
pub fn get_amount_1_delta(sqrt_ratio_a_x96: f64, sqrt_ratio_b_x96: f64, liquidity: f64) -> f64 {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        return get_amount_1_delta(sqrt_ratio_b_x96, sqrt_ratio_a_x96, liquidity);
    }

    liquidity * (sqrt_ratio_b_x96 - sqrt_ratio_a_x96) / SQRT_PRICE_SCALE / WAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_math::get_sqrt_price_at_tick;
    use approx::assert_relative_eq;

    #[test]
    fn test_amount_deltas_are_symmetric_in_bounds() {
        let a = get_sqrt_price_at_tick(-100);
        let b = get_sqrt_price_at_tick(100);

        assert_relative_eq!(get_amount_0_delta(a, b, 1e18), get_amount_0_delta(b, a, 1e18));
        assert_relative_eq!(get_amount_1_delta(a, b, 1e18), get_amount_1_delta(b, a, 1e18));
    }

    #[test]
    fn test_empty_range_holds_nothing() {
        let a = get_sqrt_price_at_tick(500);
        assert_eq!(get_amount_0_delta(a, a, 1e21), 0.0);
        assert_eq!(get_amount_1_delta(a, a, 1e21), 0.0);
    }

    #[test]
    fn test_amounts_scale_linearly_with_liquidity() {
        let a = get_sqrt_price_at_tick(-60);
        let b = get_sqrt_price_at_tick(60);

        let single = get_amount_0_delta(a, b, 1e18);
        let double = get_amount_0_delta(a, b, 2e18);
        assert_relative_eq!(double, 2.0 * single, max_relative = 1e-12);
    }

    #[test]
    fn test_symmetric_range_around_unit_price() {
        // Around price 1 a symmetric range holds (almost) equal amounts
        let a = get_sqrt_price_at_tick(-10);
        let b = get_sqrt_price_at_tick(10);
        let mid = get_sqrt_price_at_tick(0);

        let amount0 = get_amount_0_delta(mid, b, 1e22);
        let amount1 = get_amount_1_delta(a, mid, 1e22);
        assert_relative_eq!(amount0, amount1, max_relative = 1e-3);
    }
}
