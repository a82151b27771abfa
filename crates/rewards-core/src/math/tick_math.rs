//! # Tick Math
//!
//! Conversions between ticks, Q64.96 sqrt prices and plain prices.
//! Values are floating point: the replay works on subgraph-indexed figures
//! rather than exact on-chain integers.

use crate::constants::{MAX_TICK, MIN_TICK, SQRT_PRICE_SCALE, TICK_BASE};

/// Get the Q64.96 sqrt price at a tick: `1.0001^(tick/2) * 2^96`
pub fn get_sqrt_price_at_tick(tick: i32) -> f64 {
    TICK_BASE.powf(f64::from(tick) / 2.0) * SQRT_PRICE_SCALE
}

/// Get the fractional tick of a Q64.96 sqrt price.
///
/// Returns `None` for non-positive or non-finite prices, which have no tick.
pub fn get_exact_tick_at_sqrt_price(sqrt_price_x96: f64) -> Option<f64> {
    if !sqrt_price_x96.is_finite() || sqrt_price_x96 <= 0.0 {
        return None;
    }
    Some((sqrt_price_x96 / SQRT_PRICE_SCALE).ln() / TICK_BASE.sqrt().ln())
}

/// Get the tick containing a Q64.96 sqrt price (rounded toward negative infinity)
pub fn get_tick_at_sqrt_price(sqrt_price_x96: f64) -> Option<i32> {
    let exact = get_exact_tick_at_sqrt_price(sqrt_price_x96)?;
    Some(exact.floor().clamp(f64::from(MIN_TICK), f64::from(MAX_TICK)) as i32)
}

/// Convert a plain price (token1 per token0) to a Q64.96 sqrt price
pub fn price_to_sqrt_price(price: f64) -> Option<f64> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    Some(price.sqrt() * SQRT_PRICE_SCALE)
}

/// Convert a Q64.96 sqrt price to a plain price (token1 per token0)
pub fn sqrt_price_to_price(sqrt_price_x96: f64) -> f64 {
    let ratio = sqrt_price_x96 / SQRT_PRICE_SCALE;
    ratio * ratio
}

/// Round a tick down to the closest multiple of the tick spacing
pub fn floor_to_tick_spacing(tick: i32, tick_spacing: i32) -> i32 {
    let compressed = tick / tick_spacing;
    if tick < 0 && tick % tick_spacing != 0 {
        (compressed - 1) * tick_spacing
    } else {
        compressed * tick_spacing
    }
}

/// Check if a tick is within the supported range
pub fn is_tick_valid(tick: i32) -> bool {
    (MIN_TICK..=MAX_TICK).contains(&tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tick_zero_is_unit_price() {
        assert_relative_eq!(get_sqrt_price_at_tick(0), SQRT_PRICE_SCALE);
        assert_eq!(get_tick_at_sqrt_price(SQRT_PRICE_SCALE), Some(0));
    }

    #[test]
    fn test_sqrt_price_to_tick_round_trip() {
        for tick in [-68_280, -1_000, -10, 10, 1_000, 65_460] {
            // Nudge inside the tick so floating noise can't drop a whole tick
            let sqrt_price = get_sqrt_price_at_tick(tick) * 1.000_001;
            assert_eq!(get_tick_at_sqrt_price(sqrt_price), Some(tick));
        }
    }

    #[test]
    fn test_market_tick_of_known_pool_price() {
        let tick = get_tick_at_sqrt_price(2_952_324_728_441_008_265_762_276_596.0).unwrap();
        assert_eq!(tick, -65_799);
    }

    #[test]
    fn test_invalid_prices_have_no_tick() {
        assert_eq!(get_tick_at_sqrt_price(0.0), None);
        assert_eq!(get_tick_at_sqrt_price(-1.0), None);
        assert_eq!(get_tick_at_sqrt_price(f64::NAN), None);
        assert_eq!(price_to_sqrt_price(0.0), None);
    }

    #[test]
    fn test_price_round_trip() {
        let sqrt_price = price_to_sqrt_price(3.0).unwrap();
        assert_relative_eq!(sqrt_price_to_price(sqrt_price), 3.0, max_relative = 1e-12);
    }

    #[test]
    fn test_floor_to_tick_spacing() {
        let spacing = 10;

        assert_eq!(floor_to_tick_spacing(5, spacing), 0);
        assert_eq!(floor_to_tick_spacing(10, spacing), 10);
        assert_eq!(floor_to_tick_spacing(-5, spacing), -10);
        assert_eq!(floor_to_tick_spacing(-10, spacing), -10);
        assert_eq!(floor_to_tick_spacing(-65_799, spacing), -65_800);
    }

    #[test]
    fn test_tick_bounds() {
        assert!(is_tick_valid(MIN_TICK));
        assert!(is_tick_valid(MAX_TICK));
        assert!(!is_tick_valid(MAX_TICK + 1));
    }
}
