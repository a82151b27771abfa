//! # Campaign Constants
//!
//! Fixed-point scales and tick parameters shared by the valuer, the weight
//! calculator and the replay engine.
//!
//! Every sqrt price handled by this crate is a Q64.96 value carried in an
//! `f64`: the real square root of the pool price multiplied by
//! [`SQRT_PRICE_SCALE`]. Data arriving in another convention must be
//! converted at the boundary.

// ============================================================================
// Mathematical Constants
// ============================================================================

/// Q96 fixed-point scale of every sqrt price: 2^96
pub const SQRT_PRICE_SCALE: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Base of the tick price lattice (price at tick `t` is `TICK_BASE^t`)
pub const TICK_BASE: f64 = 1.0001;

/// Token amount scale, both pool tokens carry 18 decimals
pub const WAD: f64 = 1e18;

// ============================================================================
// Pool Constants
// ============================================================================

/// Minimum tick of a concentrated liquidity pool
pub const MIN_TICK: i32 = -887_272;

/// Maximum tick of a concentrated liquidity pool
pub const MAX_TICK: i32 = 887_272;

/// Tick spacing of the campaign pool (0.05% fee tier)
pub const DEFAULT_TICK_SPACING: i32 = 10;

// ============================================================================
// Replay Constants
// ============================================================================

/// Maximum age of the cached redemption price before it is read again (24h)
pub const DEFAULT_REDEMPTION_PRICE_REFRESH_SECS: u64 = 86_400;

/// Log index given to position snapshots, which carry no log index of their own
pub const POSITION_SNAPSHOT_LOG_INDEX: u64 = 1_000_000;

/// Number of events between two replay progress log lines
pub const PROGRESS_LOG_INTERVAL: usize = 1_000;

