//! # Core Error Types
//!
//! Every error raised by the replay core is fatal: a ledger produced by a
//! replay that returned an error is not a valid distribution.

use thiserror::Error;

use crate::types::{Address, EventKind, TokenId};

/// Malformed input or a broken ledger invariant
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    // ========================================================================
    // Event Shape Errors
    // ========================================================================

    #[error("Event is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("{0} event requires an address")]
    MissingAddress(EventKind),

    #[error("{kind} event must not carry an address (got {address})")]
    UnexpectedAddress { kind: EventKind, address: String },

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EventKind, reason: String },

    #[error("Events out of order: ({prev_timestamp}, {prev_log_index}) followed by ({timestamp}, {log_index})")]
    OutOfOrder {
        prev_timestamp: u64,
        prev_log_index: u64,
        timestamp: u64,
        log_index: u64,
    },

    #[error("Event at {timestamp} lies outside the campaign [{start}, {end}]")]
    OutsideCampaign { timestamp: u64, start: u64, end: u64 },

    // ========================================================================
    // Position Errors
    // ========================================================================

    #[error("Tick bounds of position {token_id} can't be updated: stored [{stored_lower}, {stored_upper}], observed [{lower}, {upper}]")]
    TickBoundsMutated {
        token_id: TokenId,
        stored_lower: i32,
        stored_upper: i32,
        lower: i32,
        upper: i32,
    },

    #[error("Position {token_id} has an empty tick range [{lower}, {upper}]")]
    InvalidTickRange { token_id: TokenId, lower: i32, upper: i32 },

    #[error("Position {token_id} has invalid liquidity {liquidity}")]
    InvalidLiquidity { token_id: TokenId, liquidity: f64 },

    #[error("Position {token_id} is held by both {first} and {second}")]
    DuplicateOwnership {
        token_id: TokenId,
        first: Address,
        second: Address,
    },

    #[error("Ownership index disagrees with position sets for position {0}")]
    OwnershipIndexCorrupted(TokenId),

    // ========================================================================
    // Ledger Invariant Errors
    // ========================================================================

    #[error("Negative staking weight {weight} for {address}")]
    NegativeWeight { address: Address, weight: f64 },

    #[error("Negative debt {debt} for {address}")]
    NegativeDebt { address: Address, debt: f64 },

    #[error("Non-finite {field} for {address}")]
    NonFinite { address: Address, field: &'static str },

    #[error("Earned balance of {address} would decrease from {before} to {after}")]
    EarnedDecreased { address: Address, before: f64, after: f64 },

    #[error("Reward snapshot of {address} ({stored}) is ahead of the accumulator ({current})")]
    SnapshotAhead { address: Address, stored: f64, current: f64 },

    // ========================================================================
    // Parameter Errors
    // ========================================================================

    #[error("Invalid Q64.96 sqrt price {0}")]
    InvalidSqrtPrice(f64),

    #[error("Invalid campaign window: start {start}, end {end}")]
    InvalidCampaign { start: u64, end: u64 },

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },
}

/// Failure of a whole replay
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("Event #{index} (timestamp {timestamp}, log index {log_index}) rejected: {source}")]
    Event {
        index: usize,
        timestamp: u64,
        log_index: u64,
        #[source]
        source: ConsistencyError,
    },

    #[error("Redemption price lookup failed at {timestamp}: {message}")]
    PriceSource { timestamp: u64, message: String },
}

/// Result type for ledger and event operations
pub type CoreResult<T> = Result<T, ConsistencyError>;

/// Result type for a replay
pub type ReplayResult<T> = Result<T, ReplayError>;
