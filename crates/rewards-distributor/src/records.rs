//! Subgraph row types
//!
//! Subgraphs return big numbers as decimal strings; rows keep them as
//! strings and are parsed when converted into campaign data.

use std::str::FromStr;

use rewards_core::{Address, LpPosition};
use serde::Deserialize;

use crate::error::{DistributorError, DistributorResult};

// ============================================================================
// Debt protocol subgraph
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub address: String,
}

/// Safe handler and the account that owns it
#[derive(Debug, Clone, Deserialize)]
pub struct SafeHandlerOwnerRecord {
    pub id: String,
    pub owner: AccountRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeDebtRecord {
    pub debt: String,
    pub safe_handler: String,
}

/// A debt change of one safe: a modification or a confiscation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeModificationRecord {
    pub id: String,
    pub delta_debt: String,
    pub safe_handler: String,
    pub created_at: String,
}

/// Debt moved from one safe to another
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtTransferRecord {
    pub id: String,
    pub delta_debt: String,
    pub created_at: String,
    pub src_handler: String,
    pub dst_handler: String,
}

impl DebtTransferRecord {
    /// The transfer as a debit of the source and a credit of the destination
    pub fn split(&self) -> [SafeModificationRecord; 2] {
        let debit = match self.delta_debt.strip_prefix('-') {
            Some(positive) => positive.to_string(),
            None => format!("-{}", self.delta_debt),
        };

        [
            SafeModificationRecord {
                id: self.id.clone(),
                delta_debt: self.delta_debt.clone(),
                safe_handler: self.dst_handler.clone(),
                created_at: self.created_at.clone(),
            },
            SafeModificationRecord {
                id: self.id.clone(),
                delta_debt: debit,
                safe_handler: self.src_handler.clone(),
                created_at: self.created_at.clone(),
            },
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedRateUpdateRecord {
    pub id: String,
    pub rate_multiplier: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralTypeRecord {
    pub accumulated_rate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionPriceRecord {
    pub value: String,
    pub timestamp: String,
}

// ============================================================================
// Pool subgraph
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRef {
    pub tick_idx: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub id: String,
    pub owner: String,
    pub liquidity: String,
    pub tick_lower: TickRef,
    pub tick_upper: TickRef,
}

impl PositionRecord {
    pub fn to_position(&self) -> DistributorResult<LpPosition> {
        position(&self.id, &self.tick_lower, &self.tick_upper, &self.liquidity)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRef {
    pub id: String,
    pub tick_lower: TickRef,
    pub tick_upper: TickRef,
}

/// State of a position after a mint, burn, modification or transfer
#[derive(Debug, Clone, Deserialize)]
pub struct PositionSnapshotRecord {
    pub owner: String,
    pub timestamp: String,
    pub liquidity: String,
    pub position: PositionRef,
}

impl PositionSnapshotRecord {
    pub fn to_position(&self) -> DistributorResult<LpPosition> {
        let p = &self.position;
        position(&p.id, &p.tick_lower, &p.tick_upper, &self.liquidity)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    #[serde(rename = "sqrtPriceX96")]
    pub sqrt_price_x96: String,
    pub timestamp: String,
    pub log_index: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRecord {
    pub sqrt_price: String,
}

// ============================================================================
// Parsing
// ============================================================================

/// Account address of a subgraph row
pub fn address(raw: &str) -> Address {
    Address::new(raw)
}

/// Parse a finite decimal number
pub fn parse_f64(field: &str, raw: &str) -> DistributorResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DistributorError::parse(format!("{field}: expected a number, got {raw:?}")))
}

/// Parse an integer field
pub fn parse_int<T: FromStr>(field: &str, raw: &str) -> DistributorResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| DistributorError::parse(format!("{field}: expected an integer, got {raw:?}")))
}

fn position(id: &str, lower: &TickRef, upper: &TickRef, liquidity: &str) -> DistributorResult<LpPosition> {
    let position = LpPosition::new(
        parse_int("position id", id)?,
        parse_int("tickLower", &lower.tick_idx)?,
        parse_int("tickUpper", &upper.tick_idx)?,
        parse_f64("liquidity", liquidity)?,
    );
    position.validate()?;
    Ok(position)
}
