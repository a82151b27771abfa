//! # Redemption Price Sources
//!
//! The replay reads the protocol redemption price at a bounded cadence. The
//! read is the only suspension point of a replay and is awaited before the
//! event that triggered it is applied.

use async_trait::async_trait;

/// Error returned by a price source
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Provider of the redemption price (token1 per token0) in force at a timestamp
#[async_trait]
pub trait RedemptionPriceSource: Send + Sync {
    async fn redemption_price_at(&self, timestamp: u64) -> Result<f64, SourceError>;
}

/// A redemption price that never changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRedemptionPrice(pub f64);

#[async_trait]
impl RedemptionPriceSource for FixedRedemptionPrice {
    async fn redemption_price_at(&self, _timestamp: u64) -> Result<f64, SourceError> {
        Ok(self.0)
    }
}

/// Step-wise redemption price history: each price holds from its timestamp on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedemptionPriceSchedule {
    points: Vec<(u64, f64)>,
}

impl RedemptionPriceSchedule {
    pub fn new(mut points: Vec<(u64, f64)>) -> Self {
        points.sort_by_key(|(timestamp, _)| *timestamp);
        Self { points }
    }

    /// Price in force at `timestamp`, if any point precedes it
    pub fn price_at(&self, timestamp: u64) -> Option<f64> {
        let idx = self.points.partition_point(|(ts, _)| *ts <= timestamp);
        idx.checked_sub(1).map(|i| self.points[i].1)
    }
}

#[async_trait]
impl RedemptionPriceSource for RedemptionPriceSchedule {
    async fn redemption_price_at(&self, timestamp: u64) -> Result<f64, SourceError> {
        self.price_at(timestamp)
            .ok_or_else(|| format!("no redemption price recorded at or before {timestamp}").into())
    }
}
