//! Replay parameters

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_REDEMPTION_PRICE_REFRESH_SECS, DEFAULT_TICK_SPACING};
use crate::errors::{ConsistencyError, CoreResult};

/// Campaign window, budget and starting market state of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayParams {
    /// Timestamp of the campaign start block
    pub campaign_start: u64,
    /// Timestamp of the campaign end block
    pub campaign_end: u64,
    /// Rewards distributed over the whole campaign
    pub total_budget: f64,
    /// Accumulated rate at the campaign start
    pub initial_accumulated_rate: f64,
    /// Q64.96 pool sqrt price at the campaign start
    pub initial_sqrt_price: f64,
    /// Negative debts no further below zero than this are clamped to zero
    pub debt_dust_tolerance: f64,
    /// Maximum age of the cached redemption price, in seconds
    pub redemption_price_refresh_secs: u64,
    /// Pool tick spacing for the reference range test
    pub tick_spacing: i32,
}

impl ReplayParams {
    pub fn new(
        campaign_start: u64,
        campaign_end: u64,
        total_budget: f64,
        initial_accumulated_rate: f64,
        initial_sqrt_price: f64,
        debt_dust_tolerance: f64,
    ) -> Self {
        Self {
            campaign_start,
            campaign_end,
            total_budget,
            initial_accumulated_rate,
            initial_sqrt_price,
            debt_dust_tolerance,
            redemption_price_refresh_secs: DEFAULT_REDEMPTION_PRICE_REFRESH_SECS,
            tick_spacing: DEFAULT_TICK_SPACING,
        }
    }

    pub fn with_refresh_secs(mut self, redemption_price_refresh_secs: u64) -> Self {
        self.redemption_price_refresh_secs = redemption_price_refresh_secs;
        self
    }

    pub fn with_tick_spacing(mut self, tick_spacing: i32) -> Self {
        self.tick_spacing = tick_spacing;
        self
    }

    /// Campaign length in seconds
    pub fn duration(&self) -> u64 {
        self.campaign_end.saturating_sub(self.campaign_start)
    }

    /// Constant reward emitted per second
    pub fn reward_rate(&self) -> f64 {
        self.total_budget / self.duration() as f64
    }

    /// Validate parameters before a replay touches the ledger
    pub fn validate(&self) -> CoreResult<()> {
        if self.campaign_end <= self.campaign_start {
            return Err(ConsistencyError::InvalidCampaign {
                start: self.campaign_start,
                end: self.campaign_end,
            });
        }

        check(
            "total_budget",
            self.total_budget,
            self.total_budget.is_finite() && self.total_budget >= 0.0,
        )?;
        check(
            "initial_accumulated_rate",
            self.initial_accumulated_rate,
            self.initial_accumulated_rate.is_finite() && self.initial_accumulated_rate > 0.0,
        )?;
        check(
            "initial_sqrt_price",
            self.initial_sqrt_price,
            self.initial_sqrt_price.is_finite() && self.initial_sqrt_price > 0.0,
        )?;
        check(
            "debt_dust_tolerance",
            self.debt_dust_tolerance,
            self.debt_dust_tolerance.is_finite() && self.debt_dust_tolerance >= 0.0,
        )?;

        if self.redemption_price_refresh_secs == 0 {
            return Err(ConsistencyError::InvalidParameter {
                name: "redemption_price_refresh_secs",
                value: "0".to_string(),
            });
        }

        if self.tick_spacing <= 0 {
            return Err(ConsistencyError::InvalidParameter {
                name: "tick_spacing",
                value: self.tick_spacing.to_string(),
            });
        }

        Ok(())
    }
}

fn check(name: &'static str, value: f64, ok: bool) -> CoreResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConsistencyError::InvalidParameter {
            name,
            value: value.to_string(),
        })
    }
}
