//! # Reward Accrual Engine
//!
//! A single-pass fold of time-ordered events over the [`Ledger`].
//!
//! Rewards stream at a constant rate and are split pro rata to staking
//! weight. The engine keeps a cumulative reward-per-weight accumulator and
//! credits a user lazily: whenever something about to change a user's
//! weight happens, the user is first credited `(accumulator - snapshot) *
//! weight` and their snapshot moves to the accumulator. Global events
//! (swaps, interest accrual, redemption price changes) credit everyone.
//!
//! Each event goes through the same steps:
//!
//! 1. advance the accumulator to the event timestamp
//! 2. refresh the redemption price if the cached one is stale
//! 3. credit, then mutate, the affected accounts and re-derive their weights
//! 4. recompute the total weight
//! 5. check the ledger invariants
//!
//! Any failure aborts the replay; the ledger is then not a valid result.

pub mod invariants;
pub mod params;

pub use invariants::check_invariants;
pub use params::ReplayParams;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::PROGRESS_LOG_INTERVAL;
use crate::errors::{ConsistencyError, CoreResult, ReplayError, ReplayResult};
use crate::oracle::RedemptionPriceSource;
use crate::types::{Address, EventPayload, Ledger, LpPosition, RewardEvent};
use crate::valuation::PriceContext;
use crate::weight::staking_weight;

/// Statistics of a finished replay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub events_processed: usize,
    pub reward_rate: f64,
    pub total_budget: f64,
    /// Sum of rewards credited during the replay
    pub distributed: f64,
    /// Seconds during which nobody had weight, so nothing was distributed
    pub undistributed_secs: u64,
    /// Positions that changed hands without a mint or burn
    pub transfers: usize,
    pub redemption_price_refreshes: usize,
    pub final_reward_per_weight: f64,
}

/// Replay state machine over a borrowed ledger.
///
/// Created by [`RewardEngine::start`], fed with [`RewardEngine::apply`] and
/// settled by [`RewardEngine::finish`].
pub struct RewardEngine<'a, P: RedemptionPriceSource + ?Sized> {
    ledger: &'a mut Ledger,
    params: ReplayParams,
    price_source: &'a P,

    /// Timestamp of the last processed event
    clock: u64,
    /// Order key of the last processed event
    last_key: Option<(u64, u64)>,
    reward_rate: f64,
    reward_per_weight: f64,
    total_weight: f64,
    accumulated_rate: f64,
    sqrt_price: f64,
    redemption_price: f64,
    redemption_price_at: u64,

    initial_earned: f64,
    summary: ReplaySummary,
}

impl<'a, P: RedemptionPriceSource + ?Sized> RewardEngine<'a, P> {
    /// Validate the parameters and the starting ledger and read the opening
    /// redemption price.
    pub async fn start(ledger: &'a mut Ledger, params: ReplayParams, price_source: &'a P) -> ReplayResult<Self> {
        params.validate()?;
        check_invariants(ledger, 0.0)?;

        let redemption_price = read_redemption_price(price_source, params.campaign_start).await?;
        let reward_rate = params.reward_rate();

        info!(
            "Distributing {} at a reward rate of {}/sec between {} and {}",
            params.total_budget, reward_rate, params.campaign_start, params.campaign_end
        );

        Ok(Self {
            clock: params.campaign_start,
            last_key: None,
            reward_rate,
            reward_per_weight: 0.0,
            total_weight: ledger.total_weight(),
            accumulated_rate: params.initial_accumulated_rate,
            sqrt_price: params.initial_sqrt_price,
            redemption_price,
            redemption_price_at: params.campaign_start,
            initial_earned: ledger.total_earned(),
            summary: ReplaySummary {
                reward_rate,
                total_budget: params.total_budget,
                ..ReplaySummary::default()
            },
            ledger,
            params,
            price_source,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        self.ledger
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn reward_per_weight(&self) -> f64 {
        self.reward_per_weight
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn accumulated_rate(&self) -> f64 {
        self.accumulated_rate
    }

    pub fn sqrt_price(&self) -> f64 {
        self.sqrt_price
    }

    pub fn redemption_price(&self) -> f64 {
        self.redemption_price
    }

    pub fn events_processed(&self) -> usize {
        self.summary.events_processed
    }

    /// Apply the next event
    pub async fn apply(&mut self, event: &RewardEvent) -> ReplayResult<()> {
        let index = self.summary.events_processed;

        self.step(event).await.map_err(|e| match e {
            ReplayError::Consistency(source) => ReplayError::Event {
                index,
                timestamp: event.timestamp,
                log_index: event.log_index,
                source,
            },
            other => other,
        })?;

        self.summary.events_processed += 1;
        if self.summary.events_processed % PROGRESS_LOG_INTERVAL == 0 {
            info!("  Processed {} events", self.summary.events_processed);
        }
        Ok(())
    }

    /// Accrue up to the campaign end, credit everyone and return the summary
    pub fn finish(mut self) -> ReplayResult<ReplaySummary> {
        self.advance(self.params.campaign_end);
        self.ledger.credit_all(self.reward_per_weight)?;
        check_invariants(self.ledger, self.reward_per_weight)?;

        self.summary.distributed = self.ledger.total_earned() - self.initial_earned;
        self.summary.final_reward_per_weight = self.reward_per_weight;

        if self.summary.undistributed_secs > 0 {
            warn!(
                "No staking weight during {}s of the campaign, {} left undistributed",
                self.summary.undistributed_secs,
                self.summary.undistributed_secs as f64 * self.reward_rate
            );
        }
        info!(
            "Replay settled: {} events, {} distributed of {}",
            self.summary.events_processed, self.summary.distributed, self.summary.total_budget
        );

        Ok(self.summary)
    }

    async fn step(&mut self, event: &RewardEvent) -> ReplayResult<()> {
        self.check_order(event)?;
        event.validate()?;

        self.advance(event.timestamp);
        self.refresh_redemption_price(event.timestamp).await?;

        match &event.payload {
            EventPayload::DeltaDebt { address, delta_debt } => self.apply_delta_debt(address, *delta_debt)?,
            EventPayload::PoolPositionUpdate { address, position } => {
                self.apply_position_update(address, position)?
            }
            EventPayload::PoolSwap { sqrt_price } => self.apply_swap(*sqrt_price)?,
            EventPayload::UpdateAccumulatedRate { rate_multiplier } => {
                self.apply_accumulated_rate(*rate_multiplier)?
            }
        }

        self.total_weight = self.ledger.total_weight();
        if self.total_weight == 0.0 {
            debug!("Zero weight at event {} time {}", self.summary.events_processed, event.timestamp);
        }

        check_invariants(self.ledger, self.reward_per_weight)?;
        Ok(())
    }

    fn check_order(&mut self, event: &RewardEvent) -> CoreResult<()> {
        if event.timestamp < self.params.campaign_start || event.timestamp > self.params.campaign_end {
            return Err(ConsistencyError::OutsideCampaign {
                timestamp: event.timestamp,
                start: self.params.campaign_start,
                end: self.params.campaign_end,
            });
        }

        let key = event.sort_key();
        if let Some(prev) = self.last_key {
            if key < prev {
                return Err(ConsistencyError::OutOfOrder {
                    prev_timestamp: prev.0,
                    prev_log_index: prev.1,
                    timestamp: key.0,
                    log_index: key.1,
                });
            }
        }
        self.last_key = Some(key);
        Ok(())
    }

    /// Move the accumulator and the clock forward to `timestamp`
    fn advance(&mut self, timestamp: u64) {
        let elapsed = timestamp.saturating_sub(self.clock);
        if self.total_weight > 0.0 {
            self.reward_per_weight += elapsed as f64 * self.reward_rate / self.total_weight;
        } else {
            self.summary.undistributed_secs += elapsed;
        }
        self.clock = timestamp;
    }

    async fn refresh_redemption_price(&mut self, timestamp: u64) -> ReplayResult<()> {
        if timestamp.saturating_sub(self.redemption_price_at) < self.params.redemption_price_refresh_secs {
            return Ok(());
        }

        let price = read_redemption_price(self.price_source, timestamp).await?;
        self.redemption_price_at = timestamp;
        self.summary.redemption_price_refreshes += 1;

        if price != self.redemption_price {
            debug!("Redemption price {} -> {} at {}", self.redemption_price, price, timestamp);
            self.ledger.credit_all(self.reward_per_weight)?;
            self.redemption_price = price;
            self.recompute_all_weights()?;
        }
        Ok(())
    }

    fn apply_delta_debt(&mut self, address: &Address, delta_debt: f64) -> CoreResult<()> {
        self.ledger.credit(address, self.reward_per_weight)?;

        let tolerance = self.params.debt_dust_tolerance;
        let account = self.ledger.get_or_create(address);
        account.debt += delta_debt * self.accumulated_rate;

        // Ignore dusty debt
        if account.debt < 0.0 && -account.debt <= tolerance {
            account.debt = 0.0;
        }

        self.recompute_weight(address)
    }

    fn apply_position_update(&mut self, address: &Address, position: &LpPosition) -> CoreResult<()> {
        self.ledger.credit(address, self.reward_per_weight)?;
        self.ledger.register_bounds(position)?;

        // Held by someone else: a plain NFT transfer, not a mint/burn/modify
        let previous_owner = self
            .ledger
            .owner_of(position.token_id)
            .filter(|owner| *owner != address)
            .cloned();
        if let Some(previous_owner) = previous_owner {
            debug!(
                "Position {} transferred from {} to {}",
                position.token_id, previous_owner, address
            );
            self.ledger.credit(&previous_owner, self.reward_per_weight)?;
            self.ledger.remove_position(&previous_owner, position.token_id);
            self.recompute_weight(&previous_owner)?;
            self.summary.transfers += 1;
        }

        self.ledger.upsert_position(address, *position)?;
        self.recompute_weight(address)
    }

    fn apply_swap(&mut self, sqrt_price: f64) -> CoreResult<()> {
        self.ledger.credit_all(self.reward_per_weight)?;
        self.sqrt_price = sqrt_price;
        self.recompute_all_weights()
    }

    fn apply_accumulated_rate(&mut self, rate_multiplier: f64) -> CoreResult<()> {
        self.ledger.credit_all(self.reward_per_weight)?;
        self.accumulated_rate += rate_multiplier;
        for (_, account) in self.ledger.accounts_mut() {
            account.debt *= 1.0 + rate_multiplier;
        }
        self.recompute_all_weights()
    }

    fn prices(&self) -> PriceContext {
        PriceContext::new(self.sqrt_price, self.redemption_price).with_tick_spacing(self.params.tick_spacing)
    }

    fn recompute_weight(&mut self, address: &Address) -> CoreResult<()> {
        let prices = self.prices();
        let account = self.ledger.get_or_create(address);
        account.staking_weight = staking_weight(account.debt, account.positions.values(), &prices)?;
        Ok(())
    }

    fn recompute_all_weights(&mut self) -> CoreResult<()> {
        let prices = self.prices();
        for (_, account) in self.ledger.accounts_mut() {
            account.staking_weight = staking_weight(account.debt, account.positions.values(), &prices)?;
        }
        Ok(())
    }
}

async fn read_redemption_price<P: RedemptionPriceSource + ?Sized>(source: &P, timestamp: u64) -> ReplayResult<f64> {
    let price = source
        .redemption_price_at(timestamp)
        .await
        .map_err(|e| ReplayError::PriceSource {
            timestamp,
            message: e.to_string(),
        })?;

    if !price.is_finite() || price <= 0.0 {
        return Err(ReplayError::PriceSource {
            timestamp,
            message: format!("invalid redemption price {price}"),
        });
    }
    Ok(price)
}

/// Replay a sorted event list over a ledger and settle it at the campaign end
pub async fn replay<P: RedemptionPriceSource + ?Sized>(
    ledger: &mut Ledger,
    events: &[RewardEvent],
    params: ReplayParams,
    price_source: &P,
) -> ReplayResult<ReplaySummary> {
    let mut engine = RewardEngine::start(ledger, params, price_source).await?;

    info!("Applying {} events...", events.len());
    for event in events {
        engine.apply(event).await?;
    }

    engine.finish()
}
