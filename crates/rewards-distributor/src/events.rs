//! Campaign event assembly
//!
//! Subgraph rows of every source are converted to [`RewardEvent`]s, merged,
//! stripped of excluded accounts, sorted by `(timestamp, logIndex)` and
//! checked before the replay sees them.

use std::collections::HashSet;

use rewards_core::{
    sort_events, Address, RawRewardEvent, RewardEvent, POSITION_SNAPSHOT_LOG_INDEX,
};
use tracing::{info, warn};

use crate::error::{DistributorError, DistributorResult};
use crate::owners::OwnerMapping;
use crate::records::*;

/// Log index of an entity whose id is `<txhash>-<logIndex>`
pub fn parse_log_index(id: &str) -> DistributorResult<u64> {
    id.split('-')
        .nth(1)
        .and_then(|index| index.parse().ok())
        .ok_or_else(|| DistributorError::parse(format!("invalid log index in id {id}")))
}

/// Debt changes attributed to the owners of the modified safes.
/// Rows whose safe handler has no owner are skipped.
pub fn debt_events(
    modifications: impl IntoIterator<Item = SafeModificationRecord>,
    owners: &OwnerMapping,
) -> DistributorResult<Vec<RewardEvent>> {
    let mut events = Vec::new();
    for row in modifications {
        let Some(owner) = owners.owner_of(&row.safe_handler) else {
            warn!("Safe handler {} has no owner", row.safe_handler);
            continue;
        };

        events.push(RewardEvent::delta_debt(
            owner.clone(),
            parse_f64("deltaDebt", &row.delta_debt)?,
            parse_int("createdAt", &row.created_at)?,
            parse_log_index(&row.id)?,
        ));
    }
    Ok(events)
}

/// Position snapshots. Snapshots carry no log index and are ordered after
/// every other event of their block.
pub fn position_events(snapshots: &[PositionSnapshotRecord]) -> DistributorResult<Vec<RewardEvent>> {
    snapshots
        .iter()
        .map(|snapshot| {
            Ok(RewardEvent::position_update(
                address(&snapshot.owner),
                snapshot.to_position()?,
                parse_int("timestamp", &snapshot.timestamp)?,
                POSITION_SNAPSHOT_LOG_INDEX,
            ))
        })
        .collect()
}

pub fn swap_events(swaps: &[SwapRecord]) -> DistributorResult<Vec<RewardEvent>> {
    swaps
        .iter()
        .map(|swap| {
            Ok(RewardEvent::pool_swap(
                parse_f64("sqrtPriceX96", &swap.sqrt_price_x96)?,
                parse_int("timestamp", &swap.timestamp)?,
                parse_int("logIndex", &swap.log_index)?,
            ))
        })
        .collect()
}

pub fn accumulated_rate_events(updates: &[AccumulatedRateUpdateRecord]) -> DistributorResult<Vec<RewardEvent>> {
    updates
        .iter()
        .map(|update| {
            Ok(RewardEvent::accumulated_rate(
                parse_f64("rateMultiplier", &update.rate_multiplier)?,
                parse_int("createdAt", &update.created_at)?,
                parse_log_index(&update.id)?,
            ))
        })
        .collect()
}

/// Merge event batches, drop excluded accounts, sort and check every event
pub fn assemble_events(
    batches: impl IntoIterator<Item = Vec<RewardEvent>>,
    excluded: &HashSet<Address>,
) -> DistributorResult<Vec<RewardEvent>> {
    let mut events: Vec<RewardEvent> = batches.into_iter().flatten().collect();
    let fetched = events.len();

    events.retain(|event| event.address().map_or(true, |address| !excluded.contains(address)));
    sort_events(&mut events);

    for event in &events {
        sanity_check(event)?;
    }

    info!(
        "Fetched a total of {} events ({} dropped by the exclusion list)",
        events.len(),
        fetched - events.len()
    );
    Ok(events)
}

/// Re-validate an event as if it had been read from a dump
fn sanity_check(event: &RewardEvent) -> DistributorResult<()> {
    RewardEvent::try_from(RawRewardEvent::from(event.clone()))?;
    Ok(())
}
