//! Ledger at the campaign start
//!
//! Positions and debts are read at the start block, debts scaled to real
//! debt by the accumulated rate, excluded accounts dropped, and starting
//! weights computed with the same calculator the replay uses.

use std::collections::{BTreeMap, HashSet};

use rewards_core::{check_invariants, staking_weight, Address, Ledger, PriceContext, UserAccount};
use tracing::{info, warn};

use crate::error::DistributorResult;
use crate::owners::OwnerMapping;
use crate::records::{address, parse_f64, PositionRecord, SafeDebtRecord};

/// On-chain state the starting ledger is derived from
#[derive(Debug, Clone)]
pub struct StartState {
    pub accumulated_rate: f64,
    pub sqrt_price: f64,
    pub redemption_price: f64,
    pub tick_spacing: i32,
}

/// Build the starting ledger
pub fn build_initial_state(
    positions: &[PositionRecord],
    debts: &[SafeDebtRecord],
    owners: &OwnerMapping,
    excluded: &HashSet<Address>,
    start: &StartState,
) -> DistributorResult<Ledger> {
    let mut accounts: BTreeMap<Address, UserAccount> = BTreeMap::new();

    for record in positions {
        let position = record.to_position()?;
        accounts
            .entry(address(&record.owner))
            .or_default()
            .positions
            .insert(position.token_id, position);
    }

    let mut unmapped = 0;
    for record in debts {
        let Some(owner) = owners.owner_of(&record.safe_handler) else {
            warn!("Safe handler {} has no owner", record.safe_handler);
            unmapped += 1;
            continue;
        };
        let debt = parse_f64("debt", &record.debt)? * start.accumulated_rate;
        accounts.entry(owner.clone()).or_default().debt += debt;
    }
    info!("  Fetched {} debt balances ({} without owner)", debts.len(), unmapped);

    accounts.retain(|address, _| !excluded.contains(address));

    let prices = PriceContext::new(start.sqrt_price, start.redemption_price).with_tick_spacing(start.tick_spacing);
    for account in accounts.values_mut() {
        account.staking_weight = staking_weight(account.debt, account.positions.values(), &prices)?;
    }

    let ledger = Ledger::from_accounts(accounts)?;
    check_invariants(&ledger, 0.0)?;

    info!("Finished loading initial state for {} users", ledger.len());
    Ok(ledger)
}
