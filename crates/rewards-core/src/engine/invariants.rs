//! Ledger invariants checked after every replayed event

use crate::errors::{ConsistencyError, CoreResult};
use crate::types::Ledger;

/// Verify every per-account invariant and the position ownership index.
///
/// `earned` monotonicity and tick-bound immutability are enforced where
/// those fields change (crediting and position upserts).
pub fn check_invariants(ledger: &Ledger, reward_per_weight: f64) -> CoreResult<()> {
    for (address, account) in ledger.iter() {
        let fields = [
            ("debt", account.debt),
            ("staking weight", account.staking_weight),
            ("reward snapshot", account.reward_per_weight_stored),
            ("earned", account.earned),
        ];
        if let Some((field, _)) = fields.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConsistencyError::NonFinite {
                address: address.clone(),
                field,
            });
        }

        if account.staking_weight < 0.0 {
            return Err(ConsistencyError::NegativeWeight {
                address: address.clone(),
                weight: account.staking_weight,
            });
        }

        if account.debt < 0.0 {
            return Err(ConsistencyError::NegativeDebt {
                address: address.clone(),
                debt: account.debt,
            });
        }

        if account.reward_per_weight_stored > reward_per_weight {
            return Err(ConsistencyError::SnapshotAhead {
                address: address.clone(),
                stored: account.reward_per_weight_stored,
                current: reward_per_weight,
            });
        }
    }

    ledger.check_ownership()
}
