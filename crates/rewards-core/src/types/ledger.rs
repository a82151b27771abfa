//! The ledger of per-user reward state
//!
//! Besides the accounts themselves the ledger keeps two indexes:
//!
//! - `owners`: position id to the account currently holding it, so an
//!   implicit NFT transfer is a lookup instead of a scan of every account.
//!   Positions only leave an account through a transfer; a burned position
//!   stays with its last owner at zero liquidity, so the index always names
//!   the last known owner of an id.
//! - `tick_bounds`: the bounds each position id was first seen with. Entries
//!   are never removed.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize, Serializer};

use super::account::{Address, UserAccount};
use super::position::{LpPosition, TokenId};
use crate::errors::{ConsistencyError, CoreResult};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<Address, UserAccount>")]
pub struct Ledger {
    accounts: BTreeMap<Address, UserAccount>,
    owners: HashMap<TokenId, Address>,
    tick_bounds: HashMap<TokenId, (i32, i32)>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from a starting snapshot, indexing every position.
    ///
    /// Fails if a position id appears under two accounts or a position is
    /// malformed.
    pub fn from_accounts(accounts: impl IntoIterator<Item = (Address, UserAccount)>) -> CoreResult<Self> {
        let mut ledger = Self::new();

        for (address, account) in accounts {
            if ledger.accounts.contains_key(&address) {
                return Err(ConsistencyError::InvalidParameter {
                    name: "accounts",
                    value: format!("{address} listed twice"),
                });
            }

            for position in account.positions.values() {
                position.validate()?;
                if let Some(first) = ledger.owners.get(&position.token_id) {
                    return Err(ConsistencyError::DuplicateOwnership {
                        token_id: position.token_id,
                        first: first.clone(),
                        second: address.clone(),
                    });
                }
                ledger.owners.insert(position.token_id, address.clone());
                ledger
                    .tick_bounds
                    .insert(position.token_id, (position.lower_tick, position.upper_tick));
            }

            ledger.accounts.insert(address, account);
        }

        Ok(ledger)
    }

    pub fn get(&self, address: &Address) -> Option<&UserAccount> {
        self.accounts.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Accounts in address order
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &UserAccount)> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Current holder of a position id
    pub fn owner_of(&self, token_id: TokenId) -> Option<&Address> {
        self.owners.get(&token_id)
    }

    /// Bounds a position id was first observed with
    pub fn tick_bounds_of(&self, token_id: TokenId) -> Option<(i32, i32)> {
        self.tick_bounds.get(&token_id).copied()
    }

    /// Sum of every account's staking weight
    pub fn total_weight(&self) -> f64 {
        self.accounts.values().map(|a| a.staking_weight).sum()
    }

    /// Sum of every account's earned balance
    pub fn total_earned(&self) -> f64 {
        self.accounts.values().map(|a| a.earned).sum()
    }

    pub fn into_accounts(self) -> BTreeMap<Address, UserAccount> {
        self.accounts
    }

    // ========================================================================
    // Mutation (replay only)
    // ========================================================================

    pub(crate) fn get_or_create(&mut self, address: &Address) -> &mut UserAccount {
        self.accounts.entry(address.clone()).or_default()
    }

    pub(crate) fn accounts_mut(&mut self) -> impl Iterator<Item = (&Address, &mut UserAccount)> {
        self.accounts.iter_mut()
    }

    /// Credit one account at the given accumulator value, creating it if needed
    pub(crate) fn credit(&mut self, address: &Address, reward_per_weight: f64) -> CoreResult<f64> {
        let account = self.get_or_create(address);
        let before = account.earned;
        let accrued = account.credit(reward_per_weight);
        check_accrual(address, before, account.earned, accrued)?;
        Ok(accrued)
    }

    /// Credit every account; returns the total credited
    pub(crate) fn credit_all(&mut self, reward_per_weight: f64) -> CoreResult<f64> {
        let mut total = 0.0;
        for (address, account) in self.accounts.iter_mut() {
            let before = account.earned;
            let accrued = account.credit(reward_per_weight);
            check_accrual(address, before, account.earned, accrued)?;
            total += accrued;
        }
        Ok(total)
    }

    /// Check an observed position against the bounds first recorded for its id,
    /// recording them if the id is new.
    pub(crate) fn register_bounds(&mut self, position: &LpPosition) -> CoreResult<()> {
        match self.tick_bounds.get(&position.token_id) {
            Some(&(lower, upper)) if (lower, upper) != (position.lower_tick, position.upper_tick) => {
                Err(ConsistencyError::TickBoundsMutated {
                    token_id: position.token_id,
                    stored_lower: lower,
                    stored_upper: upper,
                    lower: position.lower_tick,
                    upper: position.upper_tick,
                })
            }
            Some(_) => Ok(()),
            None => {
                self.tick_bounds
                    .insert(position.token_id, (position.lower_tick, position.upper_tick));
                Ok(())
            }
        }
    }

    /// Take a position away from its holder
    pub(crate) fn remove_position(&mut self, owner: &Address, token_id: TokenId) -> Option<LpPosition> {
        let removed = self.accounts.get_mut(owner)?.positions.remove(&token_id);
        if removed.is_some() && self.owners.get(&token_id) == Some(owner) {
            self.owners.remove(&token_id);
        }
        removed
    }

    /// Insert a position into `owner`'s set, or update its liquidity in place
    pub(crate) fn upsert_position(&mut self, owner: &Address, position: LpPosition) -> CoreResult<()> {
        let account = self.accounts.entry(owner.clone()).or_default();
        match account.positions.get_mut(&position.token_id) {
            Some(existing) => {
                if !existing.same_bounds(&position) {
                    return Err(ConsistencyError::TickBoundsMutated {
                        token_id: position.token_id,
                        stored_lower: existing.lower_tick,
                        stored_upper: existing.upper_tick,
                        lower: position.lower_tick,
                        upper: position.upper_tick,
                    });
                }
                existing.liquidity = position.liquidity;
            }
            None => {
                account.positions.insert(position.token_id, position);
            }
        }
        self.owners.insert(position.token_id, owner.clone());
        Ok(())
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Verify that the ownership index matches the position sets exactly
    pub(crate) fn check_ownership(&self) -> CoreResult<()> {
        let mut seen: HashMap<TokenId, &Address> = HashMap::with_capacity(self.owners.len());

        for (address, account) in &self.accounts {
            for token_id in account.positions.keys() {
                if let Some(first) = seen.insert(*token_id, address) {
                    return Err(ConsistencyError::DuplicateOwnership {
                        token_id: *token_id,
                        first: first.clone(),
                        second: address.clone(),
                    });
                }
                if self.owners.get(token_id) != Some(address) {
                    return Err(ConsistencyError::OwnershipIndexCorrupted(*token_id));
                }
            }
        }

        if seen.len() != self.owners.len() {
            let orphan = self.owners.keys().find(|id| !seen.contains_key(id)).copied();
            return Err(ConsistencyError::OwnershipIndexCorrupted(orphan.unwrap_or_default()));
        }

        Ok(())
    }
}

fn check_accrual(address: &Address, before: f64, after: f64, accrued: f64) -> CoreResult<()> {
    if !accrued.is_finite() {
        return Err(ConsistencyError::NonFinite {
            address: address.clone(),
            field: "earned",
        });
    }
    if after < before {
        return Err(ConsistencyError::EarnedDecreased {
            address: address.clone(),
            before,
            after,
        });
    }
    Ok(())
}

impl TryFrom<BTreeMap<Address, UserAccount>> for Ledger {
    type Error = ConsistencyError;

    fn try_from(accounts: BTreeMap<Address, UserAccount>) -> Result<Self, Self::Error> {
        Self::from_accounts(accounts)
    }
}

impl Serialize for Ledger {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.accounts.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    #[test]
    fn test_from_accounts_indexes_positions() {
        let ledger = Ledger::from_accounts([
            (addr("alice"), UserAccount::new(1.0, [LpPosition::new(1, -10, 10, 5.0)])),
            (addr("bob"), UserAccount::new(0.0, [LpPosition::new(2, -20, 20, 5.0)])),
        ])
        .unwrap();

        assert_eq!(ledger.owner_of(1), Some(&addr("alice")));
        assert_eq!(ledger.owner_of(2), Some(&addr("bob")));
        assert_eq!(ledger.tick_bounds_of(2), Some((-20, 20)));
        assert!(ledger.check_ownership().is_ok());
    }

    #[test]
    fn test_from_accounts_rejects_shared_position() {
        let result = Ledger::from_accounts([
            (addr("alice"), UserAccount::new(1.0, [LpPosition::new(1, -10, 10, 5.0)])),
            (addr("bob"), UserAccount::new(0.0, [LpPosition::new(1, -10, 10, 5.0)])),
        ]);

        assert!(matches!(result, Err(ConsistencyError::DuplicateOwnership { token_id: 1, .. })));
    }

    #[test]
    fn test_upsert_updates_liquidity_in_place() {
        let mut ledger = Ledger::new();
        let alice = addr("alice");

        ledger.upsert_position(&alice, LpPosition::new(1, -10, 10, 5.0)).unwrap();
        ledger.upsert_position(&alice, LpPosition::new(1, -10, 10, 8.0)).unwrap();

        let account = ledger.get(&alice).unwrap();
        assert_eq!(account.positions.len(), 1);
        assert_eq!(account.position(1).unwrap().liquidity, 8.0);
    }

    #[test]
    fn test_upsert_rejects_new_bounds() {
        let mut ledger = Ledger::new();
        let alice = addr("alice");

        ledger.upsert_position(&alice, LpPosition::new(1, -10, 10, 5.0)).unwrap();
        let result = ledger.upsert_position(&alice, LpPosition::new(1, -20, 10, 5.0));

        assert!(matches!(result, Err(ConsistencyError::TickBoundsMutated { token_id: 1, .. })));
    }

    #[test]
    fn test_bounds_registry_outlives_owner() {
        let mut ledger = Ledger::new();
        let position = LpPosition::new(9, -30, 30, 1.0);

        ledger.register_bounds(&position).unwrap();
        ledger.upsert_position(&addr("alice"), position).unwrap();
        ledger.remove_position(&addr("alice"), 9).unwrap();

        assert_eq!(ledger.owner_of(9), None);
        assert!(ledger.register_bounds(&LpPosition::new(9, -40, 30, 1.0)).is_err());
        assert!(ledger.register_bounds(&LpPosition::new(9, -30, 30, 2.0)).is_ok());
    }

    #[test]
    fn test_credit_creates_account_lazily() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.credit(&addr("carol"), 3.0).unwrap(), 0.0);
        assert!(ledger.contains(&addr("carol")));
        assert_eq!(ledger.get(&addr("carol")).unwrap().reward_per_weight_stored, 3.0);
    }

    #[test]
    fn test_credit_rejects_decrease() {
        let mut ledger = Ledger::from_accounts([(addr("alice"), UserAccount::new(0.0, []).with_weight(1.0))]).unwrap();
        ledger.credit(&addr("alice"), 2.0).unwrap();

        let result = ledger.credit(&addr("alice"), 1.0);
        assert!(matches!(result, Err(ConsistencyError::EarnedDecreased { .. })));
    }

    #[test]
    fn test_ledger_json_round_trip() {
        let ledger = Ledger::from_accounts([(
            addr("alice"),
            UserAccount::new(1.5, [LpPosition::new(4, -10, 10, 5.0)]).with_weight(5.0),
        )])
        .unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        let back: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
        assert_eq!(back.owner_of(4), Some(&addr("alice")));
    }
}
