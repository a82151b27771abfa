//! Per-user reward state

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::position::{LpPosition, TokenId};

/// Account identifier. Addresses are trimmed and lowercased, so checksummed
/// and plain spellings of one account compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        let address: String = address.into();
        Self(address.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Reward state of a single user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Interest-adjusted debt
    pub debt: f64,

    /// Liquidity positions keyed by NFT id
    #[serde(rename = "lpPositions", with = "positions_as_list")]
    pub positions: BTreeMap<TokenId, LpPosition>,

    /// Current share of the reward stream
    pub staking_weight: f64,

    /// Reward-per-weight at the last credit
    pub reward_per_weight_stored: f64,

    /// Rewards credited so far
    pub earned: f64,
}

impl UserAccount {
    /// Create an account with starting debt and positions and no accrual history
    pub fn new(debt: f64, positions: impl IntoIterator<Item = LpPosition>) -> Self {
        Self {
            debt,
            positions: positions.into_iter().map(|p| (p.token_id, p)).collect(),
            ..Self::default()
        }
    }

    /// Builder-style starting weight
    pub fn with_weight(mut self, staking_weight: f64) -> Self {
        self.staking_weight = staking_weight;
        self
    }

    /// Rewards due since the last credit at the given accumulator value
    pub fn pending(&self, reward_per_weight: f64) -> f64 {
        (reward_per_weight - self.reward_per_weight_stored) * self.staking_weight
    }

    /// Flush pending rewards into `earned` and move the snapshot forward.
    /// Returns the amount credited.
    pub(crate) fn credit(&mut self, reward_per_weight: f64) -> f64 {
        let accrued = self.pending(reward_per_weight);
        self.earned += accrued;
        self.reward_per_weight_stored = reward_per_weight;
        accrued
    }

    pub fn position(&self, token_id: TokenId) -> Option<&LpPosition> {
        self.positions.get(&token_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &LpPosition> {
        self.positions.values()
    }

    /// Whether the account has neither debt nor positions
    pub fn is_empty(&self) -> bool {
        self.debt == 0.0 && self.positions.is_empty()
    }
}

// Positions are dumped as a list, like the indexer payloads they come from
mod positions_as_list {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        positions: &BTreeMap<TokenId, LpPosition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(positions.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<TokenId, LpPosition>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<LpPosition>::deserialize(deserializer)?;
        let mut positions = BTreeMap::new();
        for position in list {
            if positions.insert(position.token_id, position).is_some() {
                return Err(serde::de::Error::custom(format!(
                    "position {} listed twice",
                    position.token_id
                )));
            }
        }
        Ok(positions)
    }
}
