//! Reward events
//!
//! Events arrive from the indexers as loosely typed records
//! ([`RawRewardEvent`]) and are validated into [`RewardEvent`] before the
//! replay ever sees them. Serialization goes back through the raw shape so
//! dumped event files load again unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::account::Address;
use super::position::LpPosition;
use crate::errors::{ConsistencyError, CoreResult};

/// Kind tag of a reward event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeltaDebt,
    PoolPositionUpdate,
    PoolSwap,
    UpdateAccumulatedRate,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::DeltaDebt,
        EventKind::PoolPositionUpdate,
        EventKind::PoolSwap,
        EventKind::UpdateAccumulatedRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeltaDebt => "DELTA_DEBT",
            EventKind::PoolPositionUpdate => "POOL_POSITION_UPDATE",
            EventKind::PoolSwap => "POOL_SWAP",
            EventKind::UpdateAccumulatedRate => "UPDATE_ACCUMULATED_RATE",
        }
    }

    /// Whether events of this kind target a single address
    pub fn is_per_user(&self) -> bool {
        matches!(self, EventKind::DeltaDebt | EventKind::PoolPositionUpdate)
    }

    /// Decode the kind from its name or from its ordinal
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::String(s) => s.parse(),
            Value::Number(n) => n
                .as_u64()
                .and_then(|i| Self::ALL.get(i as usize).copied())
                .ok_or_else(|| ConsistencyError::UnknownEventKind(n.to_string())),
            other => Err(ConsistencyError::UnknownEventKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConsistencyError::UnknownEventKind(s.to_string()))
    }
}

/// Kind-specific content of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Raw (pre-interest) debt change of one user
    DeltaDebt { address: Address, delta_debt: f64 },
    /// New state of a position now owned by `address`
    PoolPositionUpdate { address: Address, position: LpPosition },
    /// New Q64.96 pool sqrt price
    PoolSwap { sqrt_price: f64 },
    /// Interest accrual multiplier applied to every debt
    UpdateAccumulatedRate { rate_multiplier: f64 },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::DeltaDebt { .. } => EventKind::DeltaDebt,
            EventPayload::PoolPositionUpdate { .. } => EventKind::PoolPositionUpdate,
            EventPayload::PoolSwap { .. } => EventKind::PoolSwap,
            EventPayload::UpdateAccumulatedRate { .. } => EventKind::UpdateAccumulatedRate,
        }
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            EventPayload::DeltaDebt { address, .. }
            | EventPayload::PoolPositionUpdate { address, .. } => Some(address),
            EventPayload::PoolSwap { .. } | EventPayload::UpdateAccumulatedRate { .. } => None,
        }
    }

    /// Check the payload values are usable by the replay
    pub fn validate(&self) -> CoreResult<()> {
        let kind = self.kind();
        match self {
            EventPayload::DeltaDebt { delta_debt, .. } => {
                if !delta_debt.is_finite() {
                    return Err(invalid(kind, format!("debt change must be finite, got {delta_debt}")));
                }
            }
            EventPayload::PoolPositionUpdate { position, .. } => position.validate()?,
            EventPayload::PoolSwap { sqrt_price } => {
                if !sqrt_price.is_finite() || *sqrt_price <= 0.0 {
                    return Err(invalid(kind, format!("sqrt price must be positive, got {sqrt_price}")));
                }
            }
            EventPayload::UpdateAccumulatedRate { rate_multiplier } => {
                if !rate_multiplier.is_finite() || *rate_multiplier <= -1.0 {
                    return Err(invalid(kind, format!("rate multiplier {rate_multiplier} would wipe out debt")));
                }
            }
        }
        Ok(())
    }
}

/// A validated, timestamped reward event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRewardEvent", into = "RawRewardEvent")]
pub struct RewardEvent {
    pub timestamp: u64,
    pub log_index: u64,
    pub payload: EventPayload,
}

impl RewardEvent {
    pub fn delta_debt(address: impl Into<Address>, delta_debt: f64, timestamp: u64, log_index: u64) -> Self {
        Self {
            timestamp,
            log_index,
            payload: EventPayload::DeltaDebt {
                address: address.into(),
                delta_debt,
            },
        }
    }

    pub fn position_update(
        address: impl Into<Address>,
        position: LpPosition,
        timestamp: u64,
        log_index: u64,
    ) -> Self {
        Self {
            timestamp,
            log_index,
            payload: EventPayload::PoolPositionUpdate {
                address: address.into(),
                position,
            },
        }
    }

    pub fn pool_swap(sqrt_price: f64, timestamp: u64, log_index: u64) -> Self {
        Self {
            timestamp,
            log_index,
            payload: EventPayload::PoolSwap { sqrt_price },
        }
    }

    pub fn accumulated_rate(rate_multiplier: f64, timestamp: u64, log_index: u64) -> Self {
        Self {
            timestamp,
            log_index,
            payload: EventPayload::UpdateAccumulatedRate { rate_multiplier },
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn address(&self) -> Option<&Address> {
        self.payload.address()
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.payload.validate()
    }

    /// Replay order key: timestamp, then log index
    pub fn sort_key(&self) -> (u64, u64) {
        (self.timestamp, self.log_index)
    }
}

/// Stable sort by `(timestamp, log_index)`; equal keys keep their input order
pub fn sort_events(events: &mut [RewardEvent]) {
    events.sort_by_key(RewardEvent::sort_key);
}

/// Event record as produced by the indexers, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRewardEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub log_index: Option<u64>,
}

impl TryFrom<RawRewardEvent> for RewardEvent {
    type Error = ConsistencyError;

    fn try_from(raw: RawRewardEvent) -> Result<Self, Self::Error> {
        let kind = EventKind::from_value(raw.kind.as_ref().ok_or(ConsistencyError::MissingField("type"))?)?;
        let timestamp = raw
            .timestamp
            .filter(|ts| *ts > 0)
            .ok_or(ConsistencyError::MissingField("timestamp"))?;
        let log_index = raw.log_index.ok_or(ConsistencyError::MissingField("logIndex"))?;
        let value = raw.value.ok_or(ConsistencyError::MissingField("value"))?;

        let address = match (kind.is_per_user(), raw.address) {
            (true, Some(address)) if !address.is_empty() => Some(Address::new(address)),
            (true, _) => return Err(ConsistencyError::MissingAddress(kind)),
            (false, Some(address)) => return Err(ConsistencyError::UnexpectedAddress { kind, address }),
            (false, None) => None,
        };

        let payload = match (kind, address) {
            (EventKind::DeltaDebt, Some(address)) => EventPayload::DeltaDebt {
                address,
                delta_debt: number(kind, &value)?,
            },
            (EventKind::PoolPositionUpdate, Some(address)) => {
                let position: LpPosition = serde_json::from_value(value).map_err(|e| {
                    ConsistencyError::InvalidPayload {
                        kind,
                        reason: e.to_string(),
                    }
                })?;
                EventPayload::PoolPositionUpdate { address, position }
            }
            (EventKind::PoolSwap, None) => EventPayload::PoolSwap {
                sqrt_price: number(kind, &value)?,
            },
            (EventKind::UpdateAccumulatedRate, None) => EventPayload::UpdateAccumulatedRate {
                rate_multiplier: number(kind, &value)?,
            },
            (kind, _) => return Err(invalid(kind, "address does not match event kind".to_string())),
        };
        payload.validate()?;

        Ok(RewardEvent {
            timestamp,
            log_index,
            payload,
        })
    }
}

impl From<RewardEvent> for RawRewardEvent {
    fn from(event: RewardEvent) -> Self {
        let kind = Some(Value::String(event.kind().as_str().to_string()));
        let (address, value) = match event.payload {
            EventPayload::DeltaDebt { address, delta_debt } => {
                (Some(address.to_string()), Value::from(delta_debt))
            }
            EventPayload::PoolPositionUpdate { address, position } => (
                Some(address.to_string()),
                serde_json::to_value(position).unwrap_or(Value::Null),
            ),
            EventPayload::PoolSwap { sqrt_price } => (None, Value::from(sqrt_price)),
            EventPayload::UpdateAccumulatedRate { rate_multiplier } => (None, Value::from(rate_multiplier)),
        };

        RawRewardEvent {
            kind,
            address,
            value: Some(value),
            timestamp: Some(event.timestamp),
            log_index: Some(event.log_index),
        }
    }
}

fn invalid(kind: EventKind, reason: String) -> ConsistencyError {
    ConsistencyError::InvalidPayload { kind, reason }
}

/// Read a finite number, accepting the decimal strings the indexers emit
fn number(kind: EventKind, value: &Value) -> CoreResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(kind, format!("expected a finite number, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRewardEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_decoding() {
        assert_eq!(EventKind::from_value(&json!(0)).unwrap(), EventKind::DeltaDebt);
        assert_eq!(EventKind::from_value(&json!(3)).unwrap(), EventKind::UpdateAccumulatedRate);
        assert_eq!(EventKind::from_value(&json!("POOL_SWAP")).unwrap(), EventKind::PoolSwap);
        assert!(matches!(
            EventKind::from_value(&json!(4)),
            Err(ConsistencyError::UnknownEventKind(_))
        ));
        assert!(matches!(
            EventKind::from_value(&json!("POOL_SYNC")),
            Err(ConsistencyError::UnknownEventKind(_))
        ));
    }

    #[test]
    fn test_delta_debt_event() {
        let event = RewardEvent::try_from(raw(json!({
            "type": 0, "address": "alice", "value": -10, "timestamp": 8, "logIndex": 2
        })))
        .unwrap();

        assert_eq!(event, RewardEvent::delta_debt("alice", -10.0, 8, 2));
    }

    #[test]
    fn test_position_update_event() {
        let event = RewardEvent::try_from(raw(json!({
            "type": "POOL_POSITION_UPDATE",
            "address": "bob",
            "value": {"tokenId": 5, "lowerTick": -20, "upperTick": 20, "liquidity": "1000"},
            "timestamp": 9,
            "logIndex": 1000000
        })));

        // Liquidity must be a JSON number inside a position payload
        assert!(matches!(event, Err(ConsistencyError::InvalidPayload { .. })));

        let event = RewardEvent::try_from(raw(json!({
            "type": "POOL_POSITION_UPDATE",
            "address": "bob",
            "value": {"tokenId": 5, "lowerTick": -20, "upperTick": 20, "liquidity": 1000.0},
            "timestamp": 9,
            "logIndex": 1000000
        })))
        .unwrap();
        assert_eq!(event.address(), Some(&Address::from("bob")));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let base = json!({"type": 2, "value": 1.0, "timestamp": 5, "logIndex": 1});

        for field in ["type", "value", "timestamp", "logIndex"] {
            let mut value = base.clone();
            value.as_object_mut().unwrap().remove(field);
            assert!(
                matches!(RewardEvent::try_from(raw(value)), Err(ConsistencyError::MissingField(_))),
                "missing {field} accepted"
            );
        }
    }

    #[test]
    fn test_address_rules() {
        assert!(matches!(
            RewardEvent::try_from(raw(json!({"type": 0, "value": 1, "timestamp": 5, "logIndex": 1}))),
            Err(ConsistencyError::MissingAddress(EventKind::DeltaDebt))
        ));
        assert!(matches!(
            RewardEvent::try_from(raw(json!({
                "type": 2, "address": "carol", "value": 1, "timestamp": 5, "logIndex": 1
            }))),
            Err(ConsistencyError::UnexpectedAddress { .. })
        ));
    }

    #[test]
    fn test_invalid_global_payloads() {
        assert!(RewardEvent::try_from(raw(json!({"type": 2, "value": 0, "timestamp": 5, "logIndex": 1}))).is_err());
        assert!(RewardEvent::try_from(raw(json!({"type": 3, "value": -1, "timestamp": 5, "logIndex": 1}))).is_err());
        assert!(RewardEvent::try_from(raw(json!({"type": 3, "value": {}, "timestamp": 5, "logIndex": 1}))).is_err());
    }

    #[test]
    fn test_constructed_events_are_validated() {
        assert!(RewardEvent::pool_swap(7.9e28, 5, 1).validate().is_ok());
        for sqrt_price in [f64::NAN, 0.0, -5.0, f64::INFINITY] {
            assert!(matches!(
                RewardEvent::pool_swap(sqrt_price, 5, 1).validate(),
                Err(ConsistencyError::InvalidPayload { kind: EventKind::PoolSwap, .. })
            ));
        }

        assert!(RewardEvent::accumulated_rate(-1.0, 5, 1).validate().is_err());
        assert!(RewardEvent::accumulated_rate(f64::NAN, 5, 1).validate().is_err());
        assert!(RewardEvent::delta_debt("alice", f64::NAN, 5, 1).validate().is_err());
        assert!(RewardEvent::position_update("bob", LpPosition::new(1, 10, -10, 3.0), 5, 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_mixed_case_addresses_name_one_account() {
        let event = RewardEvent::try_from(raw(json!({
            "type": 0, "address": "0xAlice", "value": 2.5, "timestamp": 5, "logIndex": 1
        })))
        .unwrap();
        assert_eq!(event, RewardEvent::delta_debt("0xalice", 2.5, 5, 1));
    }

    #[test]
    fn test_events_reload_from_dump() {
        let events = vec![
            RewardEvent::delta_debt("alice", 10.0, 6, 0),
            RewardEvent::position_update("bob", LpPosition::new(1, -10, 10, 3.0), 7, 1_000_000),
            RewardEvent::pool_swap(7.9e28, 8, 3),
            RewardEvent::accumulated_rate(0.1, 9, 4),
        ];

        let dump = serde_json::to_string(&events).unwrap();
        let reloaded: Vec<RewardEvent> = serde_json::from_str(&dump).unwrap();
        assert_eq!(reloaded, events);
    }

    #[test]
    fn test_sort_is_stable_on_equal_keys() {
        let mut events = vec![
            RewardEvent::pool_swap(2.0, 10, 5),
            RewardEvent::delta_debt("a", 1.0, 10, 1_000_000),
            RewardEvent::delta_debt("b", 1.0, 10, 1_000_000),
            RewardEvent::pool_swap(1.0, 3, 9),
        ];
        sort_events(&mut events);

        let keys: Vec<_> = events.iter().map(|e| (e.sort_key(), e.address().cloned())).collect();
        assert_eq!(keys[0].0, (3, 9));
        assert_eq!(keys[1].0, (10, 5));
        assert_eq!(keys[2].1, Some(Address::from("a")));
        assert_eq!(keys[3].1, Some(Address::from("b")));
    }
}
