//! Result files
//!
//! - `users.json`: starting ledger
//! - `events.json`: the replayed events
//! - `ledger.json`: final ledger
//! - `rewards.csv`: `address,earned` of every positive earner, largest first
//! - `summary.json`: campaign window and replay statistics

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rewards_core::{Address, Ledger, ReplaySummary, RewardEvent};
use serde::Serialize;
use tracing::info;

use crate::error::DistributorResult;

pub const USERS_FILE: &str = "users.json";
pub const EVENTS_FILE: &str = "events.json";
pub const LEDGER_FILE: &str = "ledger.json";
pub const REWARDS_FILE: &str = "rewards.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Campaign window and outcome written next to the rewards
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub start_block: u64,
    pub end_block: u64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub users: usize,
    pub events: usize,
    pub summary: ReplaySummary,
}

#[derive(Debug, Serialize)]
struct RewardRow<'a> {
    address: &'a str,
    earned: f64,
}

/// Writes result files into one directory
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    /// Create the output directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> DistributorResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_users(&self, ledger: &Ledger) -> DistributorResult<PathBuf> {
        self.write_json(USERS_FILE, ledger)
    }

    pub fn write_events(&self, events: &[RewardEvent]) -> DistributorResult<PathBuf> {
        self.write_json(EVENTS_FILE, events)
    }

    pub fn write_ledger(&self, ledger: &Ledger) -> DistributorResult<PathBuf> {
        self.write_json(LEDGER_FILE, ledger)
    }

    pub fn write_report(&self, report: &RunReport) -> DistributorResult<PathBuf> {
        self.write_json(SUMMARY_FILE, report)
    }

    /// Write `address,earned` lines, without a header
    pub fn write_rewards(&self, ledger: &Ledger) -> DistributorResult<PathBuf> {
        let ranking = rewards_ranking(ledger);

        let path = self.dir.join(REWARDS_FILE);
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
        for (address, earned) in &ranking {
            wtr.serialize(RewardRow {
                address: address.as_str(),
                earned: *earned,
            })?;
        }
        wtr.flush()?;

        info!("Wrote rewards of {} users to {}", ranking.len(), path.display());
        Ok(path)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> DistributorResult<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string(value)?)?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Strictly positive earners by decreasing reward
pub fn rewards_ranking(ledger: &Ledger) -> Vec<(&Address, f64)> {
    let mut ranking: Vec<(&Address, f64)> = ledger
        .iter()
        .map(|(address, account)| (address, account.earned))
        .filter(|(_, earned)| *earned > 0.0)
        .collect();

    // Stable: ties keep address order
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewards_core::UserAccount;

    fn earner(earned: f64) -> UserAccount {
        UserAccount {
            earned,
            ..UserAccount::default()
        }
    }

    fn ledger() -> Ledger {
        Ledger::from_accounts([
            (Address::from("0xa"), earner(1.5)),
            (Address::from("0xb"), earner(0.0)),
            (Address::from("0xc"), earner(7.25)),
            (Address::from("0xd"), earner(1.5)),
        ])
        .unwrap()
    }

    #[test]
    fn test_ranking_drops_zero_and_sorts_descending() {
        let ledger = ledger();
        let ranking = rewards_ranking(&ledger);
        let addresses: Vec<&str> = ranking.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(addresses, vec!["0xc", "0xa", "0xd"]);
    }

    #[test]
    fn test_rewards_csv() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("out")).unwrap();

        let path = exporter.write_rewards(&ledger()).unwrap();
        let csv = fs::read_to_string(path).unwrap();
        assert_eq!(csv, "0xc,7.25\n0xa,1.5\n0xd,1.5\n");
    }

    #[test]
    fn test_rewards_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();
        let path = exporter.write_rewards(&ledger()).unwrap();

        let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
        let rows: Vec<(String, f64)> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows[0], ("0xc".to_string(), 7.25));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_ledger_dump_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();

        let path = exporter.write_ledger(&ledger()).unwrap();
        let reloaded: Ledger = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(reloaded, ledger());
    }
}
