//! Account lists: safe handler owners, owner overrides and the exclusion list
//!
//! Debt lives in safe handlers; rewards go to the account owning the
//! handler at the end of the campaign. Some owners are themselves proxy
//! contracts, an override file maps those to the account behind them.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use rewards_core::Address;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{DistributorError, DistributorResult};
use crate::records::{address, SafeHandlerOwnerRecord};

/// Safe handler to rewarded owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerMapping {
    owners: HashMap<String, Address>,
}

impl OwnerMapping {
    /// Build the mapping, replacing proxy owners listed in `overrides`
    pub fn from_records(records: &[SafeHandlerOwnerRecord], overrides: &HashMap<Address, Address>) -> Self {
        let mut replaced = 0;
        let owners = records
            .iter()
            .map(|record| {
                let owner = address(&record.owner.address);
                let owner = match overrides.get(&owner) {
                    Some(real_owner) => {
                        replaced += 1;
                        real_owner.clone()
                    }
                    None => owner,
                };
                (record.id.to_lowercase(), owner)
            })
            .collect();

        if replaced > 0 {
            info!("  Replaced {} proxy owners", replaced);
        }
        Self { owners }
    }

    /// Owner of a safe handler
    pub fn owner_of(&self, safe_handler: &str) -> Option<&Address> {
        self.owners.get(&safe_handler.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// One line of the owner override file
#[derive(Debug, Deserialize)]
struct OwnerOverrideRow {
    proxy: String,
    owner: String,
}

/// Load `proxy,owner` overrides. A `proxy,owner` header line is allowed and
/// fields may be quoted.
pub fn load_owner_overrides(path: &Path) -> DistributorResult<HashMap<Address, Address>> {
    let mut reader = list_reader(path)?;
    let mut overrides = HashMap::new();

    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed_line(path, &e))?;
        let row: OwnerOverrideRow = record.deserialize(None).map_err(|e| malformed_line(path, &e))?;
        if i == 0 && row.proxy.eq_ignore_ascii_case("proxy") && row.owner.eq_ignore_ascii_case("owner") {
            continue;
        }
        overrides.insert(address(&row.proxy), address(&row.owner));
    }

    debug!("Loaded {} owner overrides from {}", overrides.len(), path.display());
    Ok(overrides)
}

/// Load the exclusion list, one address per line
pub fn load_exclusion_list(path: &Path) -> DistributorResult<HashSet<Address>> {
    let mut reader = list_reader(path)?;
    let mut excluded = HashSet::new();

    for record in reader.records() {
        let record = record.map_err(|e| malformed_line(path, &e))?;
        if let Some(account) = record.get(0).filter(|field| !field.is_empty()) {
            excluded.insert(address(account));
        }
    }

    info!("Loaded {} excluded accounts", excluded.len());
    Ok(excluded)
}

fn list_reader(path: &Path) -> DistributorResult<csv::Reader<File>> {
    let file = File::open(path)
        .map_err(|e| DistributorError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn malformed_line(path: &Path, err: &csv::Error) -> DistributorError {
    let line = err.position().map_or(0, |pos| pos.line());
    DistributorError::parse(format!("{}:{}: expected `proxy,owner`: {}", path.display(), line, err))
}
