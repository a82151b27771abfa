use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rewards_core::{replay, Address, Ledger, RewardEvent};
use tracing::info;

use crate::chain::EthRpcClient;
use crate::config::DistributorConfig;
use crate::error::DistributorResult;
use crate::events::{accumulated_rate_events, assemble_events, debt_events, position_events, swap_events};
use crate::export::{Exporter, RunReport};
use crate::initial_state::{build_initial_state, StartState};
use crate::owners::{load_exclusion_list, load_owner_overrides, OwnerMapping};
use crate::sources::{GebSubgraph, UniswapSubgraph};
use crate::subgraph::SubgraphClient;
use crate::transport::JsonTransport;

/// Campaign window in blocks and in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignWindow {
    pub start_block: u64,
    pub end_block: u64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
}

/// Fetches a campaign's data, replays it and writes the results
pub struct Distributor {
    config: DistributorConfig,
    chain: EthRpcClient,
    geb: GebSubgraph,
    uniswap: UniswapSubgraph,
}

impl Distributor {
    pub fn new(config: DistributorConfig, transport: Arc<dyn JsonTransport>) -> Self {
        let retry = config.retry.clone();
        let endpoints = &config.endpoints;

        let chain = EthRpcClient::new(&endpoints.rpc_url, transport.clone(), retry.clone());
        let geb = GebSubgraph::new(SubgraphClient::new(
            &endpoints.geb_subgraph_url,
            transport.clone(),
            retry.clone(),
        ));
        let uniswap = UniswapSubgraph::new(
            SubgraphClient::new(&endpoints.uniswap_subgraph_url, transport, retry),
            &config.campaign.pool_address,
        );

        Self {
            config,
            chain,
            geb,
            uniswap,
        }
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    /// Run the whole campaign and write every result file
    pub async fn run(&self) -> DistributorResult<RunReport> {
        let exporter = Exporter::new(self.config.output_dir())?;
        let window = self.campaign_window().await?;

        let excluded = match &self.config.paths.exclusion_list {
            Some(path) => load_exclusion_list(path)?,
            None => HashSet::new(),
        };
        let owners = self.owner_mapping().await?;

        let (mut ledger, start) = self.initial_state(&window, &owners, &excluded).await?;
        exporter.write_users(&ledger)?;
        let users = ledger.len();

        let events = self.events(&window, &owners, &excluded).await?;
        exporter.write_events(&events)?;

        let params = self.config.replay_params(
            window.start_timestamp,
            window.end_timestamp,
            start.accumulated_rate,
            start.sqrt_price,
        );
        let summary = replay(&mut ledger, &events, params, &self.geb).await?;

        exporter.write_ledger(&ledger)?;
        exporter.write_rewards(&ledger)?;

        let report = RunReport {
            generated_at: Utc::now(),
            start_block: window.start_block,
            end_block: window.end_block,
            start_timestamp: window.start_timestamp,
            end_timestamp: window.end_timestamp,
            users,
            events: events.len(),
            summary,
        };
        exporter.write_report(&report)?;

        Ok(report)
    }

    /// Resolve the campaign blocks to timestamps
    pub async fn campaign_window(&self) -> DistributorResult<CampaignWindow> {
        let campaign = &self.config.campaign;
        let (start_timestamp, end_timestamp) = futures::try_join!(
            self.chain.block_timestamp(campaign.start_block),
            self.chain.block_timestamp(campaign.end_block),
        )?;

        info!(
            "Campaign from block {} ({}) to block {} ({})",
            campaign.start_block,
            format_timestamp(start_timestamp),
            campaign.end_block,
            format_timestamp(end_timestamp)
        );

        Ok(CampaignWindow {
            start_block: campaign.start_block,
            end_block: campaign.end_block,
            start_timestamp,
            end_timestamp,
        })
    }

    /// Safe handler owners at the end of the campaign
    pub async fn owner_mapping(&self) -> DistributorResult<OwnerMapping> {
        let overrides: HashMap<Address, Address> = match &self.config.paths.owner_overrides {
            Some(path) => load_owner_overrides(path)?,
            None => HashMap::new(),
        };

        let records = self.geb.safe_handler_owners(self.config.campaign.end_block).await?;
        let owners = OwnerMapping::from_records(&records, &overrides);

        info!("  Fetched {} owners", owners.len());
        Ok(owners)
    }

    /// Starting ledger and market state
    pub async fn initial_state(
        &self,
        window: &CampaignWindow,
        owners: &OwnerMapping,
        excluded: &HashSet<Address>,
    ) -> DistributorResult<(Ledger, StartState)> {
        info!("Fetch initial state...");
        let block = window.start_block;

        let (positions, debts, accumulated_rate, sqrt_price, redemption_price) = futures::try_join!(
            self.uniswap.positions(block),
            self.geb.safes_with_debt(block),
            self.geb.accumulated_rate(block, &self.config.campaign.collateral_type),
            self.uniswap.sqrt_price(block),
            self.geb.redemption_price(window.start_timestamp),
        )?;

        let start = StartState {
            accumulated_rate,
            sqrt_price,
            redemption_price,
            tick_spacing: self.config.replay.tick_spacing,
        };
        let ledger = build_initial_state(&positions, &debts, owners, excluded, &start)?;

        Ok((ledger, start))
    }

    /// Every reward event of the campaign, sorted and checked
    pub async fn events(
        &self,
        window: &CampaignWindow,
        owners: &OwnerMapping,
        excluded: &HashSet<Address>,
    ) -> DistributorResult<Vec<RewardEvent>> {
        info!("Fetch events...");
        let (start, end) = (window.start_block, window.end_block);

        let (modifications, confiscations, transfers, snapshots, swaps, rate_updates) = futures::try_join!(
            self.geb.safe_modifications(start, end),
            self.geb.confiscations(start, end),
            self.geb.debt_transfers(start, end),
            self.uniswap.position_snapshots(start, end),
            self.uniswap.swaps(window.start_timestamp, window.end_timestamp),
            self.geb
                .accumulated_rate_updates(start, end, &self.config.campaign.collateral_type),
        )?;

        info!(
            "  Fetched {} standard safe modifications, {} safe confiscations, {} safe debt transfers",
            modifications.len(),
            confiscations.len(),
            transfers.len()
        );

        let debt_changes = modifications
            .into_iter()
            .chain(confiscations)
            .chain(transfers.iter().flat_map(|transfer| transfer.split()));
        let debt = debt_events(debt_changes, owners)?;
        let positions = position_events(&snapshots)?;
        let swaps = swap_events(&swaps)?;
        let rates = accumulated_rate_events(&rate_updates)?;

        info!("  Fetched {} safe modification events", debt.len());
        info!("  Fetched {} position update events", positions.len());
        info!("  Fetched {} swap events", swaps.len());
        info!("  Fetched {} accumulated rate events", rates.len());

        assemble_events([debt, positions, swaps, rates], excluded)
    }
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
