//! Campaign data queries against the two subgraphs

use async_trait::async_trait;
use rewards_core::{RedemptionPriceSource, SourceError};
use tracing::info;

use crate::error::{DistributorError, DistributorResult};
use crate::records::*;
use crate::subgraph::SubgraphClient;

/// Debt protocol subgraph: safes, owners, rates and redemption prices
#[derive(Clone)]
pub struct GebSubgraph {
    client: SubgraphClient,
}

impl GebSubgraph {
    pub fn new(client: SubgraphClient) -> Self {
        Self { client }
    }

    /// Owner of every safe handler at `block`
    pub async fn safe_handler_owners(&self, block: u64) -> DistributorResult<Vec<SafeHandlerOwnerRecord>> {
        let query = format!(
            r#"{{
      safeHandlerOwners(first: 1000, skip: [[skip]], block: {{number: {block}}}) {{
        id
        owner {{
          address
        }}
      }}
    }}"#
        );
        self.client.query_paginated(&query, "safeHandlerOwners").await
    }

    /// Safes with outstanding debt at `block`, debt before interest
    pub async fn safes_with_debt(&self, block: u64) -> DistributorResult<Vec<SafeDebtRecord>> {
        let query = format!(
            r#"{{safes(where: {{debt_gt: 0}}, first: 1000, skip: [[skip]], block: {{number: {block}}}) {{debt, safeHandler}}}}"#
        );
        self.client.query_paginated(&query, "safes").await
    }

    /// Accumulated rate of a collateral type at `block`
    pub async fn accumulated_rate(&self, block: u64, collateral_type: &str) -> DistributorResult<f64> {
        let query = format!(
            r#"{{collateralType(id: "{collateral_type}", block: {{number: {block}}}) {{accumulatedRate}}}}"#
        );
        let record: Option<CollateralTypeRecord> = self.client.query_field(&query, "collateralType").await?;
        let record = record.ok_or_else(|| {
            DistributorError::subgraph(self.client.url(), format!("unknown collateral type {collateral_type}"))
        })?;

        parse_f64("accumulatedRate", &record.accumulated_rate)
    }

    /// Plain safe modifications changing debt within the block range
    pub async fn safe_modifications(&self, start: u64, end: u64) -> DistributorResult<Vec<SafeModificationRecord>> {
        self.debt_changes("modifySAFECollateralizations", start, end).await
    }

    /// Liquidations within the block range
    pub async fn confiscations(&self, start: u64, end: u64) -> DistributorResult<Vec<SafeModificationRecord>> {
        self.debt_changes("confiscateSAFECollateralAndDebts", start, end).await
    }

    /// Debt moved between safes within the block range
    pub async fn debt_transfers(&self, start: u64, end: u64) -> DistributorResult<Vec<DebtTransferRecord>> {
        let query = format!(
            r#"{{
    transferSAFECollateralAndDebts(where: {{createdAtBlock_gte: {start}, createdAtBlock_lte: {end}, deltaDebt_not: 0}}, first: 1000, skip: [[skip]]) {{
      id
      deltaDebt
      createdAt
      srcHandler
      dstHandler
    }}
  }}"#
        );
        self.client.query_paginated(&query, "transferSAFECollateralAndDebts").await
    }

    /// Interest accrual updates of a collateral type within the block range
    pub async fn accumulated_rate_updates(
        &self,
        start: u64,
        end: u64,
        collateral_type: &str,
    ) -> DistributorResult<Vec<AccumulatedRateUpdateRecord>> {
        let query = format!(
            r#"{{
            updateAccumulatedRates(orderBy: accumulatedRate, orderDirection: desc, where: {{collateralType: "{collateral_type}", createdAtBlock_gte: {start}, createdAtBlock_lte: {end}}}, first: 1000, skip: [[skip]]) {{
              id
              rateMultiplier
              createdAt
            }}
        }}"#
        );
        self.client.query_paginated(&query, "updateAccumulatedRates").await
    }

    /// Latest redemption price set at or before `timestamp`
    pub async fn redemption_price(&self, timestamp: u64) -> DistributorResult<f64> {
        let query = format!(
            r#"{{redemptionPrices(first: 1, orderBy: timestamp, orderDirection: desc, where: {{timestamp_lte: {timestamp}}}) {{value, timestamp}}}}"#
        );
        let records: Vec<RedemptionPriceRecord> = self.client.query_field(&query, "redemptionPrices").await?;
        let record = records.first().ok_or_else(|| {
            DistributorError::subgraph(self.client.url(), format!("no redemption price before {timestamp}"))
        })?;

        parse_f64("redemptionPrice", &record.value)
    }

    async fn debt_changes(&self, entity: &str, start: u64, end: u64) -> DistributorResult<Vec<SafeModificationRecord>> {
        let query = format!(
            r#"{{
      {entity}(where: {{createdAtBlock_gte: {start}, createdAtBlock_lte: {end}, deltaDebt_not: 0}}, first: 1000, skip: [[skip]]) {{
        id
        deltaDebt
        safeHandler
        createdAt
      }}
    }}"#
        );
        self.client.query_paginated(&query, entity).await
    }
}

#[async_trait]
impl RedemptionPriceSource for GebSubgraph {
    async fn redemption_price_at(&self, timestamp: u64) -> Result<f64, SourceError> {
        Ok(self.redemption_price(timestamp).await?)
    }
}

/// Concentrated liquidity pool subgraph
#[derive(Clone)]
pub struct UniswapSubgraph {
    client: SubgraphClient,
    pool: String,
}

impl UniswapSubgraph {
    pub fn new(client: SubgraphClient, pool: &str) -> Self {
        Self {
            client,
            pool: pool.to_lowercase(),
        }
    }

    /// Every position of the pool at `block`
    pub async fn positions(&self, block: u64) -> DistributorResult<Vec<PositionRecord>> {
        let query = format!(
            r#"{{
    positions(block: {{number: {block}}}, where: {{pool: "{pool}"}}, first: 1000, skip: [[skip]]) {{
      id
      owner
      liquidity
      tickLower {{
        tickIdx
      }}
      tickUpper {{
        tickIdx
      }}
    }}
  }}"#,
            pool = self.pool
        );
        let positions: Vec<PositionRecord> = self.client.query_paginated(&query, "positions").await?;
        info!("  Fetched {} LP positions", positions.len());
        Ok(positions)
    }

    /// Pool sqrt price (Q64.96) at `block`
    pub async fn sqrt_price(&self, block: u64) -> DistributorResult<f64> {
        let query = format!(
            r#"{{pool(id: "{pool}", block: {{number: {block}}}) {{sqrtPrice}}}}"#,
            pool = self.pool
        );
        let pool: Option<PoolRecord> = self.client.query_field(&query, "pool").await?;
        let pool = pool
            .ok_or_else(|| DistributorError::subgraph(self.client.url(), format!("unknown pool {}", self.pool)))?;

        parse_f64("sqrtPrice", &pool.sqrt_price)
    }

    /// Position snapshots within the block range
    pub async fn position_snapshots(&self, start: u64, end: u64) -> DistributorResult<Vec<PositionSnapshotRecord>> {
        let query = format!(
            r#"{{
    positionSnapshots(where: {{blockNumber_gte: {start}, blockNumber_lte: {end}, pool: "{pool}"}}, first: 1000, skip: [[skip]]) {{
      owner
      timestamp
      liquidity
      position {{
        id
        tickLower {{
          tickIdx
        }}
        tickUpper {{
          tickIdx
        }}
      }}
    }}
  }}"#,
            pool = self.pool
        );
        self.client.query_paginated(&query, "positionSnapshots").await
    }

    /// Swaps within the timestamp range
    pub async fn swaps(&self, start_time: u64, end_time: u64) -> DistributorResult<Vec<SwapRecord>> {
        let query = format!(
            r#"{{
    swaps(where: {{pool: "{pool}", timestamp_gte: {start_time}, timestamp_lte: {end_time}}}, first: 1000, skip: [[skip]]) {{
      sqrtPriceX96
      timestamp
      logIndex
    }}
  }}"#,
            pool = self.pool
        );
        self.client.query_paginated(&query, "swaps").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn geb(transport: Arc<MockTransport>) -> GebSubgraph {
        GebSubgraph::new(SubgraphClient::new("http://geb", transport, RetryConfig::default()))
    }

    #[tokio::test]
    async fn test_redemption_price_lookup() {
        let transport = Arc::new(MockTransport::new([Ok(json!({
            "data": { "redemptionPrices": [{ "value": "3.0102", "timestamp": "1619999000" }] }
        }))]));

        let price = geb(transport.clone()).redemption_price_at(1_620_000_000).await.unwrap();
        assert_eq!(price, 3.0102);

        let query = transport.request(0)["query"].as_str().unwrap().to_string();
        assert!(query.contains("timestamp_lte: 1620000000"));
    }

    #[tokio::test]
    async fn test_missing_redemption_price_fails() {
        let transport = Arc::new(MockTransport::new([Ok(json!({ "data": { "redemptionPrices": [] } }))]));
        assert!(geb(transport).redemption_price_at(1).await.is_err());
    }

    #[tokio::test]
    async fn test_accumulated_rate_of_collateral() {
        let transport = Arc::new(MockTransport::new([Ok(json!({
            "data": { "collateralType": { "accumulatedRate": "1.0435" } }
        }))]));

        let rate = geb(transport.clone()).accumulated_rate(100, "ETH-A").await.unwrap();
        assert_eq!(rate, 1.0435);
        assert!(transport.request(0)["query"].as_str().unwrap().contains(r#"id: "ETH-A""#));
    }

    #[tokio::test]
    async fn test_pool_address_is_lowercased() {
        let transport = Arc::new(MockTransport::new([Ok(json!({
            "data": { "pool": { "sqrtPrice": "2952324728441008265762276596" } }
        }))]));
        let client = SubgraphClient::new("http://uni", transport.clone(), RetryConfig::default());
        let uniswap = UniswapSubgraph::new(client, "0xCF7E21B96A7DAE8E1663B5A266FD812CBE973E70");

        let sqrt_price = uniswap.sqrt_price(100).await.unwrap();
        assert!((sqrt_price / 2.952324728441008e27 - 1.0).abs() < 1e-12);
        assert!(transport.request(0)["query"]
            .as_str()
            .unwrap()
            .contains("0xcf7e21b96a7dae8e1663b5a266fd812cbe973e70"));
    }
}
