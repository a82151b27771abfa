//! GraphQL subgraph client
//!
//! Paginated queries carry a `[[skip]]` placeholder where the page offset
//! goes and request `first: 1000` rows; paging stops at the first short
//! page.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{DistributorError, DistributorResult};
use crate::transport::{with_retry, JsonTransport};

/// Rows per page of a paginated query
pub const PAGE_SIZE: usize = 1000;

/// Placeholder replaced by the page offset in paginated queries
pub const SKIP_PLACEHOLDER: &str = "[[skip]]";

#[derive(Clone)]
pub struct SubgraphClient {
    url: String,
    transport: Arc<dyn JsonTransport>,
    retry: RetryConfig,
}

impl SubgraphClient {
    pub fn new(url: impl Into<String>, transport: Arc<dyn JsonTransport>, retry: RetryConfig) -> Self {
        Self {
            url: url.into(),
            transport,
            retry,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run a query and return its `data` object
    pub async fn query(&self, query: &str) -> DistributorResult<Value> {
        let body = json!({ "query": query });

        with_retry(&self.retry, &format!("Subgraph query to {}", self.url), || {
            self.post(&body)
        })
        .await
    }

    /// Run a query and decode one field of its `data` object
    pub async fn query_field<T: DeserializeOwned>(&self, query: &str, field: &str) -> DistributorResult<T> {
        let mut data = self.query(query).await?;
        let value = data
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| DistributorError::subgraph(&self.url, format!("missing field `{field}` in response")))?;

        serde_json::from_value(value)
            .map_err(|e| DistributorError::subgraph(&self.url, format!("malformed `{field}`: {e}")))
    }

    /// Fetch every row of a paginated list query
    pub async fn query_paginated<T: DeserializeOwned>(&self, query: &str, field: &str) -> DistributorResult<Vec<T>> {
        if !query.contains(SKIP_PLACEHOLDER) {
            return Err(DistributorError::InvalidConfig(format!(
                "paginated query for `{field}` has no {SKIP_PLACEHOLDER} placeholder"
            )));
        }

        let mut rows = Vec::new();
        let mut skip = 0;
        loop {
            let page_query = query.replace(SKIP_PLACEHOLDER, &skip.to_string());
            let page: Vec<T> = self.query_field(&page_query, field).await?;
            let page_len = page.len();
            rows.extend(page);

            debug!("Fetched {} `{}` rows (skip {})", page_len, field, skip);
            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        Ok(rows)
    }

    async fn post(&self, body: &Value) -> DistributorResult<Value> {
        let mut response = self.transport.post_json(&self.url, body).await?;

        if let Some(errors) = response.get("errors").filter(|e| !e.is_null()) {
            return Err(DistributorError::subgraph(&self.url, errors.to_string()));
        }

        response
            .get_mut("data")
            .filter(|data| data.is_object())
            .map(Value::take)
            .ok_or_else(|| DistributorError::subgraph(&self.url, "response has no data"))
    }
}
