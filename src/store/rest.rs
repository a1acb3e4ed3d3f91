//! REST gateway speaking a PostgREST-style row API.
//!
//! Change subscriptions are backed by per-entity broadcast channels that the
//! embedding application feeds from its push transport (see
//! [`RestStore::change_injector`]); this crate does not own the socket.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use super::{ChangeEvent, ChangeStream, JsonRow, RemoteStore, RowFilter, StoreEntity};
use crate::config::GatewayConfig;
use crate::errors::StoreError;
use async_trait::async_trait;

const FEED_CAPACITY: usize = 256;

pub struct RestStore {
    client: Client,
    base_url: String,
    headers: HeaderMap,
    feeds: HashMap<StoreEntity, broadcast::Sender<ChangeEvent>>,
}

impl RestStore {
    pub fn new(config: &GatewayConfig) -> Result<Self, StoreError> {
        // Validate early so a bad URL fails at construction, not first use.
        Url::parse(&config.base_url)
            .map_err(|e| StoreError::Backend(format!("invalid gateway URL: {e}")))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| StoreError::Backend(format!("invalid API key: {e}")))?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| StoreError::Backend(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let mut feeds = HashMap::new();
        for entity in StoreEntity::iter() {
            let (tx, _) = broadcast::channel(FEED_CAPACITY);
            feeds.insert(entity, tx);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
            feeds,
        })
    }

    /// Sender the embedding application uses to feed push notifications from
    /// its realtime transport into this store's subscriptions.
    pub fn change_injector(&self, entity: StoreEntity) -> broadcast::Sender<ChangeEvent> {
        self.feeds[&entity].clone()
    }

    fn request(&self, method: Method, entity: StoreEntity) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, entity);
        self.client.request(method, url).headers(self.headers.clone())
    }

    async fn expect_success(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Backend(format!("{status}: {body}")))
    }

    async fn rows_from(response: Response) -> Result<Vec<JsonRow>, StoreError> {
        let value: Value = response.json().await?;
        match value {
            Value::Array(rows) => Ok(rows),
            single @ Value::Object(_) => Ok(vec![single]),
            other => Err(StoreError::MalformedRow(format!(
                "unexpected response shape: {other}"
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    #[instrument(skip(self, filter), fields(entity = %entity))]
    async fn list(
        &self,
        entity: StoreEntity,
        filter: &RowFilter,
    ) -> Result<Vec<JsonRow>, StoreError> {
        let response = self
            .request(Method::GET, entity)
            .query(&filter.to_query())
            .send()
            .await?;
        Self::rows_from(Self::expect_success(response).await?).await
    }

    #[instrument(skip(self, filter), fields(entity = %entity))]
    async fn count(&self, entity: StoreEntity, filter: &RowFilter) -> Result<u64, StoreError> {
        let response = self
            .request(Method::GET, entity)
            .query(&filter.to_query())
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header("Range", "0-0")
            .send()
            .await?;

        // Partial-content responses are how the backend answers ranged reads.
        let status = response.status();
        if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("{status}: {body}")));
        }

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Backend("missing content-range header".to_string()))?;
        range
            .rsplit('/')
            .next()
            .and_then(|total| total.parse().ok())
            .ok_or_else(|| StoreError::Backend(format!("unparseable content-range: {range}")))
    }

    #[instrument(skip(self, row), fields(entity = %entity))]
    async fn insert(&self, entity: StoreEntity, row: JsonRow) -> Result<JsonRow, StoreError> {
        let response = self
            .request(Method::POST, entity)
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![row]))
            .send()
            .await?;
        let rows = Self::rows_from(Self::expect_success(response).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("insert returned no representation".to_string()))
    }

    #[instrument(skip(self, patch), fields(entity = %entity, id = %id))]
    async fn update(
        &self,
        entity: StoreEntity,
        id: Uuid,
        patch: JsonRow,
    ) -> Result<JsonRow, StoreError> {
        let response = self
            .request(Method::PATCH, entity)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let rows = Self::rows_from(Self::expect_success(response).await?).await?;
        rows.into_iter().next().ok_or(StoreError::RowNotFound(id))
    }

    #[instrument(skip(self), fields(entity = %entity, id = %id))]
    async fn delete(&self, entity: StoreEntity, id: Uuid) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, entity)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    fn subscribe(&self, entity: StoreEntity, filter: RowFilter) -> ChangeStream {
        ChangeStream::new(self.feeds[&entity].subscribe(), filter)
    }
}
