use crate::error::{ConfigError, Result};
use crate::traits::{RawSearchResponse, SearchTransport};
use crate::{SearchDescriptor, SearchFailure};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const APPLICATION_ID_HEADER: &str = "X-Algolia-Application-Id";
const API_KEY_HEADER: &str = "X-Algolia-API-Key";

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub index_name: String,
    pub application_id: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        application_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            index_name: index_name.into(),
            application_id: application_id.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn query_url(&self) -> Result<Url, ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Missing("index name"));
        }

        let mut url = Url::parse(self.endpoint.trim())?;
        url.path_segments_mut()
            .map_err(|_| ConfigError::NotABase(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(["1", "indexes", self.index_name.as_str(), "query"]);
        Ok(url)
    }
}

/// Queries a hosted search index over HTTPS. Timeouts come from the client
/// and surface as network failures.
pub struct HttpSearchTransport {
    client: Arc<Client>,
    query_url: Url,
    application_id: String,
    api_key: String,
}

impl HttpSearchTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, ConfigError> {
        let query_url = config.query_url()?;
        if config.application_id.trim().is_empty() {
            return Err(ConfigError::Missing("application id"));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client: Arc::new(client),
            query_url,
            application_id: config.application_id,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl SearchTransport for HttpSearchTransport {
    async fn fetch(&self, descriptor: &SearchDescriptor) -> Result<RawSearchResponse> {
        let response = self
            .client
            .post(self.query_url.clone())
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "params": descriptor.to_query_params() }))
            .send()
            .await
            .map_err(|error| SearchFailure::network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_failure(status, &body));
        }

        let body = response.bytes().await?;
        parse_response(&body)
    }
}

fn status_failure(status: StatusCode, body: &str) -> SearchFailure {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| status.to_string());

    SearchFailure::server(status.as_u16(), message)
}

fn parse_response(body: &[u8]) -> Result<RawSearchResponse> {
    serde_json::from_slice(body).map_err(SearchFailure::from)
}
