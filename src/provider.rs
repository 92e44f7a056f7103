//! HTTP client for the dispatch provider's order API.
//!
//! Two endpoints are used:
//!
//! | Endpoint | Method | Request | Response |
//! |----------|--------|---------|----------|
//! | search | `POST` | `{dateRange:{from,to}, includeOrderData, includeScheduleInformation, after_tag?}` | `{orders[], after_tag?, success?, code?, message?}` |
//! | completion | `GET` | repeated `orderNo` query parameters | `{orders[], success, code?, message?}` |
//!
//! A search envelope with `success: false` is reported as
//! [`FetchError::Provider`]. So is a completion envelope with `success: false`
//! and no orders; when it does carry orders, they inherit the flag and are
//! later rejected by the status filter.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fieldqc_core::models::{CompletionRecord, DateRange, SearchRecord};

use crate::config::ProviderConfig;
use crate::error::FetchError;
use crate::traits::{OrderProvider, SearchPage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    date_range: SearchDates,
    include_order_data: bool,
    include_schedule_information: bool,
    #[serde(rename = "after_tag", skip_serializing_if = "Option::is_none")]
    after_tag: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SearchDates {
    from: String,
    to: String,
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    orders: Vec<Value>,
    #[serde(default)]
    after_tag: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    fn check(&self) -> Result<(), FetchError> {
        if self.success == Some(false) {
            let code = match &self.code {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "unknown".to_string(),
            };
            return Err(FetchError::Provider {
                code,
                message: self
                    .message
                    .clone()
                    .unwrap_or_else(|| "request unsuccessful".to_string()),
            });
        }
        Ok(())
    }
}

/// [`OrderProvider`] backed by the provider's HTTP API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    search_url: String,
    completion_url: String,
    api_key_header: String,
    api_key: String,
    search_timeout: Option<Duration>,
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, FetchError> {
        if config.base_url.trim().is_empty() {
            return Err(FetchError::Config("provider.base_url is empty".into()));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            search_url: join_url(&config.base_url, &config.search_path),
            completion_url: join_url(&config.base_url, &config.completion_path),
            api_key_header: config.api_key_header.clone(),
            api_key,
            search_timeout: config.search_timeout(),
        })
    }

    /// Build a client, reading the credential from the configured env var.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self::new(config, api_key)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Envelope, FetchError> {
        let response = request
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.search_timeout.unwrap_or_default())
                } else {
                    FetchError::from(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl OrderProvider for ProviderClient {
    async fn search_page(
        &self,
        range: &DateRange,
        after_tag: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        let body = SearchRequest {
            date_range: SearchDates {
                from: range.start_param(),
                to: range.end_param(),
            },
            include_order_data: true,
            include_schedule_information: true,
            after_tag,
        };

        let mut request = self.client.post(&self.search_url).json(&body);
        if let Some(timeout) = self.search_timeout {
            request = request.timeout(timeout);
        }

        let envelope = self.send(request).await?;
        envelope.check()?;
        tracing::debug!(
            range = %range,
            orders = envelope.orders.len(),
            more = envelope.after_tag.is_some(),
            "search page received"
        );

        Ok(SearchPage {
            orders: envelope.orders.into_iter().map(SearchRecord::new).collect(),
            after_tag: envelope.after_tag.filter(|t| !t.is_empty()),
        })
    }

    async fn completion_batch(
        &self,
        order_numbers: &[String],
    ) -> Result<Vec<CompletionRecord>, FetchError> {
        let query: Vec<(&str, &str)> = order_numbers
            .iter()
            .map(|n| ("orderNo", n.as_str()))
            .collect();
        let request = self.client.get(&self.completion_url).query(&query);

        let envelope = self.send(request).await?;
        if envelope.orders.is_empty() {
            envelope.check()?;
        }
        let envelope_success = envelope.success.unwrap_or(true);
        if !envelope_success {
            tracing::warn!(
                orders = envelope.orders.len(),
                message = envelope.message.as_deref().unwrap_or(""),
                "completion envelope unsuccessful, records marked unsuccessful"
            );
        }

        let mut records = Vec::with_capacity(envelope.orders.len());
        let mut unkeyed = 0usize;
        for payload in envelope.orders {
            match CompletionRecord::from_payload(payload, envelope_success) {
                Some(record) => records.push(record),
                None => unkeyed += 1,
            }
        }
        if unkeyed > 0 {
            tracing::warn!(count = unkeyed, "completion records without an order number skipped");
        }
        Ok(records)
    }
}
