//! [`OrderStore`] that forwards batches to a remote import endpoint.
//!
//! The endpoint takes `{orders: CanonicalOrder[]}` and answers with
//! `{imported, duplicates, errors, errorDetails[]}`, which is exactly what
//! `fqc serve` exposes at `POST /orders/import-batch`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use fieldqc_core::models::{BatchImportOutcome, CanonicalOrder};
use fieldqc_core::store::OrderStore;

#[derive(Serialize)]
struct ImportRequest<'a> {
    orders: &'a [CanonicalOrder],
}

pub struct HttpImportStore {
    client: Client,
    url: String,
}

impl HttpImportStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build import HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl OrderStore for HttpImportStore {
    async fn persist_batch(&self, orders: &[CanonicalOrder]) -> Result<BatchImportOutcome> {
        let response = self
            .client
            .post(&self.url)
            .json(&ImportRequest { orders })
            .send()
            .await
            .with_context(|| format!("import request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "import endpoint returned HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        response
            .json::<BatchImportOutcome>()
            .await
            .context("failed to parse import response")
    }
}
