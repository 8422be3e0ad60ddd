//! # Feature: Dose Recorder
//!
//! Persists "dose taken" through the medication store's record endpoint.
//! The engine treats this as best effort: failures are logged by the caller
//! and never retried.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use serde_json::json;
use std::time::Duration;

use crate::features::reminders::ItemId;

/// Record interface of the persistent store
#[async_trait]
pub trait DoseRecorder: Send + Sync {
    async fn record_taken(&self, item_id: &ItemId) -> Result<()>;
}

/// `POST {base}/{itemId}` with `{"taken": true}`
pub struct HttpDoseRecorder {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDoseRecorder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("record url cannot be a base: {}", base_url));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Endpoint for one item, with the id escaped as a single path segment
    pub fn url_for(&self, item_id: &ItemId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("record url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .push(item_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl DoseRecorder for HttpDoseRecorder {
    async fn record_taken(&self, item_id: &ItemId) -> Result<()> {
        let url = self.url_for(item_id)?;
        let response = self
            .client
            .post(url.clone())
            .json(&json!({ "taken": true }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("record endpoint {} returned {}", url, status));
        }

        debug!("Recorded dose taken for item {item_id}");
        Ok(())
    }
}
