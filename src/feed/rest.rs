//! REST client for the hosted store.
//!
//! Query and insert go through the PostgREST-style table endpoint; the
//! broadcast fallback goes through the realtime HTTP endpoint for when no
//! channel socket is open.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use super::FeedError;
use crate::complaint::{Complaint, FIELD_CREATED_AT};
use crate::config::FeedConfig;

const PREFER_REPRESENTATION: &str = "return=representation";

#[derive(Serialize)]
struct InsertRow<'a> {
    text: &'a str,
}

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestClient {
    /// # Errors
    ///
    /// Returns [`FeedError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FeedError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    /// All rows, newest first. Rows that fail validation are logged and skipped.
    pub async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError> {
        let order = format!("{FIELD_CREATED_AT}.desc");
        let request = self
            .http
            .get(self.table_url())
            .query(&[("select", "*"), ("order", order.as_str())]);
        let text = self.send(request).await?;

        let rows: Vec<Value> = serde_json::from_str(&text).map_err(|e| FeedError::Parse(e.to_string()))?;
        Ok(parse_rows(&rows))
    }

    /// Insert one row and return it as stored.
    pub async fn insert(&self, text: &str) -> Result<Complaint, FeedError> {
        let request = self
            .http
            .post(self.table_url())
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&[InsertRow { text }]);
        let body = self.send(request).await?;

        let rows: Vec<Value> = serde_json::from_str(&body).map_err(|e| FeedError::Parse(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| FeedError::Parse("insert returned no rows".to_string()))?;
        Ok(Complaint::from_payload(row)?)
    }

    /// Broadcast over HTTP to a channel nobody here has joined.
    pub async fn broadcast(&self, channel: &str, event: &str) -> Result<(), FeedError> {
        let body = json!({
            "messages": [{ "topic": channel, "event": event, "payload": {} }]
        });
        let request = self
            .http
            .post(format!("{}/realtime/v1/api/broadcast", self.base_url))
            .json(&body);
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, FeedError> {
        let response = request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(FeedError::Response { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

/// Validate fetched rows, keeping order and dropping the malformed ones.
pub(crate) fn parse_rows(rows: &[Value]) -> Vec<Complaint> {
    rows.iter()
        .filter_map(|row| match Complaint::from_payload(row) {
            Ok(complaint) => Some(complaint),
            Err(e) => {
                warn!(error = %e, "skipping malformed complaint row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
