//! Hosted backend feed: REST for rows, realtime websocket for live events.

use std::sync::Mutex;

use tracing::debug;

use super::realtime::{BroadcastSender, RealtimeClient};
use super::rest::RestClient;
use super::{FeedClient, FeedError, Subscription, Topics};
use crate::complaint::Complaint;
use crate::config::FeedConfig;

pub struct HostedFeed {
    rest: RestClient,
    realtime: RealtimeClient,
    channel: String,
    /// Outbound side of the currently joined channel, if any.
    broadcaster: Mutex<Option<BroadcastSender>>,
}

impl HostedFeed {
    /// # Errors
    ///
    /// Returns [`FeedError::HttpClientBuild`] if the HTTP client cannot be
    /// built and [`FeedError::Connect`] if the realtime URL is invalid.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        Ok(Self {
            rest: RestClient::new(config)?,
            realtime: RealtimeClient::new(config)?,
            channel: config.channel.clone(),
            broadcaster: Mutex::new(None),
        })
    }

    fn current_broadcaster(&self) -> Option<BroadcastSender> {
        self.broadcaster
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_broadcaster(&self, sender: Option<BroadcastSender>) {
        *self
            .broadcaster
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = sender;
    }
}

#[async_trait::async_trait]
impl FeedClient for HostedFeed {
    async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError> {
        self.rest.fetch_all().await
    }

    async fn insert(&self, text: &str) -> Result<Complaint, FeedError> {
        self.rest.insert(text).await
    }

    async fn subscribe(&self, topics: Topics) -> Result<Subscription, FeedError> {
        let (subscription, sender) = self.realtime.join(topics).await?;
        self.set_broadcaster(Some(sender));
        Ok(subscription)
    }

    async fn send_broadcast(&self, event: &str) -> Result<(), FeedError> {
        if let Some(sender) = self.current_broadcaster() {
            if sender.send(event.to_string()).await.is_ok() {
                return Ok(());
            }
            debug!("realtime channel gone, broadcasting over HTTP");
            self.set_broadcaster(None);
        }
        self.rest.broadcast(&self.channel, event).await
    }
}

#[cfg(test)]
#[path = "hosted_test.rs"]
mod tests;
