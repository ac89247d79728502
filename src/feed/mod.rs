//! Feed client — the seam between view state and the hosted backend.
//!
//! ARCHITECTURE
//! ============
//! The wall never talks to a store directly. It is handed an
//! `Arc<dyn FeedClient>` at construction:
//!
//! - `memory`: in-process hub, used by tests and offline mode.
//! - `hosted`: REST query/insert plus a realtime websocket channel.
//!
//! DESIGN
//! ======
//! Subscriptions are scoped resources. A [`Subscription`] owns the event
//! receiver and a release signal for whatever background task feeds it;
//! `unsubscribe()` releases explicitly, dropping releases implicitly.

pub mod hosted;
pub mod memory;
pub mod realtime;
pub mod rest;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::complaint::{Complaint, PayloadError};

/// Event buffer for a single subscription.
pub const SUBSCRIPTION_BUFFER: usize = 64;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by feed client operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend response error: status {status}")]
    Response { status: u16, body: String },

    /// The response body was not the JSON we expected.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// A returned row failed validation.
    #[error("invalid row: {0}")]
    Payload(#[from] PayloadError),

    /// The realtime socket could not be opened.
    #[error("realtime connect failed: {0}")]
    Connect(String),

    /// The realtime channel refused or never confirmed the join.
    #[error("realtime subscribe failed: {0}")]
    Subscribe(String),

    /// The feed connection is gone.
    #[error("feed closed")]
    Closed,
}

// =============================================================================
// EVENTS
// =============================================================================

/// What a subscription should deliver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topics {
    /// Deliver rows inserted into the complaints table.
    pub inserts: bool,
    /// Deliver these named broadcast events.
    pub broadcasts: Vec<String>,
}

impl Topics {
    #[must_use]
    pub fn wants_broadcast(&self, event: &str) -> bool {
        self.broadcasts.iter().any(|b| b == event)
    }
}

/// One delivery from the change feed or the broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Raw newly inserted row. Untrusted until validated.
    Insert(Value),
    /// A payload-less named broadcast.
    Broadcast { event: String },
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live event stream plus the handle that releases it.
pub struct Subscription {
    events: mpsc::Receiver<FeedEvent>,
    release: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver whose producer stops when `release` fires or drops.
    #[must_use]
    pub fn new(events: mpsc::Receiver<FeedEvent>, release: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { events, release: Some(release), task: Some(task) }
    }

    /// Next event, or `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Release the subscription and wait for its background task to finish.
    pub async fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "subscription task ended abnormally");
            }
        }
    }
}

// =============================================================================
// CLIENT TRAIT
// =============================================================================

/// Query, insert, subscribe and broadcast against the complaints feed.
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    /// All complaints, newest first.
    async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError>;

    /// Insert a complaint; the store assigns `id` and `created_at`.
    async fn insert(&self, text: &str) -> Result<Complaint, FeedError>;

    /// Open a subscription for the given topics.
    async fn subscribe(&self, topics: Topics) -> Result<Subscription, FeedError>;

    /// Send a payload-less broadcast event to other clients.
    async fn send_broadcast(&self, event: &str) -> Result<(), FeedError>;
}
