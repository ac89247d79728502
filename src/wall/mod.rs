//! View state synchronizer for the complaint wall.
//!
//! ARCHITECTURE
//! ============
//! `ComplaintWall` is the single point of mutation for the visible list,
//! the draft text and the typing flag. It reacts to three inputs:
//!
//! - local user actions (keystrokes, submit),
//! - feed events (inserted rows, typing broadcasts),
//! - the clock (typing flag reset).
//!
//! `session` wraps it in one task so those inputs are applied in order.
//!
//! DESIGN
//! ======
//! - Feed failures are logged and swallowed. Nothing is retried and no
//!   error ever reaches the snapshot.
//! - A wall runs exactly one `RefreshPolicy`. `Refetch` reloads the list
//!   after its own inserts and never subscribes to the change feed;
//!   `FeedEcho` subscribes and waits for its insert to come back.
//! - Incoming rows are validated and deduplicated by id, and placed so the
//!   list stays newest first.

pub mod session;
pub mod typing;

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::complaint::{Complaint, sort_newest_first};
use crate::config::WallConfig;
use crate::feed::{FeedClient, FeedEvent, Subscription, Topics};

use typing::{BroadcastThrottle, TypingIndicator};

/// Broadcast event name for the typing indicator.
pub const TYPING_EVENT: &str = "typing";

// =============================================================================
// TYPES
// =============================================================================

/// How a wall learns about complaints it submitted itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Reload the whole list after each successful insert.
    Refetch,
    /// Rely on the change feed echoing the insert back.
    FeedEcho,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WallSnapshot {
    /// Newest first.
    pub complaints: Vec<Complaint>,
    pub draft: String,
    pub someone_typing: bool,
}

/// Result of a submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank text; nothing was sent.
    Rejected,
    /// The store accepted the complaint.
    Submitted(Complaint),
    /// The insert failed; the failure was logged.
    Failed,
}

// =============================================================================
// WALL
// =============================================================================

pub struct ComplaintWall {
    feed: Arc<dyn FeedClient>,
    policy: RefreshPolicy,
    complaints: Vec<Complaint>,
    draft: String,
    typing: TypingIndicator,
    throttle: BroadcastThrottle,
    /// In-flight typing broadcasts. Dropping the wall aborts them.
    broadcasts: JoinSet<()>,
}

impl ComplaintWall {
    #[must_use]
    pub fn new(feed: Arc<dyn FeedClient>, config: WallConfig) -> Self {
        Self {
            feed,
            policy: config.refresh,
            complaints: Vec::new(),
            draft: String::new(),
            typing: TypingIndicator::new(config.typing_timeout),
            throttle: BroadcastThrottle::new(config.typing_broadcast_interval),
            broadcasts: JoinSet::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Topics this wall's policy subscribes to.
    #[must_use]
    pub fn topics(&self) -> Topics {
        Topics { inserts: self.policy == RefreshPolicy::FeedEcho, broadcasts: vec![TYPING_EVENT.to_string()] }
    }

    /// Open the feed subscription. Failure is logged; the wall keeps working
    /// without live updates.
    pub async fn subscribe(&self) -> Option<Subscription> {
        match self.feed.subscribe(self.topics()).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                error!(error = %e, "feed subscribe failed; live updates disabled");
                None
            }
        }
    }

    /// Load the full list from the store, replacing what is shown.
    /// On failure the current list is left as it was.
    pub async fn initialize(&mut self) -> bool {
        match self.feed.fetch_all().await {
            Ok(mut complaints) => {
                sort_newest_first(&mut complaints);
                info!(count = complaints.len(), "complaints loaded");
                self.complaints = complaints;
                true
            }
            Err(e) => {
                error!(error = %e, "complaint fetch failed");
                false
            }
        }
    }

    /// Admit a row from the change feed. Returns true if the list changed.
    pub fn on_feed_insert(&mut self, payload: &Value) -> bool {
        let complaint = match Complaint::from_payload(payload) {
            Ok(complaint) => complaint,
            Err(e) => {
                warn!(error = %e, "dropping malformed feed payload");
                return false;
            }
        };
        if self.complaints.iter().any(|c| c.id == complaint.id) {
            debug!(id = %complaint.id, "complaint already listed");
            return false;
        }
        // Fresh rows land at the front; older stragglers go where they belong.
        let at = self
            .complaints
            .partition_point(|c| c.created_at > complaint.created_at);
        self.complaints.insert(at, complaint);
        true
    }

    /// Submit `text`. Blank text is a no-op; otherwise the draft is cleared
    /// whether or not the insert succeeds.
    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Rejected;
        }

        let result = self.feed.insert(text).await;
        self.draft.clear();

        match result {
            Ok(complaint) => {
                debug!(id = %complaint.id, "complaint submitted");
                if self.policy == RefreshPolicy::Refetch {
                    self.initialize().await;
                }
                SubmitOutcome::Submitted(complaint)
            }
            Err(e) => {
                error!(error = %e, "complaint insert failed");
                SubmitOutcome::Failed
            }
        }
    }

    /// Submit whatever is in the draft.
    pub async fn submit_draft(&mut self) -> SubmitOutcome {
        let text = self.draft.clone();
        self.submit(&text).await
    }

    /// Record the draft and, throttled, tell other clients we are typing.
    /// The broadcast runs in the background; a slow or failing send never
    /// holds up the caller.
    pub fn on_typing_keystroke(&mut self, draft: String, now: Instant) {
        self.draft = draft;
        if !self.throttle.should_emit(now) {
            return;
        }
        while self.broadcasts.try_join_next().is_some() {}
        let feed = Arc::clone(&self.feed);
        self.broadcasts.spawn(async move {
            if let Err(e) = feed.send_broadcast(TYPING_EVENT).await {
                warn!(error = %e, "typing broadcast failed");
            }
        });
    }

    /// React to a named broadcast. Returns true if the snapshot changed.
    pub fn on_broadcast(&mut self, event: &str, now: Instant) -> bool {
        if event != TYPING_EVENT {
            return false;
        }
        let was_active = self.typing.is_active();
        self.typing.signal(now);
        !was_active
    }

    /// Apply one feed event.
    pub fn on_feed_event(&mut self, event: FeedEvent, now: Instant) -> bool {
        match event {
            FeedEvent::Insert(payload) => self.on_feed_insert(&payload),
            FeedEvent::Broadcast { event } => self.on_broadcast(&event, now),
        }
    }

    /// Drop the typing flag if its time is up.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        self.typing.expire(now)
    }

    #[must_use]
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    #[must_use]
    pub fn complaints(&self) -> &[Complaint] {
        &self.complaints
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    #[must_use]
    pub fn someone_typing(&self) -> bool {
        self.typing.is_active()
    }

    #[must_use]
    pub fn snapshot(&self) -> WallSnapshot {
        WallSnapshot {
            complaints: self.complaints.clone(),
            draft: self.draft.clone(),
            someone_typing: self.typing.is_active(),
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
