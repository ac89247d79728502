//! Wall session — the task that owns a mounted wall.
//!
//! DESIGN
//! ======
//! One spawned task owns the `ComplaintWall`, its subscription and its
//! typing timer. UI commands, feed events and the timer all arrive through
//! a single `select!`, so every mutation happens in that task and in the
//! order its inputs complete. A fetch or insert being awaited holds back
//! queued feed events until it resolves, so a slow fetch cannot clobber
//! rows that arrived after it.
//!
//! Snapshots go out over a `watch` channel whenever they change.
//! `WallHandle::unmount` runs any commands already queued, then stops the
//! task, releases the subscription and drops the timer. Nothing touches
//! state after that.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ComplaintWall, WallSnapshot};
use crate::config::WallConfig;
use crate::feed::{FeedClient, FeedEvent, Subscription};

const COMMAND_BUFFER: usize = 32;

/// Local user actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WallCommand {
    /// The input field now holds this text.
    Keystroke(String),
    /// Submit the current draft.
    Submit,
    /// Reload the list from the store.
    Refresh,
}

/// Handle to a mounted wall.
pub struct WallHandle {
    commands: mpsc::Sender<WallCommand>,
    snapshots: watch::Receiver<WallSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WallHandle {
    /// Queue a command. Returns false once the session has ended.
    pub async fn send(&self, command: WallCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn keystroke(&self, draft: impl Into<String>) -> bool {
        self.send(WallCommand::Keystroke(draft.into())).await
    }

    pub async fn submit(&self) -> bool {
        self.send(WallCommand::Submit).await
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WallSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver for snapshot changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<WallSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`. `None` if the session ended first.
    pub async fn wait_for(&self, predicate: impl FnMut(&WallSnapshot) -> bool) -> Option<WallSnapshot> {
        let mut rx = self.snapshots.clone();
        rx.wait_for(predicate).await.ok().map(|s| s.clone())
    }

    /// Run the commands already sent, then stop the session and release
    /// everything it holds.
    pub async fn unmount(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "wall session ended abnormally");
            }
        }
    }
}

/// Mount a wall: subscribe, load, and start processing.
#[must_use]
pub fn mount(feed: Arc<dyn FeedClient>, config: WallConfig) -> WallHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (snapshot_tx, snapshot_rx) = watch::channel(WallSnapshot::default());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let wall = ComplaintWall::new(feed, config);
    let task = tokio::spawn(run_session(wall, command_rx, snapshot_tx, shutdown_rx));

    WallHandle { commands: command_tx, snapshots: snapshot_rx, shutdown: Some(shutdown_tx), task: Some(task) }
}

fn publish(snapshots: &watch::Sender<WallSnapshot>, wall: &ComplaintWall) {
    let next = wall.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// Next feed event, or pending forever without a subscription.
async fn next_event(subscription: &mut Option<Subscription>) -> Option<FeedEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the typing deadline, or forever without one.
async fn typing_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn apply_command(wall: &mut ComplaintWall, command: WallCommand) {
    match command {
        WallCommand::Keystroke(draft) => wall.on_typing_keystroke(draft, Instant::now()),
        WallCommand::Submit => {
            let outcome = wall.submit_draft().await;
            debug!(?outcome, "submit settled");
        }
        WallCommand::Refresh => {
            wall.initialize().await;
        }
    }
}

async fn run_session(
    mut wall: ComplaintWall,
    mut commands: mpsc::Receiver<WallCommand>,
    snapshots: watch::Sender<WallSnapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut subscription = wall.subscribe().await;
    wall.initialize().await;
    publish(&snapshots, &wall);
    info!(policy = ?wall.policy(), live = subscription.is_some(), "wall mounted");

    loop {
        let deadline = wall.typing_deadline();
        tokio::select! {
            _ = &mut shutdown => {
                // Commands sent before unmount still run; later sends are refused.
                commands.close();
                let mut drained = 0usize;
                while let Some(command) = commands.recv().await {
                    apply_command(&mut wall, command).await;
                    drained += 1;
                }
                if drained > 0 {
                    debug!(drained, "applied queued commands before unmount");
                    publish(&snapshots, &wall);
                }
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                apply_command(&mut wall, command).await;
            }
            event = next_event(&mut subscription) => match event {
                Some(event) => {
                    wall.on_feed_event(event, Instant::now());
                }
                None => {
                    warn!("feed subscription closed; live updates stopped");
                    subscription = None;
                }
            },
            () = typing_deadline(deadline) => {
                wall.expire_typing(Instant::now());
            }
        }
        publish(&snapshots, &wall);
    }

    if let Some(subscription) = subscription.take() {
        subscription.unsubscribe().await;
    }
    info!("wall unmounted");
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
