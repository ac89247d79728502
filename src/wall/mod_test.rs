use super::*;
use std::time::Duration;

use serde_json::json;
use time::macros::datetime;
use tokio::time::timeout;

use crate::complaint::ComplaintId;
use crate::feed::FeedError;
use crate::feed::memory::MemoryHub;

struct FailingFeed;

#[async_trait::async_trait]
impl FeedClient for FailingFeed {
    async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError> {
        Err(FeedError::Request("connection refused".into()))
    }

    async fn insert(&self, _text: &str) -> Result<Complaint, FeedError> {
        Err(FeedError::Response { status: 503, body: "down".into() })
    }

    async fn subscribe(&self, _topics: Topics) -> Result<Subscription, FeedError> {
        Err(FeedError::Connect("refused".into()))
    }

    async fn send_broadcast(&self, _event: &str) -> Result<(), FeedError> {
        Err(FeedError::Closed)
    }
}

/// Broadcasts never complete; each one holds a clone of `in_flight` until dropped.
struct StalledBroadcastFeed {
    in_flight: Arc<()>,
}

#[async_trait::async_trait]
impl FeedClient for StalledBroadcastFeed {
    async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError> {
        Ok(Vec::new())
    }

    async fn insert(&self, _text: &str) -> Result<Complaint, FeedError> {
        Err(FeedError::Closed)
    }

    async fn subscribe(&self, _topics: Topics) -> Result<Subscription, FeedError> {
        Err(FeedError::Closed)
    }

    async fn send_broadcast(&self, _event: &str) -> Result<(), FeedError> {
        let _held = Arc::clone(&self.in_flight);
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn config(refresh: RefreshPolicy) -> WallConfig {
    WallConfig { refresh, ..WallConfig::default() }
}

fn complaint(id: &str, text: &str, created_at: time::OffsetDateTime) -> Complaint {
    Complaint::new(ComplaintId::new(id), text, created_at)
}

fn seeded_hub() -> MemoryHub {
    MemoryHub::with_complaints(vec![
        complaint("t1", "first", datetime!(2024-05-01 09:00 UTC)),
        complaint("t2", "second", datetime!(2024-05-01 10:00 UTC)),
    ])
}

fn assert_newest_first(list: &[Complaint]) {
    assert!(
        list.windows(2).all(|w| w[0].created_at >= w[1].created_at),
        "list out of order: {list:?}"
    );
}

async fn apply_next(wall: &mut ComplaintWall, sub: &mut Subscription) -> bool {
    let event = timeout(Duration::from_millis(500), sub.recv())
        .await
        .expect("feed event timed out")
        .expect("subscription closed");
    wall.on_feed_event(event, Instant::now())
}

// =============================================================================
// initialize
// =============================================================================

#[tokio::test]
async fn initialize_orders_newest_first() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());

    assert!(wall.initialize().await);

    let ids: Vec<&str> = wall.complaints().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["t2", "t1"]);
}

#[tokio::test]
async fn initialize_twice_yields_same_list() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());

    wall.initialize().await;
    let first = wall.snapshot();
    wall.initialize().await;
    assert_eq!(wall.snapshot(), first);
}

#[tokio::test]
async fn initialize_failure_leaves_list_empty() {
    let mut wall = ComplaintWall::new(Arc::new(FailingFeed), WallConfig::default());

    assert!(!wall.initialize().await);
    assert!(wall.complaints().is_empty());
}

#[tokio::test]
async fn failed_refresh_keeps_stale_list() {
    let mut wall = ComplaintWall::new(Arc::new(FailingFeed), WallConfig::default());
    let row = json!({ "id": "x", "text": "still here", "created_at": "2024-05-01T10:00:00Z" });
    wall.on_feed_insert(&row);

    wall.initialize().await;
    assert_eq!(wall.complaints().len(), 1);
}

// =============================================================================
// submit
// =============================================================================

#[tokio::test]
async fn blank_submit_is_noop() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());
    wall.initialize().await;
    wall.on_typing_keystroke("   ".into(), Instant::now());
    let before = wall.snapshot();

    for text in ["", " ", "\t\n"] {
        assert_eq!(wall.submit(text).await, SubmitOutcome::Rejected);
    }
    assert_eq!(wall.submit_draft().await, SubmitOutcome::Rejected);

    assert_eq!(hub.insert_calls().await, 0);
    assert_eq!(wall.snapshot(), before);
}

#[tokio::test]
async fn submit_with_feed_echo_shows_exactly_one_complaint() {
    let hub = MemoryHub::new();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), config(RefreshPolicy::FeedEcho));
    let mut sub = wall.subscribe().await.expect("memory subscribe");
    wall.initialize().await;

    wall.on_typing_keystroke("the wifi is down".into(), Instant::now());
    let outcome = wall.submit_draft().await;
    assert!(matches!(outcome, SubmitOutcome::Submitted(ref c) if c.text == "the wifi is down"));

    // Nothing shows until the echo arrives.
    assert!(wall.complaints().is_empty());
    assert!(apply_next(&mut wall, &mut sub).await);

    assert_eq!(wall.complaints().len(), 1);
    assert_eq!(wall.complaints()[0].text, "the wifi is down");
    assert_eq!(wall.draft(), "");
    assert_eq!(hub.insert_calls().await, 1);
}

#[tokio::test]
async fn submit_with_refetch_reloads_list() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), config(RefreshPolicy::Refetch));
    wall.initialize().await;

    let outcome = wall.submit("cold coffee").await;
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));

    assert_eq!(wall.complaints().len(), 3);
    assert_eq!(wall.complaints()[0].text, "cold coffee");
    assert_newest_first(wall.complaints());
}

#[tokio::test]
async fn refetch_policy_does_not_subscribe_to_inserts() {
    let wall = ComplaintWall::new(Arc::new(MemoryHub::new().client()), config(RefreshPolicy::Refetch));
    assert_eq!(wall.topics(), Topics { inserts: false, broadcasts: vec![TYPING_EVENT.into()] });

    let wall = ComplaintWall::new(Arc::new(MemoryHub::new().client()), config(RefreshPolicy::FeedEcho));
    assert!(wall.topics().inserts);
}

#[tokio::test]
async fn failed_insert_still_clears_draft() {
    let mut wall = ComplaintWall::new(Arc::new(FailingFeed), WallConfig::default());
    wall.on_typing_keystroke("printer jammed".into(), Instant::now());

    assert_eq!(wall.submit_draft().await, SubmitOutcome::Failed);
    assert_eq!(wall.draft(), "");
    assert!(wall.complaints().is_empty());
}

#[tokio::test]
async fn subscribe_failure_is_swallowed() {
    let wall = ComplaintWall::new(Arc::new(FailingFeed), WallConfig::default());
    assert!(wall.subscribe().await.is_none());
}

// =============================================================================
// feed inserts
// =============================================================================

#[tokio::test]
async fn feed_insert_prepends_new_rows() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());
    wall.initialize().await;

    let row = json!({ "id": "t3", "text": "third", "created_at": "2024-05-01T11:00:00Z" });
    assert!(wall.on_feed_insert(&row));

    assert_eq!(wall.complaints()[0].id.as_str(), "t3");
    assert_newest_first(wall.complaints());
}

#[tokio::test]
async fn feed_insert_places_late_rows_in_order() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());
    wall.initialize().await;

    let row = json!({ "id": "late", "text": "late", "created_at": "2024-05-01T09:30:00Z" });
    assert!(wall.on_feed_insert(&row));

    let ids: Vec<&str> = wall.complaints().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["t2", "late", "t1"]);
}

#[tokio::test]
async fn feed_insert_ignores_known_ids() {
    let hub = seeded_hub();
    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());
    wall.initialize().await;

    let dup = json!({ "id": "t2", "text": "second", "created_at": "2024-05-01T10:00:00Z" });
    assert!(!wall.on_feed_insert(&dup));
    assert_eq!(wall.complaints().len(), 2);
}

#[tokio::test]
async fn feed_insert_drops_malformed_payloads() {
    let mut wall = ComplaintWall::new(Arc::new(MemoryHub::new().client()), WallConfig::default());

    for payload in [
        json!(null),
        json!({ "id": "a", "created_at": "2024-05-01T10:00:00Z" }),
        json!({ "id": "a", "text": 12, "created_at": "2024-05-01T10:00:00Z" }),
        json!({ "id": "a", "text": "ok", "created_at": "not a time" }),
    ] {
        assert!(!wall.on_feed_insert(&payload));
    }
    assert!(wall.complaints().is_empty());
}

// =============================================================================
// typing
// =============================================================================

#[tokio::test]
async fn typing_broadcast_raises_flag_until_three_seconds_after_last() {
    let mut wall = ComplaintWall::new(Arc::new(MemoryHub::new().client()), WallConfig::default());
    let t0 = Instant::now();

    assert!(wall.on_broadcast(TYPING_EVENT, t0));
    assert!(wall.someone_typing());

    // A second signal restarts the countdown but doesn't change the snapshot.
    assert!(!wall.on_broadcast(TYPING_EVENT, t0 + Duration::from_secs(2)));

    assert!(!wall.expire_typing(t0 + Duration::from_secs(3)));
    assert!(wall.someone_typing());
    assert!(!wall.expire_typing(t0 + Duration::from_millis(4999)));
    assert!(wall.expire_typing(t0 + Duration::from_secs(5)));
    assert!(!wall.someone_typing());
}

#[tokio::test]
async fn other_broadcasts_are_ignored() {
    let mut wall = ComplaintWall::new(Arc::new(MemoryHub::new().client()), WallConfig::default());
    assert!(!wall.on_broadcast("shouting", Instant::now()));
    assert!(!wall.someone_typing());
}

#[tokio::test]
async fn keystrokes_broadcast_through_throttle() {
    let hub = MemoryHub::new();
    let observer = hub.client();
    let mut observed = observer
        .subscribe(Topics { inserts: false, broadcasts: vec![TYPING_EVENT.into()] })
        .await
        .unwrap();

    let mut wall = ComplaintWall::new(Arc::new(hub.client()), WallConfig::default());
    let t0 = Instant::now();
    wall.on_typing_keystroke("h".into(), t0);
    wall.on_typing_keystroke("he".into(), t0 + Duration::from_millis(100));
    wall.on_typing_keystroke("hel".into(), t0 + Duration::from_millis(900));
    wall.on_typing_keystroke("hell".into(), t0 + Duration::from_millis(1600));

    assert_eq!(wall.draft(), "hell");
    for _ in 0..2 {
        let event = timeout(Duration::from_millis(500), observed.recv()).await.unwrap();
        assert_eq!(event, Some(FeedEvent::Broadcast { event: TYPING_EVENT.into() }));
    }
    assert!(timeout(Duration::from_millis(50), observed.recv()).await.is_err());
}

#[tokio::test]
async fn broadcast_failure_still_updates_draft() {
    let mut wall = ComplaintWall::new(Arc::new(FailingFeed), WallConfig::default());
    wall.on_typing_keystroke("abc".into(), Instant::now());
    assert_eq!(wall.draft(), "abc");
}

#[tokio::test]
async fn stalled_broadcast_does_not_hold_up_the_wall() {
    let in_flight = Arc::new(());
    let feed = Arc::new(StalledBroadcastFeed { in_flight: Arc::clone(&in_flight) });
    let mut wall = ComplaintWall::new(feed, WallConfig::default());
    let t0 = Instant::now();

    wall.on_typing_keystroke("a".into(), t0);
    assert_eq!(wall.draft(), "a");

    // Other inputs are still handled while the send hangs.
    let row = json!({ "id": "x", "text": "lights out", "created_at": "2024-05-01T10:00:00Z" });
    assert!(wall.on_feed_insert(&row));
    assert!(wall.on_broadcast(TYPING_EVENT, t0));

    // Test + feed + the running send.
    timeout(Duration::from_millis(500), async {
        while Arc::strong_count(&in_flight) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("broadcast never started");
}

#[tokio::test]
async fn dropping_the_wall_aborts_pending_broadcasts() {
    let in_flight = Arc::new(());
    let feed = Arc::new(StalledBroadcastFeed { in_flight: Arc::clone(&in_flight) });
    let mut wall = ComplaintWall::new(feed, WallConfig::default());

    wall.on_typing_keystroke("a".into(), Instant::now());
    timeout(Duration::from_millis(500), async {
        while Arc::strong_count(&in_flight) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("broadcast never started");

    drop(wall);
    timeout(Duration::from_millis(500), async {
        while Arc::strong_count(&in_flight) > 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("broadcast outlived the wall");
}
