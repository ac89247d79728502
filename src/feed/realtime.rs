//! Realtime channel client.
//!
//! ARCHITECTURE
//! ============
//! One websocket, one channel. `join` connects, sends `phx_join`, and waits
//! for the matching `phx_reply` before handing back a [`Subscription`].
//! A spawned task then owns the socket:
//!
//! ```text
//! socket ──frames──▶ classify ──▶ FeedEvent ──▶ Subscription
//! BroadcastSender ──event names──▶ broadcast frame ──▶ socket
//! interval ──▶ heartbeat frame ──▶ socket
//! release ──▶ phx_leave + close
//! ```
//!
//! TRADE-OFFS
//! ==========
//! No reconnection. When the server closes the channel or the socket dies
//! the subscription ends and the caller sees `recv() == None`.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{FeedError, FeedEvent, SUBSCRIPTION_BUFFER, Subscription, Topics};
use crate::config::FeedConfig;
use crate::frame::{Frame, Inbound, channel_topic};

/// Phoenix expects a heartbeat well inside its 60 s idle timeout.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Protocol version advertised on connect.
const PROTOCOL_VSN: &str = "1.0.0";

const OUTBOUND_BUFFER: usize = 16;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Sends named broadcast events over a joined channel.
pub type BroadcastSender = mpsc::Sender<String>;

/// Websocket URL for a hosted backend base URL. The key is query-encoded.
///
/// # Errors
///
/// Returns [`FeedError::Connect`] if the base URL does not parse.
pub fn socket_url(base_url: &str, api_key: &str) -> Result<String, FeedError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let mut url = reqwest::Url::parse(&format!("{ws_base}/realtime/v1/websocket"))
        .map_err(|e| FeedError::Connect(format!("invalid realtime url {ws_base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url.to_string())
}

pub struct RealtimeClient {
    socket_url: String,
    api_key: String,
    topic: String,
    table: String,
    join_timeout: Duration,
    heartbeat_interval: Duration,
}

impl RealtimeClient {
    /// # Errors
    ///
    /// Returns [`FeedError::Connect`] if the configured URL is not usable.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        Ok(Self {
            socket_url: socket_url(&config.url, &config.api_key)?,
            api_key: config.api_key.clone(),
            topic: channel_topic(&config.channel),
            table: config.table.clone(),
            join_timeout: config.connect_timeout,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Connect, join the channel, and start the channel task.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Connect`] if the socket cannot be opened and
    /// [`FeedError::Subscribe`] if the join is refused or not confirmed in time.
    pub async fn join(&self, topics: Topics) -> Result<(Subscription, BroadcastSender), FeedError> {
        let (ws, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        let (write, mut read) = ws.split();

        let mut channel = Channel { write, topic: self.topic.clone(), join_ref: String::new(), next_ref: 0 };
        let join_ref = channel.next_ref();
        channel.join_ref.clone_from(&join_ref);

        let table = topics.inserts.then_some(self.table.as_str());
        channel
            .send(&Frame::join(&self.topic, table, &self.api_key, &join_ref))
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        tokio::time::timeout(self.join_timeout, await_join_reply(&mut read, &join_ref))
            .await
            .map_err(|_| FeedError::Subscribe("join not confirmed in time".into()))??;
        info!(topic = %self.topic, inserts = topics.inserts, "realtime channel joined");

        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (release_tx, release_rx) = oneshot::channel();

        let task = tokio::spawn(run_channel(
            channel,
            read,
            topics,
            events_tx,
            outbound_rx,
            release_rx,
            self.heartbeat_interval,
        ));

        Ok((Subscription::new(events_rx, release_tx, task), outbound_tx))
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

struct Channel {
    write: WsSink,
    topic: String,
    join_ref: String,
    next_ref: u64,
}

impl Channel {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        self.write.send(Message::text(frame.encode())).await
    }

    async fn heartbeat(&mut self) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let reference = self.next_ref();
        self.send(&Frame::heartbeat(&reference)).await
    }

    async fn broadcast(&mut self, event: &str) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let reference = self.next_ref();
        let frame = Frame::broadcast(&self.topic, event, &reference, &self.join_ref);
        self.send(&frame).await
    }

    async fn leave(&mut self) {
        let reference = self.next_ref();
        let frame = Frame::leave(&self.topic, &reference, &self.join_ref);
        if let Err(e) = self.send(&frame).await {
            debug!(error = %e, "phx_leave not sent");
        }
        let _ = self.write.close().await;
    }
}

/// Read until the reply to our join arrives.
async fn await_join_reply(read: &mut WsSource, join_ref: &str) -> Result<(), FeedError> {
    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| FeedError::Connect(e.to_string()))?;
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(frame) = Frame::decode(text.as_str()) else {
            continue;
        };
        match frame.classify() {
            Inbound::Reply { reference: Some(r), ok, response } if r == join_ref => {
                return if ok { Ok(()) } else { Err(FeedError::Subscribe(response.to_string())) };
            }
            Inbound::Closed { reason } => return Err(FeedError::Subscribe(reason)),
            _ => {}
        }
    }
    Err(FeedError::Closed)
}

async fn run_channel(
    mut channel: Channel,
    mut read: WsSource,
    topics: Topics,
    events: mpsc::Sender<FeedEvent>,
    mut outbound: mpsc::Receiver<String>,
    mut release: oneshot::Receiver<()>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat_interval, heartbeat_interval);

    loop {
        tokio::select! {
            _ = &mut release => {
                channel.leave().await;
                debug!(topic = %channel.topic, "realtime channel released");
                return;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = channel.heartbeat().await {
                    warn!(error = %e, "realtime heartbeat failed");
                    return;
                }
            }
            Some(event) = outbound.recv() => {
                if let Err(e) = channel.broadcast(&event).await {
                    warn!(error = %e, %event, "realtime broadcast failed");
                    return;
                }
            }
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        warn!(topic = %channel.topic, "realtime socket closed");
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "realtime socket error");
                        return;
                    }
                };
                let frame = match Frame::decode(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "ignoring undecodable realtime frame");
                        continue;
                    }
                };
                let event = match frame.classify() {
                    Inbound::Insert { record } if topics.inserts => FeedEvent::Insert(record),
                    Inbound::Broadcast { event } if topics.wants_broadcast(&event) => FeedEvent::Broadcast { event },
                    Inbound::Closed { reason } if frame.topic == channel.topic => {
                        warn!(topic = %channel.topic, %reason, "realtime channel closed by server");
                        return;
                    }
                    Inbound::Reply { ok: false, response, .. } => {
                        warn!(%response, "realtime request refused");
                        continue;
                    }
                    _ => continue,
                };
                if events.send(event).await.is_err() {
                    channel.leave().await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
