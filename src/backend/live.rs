//! Realtime channel of [`HttpBackend`](super::http::HttpBackend).
//!
//! One websocket carries every live query of the process. Subscribers
//! hold an RAII guard; dropping it sends the unsubscribe frame. The
//! driver reconnects with capped exponential backoff and re-issues the
//! active subscriptions after each reconnect.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::backoff::ReconnectPolicy;

use super::{BackendError, Document, Query, Snapshot, Subscription, SubscriptionGuard};

pub const REALTIME_PROTOCOL_VERSION: u8 = 1;

/// Per-subscription buffer. Snapshots are whole result sets, so an
/// overrun consumer only misses an intermediate state, never data.
const SNAPSHOT_BUFFER: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe {
        subscription_id: String,
        version: u8,
        query: Query,
    },
    Unsubscribe {
        subscription_id: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
enum ServerFrame {
    Snapshot {
        subscription_id: String,
        documents: Vec<Document>,
    },
}

enum Command {
    Subscribe {
        id: String,
        query: Query,
        snapshot_tx: mpsc::Sender<Snapshot>,
    },
}

struct Entry {
    query: Query,
    snapshot_tx: mpsc::Sender<Snapshot>,
}

#[derive(Clone)]
pub struct RealtimeHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    unsub_tx: mpsc::UnboundedSender<String>,
}

impl RealtimeHandle {
    pub fn subscribe(&self, query: Query) -> Result<Subscription, BackendError> {
        let id = crate::observability::request_id();
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_BUFFER);

        self.cmd_tx
            .send(Command::Subscribe {
                id: id.clone(),
                query,
                snapshot_tx,
            })
            .map_err(|_| BackendError::ChannelClosed)?;

        Ok(Subscription::new(
            snapshot_rx,
            SubscriptionGuard::new(id, self.unsub_tx.clone()),
        ))
    }
}

/// Validate the endpoint and start the driver task. Must be called
/// from within a tokio runtime.
pub fn spawn(realtime_url: String) -> Result<RealtimeHandle, BackendError> {
    Url::parse(&realtime_url)?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (unsub_tx, unsub_rx) = mpsc::unbounded_channel();

    tokio::spawn(run(realtime_url, cmd_rx, unsub_rx));

    Ok(RealtimeHandle { cmd_tx, unsub_tx })
}

async fn run(
    realtime_url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut unsub_rx: mpsc::UnboundedReceiver<String>,
) {
    let policy = ReconnectPolicy::default();
    let mut registry: HashMap<String, Entry> = HashMap::new();
    let mut attempts = 0u32;

    loop {
        match connect_async(realtime_url.clone()).await {
            Ok((stream, _)) => {
                tracing::info!(
                    component = "realtime",
                    url = %realtime_url,
                    subscriptions = registry.len(),
                    "realtime channel connected"
                );
                attempts = 0;

                let (mut write, mut read) = stream.split();

                for (id, entry) in &registry {
                    if let Err(error) = send_subscribe(&mut write, id, &entry.query).await {
                        tracing::warn!(component = "realtime", %error, "resubscribe failed");
                    }
                }

                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(Command::Subscribe { id, query, snapshot_tx }) => {
                                if let Err(error) = send_subscribe(&mut write, &id, &query).await {
                                    tracing::warn!(component = "realtime", %error, "subscribe failed");
                                }
                                registry.insert(id, Entry { query, snapshot_tx });
                            }
                            // Backend dropped; tear the channel down.
                            None => return,
                        },
                        unsub = unsub_rx.recv() => match unsub {
                            Some(id) => {
                                registry.remove(&id);
                                let frame = ClientFrame::Unsubscribe { subscription_id: id };
                                if let Err(error) = send_frame(&mut write, &frame).await {
                                    tracing::warn!(component = "realtime", %error, "unsubscribe failed");
                                }
                            }
                            None => return,
                        },
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                dispatch(&mut registry, &text);
                            }
                            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(error)) => {
                                tracing::warn!(component = "realtime", %error, "websocket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                    }
                }
            }
            Err(error) => {
                tracing::warn!(component = "realtime", %error, "realtime connect failed");
            }
        }

        // Disconnected. Keep the registry current while waiting so the
        // reconnect resubscribes exactly the live set.
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Subscribe { id, query, snapshot_tx }) => {
                    registry.insert(id, Entry { query, snapshot_tx });
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }
        while let Ok(id) = unsub_rx.try_recv() {
            registry.remove(&id);
        }

        attempts = attempts.saturating_add(1);
        let delay = policy.delay(attempts);
        tracing::info!(
            component = "realtime",
            attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting realtime channel"
        );
        tokio::time::sleep(delay).await;
    }
}

fn dispatch(registry: &mut HashMap<String, Entry>, text: &str) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(component = "realtime", %error, "unparseable server frame");
            return;
        }
    };

    let ServerFrame::Snapshot {
        subscription_id,
        documents,
    } = frame;

    let Some(entry) = registry.get(&subscription_id) else {
        // Frames can race an unsubscribe; nothing to deliver to.
        return;
    };

    match entry.snapshot_tx.try_send(Snapshot { documents }) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(
                component = "realtime",
                subscription_id = %subscription_id,
                "consumer behind, dropping intermediate snapshot"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            registry.remove(&subscription_id);
        }
    }
}

async fn send_subscribe<S>(write: &mut S, id: &str, query: &Query) -> Result<(), BackendError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let frame = ClientFrame::Subscribe {
        subscription_id: id.to_string(),
        version: REALTIME_PROTOCOL_VERSION,
        query: query.clone(),
    };
    send_frame(write, &frame).await
}

async fn send_frame<S>(write: &mut S, frame: &ClientFrame) -> Result<(), BackendError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(frame)?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| BackendError::Request(format!("realtime send failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_as_tagged_json() {
        let frame = ClientFrame::Subscribe {
            subscription_id: "sub-1".to_string(),
            version: REALTIME_PROTOCOL_VERSION,
            query: Query::collection("chats/u1_u2/messages").order_by("timestamp"),
        };

        let text = serde_json::to_string(&frame).expect("serialize");
        assert!(text.contains("\"type\":\"subscribe\""));

        let parsed: ClientFrame = serde_json::from_str(&text).expect("parse");
        match parsed {
            ClientFrame::Subscribe { query, .. } => {
                assert_eq!(query.collection, "chats/u1_u2/messages");
            }
            _ => panic!("wrong frame"),
        }
    }

    #[test]
    fn snapshot_frame_parses_documents() {
        let text = serde_json::json!({
            "type": "snapshot",
            "payload": {
                "subscription_id": "sub-1",
                "documents": [{ "id": "m1", "data": { "text": "hi" } }]
            }
        })
        .to_string();

        let frame: ServerFrame = serde_json::from_str(&text).expect("parse");
        let ServerFrame::Snapshot { documents, .. } = frame;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "m1");
    }
}
