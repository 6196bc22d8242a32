//! Live message feed for one open channel.
//!
//! Lifecycle per channel selection: `Closed → Loading` on open,
//! `Loading → Live` on the first snapshot, back to `Closed` on
//! teardown. The driver owns the store subscription; aborting it drops
//! the subscription guard, so release is guaranteed on every exit.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{Backend, Query, Snapshot};
use crate::chat::channel::ChannelId;
use crate::chat::domain::Message;
use crate::error::AppResult;
use crate::events::{ChatEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Closed,
    Loading,
    Live,
}

#[derive(Debug, Clone)]
pub struct FeedView {
    pub phase: FeedPhase,
    pub messages: Vec<Message>,
}

pub struct MessageFeed {
    channel: ChannelId,
    view_rx: watch::Receiver<FeedView>,
    driver: JoinHandle<()>,
}

impl MessageFeed {
    /// Subscribe to the channel's messages and start folding snapshots.
    pub(crate) async fn open<B: Backend>(
        backend: &B,
        channel: ChannelId,
        viewer: String,
        events: EventBus,
    ) -> AppResult<Self> {
        let subscription = backend
            .subscribe(Query::collection(channel.messages_collection()).order_by("timestamp"))
            .await?;

        let (view_tx, view_rx) = watch::channel(FeedView {
            phase: FeedPhase::Loading,
            messages: Vec::new(),
        });

        tracing::debug!(component = "feed", channel = %channel, "feed opened");

        let driver = tokio::spawn(drive(subscription, channel.clone(), viewer, events, view_tx));

        Ok(Self {
            channel,
            view_rx,
            driver,
        })
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn view(&self) -> FeedView {
        self.view_rx.borrow().clone()
    }

    /// Watch handle for reactive consumers.
    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view_rx.clone()
    }

    /// Tear the feed down. Dropping the handle is equivalent; the
    /// subscription is released either way.
    pub fn close(self) {}
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.driver.abort();
        tracing::debug!(component = "feed", channel = %self.channel, "feed closed");
    }
}

async fn drive(
    mut subscription: crate::backend::Subscription,
    channel: ChannelId,
    viewer: String,
    events: EventBus,
    view_tx: watch::Sender<FeedView>,
) {
    let mut last_seen: Option<DateTime<Utc>> = None;

    while let Some(snapshot) = subscription.next().await {
        let messages = reconcile(&snapshot, &viewer);

        if let Some(latest) = newly_arrived(&messages, last_seen) {
            last_seen = Some(latest.record.timestamp);
            if latest.record.sender_id != viewer {
                events.emit(ChatEvent::MessageReceived {
                    channel_id: channel.to_string(),
                    sender_id: latest.record.sender_id.clone(),
                    timestamp: latest.record.timestamp,
                });
            }
        }

        let update = FeedView {
            phase: FeedPhase::Live,
            messages,
        };
        if view_tx.send(update).is_err() {
            return;
        }
    }

    // Backend dropped the stream; there will be no more deliveries.
    view_tx.send_modify(|view| view.phase = FeedPhase::Closed);
}

/// Pure reconciliation of one snapshot into renderable feed state:
/// drop malformed documents, apply the viewer's soft-deletion filter,
/// keep non-decreasing timestamp order. The store's ordering is
/// authoritative; the stable sort only repairs transport interleaving.
pub fn reconcile(snapshot: &Snapshot, viewer: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .documents
        .iter()
        .filter_map(|doc| match doc.parse::<crate::chat::domain::MessageRecord>() {
            Ok(record) => Some(Message {
                id: doc.id.clone(),
                record,
            }),
            Err(error) => {
                tracing::warn!(
                    component = "feed",
                    doc_id = %doc.id,
                    %error,
                    "skipping malformed message"
                );
                None
            }
        })
        .filter(|message| message.visible_to(viewer))
        .collect();

    messages.sort_by_key(|message| message.record.timestamp);
    messages
}

/// The latest message when it postdates everything seen so far.
/// Rendering never reorders; this only decides arrival side effects.
pub fn newly_arrived<'a>(
    messages: &'a [Message],
    last_seen: Option<DateTime<Utc>>,
) -> Option<&'a Message> {
    let latest = messages.last()?;
    match last_seen {
        Some(seen) if latest.record.timestamp <= seen => None,
        _ => Some(latest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{Document, DocumentStore};
    use serde_json::json;
    use std::time::Duration;

    fn snapshot(docs: Vec<serde_json::Value>) -> Snapshot {
        Snapshot {
            documents: docs
                .into_iter()
                .enumerate()
                .map(|(i, data)| Document {
                    id: format!("m{}", i),
                    data,
                })
                .collect(),
        }
    }

    fn message_json(sender: &str, text: &str, ts: &str) -> serde_json::Value {
        json!({ "senderId": sender, "text": text, "timestamp": ts })
    }

    #[test]
    fn reconcile_sorts_by_timestamp_and_drops_malformed() {
        let snap = snapshot(vec![
            message_json("u1", "second", "2026-03-01T10:00:02Z"),
            json!({ "garbage": true }),
            message_json("u2", "first", "2026-03-01T10:00:01Z"),
        ]);

        let messages = reconcile(&snap, "u1");
        let texts: Vec<&str> = messages.iter().map(|m| m.record.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn reconcile_applies_viewer_visibility_filter() {
        let snap = snapshot(vec![
            json!({
                "senderId": "u2",
                "text": "hidden from u1",
                "timestamp": "2026-03-01T10:00:01Z",
                "deleteBy": ["u1"]
            }),
            message_json("u2", "visible", "2026-03-01T10:00:02Z"),
        ]);

        let for_u1 = reconcile(&snap, "u1");
        assert_eq!(for_u1.len(), 1);
        assert_eq!(for_u1[0].record.text, "visible");

        let for_u2 = reconcile(&snap, "u2");
        assert_eq!(for_u2.len(), 2);
    }

    #[test]
    fn arrival_detection_fires_once_per_message() {
        let snap = snapshot(vec![message_json("u2", "hi", "2026-03-01T10:00:01Z")]);
        let messages = reconcile(&snap, "u1");

        let first = newly_arrived(&messages, None).expect("new message");
        let seen = Some(first.record.timestamp);

        assert!(newly_arrived(&messages, seen).is_none());
    }

    #[tokio::test]
    async fn feed_goes_live_and_folds_store_echoes() {
        let backend = MemoryBackend::new();
        let channel = ChannelId::between("u1", "u2");
        let events = EventBus::new();

        let feed = MessageFeed::open(&backend, channel.clone(), "u1".to_string(), events)
            .await
            .expect("open feed");

        let mut view = feed.watch();
        tokio::time::timeout(
            Duration::from_secs(1),
            view.wait_for(|v| v.phase == FeedPhase::Live),
        )
        .await
        .expect("goes live")
        .expect("watch alive");

        backend
            .create_document(
                &channel.messages_collection(),
                message_json("u2", "hello", "2026-03-01T10:00:01Z"),
            )
            .await
            .expect("create message");

        let live = tokio::time::timeout(
            Duration::from_secs(1),
            view.wait_for(|v| v.messages.len() == 1),
        )
        .await
        .expect("echo folds in")
        .expect("watch alive");
        assert_eq!(live.messages[0].record.text, "hello");
    }

    #[tokio::test]
    async fn foreign_arrivals_raise_events_but_own_sends_do_not() {
        let backend = MemoryBackend::new();
        let channel = ChannelId::between("u1", "u2");
        let events = EventBus::new();
        let mut event_rx = events.subscribe();

        let feed = MessageFeed::open(&backend, channel.clone(), "u1".to_string(), events)
            .await
            .expect("open feed");
        let mut view = feed.watch();

        backend
            .create_document(
                &channel.messages_collection(),
                message_json("u1", "mine", "2026-03-01T10:00:01Z"),
            )
            .await
            .expect("own message");
        backend
            .create_document(
                &channel.messages_collection(),
                message_json("u2", "theirs", "2026-03-01T10:00:02Z"),
            )
            .await
            .expect("their message");

        tokio::time::timeout(
            Duration::from_secs(1),
            view.wait_for(|v| v.messages.len() == 2),
        )
        .await
        .expect("both folded")
        .expect("watch alive");

        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .expect("one event")
            .expect("recv");
        match event {
            ChatEvent::MessageReceived { sender_id, .. } => assert_eq!(sender_id, "u2"),
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_the_feed_releases_the_subscription() {
        let backend = MemoryBackend::new();
        let channel = ChannelId::between("u1", "u2");

        let feed = MessageFeed::open(&backend, channel.clone(), "u1".to_string(), EventBus::new())
            .await
            .expect("open feed");
        feed.close();

        // Give the aborted driver a beat to drop the subscription.
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend
            .create_document(
                &channel.messages_collection(),
                message_json("u2", "late", "2026-03-01T10:00:01Z"),
            )
            .await
            .expect("create after close");

        // The write's publish pass reaps the released subscription.
        assert_eq!(backend.live_query_count(), 0);
    }
}
