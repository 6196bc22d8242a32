//! Sending and wiping messages on a pairwise channel.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;

use crate::backend::{Backend, BackendError, Query};
use crate::cache::WarmCache;
use crate::chat::channel::ChannelId;
use crate::chat::domain::{
    preview, ChannelMeta, Draft, FileAttachment, Message, MessageRecord, GIF_PREVIEW,
};
use crate::chat::feed::MessageFeed;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::session::AuthSession;

pub(crate) const CHATS_COLLECTION: &str = "chats";
const CHAT_FILES_PREFIX: &str = "chat_files";

/// Per-message outcome tally of a conversation wipe. The loop is not
/// atomic; a partial wipe is reported, never rolled back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WipeSummary {
    /// Hard-deleted because both participants had marked the message.
    pub deleted: usize,
    /// Soft-deleted for the current user only.
    pub marked: usize,
    /// Already hidden from the current user; left untouched.
    pub already_marked: usize,
    pub failed: usize,
}

pub struct ChatService<B> {
    backend: Arc<B>,
    session: Arc<AuthSession<B>>,
    cache: WarmCache,
    events: EventBus,
}

impl<B: Backend> ChatService<B> {
    pub fn new(
        backend: Arc<B>,
        session: Arc<AuthSession<B>>,
        cache: WarmCache,
        events: EventBus,
    ) -> Self {
        Self {
            backend,
            session,
            cache,
            events,
        }
    }

    /// Open the live feed for the conversation with `partner_uid` and
    /// remember the partner for warm-started sessions.
    pub async fn open_feed(&self, partner_uid: &str) -> AppResult<MessageFeed> {
        let me = self.session.require_current()?;
        let channel = ChannelId::between(&me.uid, partner_uid);

        self.cache.set_recent_partner(&me.uid, partner_uid).await?;

        MessageFeed::open(self.backend.as_ref(), channel, me.uid, self.events.clone()).await
    }

    /// Partner of the most recently opened channel, if any.
    pub async fn recent_partner(&self) -> AppResult<Option<String>> {
        let me = self.session.require_current()?;
        self.cache.recent_partner(&me.uid).await
    }

    /// Send a message: upload attachments, write the message document,
    /// upsert the channel preview, raise the sent event. An upload
    /// failure aborts before anything is written; later failures
    /// surface to the caller without retry.
    pub async fn send(&self, partner_uid: &str, draft: Draft) -> AppResult<Message> {
        let me = self.session.require_current()?;

        let text = draft.text.trim().to_string();
        if text.is_empty() && draft.files.is_empty() {
            return Err(AppError::invalid_input("Nothing to send"));
        }

        let channel = ChannelId::between(&me.uid, partner_uid);
        let now = Utc::now();

        // Uploads run concurrently; the result keeps the selection
        // order, so each partition stays in picking order for display.
        let stamp = now.timestamp_millis();
        let uploads = draft.files.into_iter().map(|file| {
            let backend = Arc::clone(&self.backend);
            let path = format!(
                "{}/{}/{}_{}",
                CHAT_FILES_PREFIX,
                channel.as_str(),
                stamp,
                file.name
            );
            async move {
                let is_image = file.is_image();
                backend.upload(&path, file.bytes, &file.content_type).await?;
                let url = backend.download_url(&path).await?;
                Ok::<(bool, String, String), BackendError>((is_image, file.name, url))
            }
        });
        let uploaded = try_join_all(uploads).await?;

        let mut image_urls = Vec::new();
        let mut files = Vec::new();
        for (is_image, name, url) in uploaded {
            if is_image {
                image_urls.push(url);
            } else {
                files.push(FileAttachment { name, url });
            }
        }

        let record = MessageRecord {
            sender_id: me.uid.clone(),
            text,
            image_urls,
            files,
            gif_url: None,
            timestamp: now,
            delete_by: Vec::new(),
        };

        let last_message = preview(&record.text, record.image_urls.len(), record.files.len());
        self.write_message(&me.uid, partner_uid, &channel, record, last_message)
            .await
    }

    /// Send a GIF-only message with the literal `GIF` preview.
    pub async fn send_gif(&self, partner_uid: &str, gif_url: &str) -> AppResult<Message> {
        let me = self.session.require_current()?;

        if gif_url.trim().is_empty() {
            return Err(AppError::invalid_input("Nothing to send"));
        }

        let channel = ChannelId::between(&me.uid, partner_uid);
        let record = MessageRecord {
            sender_id: me.uid.clone(),
            text: String::new(),
            image_urls: Vec::new(),
            files: Vec::new(),
            gif_url: Some(gif_url.to_string()),
            timestamp: Utc::now(),
            delete_by: Vec::new(),
        };

        self.write_message(&me.uid, partner_uid, &channel, record, GIF_PREVIEW.to_string())
            .await
    }

    async fn write_message(
        &self,
        my_uid: &str,
        partner_uid: &str,
        channel: &ChannelId,
        record: MessageRecord,
        last_message: String,
    ) -> AppResult<Message> {
        let doc = self
            .backend
            .create_document(
                &channel.messages_collection(),
                serde_json::to_value(&record)?,
            )
            .await?;

        let meta = ChannelMeta {
            participants: vec![my_uid.to_string(), partner_uid.to_string()],
            last_message,
            last_message_timestamp: record.timestamp,
            created_at: record.timestamp,
        };
        self.backend
            .set_document(
                CHATS_COLLECTION,
                channel.as_str(),
                serde_json::to_value(&meta)?,
            )
            .await?;

        self.events.emit(ChatEvent::MessageSent {
            channel_id: channel.to_string(),
        });

        Ok(Message {
            id: doc.id,
            record,
        })
    }

    /// Wipe the conversation for the current user: mark every message
    /// deleted-by-me, hard-deleting those the partner already marked.
    /// Messages are handled independently; failures are tallied and
    /// the loop keeps going.
    pub async fn delete_conversation(&self, partner_uid: &str) -> AppResult<WipeSummary> {
        let me = self.session.require_current()?;
        let channel = ChannelId::between(&me.uid, partner_uid);

        let docs = self
            .backend
            .run_query(&Query::collection(channel.messages_collection()))
            .await?;

        let mut summary = WipeSummary::default();
        for doc in docs {
            let delete_by = doc
                .data
                .get("deleteBy")
                .and_then(|v| v.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            if delete_by.iter().any(|uid| uid == &me.uid) {
                summary.already_marked += 1;
                continue;
            }

            let mut updated = delete_by;
            updated.push(me.uid.clone());

            // Both participants gone means the document goes too.
            let both_sides = updated.len() >= 2;
            let result = if both_sides {
                self.backend
                    .delete_document(&channel.messages_collection(), &doc.id)
                    .await
            } else {
                self.backend
                    .update_document(
                        &channel.messages_collection(),
                        &doc.id,
                        serde_json::json!({ "deleteBy": updated }),
                    )
                    .await
            };

            match result {
                Ok(()) if both_sides => summary.deleted += 1,
                Ok(()) => summary.marked += 1,
                Err(error) => {
                    tracing::warn!(
                        component = "chat",
                        doc_id = %doc.id,
                        %error,
                        "wipe step failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        self.events.emit(ChatEvent::ConversationWiped {
            channel_id: channel.to_string(),
        });

        tracing::info!(
            component = "chat",
            channel = %channel,
            deleted = summary.deleted,
            marked = summary.marked,
            failed = summary.failed,
            "conversation wiped"
        );

        Ok(summary)
    }
}
