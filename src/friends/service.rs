//! Relationship ledger: friend requests and the derived friend list.
//!
//! The pair-uniqueness invariant (at most one pending or accepted
//! record per unordered pair of users) is enforced here on the write
//! path; the store itself does not know about it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::backend::{Backend, Document, Query, Snapshot, Subscription};
use crate::cache::WarmCache;
use crate::error::{AppError, AppResult};
use crate::friends::domain::{
    FriendEntry, FriendProfile, FriendRequest, FriendRequestRecord, PendingRequest, RequestStatus,
};
use crate::session::{AuthSession, UserDoc, USERS_COLLECTION, PROFILE_IMAGE_PREFIX};
use crate::validation::normalize_display_name;

pub(crate) const FRIEND_REQUESTS_COLLECTION: &str = "friendRequests";

pub struct FriendService<B> {
    backend: Arc<B>,
    session: Arc<AuthSession<B>>,
    cache: WarmCache,
}

impl<B: Backend> FriendService<B> {
    pub fn new(backend: Arc<B>, session: Arc<AuthSession<B>>, cache: WarmCache) -> Self {
        Self {
            backend,
            session,
            cache,
        }
    }

    /// Issue a friend request to a display name. Fails without writing
    /// when the target is invalid, unknown, already a friend, or
    /// already covered by a pending request in either direction.
    pub async fn send_request(&self, target_display_name: &str) -> AppResult<FriendRequest> {
        let me = self.session.require_current()?;

        let target = normalize_display_name(target_display_name);
        if target.is_empty() {
            return Err(AppError::invalid_input("Please enter a valid display name"));
        }

        let receivers = self
            .backend
            .run_query(
                &Query::collection(USERS_COLLECTION).filter_eq("displayName", target.clone()),
            )
            .await?;
        let receiver = receivers
            .first()
            .ok_or_else(|| AppError::not_found("No user found with the provided display name"))?;
        let receiver_uid = receiver.id.clone();

        if receiver_uid == me.uid {
            return Err(AppError::invalid_input(
                "Cannot send a friend request to yourself",
            ));
        }

        let pair_filter = |status: RequestStatus| {
            Query::collection(FRIEND_REQUESTS_COLLECTION)
                .filter_in(
                    "senderUid",
                    vec![me.uid.clone().into(), receiver_uid.clone().into()],
                )
                .filter_in(
                    "receiverUid",
                    vec![me.uid.clone().into(), receiver_uid.clone().into()],
                )
                .filter_eq("status", status.as_str())
        };

        let accepted = self.backend.run_query(&pair_filter(RequestStatus::Accepted)).await?;
        if !accepted.is_empty() {
            return Err(AppError::conflict("You are already friends"));
        }

        let pending = self.backend.run_query(&pair_filter(RequestStatus::Pending)).await?;
        if let Some(doc) = pending.first() {
            let message = match parse_request(doc) {
                Some(existing) if existing.record.sender_uid != me.uid => {
                    "This user has already sent you a friend request"
                }
                _ => "A pending friend request already exists",
            };
            return Err(AppError::conflict(message));
        }

        let record = FriendRequestRecord {
            sender_uid: me.uid.clone(),
            sender_display_name: me.display_name.clone(),
            receiver_uid,
            receiver_display_name: target,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };

        let doc = self
            .backend
            .create_document(FRIEND_REQUESTS_COLLECTION, serde_json::to_value(&record)?)
            .await?;

        tracing::info!(
            component = "friends",
            request_id = %doc.id,
            receiver = %record.receiver_display_name,
            "friend request sent"
        );

        Ok(FriendRequest { id: doc.id, record })
    }

    /// Transition a pending request to accepted. A missing or
    /// already-resolved id is a no-op.
    pub async fn accept(&self, request_id: &str) -> AppResult<()> {
        self.resolve(request_id, RequestStatus::Accepted).await
    }

    /// Transition a pending request to rejected. A missing or
    /// already-resolved id is a no-op.
    pub async fn reject(&self, request_id: &str) -> AppResult<()> {
        self.resolve(request_id, RequestStatus::Rejected).await
    }

    async fn resolve(&self, request_id: &str, status: RequestStatus) -> AppResult<()> {
        self.session.require_current()?;

        let update = serde_json::json!({ "status": status.as_str() });
        match self
            .backend
            .update_document(FRIEND_REQUESTS_COLLECTION, request_id, update)
            .await
        {
            Ok(()) => Ok(()),
            Err(crate::backend::BackendError::NotFound(_)) => {
                tracing::debug!(component = "friends", request_id, "resolving absent request");
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Withdraw a pending request the current user sent.
    pub async fn cancel(&self, request_id: &str) -> AppResult<()> {
        let me = self.session.require_current()?;

        let Some(doc) = self
            .backend
            .get_document(FRIEND_REQUESTS_COLLECTION, request_id)
            .await?
        else {
            return Ok(());
        };

        let Some(request) = parse_request(&doc) else {
            return Ok(());
        };

        if request.record.sender_uid != me.uid {
            return Err(AppError::conflict("Only the sender can cancel a request"));
        }
        if request.record.status != RequestStatus::Pending {
            return Ok(());
        }

        self.backend
            .delete_document(FRIEND_REQUESTS_COLLECTION, request_id)
            .await?;
        Ok(())
    }

    /// Dissolve an accepted friendship for both parties and evict the
    /// cached derived entry.
    pub async fn remove_friendship(&self, request_id: &str) -> AppResult<()> {
        let me = self.session.require_current()?;

        let Some(doc) = self
            .backend
            .get_document(FRIEND_REQUESTS_COLLECTION, request_id)
            .await?
        else {
            return Ok(());
        };

        let other_uid = parse_request(&doc).map(|req| req.other_party(&me.uid).to_string());

        self.backend
            .delete_document(FRIEND_REQUESTS_COLLECTION, request_id)
            .await?;

        if let Some(other_uid) = other_uid {
            self.cache.remove_friend(&me.uid, &other_uid).await?;
        }

        Ok(())
    }

    /// Derive the accepted-friends list: every accepted record where
    /// the current user appears, mapped to the other party, deduped by
    /// uid (last-seen wins). The result is mirrored into the
    /// warm-start cache.
    pub async fn accepted_friends(&self) -> AppResult<Vec<FriendEntry>> {
        let me = self.session.require_current()?;

        let as_receiver = self
            .backend
            .run_query(
                &Query::collection(FRIEND_REQUESTS_COLLECTION)
                    .filter_eq("status", RequestStatus::Accepted.as_str())
                    .filter_eq("receiverUid", me.uid.clone()),
            )
            .await?;
        let as_sender = self
            .backend
            .run_query(
                &Query::collection(FRIEND_REQUESTS_COLLECTION)
                    .filter_eq("status", RequestStatus::Accepted.as_str())
                    .filter_eq("senderUid", me.uid.clone()),
            )
            .await?;

        let mut by_uid: HashMap<String, String> = HashMap::new();
        for doc in as_receiver.iter().chain(as_sender.iter()) {
            let Some(request) = parse_request(doc) else {
                continue;
            };
            let other = request.other_party(&me.uid).to_string();
            by_uid.insert(other, request.id);
        }

        let mut entries = Vec::with_capacity(by_uid.len());
        for (uid, request_id) in by_uid {
            let profile = self.resolve_profile(&uid).await?;
            entries.push(FriendEntry {
                request_id,
                uid: profile.uid,
                display_name: profile.display_name,
                avatar_url: profile.avatar_url,
                background_color: profile.background_color,
            });
        }
        entries.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));

        self.cache.replace_friends(&me.uid, &entries).await?;
        Ok(entries)
    }

    /// Warm-start view of the last derivation; may be stale.
    pub async fn cached_friends(&self) -> AppResult<Vec<FriendEntry>> {
        let me = self.session.require_current()?;
        self.cache.cached_friends(&me.uid).await
    }

    pub async fn pending_received(&self) -> AppResult<Vec<PendingRequest>> {
        let me = self.session.require_current()?;
        let docs = self
            .backend
            .run_query(&pending_query("receiverUid", &me.uid))
            .await?;
        self.annotate(docs, &me.uid).await
    }

    pub async fn pending_sent(&self) -> AppResult<Vec<PendingRequest>> {
        let me = self.session.require_current()?;
        let docs = self
            .backend
            .run_query(&pending_query("senderUid", &me.uid))
            .await?;
        self.annotate(docs, &me.uid).await
    }

    /// Live view of requests awaiting the current user's decision.
    pub async fn watch_pending_received(&self) -> AppResult<Subscription> {
        let me = self.session.require_current()?;
        Ok(self
            .backend
            .subscribe(pending_query("receiverUid", &me.uid))
            .await?)
    }

    /// Live view of requests the current user has sent.
    pub async fn watch_pending_sent(&self) -> AppResult<Subscription> {
        let me = self.session.require_current()?;
        Ok(self
            .backend
            .subscribe(pending_query("senderUid", &me.uid))
            .await?)
    }

    async fn annotate(
        &self,
        docs: Vec<Document>,
        my_uid: &str,
    ) -> AppResult<Vec<PendingRequest>> {
        let mut out = Vec::with_capacity(docs.len());
        for doc in &docs {
            let Some(request) = parse_request(doc) else {
                continue;
            };
            let counterparty = self.resolve_profile(request.other_party(my_uid)).await?;
            out.push(PendingRequest {
                request,
                counterparty,
            });
        }
        Ok(out)
    }

    /// Best-effort profile of another user: their `users` document,
    /// their avatar download URL when one was uploaded, and a stable
    /// background color for the fallback initial.
    pub async fn resolve_profile(&self, uid: &str) -> AppResult<FriendProfile> {
        let display_name = match self.backend.get_document(USERS_COLLECTION, uid).await? {
            Some(doc) => match doc.parse::<UserDoc>() {
                Ok(user) => {
                    if user.display_name.is_empty() {
                        user.email
                    } else {
                        user.display_name
                    }
                }
                Err(error) => {
                    tracing::warn!(component = "friends", uid, %error, "malformed users doc");
                    "Unknown User".to_string()
                }
            },
            None => "Unknown User".to_string(),
        };

        let avatar_path = format!("{}/{}", PROFILE_IMAGE_PREFIX, uid);
        let avatar_url = match self.backend.download_url(&avatar_path).await {
            Ok(url) => Some(url),
            Err(error) => {
                tracing::debug!(component = "friends", uid, %error, "no avatar for user");
                None
            }
        };

        let background_color = self.cache.color_for(uid).await?;

        Ok(FriendProfile {
            uid: uid.to_string(),
            display_name,
            avatar_url,
            background_color,
        })
    }
}

fn pending_query(field: &str, uid: &str) -> Query {
    Query::collection(FRIEND_REQUESTS_COLLECTION)
        .filter_eq("status", RequestStatus::Pending.as_str())
        .filter_eq(field, uid)
        .order_by("createdAt")
}

fn parse_request(doc: &Document) -> Option<FriendRequest> {
    match doc.parse::<FriendRequestRecord>() {
        Ok(record) => Some(FriendRequest {
            id: doc.id.clone(),
            record,
        }),
        Err(error) => {
            tracing::warn!(
                component = "friends",
                doc_id = %doc.id,
                %error,
                "skipping malformed friend request"
            );
            None
        }
    }
}

/// Decode the documents of a pending-request snapshot, skipping
/// anything malformed. Companion to the `watch_pending_*` streams.
pub fn requests_from_snapshot(snapshot: &Snapshot) -> Vec<FriendRequest> {
    snapshot.documents.iter().filter_map(parse_request).collect()
}
