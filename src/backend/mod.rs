//! Contract over the hosted backend platform.
//!
//! The platform owns auth, document persistence, realtime fan-out, and
//! file storage; this module pins down the narrow surface the client
//! relies on. Services are generic over [`Backend`] so the same logic
//! runs against the HTTP implementation and the in-memory one.

pub mod gif;
pub mod http;
pub mod live;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend request failed: {0}")]
    Request(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("realtime channel closed")]
    ChannelClosed,
}

/// A stored document: opaque id plus its JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    In,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Collection-scoped query: equality / membership filters plus an
/// optional ascending order-by, mirroring what the hosted store offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn filter_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::In,
            value: Value::Array(values),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }
}

/// One delivery from a live query: the full current result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

/// Live query handle. Dropping it releases the server-side
/// subscription; no snapshot is delivered after that point.
pub struct Subscription {
    rx: mpsc::Receiver<Snapshot>,
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<Snapshot>, guard: SubscriptionGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Next snapshot, or `None` once the backend side shut down.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

pub(crate) struct SubscriptionGuard {
    id: String,
    unsub_tx: mpsc::UnboundedSender<String>,
}

impl SubscriptionGuard {
    pub(crate) fn new(id: String, unsub_tx: mpsc::UnboundedSender<String>) -> Self {
        Self { id, unsub_tx }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        // Backend already gone is fine; there is nothing left to release.
        let _ = self.unsub_tx.send(self.id.clone());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait Auth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;
    async fn update_profile(&self, update: ProfileUpdate) -> Result<AuthUser, BackendError>;
    async fn send_email_verification(&self) -> Result<(), BackendError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), BackendError>;
}

#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Create with a store-assigned id.
    async fn create_document(&self, collection: &str, data: Value)
        -> Result<Document, BackendError>;
    /// Merge-upsert: top-level fields are merged into the existing
    /// document, which is created when missing.
    async fn set_document(&self, collection: &str, id: &str, data: Value)
        -> Result<(), BackendError>;
    /// Merge into an existing document; `NotFound` when missing.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<(), BackendError>;
    /// Idempotent: deleting an absent document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError>;
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, BackendError>;
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, BackendError>;
    /// Live variant of [`run_query`](Self::run_query): the first
    /// snapshot is the current result set, then one per change.
    async fn subscribe(&self, query: Query) -> Result<Subscription, BackendError>;
}

#[allow(async_fn_in_trait)]
pub trait ObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;
    async fn download_url(&self, path: &str) -> Result<String, BackendError>;
}

pub trait Backend: Auth + DocumentStore + ObjectStorage + Send + Sync + 'static {}

impl<T> Backend for T where T: Auth + DocumentStore + ObjectStorage + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_collects_filters_in_order() {
        let query = Query::collection("friendRequests")
            .filter_eq("status", "pending")
            .filter_in("senderUid", vec!["u1".into(), "u2".into()])
            .order_by("createdAt");

        assert_eq!(query.collection, "friendRequests");
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].op, FilterOp::Eq);
        assert_eq!(query.filters[1].op, FilterOp::In);
        assert_eq!(query.order_by.as_deref(), Some("createdAt"));
    }

    #[test]
    fn document_parse_round_trips_typed_payloads() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Probe {
            name: String,
        }

        let doc = Document {
            id: "d1".to_string(),
            data: serde_json::json!({ "name": "alice" }),
        };

        assert_eq!(
            doc.parse::<Probe>().expect("parse"),
            Probe {
                name: "alice".to_string()
            }
        );
    }
}
