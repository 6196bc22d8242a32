//! In-memory implementation of the backend contract.
//!
//! Behaves like the hosted platform from the client's point of view:
//! every mutation republishes the full result set of each matching
//! live query. Backs the test suite and offline development.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::DateTime;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    Auth, AuthUser, BackendError, Document, DocumentStore, Filter, FilterOp, ObjectStorage,
    ProfileUpdate, Query, Snapshot, Subscription, SubscriptionGuard,
};

const SNAPSHOT_BUFFER: usize = 8;

#[derive(Debug, Clone)]
struct MemoryUser {
    uid: String,
    email: String,
    password: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    email_verified: bool,
}

impl MemoryUser {
    fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            email_verified: self.email_verified,
        }
    }
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

struct LiveQuery {
    id: String,
    query: Query,
    snapshot_tx: mpsc::Sender<Snapshot>,
}

#[derive(Default)]
struct MemoryState {
    users: Vec<MemoryUser>,
    current_uid: Option<String>,
    collections: HashMap<String, Vec<Document>>,
    objects: HashMap<String, StoredObject>,
    subscriptions: Vec<LiveQuery>,
    verification_emails: Vec<String>,
    password_resets: Vec<String>,
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    unsub_tx: mpsc::UnboundedSender<String>,
    unsub_rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (unsub_tx, unsub_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(MemoryState::default()),
            unsub_tx,
            unsub_rx: Mutex::new(unsub_rx),
        }
    }

    /// Flip the verification flag, standing in for the user clicking
    /// the emailed link.
    pub fn mark_email_verified(&self, email: &str) {
        let mut state = self.lock();
        if let Some(user) = state.users.iter_mut().find(|u| u.email == email) {
            user.email_verified = true;
        }
    }

    /// Emails the platform would have dispatched (verification, reset).
    pub fn sent_verification_emails(&self) -> Vec<String> {
        self.lock().verification_emails.clone()
    }

    pub fn sent_password_resets(&self) -> Vec<String> {
        self.lock().password_resets.clone()
    }

    /// Stored object bytes and content type, for assertions.
    pub fn stored_object(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.lock()
            .objects
            .get(path)
            .map(|o| (o.bytes.clone(), o.content_type.clone()))
    }

    /// Live queries still registered; released guards are reaped on
    /// the next mutation.
    pub fn live_query_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop subscriptions whose guard was released, then push the
    /// current result set of every live query over `collection`.
    fn publish(&self, state: &mut MemoryState, collection: &str) {
        let mut released: Vec<String> = Vec::new();
        {
            let mut unsub_rx = self.unsub_rx.lock().unwrap_or_else(|p| p.into_inner());
            while let Ok(id) = unsub_rx.try_recv() {
                released.push(id);
            }
        }
        if !released.is_empty() {
            state.subscriptions.retain(|sub| !released.contains(&sub.id));
        }

        let mut closed: Vec<String> = Vec::new();
        for sub in &state.subscriptions {
            if sub.query.collection != collection {
                continue;
            }
            let documents = evaluate(&state.collections, &sub.query);
            match sub.snapshot_tx.try_send(Snapshot { documents }) {
                Ok(()) => {}
                // Full: the consumer will observe a fresher snapshot.
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id.clone()),
            }
        }
        if !closed.is_empty() {
            state.subscriptions.retain(|sub| !closed.contains(&sub.id));
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate(collections: &HashMap<String, Vec<Document>>, query: &Query) -> Vec<Document> {
    let mut documents: Vec<Document> = collections
        .get(&query.collection)
        .map(|docs| {
            docs.iter()
                .filter(|doc| query.filters.iter().all(|f| matches(f, doc)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if let Some(field) = &query.order_by {
        documents.sort_by(|a, b| {
            compare_values(
                a.data.get(field).unwrap_or(&Value::Null),
                b.data.get(field).unwrap_or(&Value::Null),
            )
        });
    }

    documents
}

fn matches(filter: &Filter, doc: &Document) -> bool {
    let field_value = doc.data.get(&filter.field).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::Eq => field_value == &filter.value,
        FilterOp::In => filter
            .value
            .as_array()
            .map(|candidates| candidates.contains(field_value))
            .unwrap_or(false),
    }
}

/// Order-by comparison. RFC 3339 strings compare chronologically so
/// fractional seconds don't break against unfractioned neighbors.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn merge_into(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                target_map.insert(key, value);
            }
        }
        (target_slot, patch) => *target_slot = patch,
    }
}

impl Auth for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let mut state = self.lock();

        if state.users.iter().any(|u| u.email == email) {
            return Err(BackendError::Conflict(format!(
                "account already exists for {}",
                email
            )));
        }

        let user = MemoryUser {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password: password.to_string(),
            display_name: None,
            photo_url: None,
            email_verified: false,
        };
        let auth_user = user.to_auth_user();

        state.current_uid = Some(user.uid.clone());
        state.users.push(user);

        Ok(auth_user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let mut state = self.lock();

        let user = state
            .users
            .iter()
            .find(|u| u.email == email && u.password == password)
            .cloned()
            .ok_or(BackendError::InvalidCredentials)?;

        state.current_uid = Some(user.uid.clone());
        Ok(user.to_auth_user())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.lock().current_uid = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let state = self.lock();
        let Some(uid) = &state.current_uid else {
            return Ok(None);
        };
        Ok(state
            .users
            .iter()
            .find(|u| &u.uid == uid)
            .map(MemoryUser::to_auth_user))
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<AuthUser, BackendError> {
        let mut state = self.lock();
        let uid = state
            .current_uid
            .clone()
            .ok_or(BackendError::NotAuthenticated)?;

        let user = state
            .users
            .iter_mut()
            .find(|u| u.uid == uid)
            .ok_or(BackendError::NotAuthenticated)?;

        if let Some(display_name) = update.display_name {
            user.display_name = Some(display_name);
        }
        if let Some(photo_url) = update.photo_url {
            user.photo_url = Some(photo_url);
        }

        Ok(user.to_auth_user())
    }

    async fn send_email_verification(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        let uid = state
            .current_uid
            .clone()
            .ok_or(BackendError::NotAuthenticated)?;
        let email = state
            .users
            .iter()
            .find(|u| u.uid == uid)
            .map(|u| u.email.clone())
            .ok_or(BackendError::NotAuthenticated)?;

        state.verification_emails.push(email);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), BackendError> {
        self.lock().password_resets.push(email.to_string());
        Ok(())
    }
}

impl DocumentStore for MemoryBackend {
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> Result<Document, BackendError> {
        let mut state = self.lock();

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            data,
        };
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());

        self.publish(&mut state, collection);
        Ok(doc)
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();

        let docs = state.collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|doc| doc.id == id) {
            Some(doc) => merge_into(&mut doc.data, data),
            None => docs.push(Document {
                id: id.to_string(),
                data,
            }),
        }

        self.publish(&mut state, collection);
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();

        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;

        merge_into(&mut doc.data, data);
        self.publish(&mut state, collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();

        if let Some(docs) = state.collections.get_mut(collection) {
            docs.retain(|doc| doc.id != id);
        }

        self.publish(&mut state, collection);
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, BackendError> {
        let state = self.lock();
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let state = self.lock();
        Ok(evaluate(&state.collections, query))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, BackendError> {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let id = Uuid::new_v4().to_string();

        let mut state = self.lock();

        // Initial delivery: the current result set, like the hosted
        // store's first snapshot.
        let documents = evaluate(&state.collections, &query);
        let _ = snapshot_tx.try_send(Snapshot { documents });

        state.subscriptions.push(LiveQuery {
            id: id.clone(),
            query,
            snapshot_tx,
        });

        Ok(Subscription::new(
            snapshot_rx,
            SubscriptionGuard::new(id, self.unsub_tx.clone()),
        ))
    }
}

impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.lock().objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        let state = self.lock();
        if state.objects.contains_key(path) {
            Ok(format!("memory://{}", path))
        } else {
            Err(BackendError::NotFound(path.to_string()))
        }
    }
}
