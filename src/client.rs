//! Composition root. Nothing in this crate starts at module load; the
//! embedding app builds a [`ChatClient`] explicitly (and calls
//! [`crate::observability::init_tracing`] if it wants the default
//! subscriber), then hands the services to its views.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::backend::gif::GifClient;
use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::cache::WarmCache;
use crate::chat::ChatService;
use crate::config::Settings;
use crate::error::AppResult;
use crate::events::{ChatEvent, EventBus};
use crate::friends::FriendService;
use crate::session::AuthSession;

pub struct ChatClient<B> {
    session: Arc<AuthSession<B>>,
    friends: FriendService<B>,
    chat: ChatService<B>,
    gif: GifClient,
    events: EventBus,
}

impl ChatClient<HttpBackend> {
    /// Production entry point: hosted backend over HTTP + websocket.
    pub async fn connect(settings: Settings) -> AppResult<Self> {
        let backend = Arc::new(HttpBackend::connect(&settings.backend)?);
        Self::with_backend(backend, &settings).await
    }
}

impl<B: Backend> ChatClient<B> {
    /// Wire the services over any conforming backend implementation.
    pub async fn with_backend(backend: Arc<B>, settings: &Settings) -> AppResult<Self> {
        let cache = WarmCache::new(settings.cache.db_path.clone()).await?;
        let events = EventBus::new();

        let session = Arc::new(AuthSession::new(backend.clone(), cache.clone()));
        let friends = FriendService::new(backend.clone(), session.clone(), cache.clone());
        let chat = ChatService::new(backend, session.clone(), cache, events.clone());
        let gif = GifClient::new(settings.gif.clone());

        Ok(Self {
            session,
            friends,
            chat,
            gif,
            events,
        })
    }

    pub fn session(&self) -> &AuthSession<B> {
        &self.session
    }

    pub fn friends(&self) -> &FriendService<B> {
        &self.friends
    }

    pub fn chat(&self) -> &ChatService<B> {
        &self.chat
    }

    pub fn gif(&self) -> &GifClient {
        &self.gif
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{DocumentStore, Query};
    use crate::chat::Draft;
    use crate::config::{BackendSettings, CacheSettings, GifSettings};
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_settings() -> (Settings, PathBuf) {
        let db_path = std::env::temp_dir().join(format!("chat-client-{}.sqlite", Uuid::new_v4()));
        let settings = Settings {
            backend: BackendSettings {
                base_url: "https://backend.example".to_string(),
                realtime_url: "wss://backend.example/realtime".to_string(),
                api_key: None,
            },
            gif: GifSettings::default(),
            cache: CacheSettings {
                db_path: db_path.clone(),
            },
        };
        (settings, db_path)
    }

    #[tokio::test]
    async fn wires_a_working_client_over_any_backend() {
        let (settings, db_path) = test_settings();
        let backend = Arc::new(MemoryBackend::new());
        let client = ChatClient::with_backend(backend.clone(), &settings)
            .await
            .expect("build client");

        client
            .session()
            .sign_up("alice@example.com", "hunter2", "alice", None)
            .await
            .expect("sign up alice");
        client
            .session()
            .sign_up("bob@example.com", "hunter2", "bob", None)
            .await
            .expect("sign up bob");
        backend.mark_email_verified("alice@example.com");

        client
            .session()
            .sign_in("alice@example.com", "hunter2")
            .await
            .expect("sign in alice");

        let bob_uid = backend
            .run_query(&Query::collection("users").filter_eq("displayName", "bob"))
            .await
            .expect("lookup bob")
            .first()
            .expect("bob exists")
            .id
            .clone();

        let mut events = client.subscribe_events();
        let feed = client.chat().open_feed(&bob_uid).await.expect("open feed");

        client
            .chat()
            .send(
                &bob_uid,
                Draft {
                    text: "hello".to_string(),
                    files: Vec::new(),
                },
            )
            .await
            .expect("send");

        match tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event in time")
            .expect("recv")
        {
            ChatEvent::MessageSent { channel_id } => assert!(channel_id.contains('_')),
            other => panic!("unexpected event: {:?}", other),
        }

        let mut view = feed.watch();
        let live = tokio::time::timeout(
            Duration::from_secs(1),
            view.wait_for(|v| v.messages.len() == 1),
        )
        .await
        .expect("feed folds send echo")
        .expect("watch alive");
        assert_eq!(live.messages[0].record.text, "hello");

        assert_eq!(
            client.chat().recent_partner().await.expect("recent"),
            Some(bob_uid)
        );

        let _ = std::fs::remove_file(db_path);
    }
}
