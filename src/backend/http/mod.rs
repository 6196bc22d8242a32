mod auth;
mod docs;
mod storage;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tokio::sync::RwLock;

use crate::config::BackendSettings;

use super::live::{self, RealtimeHandle};
use super::BackendError;

/// REST + realtime client for the hosted platform. Cheap to clone;
/// every clone shares the session token and the realtime channel.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    token: Arc<RwLock<Option<String>>>,
    realtime: RealtimeHandle,
}

impl HttpBackend {
    /// Build the client and start the realtime driver. Must be called
    /// from within a tokio runtime.
    pub fn connect(settings: &BackendSettings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let realtime = live::spawn(settings.realtime_url.clone())?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            token: Arc::new(RwLock::new(None)),
            realtime,
        })
    }

    pub(crate) fn realtime(&self) -> &RealtimeHandle {
        &self.realtime
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub(crate) async fn set_token(&self, token: Option<String>) {
        let mut write_guard = self.token.write().await;
        *write_guard = token;
    }

    pub(crate) async fn get_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Bearer header for endpoints that require a session.
    pub(crate) async fn auth_header(&self) -> Result<String, BackendError> {
        self.get_token()
            .await
            .map(|t| format!("Bearer {}", t))
            .ok_or(BackendError::NotAuthenticated)
    }

    /// Attach the bearer token when a session exists. Document access
    /// control is the platform's concern; some reads (display-name
    /// lookups at sign-up) legitimately happen before sign-in.
    pub(crate) async fn maybe_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.get_token().await {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Attach the platform API key and request id to every call.
    pub(crate) fn decorate(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("X-Request-Id", crate::observability::request_id());
        match &self.api_key {
            Some(key) => req.header("X-Api-Key", key),
            None => req,
        }
    }

    /// Map non-success statuses onto the contract error taxonomy.
    pub(crate) async fn check(res: Response, context: &str) -> Result<Response, BackendError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let text = res.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => BackendError::NotAuthenticated,
            StatusCode::NOT_FOUND => BackendError::NotFound(context.to_string()),
            StatusCode::CONFLICT => BackendError::Conflict(text),
            _ => BackendError::Request(format!("{} ({}): {}", context, status, text)),
        })
    }
}
