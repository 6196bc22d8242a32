//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start against a local
//! development backend with zero configuration.

use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub gif: GifSettings,
    pub cache: CacheSettings,
}

impl Settings {
    /// Load every section from the environment, falling back to
    /// defaults. `RUST_LOG`/`PAIRCHAT_LOG` are handled by the tracing
    /// bootstrap, not stored here.
    pub fn from_env() -> Self {
        Self {
            backend: BackendSettings::from_env(),
            gif: GifSettings::from_env(),
            cache: CacheSettings::from_env(),
        }
    }
}

/// Hosted platform endpoints.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// REST base for auth, documents, and object storage.
    /// Env: `PAIRCHAT_BACKEND_URL`
    pub base_url: String,

    /// Websocket endpoint delivering live query snapshots.
    /// Env: `PAIRCHAT_REALTIME_URL`
    pub realtime_url: String,

    /// Platform API key attached to every request.
    /// Env: `PAIRCHAT_API_KEY`
    /// Default: none (local backends don't require one).
    pub api_key: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            realtime_url: "ws://127.0.0.1:8080/realtime".to_string(),
            api_key: None,
        }
    }
}

impl BackendSettings {
    fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("PAIRCHAT_BACKEND_URL") {
            settings.base_url = url;
        }
        if let Ok(url) = std::env::var("PAIRCHAT_REALTIME_URL") {
            settings.realtime_url = url;
        }
        if let Ok(key) = std::env::var("PAIRCHAT_API_KEY") {
            if !key.is_empty() {
                settings.api_key = Some(key);
            }
        }

        settings
    }
}

/// GIF search provider.
#[derive(Debug, Clone)]
pub struct GifSettings {
    /// Env: `PAIRCHAT_GIF_URL`
    pub base_url: String,

    /// Env: `PAIRCHAT_GIF_API_KEY`
    /// Default: none (GIF search stays disabled without a key).
    pub api_key: Option<String>,

    /// Result count per search.
    /// Env: `PAIRCHAT_GIF_LIMIT`
    pub limit: u32,
}

impl Default for GifSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.giphy.com/v1/gifs".to_string(),
            api_key: None,
            limit: 25,
        }
    }
}

impl GifSettings {
    fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("PAIRCHAT_GIF_URL") {
            settings.base_url = url;
        }
        if let Ok(key) = std::env::var("PAIRCHAT_GIF_API_KEY") {
            if !key.is_empty() {
                settings.api_key = Some(key);
            }
        }
        if let Ok(raw) = std::env::var("PAIRCHAT_GIF_LIMIT") {
            match raw.parse::<u32>() {
                Ok(limit) if limit > 0 => settings.limit = limit,
                _ => {
                    tracing::warn!(value = %raw, "Invalid PAIRCHAT_GIF_LIMIT, using default");
                }
            }
        }

        settings
    }
}

/// Warm-start cache location.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Env: `PAIRCHAT_CACHE_DB`
    pub db_path: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./var/pairchat-cache.sqlite"),
        }
    }
}

impl CacheSettings {
    fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(path) = std::env::var("PAIRCHAT_CACHE_DB") {
            settings.db_path = PathBuf::from(path);
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_development() {
        let settings = Settings::default();

        assert_eq!(settings.backend.base_url, "http://127.0.0.1:8080/api");
        assert_eq!(
            settings.backend.realtime_url,
            "ws://127.0.0.1:8080/realtime"
        );
        assert!(settings.backend.api_key.is_none());
        assert_eq!(settings.gif.limit, 25);
        assert!(settings.gif.api_key.is_none());
        assert_eq!(
            settings.cache.db_path,
            PathBuf::from("./var/pairchat-cache.sqlite")
        );
    }
}
