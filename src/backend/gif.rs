//! Keyed GIF search against a Giphy-shaped provider. The provider is
//! an external content source; only the ranked fixed-height rendition
//! URLs are surfaced.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::config::GifSettings;

use super::BackendError;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<GifEntry>,
}

#[derive(Debug, Deserialize)]
struct GifEntry {
    images: GifRenditions,
}

#[derive(Debug, Deserialize)]
struct GifRenditions {
    fixed_height: GifRendition,
}

#[derive(Debug, Deserialize)]
struct GifRendition {
    url: String,
}

#[derive(Clone)]
pub struct GifClient {
    client: Client,
    settings: GifSettings,
}

impl GifClient {
    pub fn new(settings: GifSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, settings }
    }

    /// Ranked animated-image URLs for a text query. A blank query
    /// yields an empty result without a network call.
    pub async fn search(&self, term: &str) -> Result<Vec<String>, BackendError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Request("GIF search api key not configured".into()))?;

        let url = format!("{}/search", self.settings.base_url.trim_end_matches('/'));
        let limit = self.settings.limit.to_string();

        let res = self
            .client
            .get(&url)
            .query(&[("api_key", api_key), ("q", term), ("limit", &limit)])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(BackendError::Request(format!(
                "gif search ({}): {}",
                status, text
            )));
        }

        let body: SearchResponse = res.json().await?;
        Ok(extract_urls(body))
    }
}

fn extract_urls(response: SearchResponse) -> Vec<String> {
    response
        .data
        .into_iter()
        .map(|entry| entry.images.fixed_height.url)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fixed_height_urls_in_rank_order() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({
            "data": [
                { "images": { "fixed_height": { "url": "https://gifs.example/a.gif" } } },
                { "images": { "fixed_height": { "url": "https://gifs.example/b.gif" } } }
            ]
        }))
        .expect("parse search response");

        assert_eq!(
            extract_urls(body),
            vec![
                "https://gifs.example/a.gif".to_string(),
                "https://gifs.example/b.gif".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn blank_query_short_circuits() {
        let client = GifClient::new(GifSettings::default());
        let urls = client.search("   ").await.expect("search");
        assert!(urls.is_empty());
    }
}
