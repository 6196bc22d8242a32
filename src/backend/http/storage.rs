use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::backend::{BackendError, ObjectStorage};

use super::HttpBackend;

#[derive(Debug, Deserialize)]
struct DownloadUrlResponse {
    url: String,
}

impl ObjectStorage for HttpBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("storage/{}", path));

        let res = self
            .decorate(self.client.post(&url))
            .header("Authorization", self.auth_header().await?)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        Self::check(res, "upload object").await?;
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, BackendError> {
        let url = self.endpoint(&format!("storage/{}/url", path));

        let res = self
            .decorate(self.client.get(&url))
            .header("Authorization", self.auth_header().await?)
            .send()
            .await?;

        let body: DownloadUrlResponse = Self::check(res, "resolve download url")
            .await?
            .json()
            .await?;

        Ok(body.url)
    }
}
