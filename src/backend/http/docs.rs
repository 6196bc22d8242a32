use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{BackendError, Document, DocumentStore, Filter, Query, Subscription};

use super::HttpBackend;

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    filters: &'a [Filter],
    #[serde(skip_serializing_if = "Option::is_none")]
    order_by: &'a Option<String>,
}

impl DocumentStore for HttpBackend {
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> Result<Document, BackendError> {
        let url = self.endpoint(&format!("db/{}", collection));

        let res = self
            .maybe_auth(self.decorate(self.client.post(&url)))
            .await
            .json(&data)
            .send()
            .await?;

        let created: CreateResponse = Self::check(res, "create document").await?.json().await?;

        Ok(Document {
            id: created.id,
            data,
        })
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("db/{}/{}", collection, id));

        let res = self
            .maybe_auth(self.decorate(self.client.patch(&url)))
            .await
            .query(&[("upsert", "true")])
            .json(&data)
            .send()
            .await?;

        Self::check(res, "set document").await?;
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("db/{}/{}", collection, id));

        let res = self
            .maybe_auth(self.decorate(self.client.patch(&url)))
            .await
            .json(&data)
            .send()
            .await?;

        Self::check(res, "update document").await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("db/{}/{}", collection, id));

        let res = self
            .maybe_auth(self.decorate(self.client.delete(&url)))
            .await
            .send()
            .await?;

        // Deleting an already-gone document is a success.
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Self::check(res, "delete document").await?;
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, BackendError> {
        let url = self.endpoint(&format!("db/{}/{}", collection, id));

        let res = self
            .maybe_auth(self.decorate(self.client.get(&url)))
            .await
            .send()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let doc: Document = Self::check(res, "get document").await?.json().await?;
        Ok(Some(doc))
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let url = self.endpoint(&format!("db/{}/query", query.collection));

        let res = self
            .maybe_auth(self.decorate(self.client.post(&url)))
            .await
            .json(&QueryBody {
                filters: &query.filters,
                order_by: &query.order_by,
            })
            .send()
            .await?;

        let documents: Vec<Document> = Self::check(res, "run query").await?.json().await?;
        Ok(documents)
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, BackendError> {
        self.realtime().subscribe(query)
    }
}
