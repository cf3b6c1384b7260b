//! Elasticsearch REST adapter
//!
//! Talks to the document and index APIs directly over HTTP. Writes use
//! `refresh=true` so a projected change is searchable as soon as the consumer
//! moves on.

use super::documents::{index_mapping, DeleteTarget, IndexDocument};
use super::traits::{IndexWriteError, SearchIndex};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::json;

/// HTTP-based `SearchIndex` for one Elasticsearch index.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: Url,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticClient {
    /// Create a client for `index` on the cluster at `base_url`.
    ///
    /// Basic auth is sent when `username` is set.
    pub fn new(
        base_url: &str,
        index: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Elasticsearch URL {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Elasticsearch URL {} cannot carry a path", base_url);
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            index: index.into(),
            username: username.filter(|u| !u.is_empty()),
            password,
        })
    }

    /// `base/{index}/{segments...}`, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.index).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_ref()),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, doc: &str) -> Result<reqwest::Response, IndexWriteError> {
        req.send().await.map_err(|e| IndexWriteError::Request {
            doc: doc.to_string(),
            reason: e.to_string(),
        })
    }

    async fn rejected(response: reqwest::Response, doc: String) -> IndexWriteError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        IndexWriteError::Rejected { doc, status, body }
    }
}

#[async_trait]
impl SearchIndex for ElasticClient {
    async fn ensure_index(&self) -> Result<(), IndexWriteError> {
        let label = format!("index {}", self.index);
        let create = self
            .request(Method::PUT, self.endpoint(&[]))
            .json(&json!({ "mappings": index_mapping() }));
        let response = self.send(create, &label).await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!(index = %self.index, "Index created with join mapping");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::BAD_REQUEST || !body.contains("resource_already_exists_exception") {
            return Err(IndexWriteError::Rejected {
                doc: label,
                status: status.as_u16(),
                body,
            });
        }

        // Existing index: apply the mapping in place (additive, idempotent).
        let update = self
            .request(Method::PUT, self.endpoint(&["_mapping"]))
            .json(&index_mapping());
        let response = self.send(update, &label).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response, label).await);
        }
        tracing::debug!(index = %self.index, "Index exists, mapping applied");
        Ok(())
    }

    async fn upsert(&self, doc: &IndexDocument) -> Result<(), IndexWriteError> {
        let label = doc.label();
        let mut req = self
            .request(Method::PUT, self.endpoint(&["_doc", &doc.id]))
            .query(&[("refresh", "true")]);
        if let Some(routing) = &doc.routing {
            req = req.query(&[("routing", routing.as_str())]);
        }

        let response = self.send(req.json(&doc.body), &label).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response, label).await);
        }
        tracing::debug!(doc_id = %doc.id, routing = ?doc.routing, "Document indexed");
        Ok(())
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<(), IndexWriteError> {
        let label = target.label();
        let mut req = self
            .request(Method::DELETE, self.endpoint(&["_doc", &target.id]))
            .query(&[("refresh", "true")]);
        if let Some(routing) = &target.routing {
            req = req.query(&[("routing", routing.as_str())]);
        }

        let response = self.send(req, &label).await?;
        match response.status() {
            status if status.is_success() => {
                tracing::debug!(doc_id = %target.id, routing = ?target.routing, "Document deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(IndexWriteError::Missing { doc: label }),
            _ => Err(Self::rejected(response, label).await),
        }
    }
}
