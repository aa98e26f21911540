//! Firestore REST Client
//!
//! Read-only access to a Firestore database over the v1 REST API.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::errors::StoreError;
use super::types::{ContentBlock, Document, ListDocumentsResponse, RawDocument};
use super::DocumentStore;

/// Public Firestore endpoint
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Default HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested when listing a collection
const LIST_PAGE_SIZE: u32 = 300;

/// Firestore client bound to one project's default database
#[derive(Clone)]
pub struct FirestoreClient {
    /// HTTP client for making requests
    http_client: Client,
    /// `{base}/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// Web API key, sent as the `key` query parameter
    api_key: Option<String>,
}

impl FirestoreClient {
    /// Create a client against the public Firestore endpoint
    pub fn new(project_id: &str, api_key: Option<String>) -> Result<Self, StoreError> {
        Self::with_base_url(DEFAULT_BASE_URL, project_id, api_key, REQUEST_TIMEOUT)
    }

    /// Create a client against a custom endpoint (emulator, proxy, tests)
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://localhost:8080/v1`
    /// * `project_id` - Project holding the database
    /// * `api_key` - Optional web API key
    /// * `timeout` - Per-request timeout
    pub fn with_base_url(
        base_url: &str,
        project_id: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let documents_url = format!(
            "{}/projects/{}/databases/(default)/documents",
            base_url.trim_end_matches('/'),
            urlencoding::encode(project_id)
        );

        info!(url = %documents_url, "Firestore client ready");

        Ok(Self {
            http_client,
            documents_url,
            api_key,
        })
    }

    /// Build the URL for a slash-separated document or collection path
    fn url_for(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.documents_url, encoded.join("/"))
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    /// Turn a non-success response into a StoreError
    async fn check(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Err(StoreError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<ContentBlock, StoreError> {
        let path = format!("{}/{}", collection, document_id);
        let url = self.url_for(&path);

        debug!(path = %path, "Fetching document");

        let response = self.with_key(self.http_client.get(&url)).send().await?;
        let response = Self::check(response, &path).await?;

        let raw: RawDocument = response.json().await?;
        let doc = raw.into_document();

        debug!(path = %path, fields = doc.fields.len(), "Fetched document");
        Ok(doc.fields)
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self.url_for(collection);
        let mut all_documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            debug!(collection = collection, page_token = ?page_token, "Listing documents");

            let response = self.with_key(request).send().await?;
            let response = Self::check(response, collection).await?;
            let page: ListDocumentsResponse = response.json().await?;

            all_documents.extend(page.documents.into_iter().map(RawDocument::into_document));

            // Check for more pages
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(collection = collection, count = all_documents.len(), "Listed documents");
        Ok(all_documents)
    }
}
