use crate::auth::TokenProvider;
use crate::error::{clip_details, BackendError};
use crate::models::CandidateRecord;
use crate::traits::ProfileStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "profile-store";

/// Document-style record store keyed by candidate id. Writes are full
/// replacements, so re-ingesting the same document is a no-op overwrite.
pub struct HttpProfileStore {
    endpoint: String,
    collection: String,
    client: Client,
    auth: Arc<TokenProvider>,
}

impl HttpProfileStore {
    pub fn new(
        endpoint: String,
        collection: String,
        client: Client,
        auth: Arc<TokenProvider>,
    ) -> Self {
        Self {
            endpoint,
            collection,
            client,
            auth,
        }
    }

    fn record_url(&self, candidate_id: &str) -> String {
        format!("{}/v1/{}/{}", self.endpoint, self.collection, candidate_id)
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn put(&self, record: &CandidateRecord) -> Result<(), BackendError> {
        let url = self.record_url(&record.candidate_id);
        let mut request = self.client.put(&url).json(record);
        if let Some(token) = self.auth.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                details: clip_details(&details),
            });
        }
        debug!(candidate_id = %record.candidate_id, "stored candidate record");
        Ok(())
    }

    async fn fetch(&self, candidate_id: &str) -> Result<Option<CandidateRecord>, BackendError> {
        let url = self.record_url(candidate_id);
        let mut request = self.client.get(&url);
        if let Some(token) = self.auth.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                details: clip_details(&details),
            });
        }

        let record = response.json::<CandidateRecord>().await?;
        Ok(Some(record))
    }
}
