use crate::answer::{answer_query, AnswerOptions, QueryReport};
use crate::auth::{TokenProvider, TokenSource};
use crate::embeddings::{RemoteEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::{BackendError, QueryError};
use crate::extractor::{LopdfExtractor, ResumeExtractor};
use crate::generation::RemoteModel;
use crate::ingest::Ingestor;
use crate::models::QueryFilter;
use crate::orchestrator::SearchCoordinator;
use crate::stores::{
    GenericMatchStrategy, HttpProfileStore, IndexTransport, MatchingIndexConfig,
    MatchingIndexWriter, NativeNeighborsStrategy, RawTransportStrategy, RetryPolicy,
};
use crate::traits::{GenerativeModel, ProfileStore, SearchStrategy, TextEmbedder, VectorIndexWriter};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub embedding_endpoint: String,
    pub embedding_model: String,
    pub model_endpoint: String,
    pub model_name: String,
    pub vector_endpoint: String,
    pub vector_index: String,
    pub vector_index_endpoint: String,
    pub deployed_index: String,
    pub store_endpoint: String,
    pub store_collection: String,
    pub token: TokenSource,
    pub dimensions: usize,
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_endpoint: String::new(),
            embedding_model: String::new(),
            model_endpoint: String::new(),
            model_name: String::new(),
            vector_endpoint: String::new(),
            vector_index: String::new(),
            vector_index_endpoint: String::new(),
            deployed_index: String::new(),
            store_endpoint: String::new(),
            store_collection: String::new(),
            token: TokenSource::None,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Every remote client the pipeline needs, built once at startup and shared.
/// Handed around explicitly rather than living in a global.
pub struct Clients {
    pub extractor: Arc<dyn ResumeExtractor>,
    pub model: Arc<dyn GenerativeModel>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub index_writer: Arc<dyn VectorIndexWriter>,
    pub store: Arc<dyn ProfileStore>,
    pub coordinator: SearchCoordinator,
}

impl Clients {
    pub fn build(config: &PipelineConfig) -> Result<Self, BackendError> {
        for endpoint in [
            &config.embedding_endpoint,
            &config.model_endpoint,
            &config.vector_endpoint,
            &config.store_endpoint,
        ] {
            Url::parse(endpoint)?;
        }

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;
        let auth = Arc::new(TokenProvider::new(config.token.clone(), client.clone()));

        let embedder: Arc<dyn TextEmbedder> = Arc::new(RemoteEmbedder::new(
            trimmed(&config.embedding_endpoint),
            config.embedding_model.clone(),
            client.clone(),
            auth.clone(),
            config.dimensions,
        ));
        let model: Arc<dyn GenerativeModel> = Arc::new(RemoteModel::new(
            trimmed(&config.model_endpoint),
            config.model_name.clone(),
            client.clone(),
            auth.clone(),
        ));

        let index_config = MatchingIndexConfig {
            endpoint: trimmed(&config.vector_endpoint),
            index: config.vector_index.clone(),
            index_endpoint: config.vector_index_endpoint.clone(),
            deployed_index: config.deployed_index.clone(),
            dimensions: config.dimensions,
        };
        let transport = Arc::new(IndexTransport::new(
            index_config.clone(),
            client.clone(),
            auth.clone(),
        ));
        let index_writer: Arc<dyn VectorIndexWriter> = Arc::new(MatchingIndexWriter::new(
            transport.clone(),
            RetryPolicy::default(),
        ));
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(NativeNeighborsStrategy::new(transport.clone())),
            Arc::new(GenericMatchStrategy::new(transport)),
            Arc::new(RawTransportStrategy::new(&index_config, auth.clone(), timeout)),
        ];
        let coordinator = SearchCoordinator::new(embedder.clone(), strategies);

        let store: Arc<dyn ProfileStore> = Arc::new(HttpProfileStore::new(
            trimmed(&config.store_endpoint),
            config.store_collection.clone(),
            client,
            auth,
        ));

        Ok(Self {
            extractor: Arc::new(LopdfExtractor),
            model,
            embedder,
            index_writer,
            store,
            coordinator,
        })
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.extractor.clone(),
            self.model.clone(),
            self.embedder.clone(),
            self.index_writer.clone(),
            self.store.clone(),
        )
    }

    pub async fn ask(
        &self,
        query: &str,
        filter: &QueryFilter,
        options: &AnswerOptions,
    ) -> Result<QueryReport, QueryError> {
        answer_query(
            self.model.as_ref(),
            &self.coordinator,
            self.store.as_ref(),
            query,
            filter,
            options,
        )
        .await
    }
}

fn trimmed(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}
