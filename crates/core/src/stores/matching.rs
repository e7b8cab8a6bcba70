use crate::auth::TokenProvider;
use crate::error::{clip_details, BackendError, IngestError, StrategyError};
use crate::models::{ChunkMatch, IndexPoint, QueryFilter};
use crate::traits::{SearchStrategy, VectorIndexWriter};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const BACKEND: &str = "matching-index";

#[derive(Debug, Clone)]
pub struct MatchingIndexConfig {
    pub endpoint: String,
    pub index: String,
    pub index_endpoint: String,
    pub deployed_index: String,
    pub dimensions: usize,
}

/// Bounded exponential backoff for the index writer. Attempt 1 retries after
/// `base_delay_ms`, attempt 2 after twice that, and so on with a capped shift.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }
}

/// Shared HTTP channel to the index service: one client, one auth source,
/// format!-built resource URLs.
pub struct IndexTransport {
    pub config: MatchingIndexConfig,
    client: Client,
    auth: Arc<TokenProvider>,
}

impl IndexTransport {
    pub fn new(config: MatchingIndexConfig, client: Client, auth: Arc<TokenProvider>) -> Self {
        Self {
            config,
            client,
            auth,
        }
    }

    fn upsert_url(&self) -> String {
        format!(
            "{}/v1/{}:upsertDatapoints",
            self.config.endpoint, self.config.index
        )
    }

    fn query_url(&self, verb: &str) -> String {
        format!(
            "{}/v1/{}:{verb}",
            self.config.endpoint, self.config.index_endpoint
        )
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, BackendError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = self.auth.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                details: clip_details(&payload),
            });
        }
        if payload.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&payload)?)
    }
}

pub struct MatchingIndexWriter {
    transport: Arc<IndexTransport>,
    retry: RetryPolicy,
}

impl MatchingIndexWriter {
    pub fn new(transport: Arc<IndexTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }
}

fn validate_dimensions(points: &[IndexPoint], expected: usize) -> Result<(), IngestError> {
    for point in points {
        if point.vector.len() != expected {
            return Err(IngestError::DimensionMismatch {
                expected,
                actual: point.vector.len(),
            });
        }
    }
    Ok(())
}

fn is_transient(error: &BackendError) -> bool {
    match error {
        BackendError::Http(_) => true,
        BackendError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl VectorIndexWriter for MatchingIndexWriter {
    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IngestError> {
        validate_dimensions(points, self.transport.config.dimensions)?;
        if points.is_empty() {
            return Ok(());
        }

        let datapoints: Vec<Value> = points
            .iter()
            .map(|point| {
                json!({
                    "datapointId": point.datapoint_id,
                    "featureVector": point.vector,
                    "restricts": point.restricts,
                })
            })
            .collect();
        let body = json!({ "datapoints": datapoints });
        let url = self.transport.upsert_url();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.post(&url, &body).await {
                Ok(_) => {
                    debug!(points = points.len(), attempt, "upserted index datapoints");
                    return Ok(());
                }
                Err(error) if attempt < self.retry.attempts && is_transient(&error) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(attempt, ?delay, %error, "index upsert failed, retrying");
                    sleep(delay).await;
                }
                Err(error) => {
                    return Err(IngestError::IndexWriteFailed {
                        attempts: attempt,
                        detail: error.to_string(),
                    })
                }
            }
        }
    }
}

fn strategy_error(error: BackendError) -> StrategyError {
    match &error {
        BackendError::Status {
            status: 404 | 405 | 501,
            ..
        } => StrategyError::Unsupported(error.to_string()),
        _ => StrategyError::Failed(error.to_string()),
    }
}

/// Strategy A: the index endpoint's native nearest-neighbor call, restricts
/// attached to the query datapoint.
pub struct NativeNeighborsStrategy {
    transport: Arc<IndexTransport>,
}

impl NativeNeighborsStrategy {
    pub fn new(transport: Arc<IndexTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SearchStrategy for NativeNeighborsStrategy {
    fn name(&self) -> &'static str {
        "native_neighbors"
    }

    async fn search(
        &self,
        query_vector: &[f32],
        filter: &QueryFilter,
        neighbor_count: usize,
    ) -> Result<Vec<ChunkMatch>, StrategyError> {
        let body = json!({
            "deployedIndexId": self.transport.config.deployed_index,
            "queries": [{
                "datapoint": {
                    "featureVector": query_vector,
                    "restricts": filter.restrictions(),
                },
                "neighborCount": neighbor_count,
            }],
            "returnFullDatapoint": false,
        });
        let payload = self
            .transport
            .post(&self.transport.query_url("findNeighbors"), &body)
            .await
            .map_err(strategy_error)?;
        Ok(parse_neighbor_response(&payload))
    }
}

/// Strategy B: the generic match call with filter objects in the body.
pub struct GenericMatchStrategy {
    transport: Arc<IndexTransport>,
}

impl GenericMatchStrategy {
    pub fn new(transport: Arc<IndexTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SearchStrategy for GenericMatchStrategy {
    fn name(&self) -> &'static str {
        "generic_match"
    }

    async fn search(
        &self,
        query_vector: &[f32],
        filter: &QueryFilter,
        neighbor_count: usize,
    ) -> Result<Vec<ChunkMatch>, StrategyError> {
        let body = json!({
            "deployedIndexId": self.transport.config.deployed_index,
            "queries": [query_vector],
            "numNeighbors": neighbor_count,
            "filter": filter.restrictions(),
        });
        let payload = self
            .transport
            .post(&self.transport.query_url("match"), &body)
            .await
            .map_err(strategy_error)?;
        Ok(parse_match_response(&payload))
    }
}

/// Strategy C: last resort. Skips the shared transport entirely, builds a
/// one-off client, fetches the bearer token just-in-time, and speaks the
/// legacy query body.
pub struct RawTransportStrategy {
    endpoint: String,
    index_endpoint: String,
    deployed_index: String,
    auth: Arc<TokenProvider>,
    timeout: Duration,
}

impl RawTransportStrategy {
    pub fn new(config: &MatchingIndexConfig, auth: Arc<TokenProvider>, timeout: Duration) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            index_endpoint: config.index_endpoint.clone(),
            deployed_index: config.deployed_index.clone(),
            auth,
            timeout,
        }
    }
}

#[async_trait]
impl SearchStrategy for RawTransportStrategy {
    fn name(&self) -> &'static str {
        "raw_transport"
    }

    async fn search(
        &self,
        query_vector: &[f32],
        filter: &QueryFilter,
        neighbor_count: usize,
    ) -> Result<Vec<ChunkMatch>, StrategyError> {
        let token = self.auth.bearer_token().await.map_err(strategy_error)?;
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|error| StrategyError::Failed(error.to_string()))?;

        let url = format!("{}/v1/{}:query", self.endpoint, self.index_endpoint);
        let body = json!({
            "deployedIndexId": self.deployed_index,
            "queries": [{
                "featureVector": query_vector,
                "neighborCount": neighbor_count,
                "restricts": filter.restrictions(),
            }],
        });

        let mut request = client.post(&url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| strategy_error(BackendError::Http(error)))?;
        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|error| strategy_error(BackendError::Http(error)))?;
        if !status.is_success() {
            return Err(strategy_error(BackendError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                details: clip_details(&payload),
            }));
        }

        let parsed: Value = serde_json::from_str(&payload)
            .map_err(|error| StrategyError::Failed(format!("bad query response: {error}")))?;
        Ok(parse_neighbor_response(&parsed))
    }
}

fn parse_neighbor_response(payload: &Value) -> Vec<ChunkMatch> {
    let neighbors = payload
        .pointer("/nearestNeighbors/0/neighbors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut matches = Vec::new();
    for neighbor in neighbors {
        let id = neighbor
            .pointer("/datapoint/datapointId")
            .and_then(Value::as_str)
            .or_else(|| neighbor.pointer("/datapointId").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            continue;
        }
        let score = neighbor
            .pointer("/distance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        matches.push(ChunkMatch {
            chunk_id: id,
            score,
        });
    }
    matches
}

fn parse_match_response(payload: &Value) -> Vec<ChunkMatch> {
    let first_query = payload
        .pointer("/matches/0")
        .and_then(Value::as_array)
        .cloned()
        .or_else(|| payload.pointer("/matches").and_then(Value::as_array).cloned())
        .unwrap_or_default();

    let mut matches = Vec::new();
    for hit in first_query {
        let id = hit
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            continue;
        }
        let score = hit
            .pointer("/distance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        matches.push(ChunkMatch {
            chunk_id: id,
            score,
        });
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Restriction;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_shift_is_capped() {
        let policy = RetryPolicy {
            attempts: 64,
            base_delay_ms: 1,
        };
        assert_eq!(
            policy.delay_for_attempt(40),
            policy.delay_for_attempt(17)
        );
    }

    #[test]
    fn server_side_failures_are_transient() {
        let server = BackendError::Status {
            backend: BACKEND,
            status: 503,
            details: String::new(),
        };
        let throttled = BackendError::Status {
            backend: BACKEND,
            status: 429,
            details: String::new(),
        };
        let client_side = BackendError::Status {
            backend: BACKEND,
            status: 400,
            details: String::new(),
        };
        assert!(is_transient(&server));
        assert!(is_transient(&throttled));
        assert!(!is_transient(&client_side));
        assert!(!is_transient(&BackendError::Auth("no token".to_string())));
    }

    #[test]
    fn missing_routes_map_to_unsupported() {
        let missing = BackendError::Status {
            backend: BACKEND,
            status: 404,
            details: "no such method".to_string(),
        };
        assert!(matches!(
            strategy_error(missing),
            StrategyError::Unsupported(_)
        ));

        let flaky = BackendError::Status {
            backend: BACKEND,
            status: 500,
            details: "boom".to_string(),
        };
        assert!(matches!(strategy_error(flaky), StrategyError::Failed(_)));
    }

    #[test]
    fn dimension_mismatch_is_fatal_before_any_send() {
        let points = vec![IndexPoint {
            datapoint_id: "cnd_1_summary_0".to_string(),
            vector: vec![0.0; 4],
            restricts: vec![Restriction::single("batch_tag", "b")],
        }];
        let error = validate_dimensions(&points, 8).expect_err("short vector must fail");
        match error {
            IngestError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 8);
                assert_eq!(actual, 4);
            }
            other => panic!("expected dimension mismatch, got {other}"),
        }
        assert!(validate_dimensions(&[], 8).is_ok());
    }

    #[test]
    fn neighbor_response_reads_nested_and_flat_ids() {
        let payload = json!({
            "nearestNeighbors": [{
                "id": "query-0",
                "neighbors": [
                    {"datapoint": {"datapointId": "cnd_a_summary_0"}, "distance": 0.91},
                    {"datapointId": "cnd_b_work_1", "distance": 0.47},
                    {"distance": 0.1},
                ]
            }]
        });
        let matches = parse_neighbor_response(&payload);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, "cnd_a_summary_0");
        assert_eq!(matches[0].score, 0.91);
        assert_eq!(matches[1].chunk_id, "cnd_b_work_1");
    }

    #[test]
    fn empty_neighbor_response_parses_to_no_matches() {
        assert!(parse_neighbor_response(&json!({})).is_empty());
        assert!(parse_neighbor_response(&json!({"nearestNeighbors": []})).is_empty());
    }

    #[test]
    fn match_response_accepts_nested_and_flat_lists() {
        let nested = json!({
            "matches": [[{"id": "cnd_a_skills_0", "distance": 0.8}]]
        });
        let flat = json!({
            "matches": [{"id": "cnd_a_skills_0", "distance": 0.8}]
        });
        for payload in [nested, flat] {
            let matches = parse_match_response(&payload);
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].chunk_id, "cnd_a_skills_0");
        }
    }
}
