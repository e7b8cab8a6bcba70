use crate::auth::TokenProvider;
use crate::error::{clip_details, BackendError, EmbedError};
use crate::traits::TextEmbedder;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "embedding";

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Client for the remote embedding endpoint. Request and response lists are
/// position-aligned by contract; the cardinality check below is what keeps a
/// short reply from silently mis-assigning vectors to chunk ids.
pub struct RemoteEmbedder {
    endpoint: String,
    model: String,
    client: Client,
    auth: Arc<TokenProvider>,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: String,
        model: String,
        client: Client,
        auth: Arc<TokenProvider>,
        dimensions: usize,
    ) -> Self {
        Self {
            endpoint,
            model,
            client,
            auth,
            dimensions,
        }
    }

    fn predict_url(&self) -> String {
        format!("{}/v1/{}:predict", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextEmbedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let instances: Vec<Value> = texts.iter().map(|text| json!({ "content": text })).collect();
        let body = json!({ "instances": instances });

        let mut request = self.client.post(self.predict_url()).json(&body);
        if let Some(token) = self.auth.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(BackendError::Http)?;
        let status = response.status();
        let payload = response.text().await.map_err(BackendError::Http)?;
        if !status.is_success() {
            return Err(BackendError::Status {
                backend: BACKEND,
                status: status.as_u16(),
                details: clip_details(&payload),
            }
            .into());
        }

        let parsed: Value = serde_json::from_str(&payload).map_err(BackendError::Serialization)?;
        debug!(texts = texts.len(), "embedding batch returned");
        parse_embeddings(&parsed, texts.len())
    }
}

fn parse_embeddings(payload: &Value, submitted: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let predictions = payload
        .pointer("/predictions")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::BadResponse {
            backend: BACKEND,
            details: "response has no predictions array".to_string(),
        })?;

    if predictions.len() != submitted {
        return Err(EmbedError::Cardinality {
            submitted,
            returned: predictions.len(),
        });
    }

    predictions
        .iter()
        .map(|prediction| {
            let values = prediction
                .pointer("/embeddings/values")
                .and_then(Value::as_array)
                .or_else(|| prediction.as_array())
                .ok_or_else(|| BackendError::BadResponse {
                    backend: BACKEND,
                    details: "prediction has no embedding values".to_string(),
                })?;
            values
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|float| float as f32)
                        .ok_or_else(|| BackendError::BadResponse {
                            backend: BACKEND,
                            details: "embedding value is not a number".to_string(),
                        })
                })
                .collect::<Result<Vec<f32>, BackendError>>()
                .map_err(EmbedError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_embedding_values() {
        let payload = json!({
            "predictions": [
                {"embeddings": {"values": [0.1, 0.2, 0.3]}},
                {"embeddings": {"values": [0.4, 0.5, 0.6]}},
            ]
        });
        let vectors = parse_embeddings(&payload, 2).expect("nested shape should parse");
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1f32, 0.2, 0.3]);
    }

    #[test]
    fn parses_bare_array_predictions() {
        let payload = json!({ "predictions": [[1.0, 0.0], [0.0, 1.0]] });
        let vectors = parse_embeddings(&payload, 2).expect("bare arrays should parse");
        assert_eq!(vectors[1], vec![0.0f32, 1.0]);
    }

    #[test]
    fn short_reply_is_a_cardinality_error() {
        let payload = json!({ "predictions": [{"embeddings": {"values": [0.1]}}] });
        let error = parse_embeddings(&payload, 3).expect_err("count mismatch must fail");
        match error {
            EmbedError::Cardinality {
                submitted,
                returned,
            } => {
                assert_eq!(submitted, 3);
                assert_eq!(returned, 1);
            }
            other => panic!("expected cardinality error, got {other}"),
        }
    }

    #[test]
    fn missing_predictions_is_a_bad_response() {
        let payload = json!({ "deployedModelId": "m-1" });
        let error = parse_embeddings(&payload, 1).expect_err("missing predictions must fail");
        assert!(matches!(
            error,
            EmbedError::Backend(BackendError::BadResponse { .. })
        ));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let payload = json!({ "predictions": [{"embeddings": {"values": ["oops"]}}] });
        let error = parse_embeddings(&payload, 1).expect_err("string value must fail");
        assert!(error.to_string().contains("not a number"));
    }
}
