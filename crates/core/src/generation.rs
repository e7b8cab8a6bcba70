use crate::auth::TokenProvider;
use crate::error::{clip_details, BackendError};
use crate::traits::GenerativeModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

const BACKEND: &str = "model";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub json_response: bool,
}

impl GenerationOptions {
    /// Zero temperature plus a JSON response hint: the settings for every
    /// call whose reply is parsed rather than shown.
    pub fn deterministic_json() -> Self {
        Self {
            temperature: 0.0,
            json_response: true,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            json_response: false,
        }
    }
}

pub struct RemoteModel {
    endpoint: String,
    model: String,
    client: Client,
    auth: Arc<TokenProvider>,
}

impl RemoteModel {
    pub fn new(endpoint: String, model: String, client: Client, auth: Arc<TokenProvider>) -> Self {
        Self {
            endpoint,
            model,
            client,
            auth,
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/v1/{}:generateContent", self.endpoint, self.model)
    }
}

fn request_body(prompt: &str, options: &GenerationOptions) -> Value {
    let mut generation_config = json!({ "temperature": options.temperature });
    if options.json_response {
        generation_config["response_mime_type"] = json!("application/json");
    }
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generation_config": generation_config,
    })
}

fn reply_text(payload: &Value) -> Result<String, BackendError> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::BadResponse {
            backend: BACKEND,
            details: format!("no candidate text in {}", clip_details(&payload.to_string())),
        })
}

#[async_trait]
impl GenerativeModel for RemoteModel {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let mut request = self
            .client
            .post(self.generate_url())
            .json(&request_body(prompt, options));
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

        let parsed: Value = serde_json::from_str(&payload)?;
        reply_text(&parsed)
    }
}
