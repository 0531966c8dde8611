//! HTTP client for the remote text-completion service.
//!
//! The backend speaks a tensor-shaped JSON protocol: the prompt travels as
//! `inputs[0].data[0]`, the generated text comes back as
//! `outputs[0].data[0]`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::{CompletionClient, CompletionError};
use std::sync::LazyLock;
use std::time::Duration;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Cap kept on error bodies carried in errors/logs.
const MAX_ERROR_BODY_CHARS: usize = 800;

#[derive(Debug, Serialize)]
struct CompletionRequest {
    parameters: Parameters,
    inputs: Vec<TensorInput>,
}

#[derive(Debug, Serialize)]
struct Parameters {
    extra: ExtraParameters,
}

#[derive(Debug, Serialize)]
struct ExtraParameters {
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct TensorInput {
    name: String,
    shape: Vec<u32>,
    datatype: String,
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    outputs: Vec<TensorOutput>,
}

#[derive(Debug, Deserialize)]
struct TensorOutput {
    data: Vec<String>,
}

pub struct RemoteCompletionClient {
    http: Client,
    url: String,
    temperature: f32,
}

impl RemoteCompletionClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            url: url.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    fn build_request(&self, prompt: &str, max_output_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            parameters: Parameters {
                extra: ExtraParameters {
                    max_new_tokens: max_output_tokens,
                    temperature: self.temperature,
                },
            },
            inputs: vec![TensorInput {
                name: "input".to_string(),
                shape: vec![1],
                datatype: "str".to_string(),
                data: vec![prompt.to_string()],
            }],
        }
    }
}

fn truncate_body(body: String) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl CompletionClient for RemoteCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, CompletionError> {
        let req = self.build_request(prompt, max_output_tokens);
        let resp = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 403 {
            let body = truncate_body(resp.text().await.unwrap_or_default());
            return Err(CompletionError::AccessDenied { body });
        }
        if !status.is_success() {
            let body = truncate_body(resp.text().await.unwrap_or_default());
            return Err(CompletionError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
        let text = body
            .outputs
            .first()
            .and_then(|o| o.data.first())
            .ok_or_else(|| {
                CompletionError::MalformedResponse("missing outputs[0].data[0]".to_string())
            })?;

        // The backend escapes newlines in the generated text.
        Ok(text.replace("\\n", "\n"))
    }
}
