//! Client for the retrieval backend: content ingestion and grounded
//! question answering over a per-user vector store.

use anyhow::{anyhow, bail, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Retrieved-context fan: how many store hits back one answer.
const VECTOR_STORE_K: u32 = 4;
const QUERY_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct IngestRequest {
    data: Vec<IngestEntry>,
}

#[derive(Debug, Serialize)]
struct IngestEntry {
    content: String,
    metadata: IngestMetadata,
}

#[derive(Debug, Serialize)]
struct IngestMetadata {
    source: String,
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    message: String,
}

/// Build the vector-store filter expression scoping a query to the owner and,
/// optionally, to a set of source labels.
pub fn source_filter_expr(owner_id: &str, sources: &[String]) -> String {
    let owner_clause = format!("user_id == \"{owner_id}\"");
    if sources.is_empty() {
        return format!("({owner_clause})");
    }
    let formatted: Vec<String> = sources.iter().map(|s| format!("\"{s}\"")).collect();
    let source_clause = if formatted.len() > 1 {
        format!("source in [{}]", formatted.join(", "))
    } else {
        format!("source == {}", formatted[0])
    };
    format!("({source_clause}) and ({owner_clause})")
}

pub struct RetrievalClient {
    http: Client,
    query_url: String,
    ingest_url: String,
}

impl RetrievalClient {
    pub fn new(query_url: &str, ingest_url: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            query_url: query_url.to_string(),
            ingest_url: ingest_url.to_string(),
        }
    }

    /// Push one piece of content into the retrieval store under `owner_id`.
    /// The freshness skip (don't re-ingest content sent recently) is the
    /// caller's job; this call itself is idempotent from our perspective.
    pub async fn ingest(&self, owner_id: &str, content: &str, source_label: &str) -> Result<()> {
        let req = IngestRequest {
            data: vec![IngestEntry {
                content: content.to_string(),
                metadata: IngestMetadata {
                    source: source_label.to_string(),
                },
            }],
        };
        let resp = self
            .http
            .post(&self.ingest_url)
            .header("user-id", owner_id)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("ingestion error {}: {}", status, body.chars().take(800).collect::<String>());
        }
        let body: IngestResponse = resp.json().await?;
        if body.message != "Ingestion Completed" {
            bail!("ingestion not confirmed: {:?}", body.message);
        }
        debug!(source = source_label, "ingestion completed");
        Ok(())
    }

    /// Ask a question grounded in the owner's ingested sources.
    pub async fn query(
        &self,
        question: &str,
        owner_id: &str,
        sources: &[String],
        history: &str,
    ) -> Result<String> {
        let expr = source_filter_expr(owner_id, sources);
        let body = json!({
            "parameters": {
                "llm": { "temperature": QUERY_TEMPERATURE, "enable_delta": 1 },
                "vector_store": { "k": VECTOR_STORE_K, "expr": expr }
            },
            "inputs": [
                { "name": "input", "data": [question] },
                { "name": "history", "data": [history] }
            ]
        });

        let resp = self.http.post(&self.query_url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("retrieval error {}: {}", status, body.chars().take(800).collect::<String>());
        }

        let body: serde_json::Value = resp.json().await?;
        body["outputs"][0]["data"][0]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("invalid retrieval response structure"))
    }
}
