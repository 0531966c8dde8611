pub mod error;
pub mod messages;

pub use error::CompletionError;

pub mod settings {
    use serde::{Deserialize, Serialize};

    /// How long text is split before being fed to the completion backend.
    ///
    /// Lengths are measured in characters. The delimiter list is ordered from
    /// most- to least-preferred split point; an empty string at the end means
    /// "fall back to a hard character cut".
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChunkingSettings {
        pub chunk_size: usize,
        pub chunk_overlap: usize,
        pub delimiters: Vec<String>,
    }

    impl Default for ChunkingSettings {
        fn default() -> Self {
            Self {
                chunk_size: 32_000,
                chunk_overlap: 200,
                delimiters: vec![
                    "\n\n".into(),
                    "\n".into(),
                    ". ".into(),
                    " ".into(),
                    String::new(),
                ],
            }
        }
    }

    /// Freshness windows. These are two independent policy values: how long a
    /// login session stays valid, and how long an ingested tab/file is
    /// considered already-known to the retrieval backend.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FreshnessSettings {
        pub session_expiry_ms: i64,
        pub ingestion_window_ms: i64,
    }

    impl Default for FreshnessSettings {
        fn default() -> Self {
            Self {
                session_expiry_ms: 3 * 24 * 60 * 60 * 1000,
                ingestion_window_ms: 24 * 60 * 60 * 1000,
            }
        }
    }

    /// Endpoints and budgets for the remote inference service.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RemoteSettings {
        pub completion_url: String,
        pub retrieval_query_url: String,
        pub ingest_url: String,
        pub token_url: String,
        pub client_id: String,
        pub max_output_tokens: u32,
    }

    impl Default for RemoteSettings {
        fn default() -> Self {
            Self {
                completion_url: String::new(),
                retrieval_query_url: String::new(),
                ingest_url: String::new(),
                token_url: String::new(),
                client_id: String::new(),
                max_output_tokens: 3000,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct AssistantSettings {
        pub chunking: ChunkingSettings,
        pub freshness: FreshnessSettings,
        pub remote: RemoteSettings,
        /// Whether the on-device (incognito) path starts enabled.
        #[serde(default)]
        pub incognito: bool,
    }
}

pub mod chat {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    /// Render a conversation as the plain `role: content` lines the prompt
    /// templates expect.
    pub fn flatten_history(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn history_flattens_to_role_prefixed_lines() {
            let history = vec![
                ChatMessage {
                    role: "user".into(),
                    content: "hi".into(),
                },
                ChatMessage {
                    role: "assistant".into(),
                    content: "hello".into(),
                },
            ];
            assert_eq!(flatten_history(&history), "user: hi\nassistant: hello");
            assert_eq!(flatten_history(&[]), "");
        }
    }
}
