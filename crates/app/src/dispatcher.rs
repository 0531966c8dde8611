//! The operation surface the panel talks to.
//!
//! One method per user-visible action. Long-document operations run through
//! the reduction engine against the remote completion client; incognito
//! operations go through the broker to the in-process workers. Failures of
//! remote calls are logged with their cause and surfaced to the user as a
//! short generic message.

use anyhow::{anyhow, bail, Result};
use broker::{Broker, RequestCallbacks, RequestPayload};
use engine::transcript::{self, RawTranscriptEntry};
use engine::{prompts, reduce, Operation, ReductionTask};
use providers::identity::parse_redirect;
use providers::{IdentityClient, RetrievalClient};
use services::{IngestionLog, KvStore, SessionService, SourceKind, SuggestionButton, SuggestionConfig};
use shared::chat::{self, ChatMessage};
use shared::error::CompletionClient;
use shared::settings::AssistantSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

const INCOGNITO_KEY: &str = "incognito";

/// What happened to an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested,
    /// Already known to the retrieval store under the same name.
    Skipped,
}

pub struct Dispatcher {
    settings: AssistantSettings,
    completion: Arc<dyn CompletionClient>,
    retrieval: RetrievalClient,
    identity: IdentityClient,
    broker: Arc<Broker>,
    session: SessionService,
    ingest_log: IngestionLog,
    store: Arc<dyn KvStore>,
    suggestions: SuggestionConfig,
    incognito: AtomicBool,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: AssistantSettings,
        completion: Arc<dyn CompletionClient>,
        retrieval: RetrievalClient,
        identity: IdentityClient,
        broker: Arc<Broker>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        let session = SessionService::new(store.clone(), settings.freshness.session_expiry_ms);
        let ingest_log = IngestionLog::new(store.clone(), settings.freshness.ingestion_window_ms);
        let incognito = store
            .get(INCOGNITO_KEY)
            .map(|v| v == "true")
            .unwrap_or(settings.incognito);
        Self {
            settings,
            completion,
            retrieval,
            identity,
            broker,
            session,
            ingest_log,
            store,
            suggestions: SuggestionConfig::default(),
            incognito: AtomicBool::new(incognito),
        }
    }

    async fn run_reduction(&self, text: &str, operation: Operation) -> Result<String> {
        let task = ReductionTask {
            source: text.to_string(),
            operation,
            max_output_tokens: self.settings.remote.max_output_tokens,
            policy: self.settings.chunking.clone(),
        };
        reduce(self.completion.as_ref(), &task).await
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        self.run_reduction(text, Operation::Summarize)
            .await
            .map_err(|e| {
                error!(error = %e, "summarization failed");
                anyhow!("Failed to summarize text")
            })
    }

    /// Summarize a meeting transcript: normalize the raw entries, flatten
    /// them to timestamped lines, then run the usual reduction.
    pub async fn summarize_transcript(&self, entries: Vec<RawTranscriptEntry>) -> Result<String> {
        let flat = transcript::flatten(&transcript::normalize(entries));
        self.summarize(&flat).await
    }

    pub async fn highlights(&self, text: &str) -> Result<String> {
        self.run_reduction(text, Operation::Highlights)
            .await
            .map_err(|e| {
                error!(error = %e, "highlights failed");
                anyhow!("Failed to get highlights")
            })
    }

    pub async fn instruction(&self, instruction: &str, text: &str) -> Result<String> {
        self.run_reduction(
            text,
            Operation::Instruction {
                instruction: instruction.to_string(),
            },
        )
        .await
        .map_err(|e| {
            error!(error = %e, "instruction run failed");
            anyhow!("Failed to process the request")
        })
    }

    /// Answer a question, grounded in the selected sources when context mode
    /// is active, otherwise from the model alone.
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatMessage],
        context_active: bool,
        sources: &[String],
    ) -> Result<String> {
        if context_active && sources.is_empty() {
            bail!("No context source selected");
        }
        let history = chat::flatten_history(history);

        if context_active {
            let session = self
                .session
                .load()
                .ok_or_else(|| anyhow!("Please sign in to use your saved context"))?;
            return self
                .retrieval
                .query(question, &session.username, sources, &history)
                .await
                .map_err(|e| {
                    error!(error = %e, "grounded query failed");
                    anyhow!("Failed to answer from your sources")
                });
        }

        let prompt = prompts::general_question(question, &history);
        self.completion
            .complete(&prompt, self.settings.remote.max_output_tokens)
            .await
            .map_err(|e| {
                error!(error = %e, "question failed");
                anyhow!("Failed to answer the question")
            })
    }

    pub async fn ingest_tab(&self, tab_id: &str, title: &str, content: &str) -> Result<IngestOutcome> {
        self.ingest(SourceKind::Tabs, tab_id, title, content).await
    }

    pub async fn ingest_file(&self, file_name: &str, content: &str) -> Result<IngestOutcome> {
        self.ingest(SourceKind::Files, file_name, file_name, content)
            .await
    }

    async fn ingest(
        &self,
        kind: SourceKind,
        id: &str,
        name: &str,
        content: &str,
    ) -> Result<IngestOutcome> {
        let session = self
            .session
            .load()
            .ok_or_else(|| anyhow!("Please sign in before adding sources"))?;

        if self.ingest_log.is_fresh(kind, id, name) {
            info!(%kind, id, "source already ingested recently; skipping");
            return Ok(IngestOutcome::Skipped);
        }

        self.retrieval
            .ingest(&session.username, content, name)
            .await
            .map_err(|e| {
                error!(error = %e, "ingestion failed");
                anyhow!("Failed to add the source")
            })?;
        self.ingest_log.mark(kind, id, name)?;
        Ok(IngestOutcome::Ingested)
    }

    /// First half of the login flow: remember the PKCE verifier until the
    /// provider redirects back.
    pub fn begin_login(&self, pkce_verifier: &str) -> Result<()> {
        self.session.stash_verifier(pkce_verifier)
    }

    /// Second half: swap the redirect's code for an identity and open a
    /// session, refusing identities from disallowed regions.
    pub async fn login(&self, redirect_url: &str) -> Result<String> {
        let redirect = parse_redirect(redirect_url)?;
        let verifier = self
            .session
            .take_verifier()
            .ok_or_else(|| anyhow!("login was not started from this device"))?;
        let identity = self.identity.exchange(&redirect.code, &verifier).await?;
        identity.ensure_region_allowed()?;
        self.session.save(&identity.subject, None)?;
        info!(username = %identity.subject, "signed in");
        Ok(identity.subject)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.clear()
    }

    pub fn current_user(&self) -> Option<String> {
        self.session.load().map(|s| s.username)
    }

    /// Short title for a new conversation; falls back to a truncation of the
    /// user's message when the model call fails.
    pub async fn chat_title(&self, user_message: &str, ai_response: &str) -> String {
        let prompt = prompts::chat_title(user_message, ai_response);
        match self.completion.complete(&prompt, 30).await {
            Ok(title) => title.trim().to_string(),
            Err(e) => {
                error!(error = %e, "title generation failed; using fallback");
                prompts::fallback_title(user_message)
            }
        }
    }

    /// Quick actions for the page the user is on.
    pub fn suggestion_buttons(&self, url: &str) -> &[SuggestionButton] {
        self.suggestions.buttons_for(url)
    }

    pub fn incognito_enabled(&self) -> bool {
        self.incognito.load(Ordering::Relaxed)
    }

    pub fn set_incognito(&self, enabled: bool) -> Result<()> {
        self.incognito.store(enabled, Ordering::Relaxed);
        self.store
            .set(INCOGNITO_KEY, if enabled { "true" } else { "false" })
    }

    /// Run a generation on-device through the broker. Replies arrive via the
    /// registered callbacks; the returned id is only useful for logs.
    pub fn incognito_generate(&self, prompt: &str, callbacks: RequestCallbacks) -> Result<u64> {
        if !self.incognito_enabled() {
            bail!("Incognito mode is not enabled");
        }
        Ok(self.broker.begin_request(
            RequestPayload::Generate {
                prompt: prompt.to_string(),
            },
            callbacks,
        ))
    }

    /// Search the on-device index through the broker.
    pub fn incognito_search(&self, query: &str, limit: usize, callbacks: RequestCallbacks) -> Result<u64> {
        if !self.incognito_enabled() {
            bail!("Incognito mode is not enabled");
        }
        Ok(self.broker.begin_request(
            RequestPayload::Search {
                query: query.to_string(),
                limit,
            },
            callbacks,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use broker::MpscChannel;
    use services::MemoryStore;
    use shared::error::CompletionError;

    struct StubClient {
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, prompt: &str, _max: u32) -> Result<String, CompletionError> {
            if self.fail {
                return Err(CompletionError::Transport("connection refused".into()));
            }
            Ok(format!("answer to {} chars", prompt.chars().count()))
        }
    }

    fn dispatcher(fail: bool) -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let settings = AssistantSettings::default();
        let broker = Arc::new(Broker::new(Arc::new(MpscChannel::new())));
        (
            Dispatcher::new(
                settings,
                Arc::new(StubClient { fail }),
                RetrievalClient::new("http://q.invalid", "http://i.invalid"),
                IdentityClient::new("http://t.invalid", "client", "http://r.invalid"),
                broker,
                store.clone(),
            ),
            store,
        )
    }

    #[tokio::test]
    async fn summarize_maps_failures_to_a_generic_message() {
        let (dispatcher, _) = dispatcher(true);
        let err = dispatcher.summarize("some page text").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to summarize text");
    }

    #[tokio::test]
    async fn summarize_returns_model_output() {
        let (dispatcher, _) = dispatcher(false);
        let out = dispatcher.summarize("some page text").await.unwrap();
        assert!(out.starts_with("answer to"));
    }

    #[tokio::test]
    async fn ask_with_context_but_no_sources_fails_fast() {
        let (dispatcher, _) = dispatcher(false);
        let err = dispatcher.ask("why?", &[], true, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "No context source selected");
    }

    #[tokio::test]
    async fn ask_without_context_uses_the_completion_client() {
        let (dispatcher, _) = dispatcher(false);
        let out = dispatcher.ask("why?", &[], false, &[]).await.unwrap();
        assert!(out.starts_with("answer to"));
    }

    #[tokio::test]
    async fn ingest_requires_a_session() {
        let (dispatcher, _) = dispatcher(false);
        let err = dispatcher
            .ingest_tab("7", "Docs", "body text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sign in"));
    }

    #[tokio::test]
    async fn fresh_sources_are_skipped_before_any_network_call() {
        let (dispatcher, _) = dispatcher(false);
        dispatcher.session.save("jdoe", None).unwrap();
        dispatcher
            .ingest_log
            .mark(SourceKind::Tabs, "7", "Docs")
            .unwrap();
        // The retrieval URLs are unreachable; a Skipped outcome proves the
        // freshness check short-circuits the upload.
        let outcome = dispatcher.ingest_tab("7", "Docs", "body text").await.unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped);
    }

    #[tokio::test]
    async fn chat_title_falls_back_to_truncation() {
        let (dispatcher, _) = dispatcher(true);
        let title = dispatcher
            .chat_title("please summarize the quarterly report for me", "sure")
            .await;
        assert!(title.ends_with("..."));
        assert!(title.starts_with("please summarize"));
    }

    #[test]
    fn incognito_flag_persists_through_the_store() {
        let (dispatcher, store) = dispatcher(false);
        assert!(!dispatcher.incognito_enabled());
        dispatcher.set_incognito(true).unwrap();
        assert_eq!(store.get("incognito").as_deref(), Some("true"));

        let settings = AssistantSettings::default();
        let broker = Arc::new(Broker::new(Arc::new(MpscChannel::new())));
        let revived = Dispatcher::new(
            settings,
            Arc::new(StubClient { fail: false }),
            RetrievalClient::new("http://q.invalid", "http://i.invalid"),
            IdentityClient::new("http://t.invalid", "client", "http://r.invalid"),
            broker,
            store,
        );
        assert!(revived.incognito_enabled());
    }

    #[test]
    fn incognito_operations_require_the_flag() {
        let (dispatcher, _) = dispatcher(false);
        assert!(dispatcher
            .incognito_generate("hi", RequestCallbacks::new())
            .is_err());
        dispatcher.set_incognito(true).unwrap();
        assert!(dispatcher
            .incognito_generate("hi", RequestCallbacks::new())
            .is_ok());
    }
}
