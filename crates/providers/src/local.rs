//! The on-device ("incognito") inference worker.
//!
//! Owns an optional generation pipeline behind a trait so the actual model
//! runtime stays out of this crate. Replies travel back to the broker as
//! wire messages; nothing here ever sees a caller's callbacks.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::messages::{SearchHit, WireMessage};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// The model runtime seam: load weights (reporting progress) and generate
/// text token by token.
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    async fn load(&self, progress: &(dyn Fn(u8) + Send + Sync)) -> Result<()>;
    async fn generate(
        &self,
        prompt: &str,
        on_token: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    Loading,
    Ready,
}

pub struct LocalEngine {
    reply: UnboundedSender<WireMessage>,
    pipeline: Box<dyn GenerationPipeline>,
    state: Mutex<EngineState>,
    /// Plain in-memory document index for incognito search.
    index: Mutex<Vec<String>>,
}

impl LocalEngine {
    pub fn new(reply: UnboundedSender<WireMessage>, pipeline: Box<dyn GenerationPipeline>) -> Self {
        Self {
            reply,
            pipeline,
            state: Mutex::new(EngineState::Uninitialized),
            index: Mutex::new(Vec::new()),
        }
    }

    fn send(&self, message: WireMessage) {
        if self.reply.send(message).is_err() {
            warn!("broker inbox closed; local engine reply dropped");
        }
    }

    /// Load the pipeline, broadcasting progress and the terminal
    /// ready/failed signal. Re-initializing a ready engine just re-announces
    /// readiness; a load already in flight is left alone.
    pub async fn initialize(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                EngineState::Ready => {
                    drop(state);
                    self.send(WireMessage::EngineReady);
                    return;
                }
                EngineState::Loading => return,
                EngineState::Uninitialized => *state = EngineState::Loading,
            }
        }

        self.send(WireMessage::LoadProgress { progress: 0 });
        let reply = self.reply.clone();
        let progress = move |pct: u8| {
            let _ = reply.send(WireMessage::LoadProgress { progress: pct });
        };

        match self.pipeline.load(&progress).await {
            Ok(()) => {
                *self.state.lock() = EngineState::Ready;
                self.send(WireMessage::LoadProgress { progress: 100 });
                self.send(WireMessage::EngineReady);
                debug!("local engine initialized");
            }
            Err(e) => {
                *self.state.lock() = EngineState::Uninitialized;
                self.send(WireMessage::EngineFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Add a document to the incognito search index.
    pub fn index_document(&self, text: &str) {
        self.index.lock().push(text.to_string());
    }

    pub async fn handle(&self, message: WireMessage) {
        match message {
            WireMessage::GenerateText { request_id, prompt } => {
                self.generate(request_id, &prompt).await;
            }
            WireMessage::SearchIndex {
                request_id,
                query,
                limit,
            } => {
                let results = self.search(&query, limit);
                self.send(WireMessage::SearchResults {
                    request_id,
                    results,
                });
            }
            other => warn!(kind = ?other, "unexpected message at local engine; dropped"),
        }
    }

    async fn generate(&self, request_id: u64, prompt: &str) {
        if *self.state.lock() != EngineState::Ready {
            // The broker turns this into a fallback dispatch.
            self.send(WireMessage::GenerationError {
                request_id,
                error: "model not initialized".to_string(),
            });
            return;
        }

        let reply = self.reply.clone();
        let on_token = move |token: &str| {
            let _ = reply.send(WireMessage::TextChunk {
                request_id,
                chunk: token.to_string(),
            });
        };

        match self.pipeline.generate(prompt, &on_token).await {
            Ok(()) => self.send(WireMessage::GenerationComplete { request_id }),
            Err(e) => self.send(WireMessage::GenerationError {
                request_id,
                error: e.to_string(),
            }),
        }
    }

    /// Rank indexed documents by query-term overlap.
    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let index = self.index.lock();
        let mut hits: Vec<SearchHit> = index
            .iter()
            .filter_map(|doc| {
                let lower = doc.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(SearchHit {
                    text: doc.clone(),
                    score: matched as f32 / terms.len() as f32,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}
