//! The pending-request registry and delivery rules.
//!
//! Per correlation id the lifecycle is
//! `CREATED -> (zero or more PARTIAL) -> (COMPLETED | FAILED)`.
//! A record is inserted exactly once by `begin_request` and removed exactly
//! once by the terminal delivery (or by `shutdown`); late or duplicate
//! messages for an id that is already terminal are logged and dropped.

use parking_lot::Mutex;
use shared::messages::{SearchHit, WireMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::channel::{Channel, Endpoint};

/// Streaming callback; may fire zero or more times before the terminal slot.
pub type ChunkCallback = Arc<dyn Fn(String) + Send + Sync>;
/// Terminal slots fire at most once.
pub type CompleteCallback = Box<dyn FnOnce() + Send>;
pub type ErrorCallback = Box<dyn FnOnce(String) + Send>;
pub type ResultsCallback = Box<dyn FnOnce(Vec<SearchHit>) + Send>;

/// Named callback slots a caller registers for one request.
#[derive(Default)]
pub struct RequestCallbacks {
    on_chunk: Option<ChunkCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    on_results: Option<ResultsCallback>,
}

impl RequestCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_chunk(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_results(mut self, f: impl FnOnce(Vec<SearchHit>) + Send + 'static) -> Self {
        self.on_results = Some(Box::new(f));
        self
    }
}

/// What the caller wants run in a worker context.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Generate { prompt: String },
    Search { query: String, limit: usize },
}

impl RequestPayload {
    fn into_wire(self, request_id: u64) -> WireMessage {
        match self {
            RequestPayload::Generate { prompt } => WireMessage::GenerateText { request_id, prompt },
            RequestPayload::Search { query, limit } => WireMessage::SearchIndex {
                request_id,
                query,
                limit,
            },
        }
    }
}

struct PendingRequest {
    callbacks: RequestCallbacks,
    /// Kept so a failed primary dispatch can be re-sent to the fallback.
    payload: WireMessage,
    fell_back: bool,
    #[allow(dead_code)] // diagnostics only
    created_at: Instant,
}

struct Inner {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    listeners: Vec<UnboundedSender<WireMessage>>,
    worker_ready: bool,
    shut_down: bool,
}

/// Owns the pending-request map and the broadcast listener set. All registry
/// mutations happen under one mutex; callbacks are invoked only after the
/// lock is released, so a callback may safely call back into the broker.
pub struct Broker {
    channel: Arc<dyn Channel>,
    inner: Mutex<Inner>,
}

impl Broker {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            inner: Mutex::new(Inner {
                next_id: 1,
                pending: HashMap::new(),
                listeners: Vec::new(),
                worker_ready: false,
                shut_down: false,
            }),
        }
    }

    /// Register a surface for broadcast (non-correlated) messages.
    pub fn add_listener(&self, sender: UnboundedSender<WireMessage>) {
        self.inner.lock().listeners.push(sender);
    }

    /// Mark the primary worker usable (normally driven by `engine-ready`).
    pub fn set_worker_ready(&self, ready: bool) {
        self.inner.lock().worker_ready = ready;
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Allocate the next correlation id, store the callbacks under it, and
    /// dispatch the payload. Returns the id synchronously; never blocks.
    ///
    /// Generation requests go to the fallback worker when the primary is not
    /// ready yet; that dispatch is already the fallback, so a later error on
    /// it is terminal.
    pub fn begin_request(&self, payload: RequestPayload, callbacks: RequestCallbacks) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if inner.shut_down {
            drop(inner);
            if let Some(on_error) = callbacks.on_error {
                on_error("broker is shut down".to_string());
            }
            return id;
        }

        let message = payload.into_wire(id);
        let target = match &message {
            WireMessage::GenerateText { .. } if !inner.worker_ready => Endpoint::Fallback,
            _ => Endpoint::Worker,
        };
        inner.pending.insert(
            id,
            PendingRequest {
                callbacks,
                payload: message.clone(),
                fell_back: target == Endpoint::Fallback,
                created_at: Instant::now(),
            },
        );
        drop(inner);

        debug!(id, ?target, "dispatching request");
        self.channel.send(target, message);
        id
    }

    /// Route one incoming message: broadcast kinds fan out to every listener,
    /// correlated kinds go to the matching callback slot, and terminal kinds
    /// remove the record. Messages for unknown ids are dropped with a log.
    pub fn handle_message(&self, message: WireMessage) {
        if message.is_broadcast() {
            self.handle_broadcast(message);
            return;
        }

        match message {
            WireMessage::TextChunk { request_id, chunk } => {
                let on_chunk = {
                    let inner = self.inner.lock();
                    match inner.pending.get(&request_id) {
                        Some(req) => req.callbacks.on_chunk.clone(),
                        None => {
                            drop(inner);
                            warn!(request_id, "text chunk for unknown request; dropped");
                            return;
                        }
                    }
                };
                if let Some(on_chunk) = on_chunk {
                    on_chunk(chunk);
                }
            }
            WireMessage::GenerationComplete { request_id } => {
                match self.remove(request_id) {
                    Some(req) => {
                        if let Some(on_complete) = req.callbacks.on_complete {
                            on_complete();
                        }
                    }
                    None => warn!(request_id, "completion for unknown request; dropped"),
                }
            }
            WireMessage::GenerationError { request_id, error } => {
                self.handle_generation_error(request_id, error);
            }
            WireMessage::SearchResults {
                request_id,
                results,
            } => match self.remove(request_id) {
                Some(req) => {
                    if let Some(on_results) = req.callbacks.on_results {
                        on_results(results);
                    }
                }
                None => warn!(request_id, "search results for unknown request; dropped"),
            },
            other => {
                warn!(kind = ?other, "unexpected message at broker; dropped");
            }
        }
    }

    /// A primary-worker failure on a generation request gets one best-effort
    /// re-dispatch to the fallback worker; a second failure is terminal.
    fn handle_generation_error(&self, request_id: u64, error: String) {
        let mut inner = self.inner.lock();
        let Some(mut req) = inner.pending.remove(&request_id) else {
            drop(inner);
            warn!(request_id, "error for unknown request; dropped");
            return;
        };

        let retryable =
            !req.fell_back && matches!(req.payload, WireMessage::GenerateText { .. });
        if retryable {
            req.fell_back = true;
            let payload = req.payload.clone();
            inner.pending.insert(request_id, req);
            drop(inner);
            debug!(request_id, %error, "primary worker failed; falling back");
            self.channel.send(Endpoint::Fallback, payload);
            return;
        }

        drop(inner);
        if let Some(on_error) = req.callbacks.on_error {
            on_error(error);
        }
    }

    fn handle_broadcast(&self, message: WireMessage) {
        let listeners = {
            let mut inner = self.inner.lock();
            match &message {
                WireMessage::EngineReady => inner.worker_ready = true,
                WireMessage::EngineFailed { .. } => inner.worker_ready = false,
                _ => {}
            }
            // Prune surfaces that went away.
            inner.listeners.retain(|l| !l.is_closed());
            inner.listeners.clone()
        };
        for listener in listeners {
            let _ = listener.send(message.clone());
        }
    }

    fn remove(&self, request_id: u64) -> Option<PendingRequest> {
        self.inner.lock().pending.remove(&request_id)
    }

    /// Tear down: every still-pending request fails with a synthetic
    /// cancellation error, and later `begin_request` calls fail immediately.
    pub fn shutdown(&self) {
        let drained: Vec<(u64, PendingRequest)> = {
            let mut inner = self.inner.lock();
            inner.shut_down = true;
            inner.pending.drain().collect()
        };
        for (id, req) in drained {
            debug!(id, "cancelling pending request on shutdown");
            if let Some(on_error) = req.callbacks.on_error {
                on_error("request cancelled: broker shutting down".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel double that records every dispatch.
    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(Endpoint, WireMessage)>>,
    }

    impl RecordingChannel {
        fn sent(&self) -> Vec<(Endpoint, WireMessage)> {
            self.sent.lock().clone()
        }
    }

    impl Channel for RecordingChannel {
        fn send(&self, target: Endpoint, message: WireMessage) {
            self.sent.lock().push((target, message));
        }
    }

    fn broker() -> (Arc<RecordingChannel>, Broker) {
        let channel = Arc::new(RecordingChannel::default());
        let broker = Broker::new(channel.clone());
        (channel, broker)
    }

    fn generate(prompt: &str) -> RequestPayload {
        RequestPayload::Generate {
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn ids_are_distinct_and_increasing() {
        let (_, broker) = broker();
        let ids: Vec<u64> = (0..5)
            .map(|_| broker.begin_request(generate("p"), RequestCallbacks::new()))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn begin_request_returns_before_any_reply() {
        let (channel, broker) = broker();
        let id = broker.begin_request(generate("hello"), RequestCallbacks::new());
        assert_eq!(id, 1);
        assert_eq!(broker.pending_count(), 1);
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn chunks_stream_then_complete_fires_once_and_unregisters() {
        let (_, broker) = broker();
        let chunks = Arc::new(Mutex::new(Vec::<String>::new()));
        let completions = Arc::new(AtomicUsize::new(0));

        let chunks_ref = chunks.clone();
        let completions_ref = completions.clone();
        let id = broker.begin_request(
            generate("p"),
            RequestCallbacks::new()
                .on_chunk(move |c| chunks_ref.lock().push(c))
                .on_complete(move || {
                    completions_ref.fetch_add(1, Ordering::SeqCst);
                }),
        );

        broker.handle_message(WireMessage::TextChunk {
            request_id: id,
            chunk: "hel".into(),
        });
        broker.handle_message(WireMessage::TextChunk {
            request_id: id,
            chunk: "lo".into(),
        });
        broker.handle_message(WireMessage::GenerationComplete { request_id: id });

        assert_eq!(chunks.lock().join(""), "hello");
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(broker.pending_count(), 0);

        // Late messages for the now-terminal id are dropped, not delivered.
        broker.handle_message(WireMessage::TextChunk {
            request_id: id,
            chunk: "late".into(),
        });
        broker.handle_message(WireMessage::GenerationComplete { request_id: id });
        assert_eq!(chunks.lock().join(""), "hello");
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_id_is_a_logged_noop() {
        let (_, broker) = broker();
        broker.handle_message(WireMessage::GenerationComplete { request_id: 42 });
        broker.handle_message(WireMessage::TextChunk {
            request_id: 42,
            chunk: "x".into(),
        });
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn generation_routes_to_fallback_until_worker_ready() {
        let (channel, broker) = broker();

        broker.begin_request(generate("a"), RequestCallbacks::new());
        broker.handle_message(WireMessage::EngineReady);
        broker.begin_request(generate("b"), RequestCallbacks::new());

        let sent = channel.sent();
        assert_eq!(sent[0].0, Endpoint::Fallback);
        assert_eq!(sent[1].0, Endpoint::Worker);
    }

    #[test]
    fn primary_error_falls_back_once_then_is_terminal() {
        let (channel, broker) = broker();
        broker.set_worker_ready(true);

        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let errors_ref = errors.clone();
        let id = broker.begin_request(
            generate("p"),
            RequestCallbacks::new().on_error(move |e| errors_ref.lock().push(e)),
        );

        // First failure re-dispatches the stored payload to the fallback.
        broker.handle_message(WireMessage::GenerationError {
            request_id: id,
            error: "model crashed".into(),
        });
        assert!(errors.lock().is_empty());
        assert_eq!(broker.pending_count(), 1);
        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, Endpoint::Fallback);
        assert_eq!(sent[1].1.request_id(), Some(id));

        // Second failure is terminal.
        broker.handle_message(WireMessage::GenerationError {
            request_id: id,
            error: "fallback failed too".into(),
        });
        assert_eq!(errors.lock().as_slice(), ["fallback failed too"]);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn search_errors_do_not_fall_back() {
        let (channel, broker) = broker();
        broker.set_worker_ready(true);

        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let errors_ref = errors.clone();
        let id = broker.begin_request(
            RequestPayload::Search {
                query: "q".into(),
                limit: 5,
            },
            RequestCallbacks::new().on_error(move |e| errors_ref.lock().push(e)),
        );

        broker.handle_message(WireMessage::GenerationError {
            request_id: id,
            error: "index unavailable".into(),
        });
        assert_eq!(errors.lock().as_slice(), ["index unavailable"]);
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn search_results_are_terminal() {
        let (_, broker) = broker();
        broker.set_worker_ready(true);
        let results = Arc::new(Mutex::new(Vec::<SearchHit>::new()));
        let results_ref = results.clone();
        let id = broker.begin_request(
            RequestPayload::Search {
                query: "q".into(),
                limit: 2,
            },
            RequestCallbacks::new().on_results(move |r| results_ref.lock().extend(r)),
        );

        broker.handle_message(WireMessage::SearchResults {
            request_id: id,
            results: vec![SearchHit {
                text: "hit".into(),
                score: 0.9,
            }],
        });
        assert_eq!(results.lock().len(), 1);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn broadcasts_fan_out_to_all_listeners() {
        let (channel, broker) = broker();
        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        broker.add_listener(tx1);
        broker.add_listener(tx2);

        broker.handle_message(WireMessage::LoadProgress { progress: 50 });
        broker.handle_message(WireMessage::EngineReady);

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.try_recv().unwrap(),
                WireMessage::LoadProgress { progress: 50 }
            );
            assert_eq!(rx.try_recv().unwrap(), WireMessage::EngineReady);
        }

        // Broadcasts never touch the registry or the worker channel, and
        // engine-ready flipped routing to the primary worker.
        assert_eq!(broker.pending_count(), 0);
        broker.begin_request(generate("p"), RequestCallbacks::new());
        assert_eq!(channel.sent().last().unwrap().0, Endpoint::Worker);
    }

    #[test]
    fn shutdown_cancels_every_pending_request_exactly_once() {
        let (_, broker) = broker();
        let errors = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let errors_ref = errors.clone();
            broker.begin_request(
                generate("p"),
                RequestCallbacks::new().on_error(move |e| {
                    assert!(e.contains("shutting down"));
                    errors_ref.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        broker.shutdown();
        assert_eq!(errors.load(Ordering::SeqCst), 3);
        assert_eq!(broker.pending_count(), 0);

        // New requests after shutdown fail immediately.
        let errors_ref = errors.clone();
        broker.begin_request(
            generate("p"),
            RequestCallbacks::new().on_error(move |_| {
                errors_ref.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(errors.load(Ordering::SeqCst), 4);
    }
}
