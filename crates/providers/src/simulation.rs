//! Deterministic stand-in for the on-device engine.
//!
//! When the real model is not loaded yet, generation requests get routed
//! here instead. The output is canned but streamed chunk by chunk so the
//! rest of the system exercises the same paths as with real inference.

use shared::messages::WireMessage;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Duration};
use tracing::warn;

const STARTERS: &[&str] = &[
    "Here is a quick take on that.",
    "Good question; let me walk through it.",
    "Short answer first, details after.",
];

const FILLER: &[&str] = &[
    "The page you are looking at covers this topic in a few sections.",
    "The key points are laid out near the top and expanded further down.",
    "If you want more depth, the surrounding context has additional detail.",
];

/// Pause between streamed chunks, to read like token-by-token output.
const CHUNK_DELAY: Duration = Duration::from_millis(20);

pub struct SimulationEngine {
    reply: UnboundedSender<WireMessage>,
}

impl SimulationEngine {
    pub fn new(reply: UnboundedSender<WireMessage>) -> Self {
        Self { reply }
    }

    fn send(&self, message: WireMessage) {
        if self.reply.send(message).is_err() {
            warn!("broker inbox closed; simulation reply dropped");
        }
    }

    pub async fn handle(&self, message: WireMessage) {
        match message {
            WireMessage::GenerateText { request_id, prompt } => {
                self.stream_response(request_id, &prompt).await;
            }
            other => warn!(kind = ?other, "unexpected message at simulation engine; dropped"),
        }
    }

    async fn stream_response(&self, request_id: u64, prompt: &str) {
        let text = compose_response(prompt);
        for chunk in chunk_words(&text) {
            self.send(WireMessage::TextChunk {
                request_id,
                chunk,
            });
            sleep(CHUNK_DELAY).await;
        }
        self.send(WireMessage::GenerationComplete { request_id });
    }
}

/// Pick a starter by prompt length so the same prompt always gets the same
/// response, then append the filler body.
fn compose_response(prompt: &str) -> String {
    let starter = STARTERS[prompt.chars().count() % STARTERS.len()];
    let mut out = String::from(starter);
    for sentence in FILLER {
        out.push(' ');
        out.push_str(sentence);
    }
    out
}

/// Split a response into chunks of one to three words, rotating the chunk
/// size so the stream looks uneven without being random.
fn chunk_words(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut i = 0;
    let mut step = 1;
    while i < words.len() {
        let end = (i + step).min(words.len());
        let mut chunk = words[i..end].join(" ");
        if end < words.len() {
            chunk.push(' ');
        }
        chunks.push(chunk);
        i = end;
        step = step % 3 + 1;
    }
    chunks
}
