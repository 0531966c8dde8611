//! Wire messages exchanged between the UI, the broker, and the worker
//! contexts.
//!
//! Every message carries a `type` discriminator on the wire. Correlated flows
//! carry a `request_id`; callbacks never cross the channel, the requesting
//! side keeps them locally, keyed by id.

use serde::{Deserialize, Serialize};

/// A hit returned by the on-device index worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    // Requests dispatched to a worker context.
    GenerateText { request_id: u64, prompt: String },
    SearchIndex { request_id: u64, query: String, limit: usize },

    // Correlated replies from a worker.
    TextChunk { request_id: u64, chunk: String },
    GenerationComplete { request_id: u64 },
    GenerationError { request_id: u64, error: String },
    SearchResults { request_id: u64, results: Vec<SearchHit> },

    // Broadcast kinds: fanned out to every listening surface, not correlated.
    LoadProgress { progress: u8 },
    EngineReady,
    EngineFailed { error: String },
    DebugLog { message: String },
}

impl WireMessage {
    /// The correlation id, for kinds that are scoped to one request.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            WireMessage::GenerateText { request_id, .. }
            | WireMessage::SearchIndex { request_id, .. }
            | WireMessage::TextChunk { request_id, .. }
            | WireMessage::GenerationComplete { request_id }
            | WireMessage::GenerationError { request_id, .. }
            | WireMessage::SearchResults { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    /// Broadcast kinds bypass the pending-request registry entirely.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            WireMessage::LoadProgress { .. }
                | WireMessage::EngineReady
                | WireMessage::EngineFailed { .. }
                | WireMessage::DebugLog { .. }
        )
    }

    /// Terminal kinds remove the pending record after delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WireMessage::GenerationComplete { .. }
                | WireMessage::GenerationError { .. }
                | WireMessage::SearchResults { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_discriminator_is_kebab_case() {
        let msg = WireMessage::TextChunk {
            request_id: 7,
            chunk: "hello ".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "text-chunk");
        assert_eq!(json["request_id"], 7);
    }

    #[test]
    fn broadcast_kinds_have_no_request_id() {
        assert!(WireMessage::EngineReady.is_broadcast());
        assert_eq!(WireMessage::EngineReady.request_id(), None);
        assert!(WireMessage::LoadProgress { progress: 40 }.is_broadcast());
        assert!(!WireMessage::GenerationComplete { request_id: 1 }.is_broadcast());
    }

    #[test]
    fn terminal_kinds() {
        assert!(WireMessage::GenerationComplete { request_id: 1 }.is_terminal());
        assert!(WireMessage::GenerationError {
            request_id: 1,
            error: "boom".into()
        }
        .is_terminal());
        assert!(!WireMessage::TextChunk {
            request_id: 1,
            chunk: String::new()
        }
        .is_terminal());
    }

    #[test]
    fn round_trips_through_json() {
        let msg = WireMessage::SearchResults {
            request_id: 3,
            results: vec![SearchHit {
                text: "snippet".into(),
                score: 0.5,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
