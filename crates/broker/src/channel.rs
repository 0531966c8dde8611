//! Fire-and-forget message channel between the broker and worker contexts.

use parking_lot::Mutex;
use shared::messages::WireMessage;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Named endpoints a message can be addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The primary worker: the on-device inference engine.
    Worker,
    /// The secondary worker used when the primary is unavailable.
    Fallback,
    /// The broker itself (workers reply here).
    Broker,
}

/// Send a message to a named endpoint. Delivery is best-effort and never
/// blocks; a missing or closed endpoint is logged and dropped, mirroring how
/// a restarted extension context silently loses in-flight messages.
pub trait Channel: Send + Sync {
    fn send(&self, target: Endpoint, message: WireMessage);
}

/// In-process channel over unbounded mpsc senders, one per endpoint.
#[derive(Default)]
pub struct MpscChannel {
    routes: Mutex<HashMap<Endpoint, UnboundedSender<WireMessage>>>,
}

impl MpscChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an endpoint. A later registration replaces the earlier one,
    /// which is how a restarted worker context re-attaches.
    pub fn register(&self, endpoint: Endpoint, sender: UnboundedSender<WireMessage>) {
        self.routes.lock().insert(endpoint, sender);
    }
}

impl Channel for MpscChannel {
    fn send(&self, target: Endpoint, message: WireMessage) {
        let sender = self.routes.lock().get(&target).cloned();
        match sender {
            Some(tx) => {
                if tx.send(message).is_err() {
                    warn!(?target, "endpoint receiver dropped; message discarded");
                }
            }
            None => warn!(?target, "no subscriber for endpoint; message discarded"),
        }
    }
}
