//! Request Broker
//!
//! Correlates asynchronous request starts with their streamed and terminal
//! replies across contexts that share no memory: callers register callbacks
//! keyed by a correlation id, the wire carries only the id plus a kind
//! discriminator, and the broker routes replies back to the right slots.

pub mod channel;
pub mod registry;

pub use channel::{Channel, Endpoint, MpscChannel};
pub use registry::{Broker, RequestCallbacks, RequestPayload};
