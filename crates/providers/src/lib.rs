//! External collaborators: the remote inference service, the retrieval
//! backend, the identity provider, and the two in-process worker engines
//! (on-device inference and its simulation fallback).

pub mod identity;
pub mod local;
pub mod remote;
pub mod retrieval;
pub mod simulation;

pub use identity::{Identity, IdentityClient};
pub use local::{GenerationPipeline, LocalEngine};
pub use remote::RemoteCompletionClient;
pub use retrieval::RetrievalClient;
pub use simulation::SimulationEngine;
