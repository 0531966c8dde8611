//! Error taxonomy for the external collaborators.

use async_trait::async_trait;
use thiserror::Error;

/// Failures surfaced by the text-completion collaborator.
///
/// Bodies are kept (truncated at the call site) so an operator can diagnose
/// the backend from logs; callers must not show them verbatim to the user.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("access denied: you do not have permission to access this resource")]
    AccessDenied { body: String },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("completion transport error: {0}")]
    Transport(String),
}

/// One text-completion call against the remote (or local) inference service.
///
/// The engine only ever sees this seam: submit a prompt and a token budget,
/// receive generated text. Retry policy, if any, belongs to implementations.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_output_tokens: u32)
        -> Result<String, CompletionError>;
}
