use thiserror::Error;

/// Errors that can occur within any chat transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The HTTP request never produced a response.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The platform answered but rejected the call (`ok: false`).
    #[error("{method} rejected: {error}")]
    Api { method: String, error: String },

    /// The platform rejected the supplied credentials or token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The response body could not be understood.
    #[error("Malformed response from {method}: {reason}")]
    MalformedResponse { method: String, reason: String },

    /// The membership actor has shut down.
    #[error("Membership worker is not running")]
    WorkerGone,
}
