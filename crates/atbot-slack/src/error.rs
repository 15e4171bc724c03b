use atbot_channels::ChannelError;

/// Errors produced by the Slack adapter.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("no bot token configured")]
    NoToken,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("{method} returned no {field}")]
    MissingField {
        method: String,
        field: &'static str,
    },

    #[error("invalid request signature: {0}")]
    BadSignature(String),

    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SlackError {
    fn is_auth(&self) -> bool {
        matches!(
            self,
            SlackError::Api { error, .. }
                if matches!(error.as_str(), "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive")
        )
    }
}

impl From<SlackError> for ChannelError {
    fn from(e: SlackError) -> Self {
        if e.is_auth() {
            return ChannelError::AuthFailed(e.to_string());
        }
        match e {
            SlackError::Http(e) => ChannelError::RequestFailed(e.to_string()),
            SlackError::Api { method, error } => ChannelError::Api { method, error },
            SlackError::MissingField { method, field } => ChannelError::MalformedResponse {
                method,
                reason: format!("missing {field}"),
            },
            other => ChannelError::RequestFailed(other.to_string()),
        }
    }
}
