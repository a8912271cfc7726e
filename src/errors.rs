use thiserror::Error;

/// Top-level client error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── HTTP errors ──────────────────────────────────────────────────────────
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server responded {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {message}")]
    DecodeFailed { url: String, message: String },

    // ── Push transport errors ────────────────────────────────────────────────
    #[error("Could not connect to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    #[error("Broker reported error: {message}")]
    BrokerError { message: String },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Malformed message payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

impl AppError {
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::RequestFailed { url: url.into(), source }
    }

    pub fn connect(endpoint: impl Into<String>, message: impl ToString) -> Self {
        AppError::ConnectFailed { endpoint: endpoint.into(), message: message.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::UnexpectedStatus { status: 404, .. })
    }

    /// Failures of the push connection itself, as opposed to HTTP or payload
    /// errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::ConnectFailed { .. }
                | AppError::BrokerError { .. }
                | AppError::ChannelClosed
                | AppError::NotConnected
                | AppError::MalformedFrame(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_variants() {
        let not_found = AppError::UnexpectedStatus { url: "x".into(), status: 404 };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transport());

        assert!(AppError::ChannelClosed.is_transport());
        assert!(AppError::BrokerError { message: "denied".into() }.is_transport());
        assert!(!AppError::MalformedPayload(serde_json::from_str::<u8>("x").unwrap_err()).is_transport());
    }

    #[test]
    fn messages_are_readable() {
        let err = AppError::connect("ws://host/chat", "refused");
        assert_eq!(err.to_string(), "Could not connect to ws://host/chat: refused");
    }
}
