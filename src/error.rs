/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum GlacierDbError {
    /// Buffer sizing or allocation failure while assembling a request or
    /// copying a response field.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// Response body failed to parse as JSON, or a required field violated
    /// the field contract (missing, null, or wrong type).
    #[error("bad json: {0}")]
    BadJson(String),
    /// Well-formed response that is semantically invalid, e.g. a renewal
    /// reply carrying `success: false`.
    #[error("bad response: {0}")]
    BadResponse(String),
    /// Caller or configuration misuse, e.g. renewing a session without a
    /// master token.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Network or TLS failure from `reqwest`. The message includes the
    /// CA-bundle path when one is configured.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// Terminal HTTP outcome: an unretryable status code, or an exhausted
    /// retry or poll budget.
    #[error("retry error: {message}")]
    Retry {
        /// HTTP status that ended the attempt sequence, if one was seen.
        status: Option<u16>,
        message: String,
    },
}

impl GlacierDbError {
    /// Stable classification code for logs and for callers that dispatch on
    /// error kind rather than message text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory(_) => "OUT_OF_MEMORY",
            Self::BadJson(_) => "BAD_JSON",
            Self::BadResponse(_) => "BAD_RESPONSE",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Transport { .. } => "TRANSPORT",
            Self::Retry { .. } => "RETRY",
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }
}
