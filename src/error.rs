//! Error types for Mailgun operations.

use thiserror::Error;

/// Errors returned by the Mailgun client.
///
/// Client-side validation failures ([`Error::RecipientLimitExceeded`],
/// [`Error::NoRecipients`], [`Error::InvalidMessage`]) are raised before any
/// network traffic. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Adding the recipient would push the message past [`crate::MAX_RECIPIENTS`].
    #[error("recipient limit exceeded (max {})", crate::MAX_RECIPIENTS)]
    RecipientLimitExceeded,

    /// A resend was requested without any recipient.
    #[error("must provide at least one recipient")]
    NoRecipients,

    /// The message is missing a sender, a body, or any recipient.
    #[error("message not valid")]
    InvalidMessage,

    /// The connection was closed before a complete response arrived.
    ///
    /// Carries the full cause chain of the underlying transport failure.
    #[error("remote server prematurely closed connection: {0}")]
    PrematureClose(String),

    /// Any other transport failure (connection refused, invalid URL, TLS).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    ///
    /// Displays the server-provided message unmodified.
    #[error("{message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Message text taken from the JSON error envelope, or the raw body.
        message: String,
    },

    /// Webhook signature fields were missing or could not be parsed.
    #[error("malformed webhook signature input: {0}")]
    MalformedSignature(String),

    /// A response body did not have the expected JSON shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An attachment could not be read from disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call was aborted through the client's cancellation token.
    #[error("request cancelled")]
    Cancelled,

    /// The call did not finish within the configured deadline.
    #[error("request deadline exceeded")]
    Timeout,

    /// A required configuration value was not provided.
    #[error("missing configuration value: {0}")]
    MissingConfig(&'static str),

    /// The server answered for a webhook but listed no URL for it.
    #[error("webhook `{0}` has no url")]
    MissingWebhookUrl(String),
}

impl Error {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
