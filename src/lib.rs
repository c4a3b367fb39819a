//! # Mailgun Client
//! Asynchronous wrapper around the Mailgun transactional email HTTP API: build and send messages, resend stored ones, manage webhooks, page through events, and authenticate inbound webhook callbacks using [`Client`] and [`Message`].
//!
//! ## Audience and uses
//! For Rust services that send application email through Mailgun: configure a [`Client`] from a [`Config`], assemble a [`Message`] with recipients, variables, tags and delivery options, then [`Client::send`] it. Webhook receivers use [`Client::verify_webhook_request`] to check that a callback really came from Mailgun.
//!
//! ## Runtime requirements
//! Async-only; run inside a Tokio (v1) runtime. HTTP calls use `reqwest`. Diagnostics are emitted through `tracing`; install a subscriber in your application to see them.
//!
//! ## Out of scope
//! Not a server implementation and not a retry layer. Failed calls are reported once; retry policy belongs to the caller.
//!
//! ## Errors
//! Client-side validation ([`Error::RecipientLimitExceeded`], [`Error::NoRecipients`], [`Error::InvalidMessage`]) fails before any network call. Non-2xx answers become [`Error::Api`] with the server's message verbatim, and a connection dropped mid-exchange becomes [`Error::PrematureClose`]. A webhook signature mismatch is `Ok(false)`, never an error. The crate-wide [`Result`] alias wraps these errors.
//!
//! ## Example
//! ```no_run
//! use mailgun_client::{Client, Config, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mailgun_client::Error> {
//!     let client = Client::new(Config::new("mg.example.com", "key-123"))?;
//!
//!     let mut msg = Message::with_recipients(
//!         "Excited User <me@mg.example.com>",
//!         "Hello",
//!         "Testing some Mailgun awesomeness!",
//!         ["bob@example.com"],
//!     )?;
//!     msg.add_tag("welcome");
//!     msg.set_tracking(true);
//!
//!     let sent = client.send(&msg).await?;
//!     println!("{}: {}", sent.id, sent.message);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod events;
mod message;
mod models;
mod webhooks;

pub use client::{Client, ClientBuilder};
pub use config::{Config, DEFAULT_API_BASE};
pub use error::Error;
pub use events::{EVENT_STORED, Event, EventIterator, ListEventsOptions, Paging};
pub use message::{MAX_RECIPIENTS, Message, RecipientKind, RecipientVariables, Variable};
pub use models::{SendResult, Storage, StoredAttachment, StoredMessage};
pub use webhooks::Signature;

/// Token accepted by [`Client::with_cancellation`] and [`ClientBuilder::cancellation`].
pub use tokio_util::sync::CancellationToken;

/// Result type alias for Mailgun operations.
///
/// This is equivalent to `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
