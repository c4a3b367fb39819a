//! Mailgun async client implementation.

use crate::message::Payload;
use crate::models::ErrorEnvelope;
use crate::{Config, Error, Message, Result, SendResult, StoredMessage};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Async client for the Mailgun HTTP API.
///
/// Use [`Client::new`] for defaults or [`Client::builder`] for custom settings
/// like proxies, deadlines, and a custom user agent. The client is cheap to
/// clone and safe to share between tasks; its configuration never changes
/// after construction.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Config,
    proxy: Option<String>,
    user_agent: String,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Client {
    /// Create a builder for configuring the client.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Create a new Mailgun client with default transport settings.
    ///
    /// # Examples
    /// ```no_run
    /// # use mailgun_client::{Client, Config};
    /// # fn main() -> Result<(), mailgun_client::Error> {
    /// let client = Client::new(Config::new("mg.example.com", "key-123"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    /// Create a client from `MG_DOMAIN`, `MG_API_KEY` and `MG_URL`.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Routing domain used in request paths.
    pub fn domain(&self) -> &str {
        self.config.domain()
    }

    /// Secret API key, also the webhook signing key.
    pub fn api_key(&self) -> &str {
        self.config.api_key()
    }

    /// API base URL.
    pub fn api_base(&self) -> &str {
        self.config.api_base()
    }

    /// Get the proxy URL if one was configured.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Return a handle sharing this client's connection pool whose calls
    /// abort with [`Error::Cancelled`] once `token` is cancelled.
    ///
    /// # Examples
    /// ```no_run
    /// # use mailgun_client::{Client, Config, Message};
    /// # use mailgun_client::CancellationToken;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), mailgun_client::Error> {
    /// let client = Client::new(Config::new("mg.example.com", "key-123"))?;
    /// let token = CancellationToken::new();
    /// let scoped = client.with_cancellation(token.clone());
    /// let msg = Message::with_recipients("me@example.com", "Hi", "Body", ["you@example.com"])?;
    /// token.cancel();
    /// assert!(matches!(scoped.send(&msg).await, Err(mailgun_client::Error::Cancelled)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Send a message.
    ///
    /// The message is validated first; invalid messages fail with
    /// [`Error::InvalidMessage`] without touching the network. The message is
    /// only read, so the same value can be sent again.
    ///
    /// # Examples
    /// ```no_run
    /// # use mailgun_client::{Client, Config, Message};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), mailgun_client::Error> {
    /// let client = Client::new(Config::new("mg.example.com", "key-123"))?;
    /// let msg = Message::with_recipients("me@example.com", "Hi", "Body", ["you@example.com"])?;
    /// let sent = client.send(&msg).await?;
    /// println!("{} ({})", sent.message, sent.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&self, message: &Message) -> Result<SendResult> {
        message.validate()?;
        let payload = message.payload()?;
        let domain = message.domain().unwrap_or(self.config.domain());
        let url = self.url(&format!("{domain}/{}", message.endpoint()));

        let request = self.request(Method::POST, &url);
        let result: SendResult = self
            .run(async {
                let request = if payload.is_multipart() {
                    request.multipart(multipart_form(payload).await?)
                } else {
                    request.form(&payload.fields)
                };
                exchange(request).await
            })
            .await?;
        debug!(id = %result.id, "message accepted");
        Ok(result)
    }

    /// Redeliver a stored message to new recipients.
    ///
    /// `storage` is either the storage key of a stored message or its full
    /// storage URL.
    ///
    /// # Errors
    /// [`Error::NoRecipients`] when `recipients` is empty; nothing is sent.
    pub async fn resend<I, S>(&self, storage: &str, recipients: I) -> Result<SendResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let form: Vec<(&str, String)> = recipients
            .into_iter()
            .map(|address| ("to", address.into()))
            .collect();
        if form.is_empty() {
            return Err(Error::NoRecipients);
        }

        let url = self.stored_message_url(storage);
        self.execute(self.request(Method::POST, &url).form(&form))
            .await
    }

    /// Fetch a stored message by storage key or URL.
    pub async fn get_stored_message(&self, storage: &str) -> Result<StoredMessage> {
        let url = self.stored_message_url(storage);
        self.execute(self.request(Method::GET, &url)).await
    }

    /// Delete a stored message by storage key or URL.
    pub async fn delete_stored_message(&self, storage: &str) -> Result<()> {
        let url = self.stored_message_url(storage);
        let _: serde_json::Value = self.execute(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }

    fn stored_message_url(&self, storage: &str) -> String {
        if storage.starts_with("http://") || storage.starts_with("https://") {
            storage.to_string()
        } else {
            self.url(&format!("domains/{}/messages/{storage}", self.config.domain()))
        }
    }

    /// Join `path` onto the API base.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base(), path.trim_start_matches('/'))
    }

    /// Start an authenticated request.
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, url, "dispatching request");
        self.http
            .request(method, url)
            .basic_auth("api", Some(self.config.api_key()))
            .headers(self.headers())
    }

    /// Run a request under the client's deadline and cancellation token and
    /// decode its JSON body.
    pub(crate) async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.run(exchange(request)).await
    }

    /// Race `work` against the cancellation token and the deadline.
    async fn run<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.with_deadline(work) => result,
        }
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout)?,
            None => fut.await,
        }
    }

    /// Build headers for API requests.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }
}

/// Send `request` and decode its JSON body.
async fn exchange<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(classify)?;
    let status = response.status();
    let body = response.bytes().await.map_err(classify)?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    Ok(serde_json::from_slice(&body)?)
}

async fn multipart_form(payload: Payload) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in payload.fields {
        form = form.text(name, value);
    }
    for file in &payload.files {
        let part = Part::bytes(file.bytes().await?).file_name(file.file_name.clone());
        form = form.part(file.field, part);
    }
    Ok(form)
}

/// Map a transport failure onto the crate's error taxonomy.
///
/// Once a connection is established, any failure to obtain a complete
/// response means the peer hung up on us.
fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::Timeout;
    }
    if err.is_builder() || err.is_connect() || err.is_redirect() {
        return Error::Transport(err);
    }
    if err.is_request() || err.is_body() || err.is_decode() {
        let cause = error_chain(&err);
        warn!(%cause, "connection closed before a complete response");
        return Error::PrematureClose(cause);
    }
    Error::Transport(err)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn api_error(status: StatusCode, body: &[u8]) -> Error {
    let message = match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.message,
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_string()
            } else {
                text
            }
        }
    };
    warn!(status = status.as_u16(), %message, "API returned an error");
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

const USER_AGENT_VALUE: &str = concat!("mailgun-client-rs/", env!("CARGO_PKG_VERSION"));

/// Builder for configuring a Mailgun client.
///
/// Start with [`Client::builder`] to override defaults.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: Config,
    proxy: Option<String>,
    danger_accept_invalid_certs: bool,
    user_agent: String,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    ///
    /// Defaults:
    /// - No proxy
    /// - `danger_accept_invalid_certs = false`
    /// - Crate user agent
    /// - No deadline
    /// - A cancellation token that is never cancelled
    pub fn new(config: Config) -> Self {
        Self {
            config,
            proxy: None,
            danger_accept_invalid_certs: false,
            user_agent: USER_AGENT_VALUE.to_string(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the API base URL.
    ///
    /// Useful for the EU region or for pointing at a mock server in tests.
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config = self.config.with_api_base(api_base);
        self
    }

    /// Set a proxy URL (e.g., "http://127.0.0.1:8080").
    ///
    /// This uses reqwest's proxy support for all requests.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Control whether to accept invalid TLS certificates (default: false).
    pub fn danger_accept_invalid_certs(mut self, value: bool) -> Self {
        self.danger_accept_invalid_certs = value;
        self
    }

    /// Override the default user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Bound every call, including reading the response, by `timeout`.
    ///
    /// Expiry surfaces as [`Error::Timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort calls with [`Error::Cancelled`] once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the client.
    ///
    /// # Examples
    /// ```no_run
    /// # use mailgun_client::{Client, Config};
    /// # use std::time::Duration;
    /// # fn main() -> Result<(), mailgun_client::Error> {
    /// let client = Client::builder(Config::new("mg.example.com", "key-123"))
    ///     .user_agent("my-app/1.0")
    ///     .timeout(Duration::from_secs(10))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(self) -> Result<Client> {
        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(self.danger_accept_invalid_certs);

        if let Some(proxy_url) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        let http = builder.build()?;

        Ok(Client {
            http,
            config: self.config,
            proxy: self.proxy,
            user_agent: self.user_agent,
            timeout: self.timeout,
            cancel: self.cancel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::builder(Config::new("testDomain", "testAPIKey"))
            .api_base("http://127.0.0.1:9/v3")
            .build()
            .unwrap()
    }

    #[test]
    fn url_joins_base_and_path() {
        let client = client();
        assert_eq!(
            client.url("testDomain/messages"),
            "http://127.0.0.1:9/v3/testDomain/messages"
        );
        assert_eq!(
            client.url("/domains/testDomain/webhooks"),
            "http://127.0.0.1:9/v3/domains/testDomain/webhooks"
        );
    }

    #[test]
    fn stored_message_url_accepts_key_or_url() {
        let client = client();
        assert_eq!(
            client.stored_message_url("some-url"),
            "http://127.0.0.1:9/v3/domains/testDomain/messages/some-url"
        );
        assert_eq!(
            client.stored_message_url("https://storage.mailgun.net/v3/domains/x/messages/abc"),
            "https://storage.mailgun.net/v3/domains/x/messages/abc"
        );
    }

    #[test]
    fn api_error_prefers_envelope_message() {
        let err = api_error(StatusCode::BAD_REQUEST, br#"{"message":"'from' parameter is missing"}"#);
        assert_eq!(err.to_string(), "'from' parameter is missing");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn api_error_falls_back_to_body_then_reason() {
        let err = api_error(StatusCode::UNAUTHORIZED, b"Forbidden\n");
        assert_eq!(err.to_string(), "Forbidden");

        let err = api_error(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(err.to_string(), "Bad Gateway");
    }

    #[test]
    fn client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
    }

    #[test]
    fn with_cancellation_keeps_config() {
        let client = client();
        let scoped = client.with_cancellation(CancellationToken::new());
        assert_eq!(scoped.config(), client.config());
        assert_eq!(scoped.api_key(), "testAPIKey");
    }
}
