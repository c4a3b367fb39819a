//! Webhook registry calls and inbound webhook authentication.
//!
//! Every webhook POST carries a `timestamp`, a random `token` and a
//! `signature`. The signature is the hex-encoded HMAC-SHA256 of the timestamp
//! immediately followed by the token, keyed with the account's API key.

use crate::{Client, Error, Result};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP: &str = "timestamp";
const TOKEN: &str = "token";
const SIGNATURE: &str = "signature";

/// One inbound webhook authenticity claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Unix timestamp, as sent.
    pub timestamp: String,
    /// Random token chosen by the sender.
    pub token: String,
    /// Hex-encoded HMAC-SHA256 of `timestamp || token`.
    pub signature: String,
}

impl Signature {
    /// Compute the signature the API would send for `timestamp` and `token`.
    pub fn sign(api_key: &str, timestamp: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let timestamp = timestamp.into();
        let token = token.into();
        let mac = keyed_mac(api_key, &timestamp, &token)?;
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(Self {
            timestamp,
            token,
            signature,
        })
    }

    /// Check the signature against `api_key`.
    ///
    /// A mismatch is `Ok(false)`, not an error.
    ///
    /// # Errors
    /// [`Error::MalformedSignature`] when a field is empty or the signature is
    /// not valid hex.
    pub fn verify(&self, api_key: &str) -> Result<bool> {
        for (name, value) in [
            (TIMESTAMP, &self.timestamp),
            (TOKEN, &self.token),
            (SIGNATURE, &self.signature),
        ] {
            if value.is_empty() {
                return Err(Error::MalformedSignature(format!("missing field `{name}`")));
            }
        }
        let provided = hex::decode(&self.signature)
            .map_err(|e| Error::MalformedSignature(format!("signature is not hex: {e}")))?;

        // verify_slice compares in constant time
        let mac = keyed_mac(api_key, &self.timestamp, &self.token)?;
        Ok(mac.verify_slice(&provided).is_ok())
    }

    /// Assemble a signature from decoded form fields; the first occurrence wins.
    fn from_fields(fields: &[(String, String)]) -> Result<Self> {
        let find = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::MalformedSignature(format!("missing field `{name}`")))
        };
        Ok(Self {
            timestamp: find(TIMESTAMP)?,
            token: find(TOKEN)?,
            signature: find(SIGNATURE)?,
        })
    }

    /// Extract the signature fields from a received webhook request.
    ///
    /// Supports `application/x-www-form-urlencoded`, `multipart/form-data` and
    /// JSON bodies with a top-level `signature` object. Query parameters are
    /// consulted after the body, like a form would be. All other fields are
    /// ignored.
    pub async fn from_request<B: AsRef<[u8]>>(request: &http::Request<B>) -> Result<Self> {
        let content_type = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let body = request.body().as_ref();

        let mut fields: Vec<(String, String)> = match mime.as_str() {
            "multipart/form-data" => multipart_fields(content_type, body).await?,
            "application/json" => return json_signature(body),
            "application/x-www-form-urlencoded" | "" => {
                url::form_urlencoded::parse(body).into_owned().collect()
            }
            other => {
                return Err(Error::MalformedSignature(format!(
                    "unsupported content type `{other}`"
                )));
            }
        };
        if let Some(query) = request.uri().query() {
            fields.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        Self::from_fields(&fields)
    }
}

fn keyed_mac(api_key: &str, timestamp: &str, token: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(api_key.as_bytes())
        .map_err(|e| Error::MalformedSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    Ok(mac)
}

fn malformed(err: impl std::fmt::Display) -> Error {
    Error::MalformedSignature(err.to_string())
}

async fn multipart_fields(content_type: &str, body: &[u8]) -> Result<Vec<(String, String)>> {
    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let data = Bytes::copy_from_slice(body);
    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(data) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if ![TIMESTAMP, TOKEN, SIGNATURE].contains(&name.as_str()) {
            continue;
        }
        let value = field.text().await.map_err(malformed)?;
        fields.push((name, value));
    }
    Ok(fields)
}

fn json_signature(body: &[u8]) -> Result<Signature> {
    #[derive(Deserialize)]
    struct Envelope {
        signature: Signature,
    }

    let envelope: Envelope = serde_json::from_slice(body).map_err(malformed)?;
    Ok(envelope.signature)
}

#[derive(Debug, Deserialize)]
struct WebhookTarget {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
}

impl WebhookTarget {
    fn into_url(self) -> Option<String> {
        self.url.or_else(|| self.urls.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    webhook: WebhookTarget,
}

#[derive(Debug, Deserialize)]
struct WebhookList {
    #[serde(default)]
    webhooks: HashMap<String, WebhookTarget>,
}

impl Client {
    fn webhooks_url(&self, name: Option<&str>) -> String {
        let base = format!("domains/{}/webhooks", self.domain());
        match name {
            Some(name) => self.url(&format!("{base}/{name}")),
            None => self.url(&base),
        }
    }

    /// List registered webhooks as `event name -> URL`.
    pub async fn list_webhooks(&self) -> Result<HashMap<String, String>> {
        let list: WebhookList = self
            .execute(self.request(Method::GET, &self.webhooks_url(None)))
            .await?;
        Ok(list
            .webhooks
            .into_iter()
            .filter_map(|(name, target)| target.into_url().map(|url| (name, url)))
            .collect())
    }

    /// Register `urls` for the event `name` (e.g. `delivered`).
    pub async fn create_webhook<S: AsRef<str>>(&self, name: &str, urls: &[S]) -> Result<()> {
        let mut form = vec![("id", name.to_string())];
        form.extend(urls.iter().map(|u| ("url", u.as_ref().to_string())));

        let _: serde_json::Value = self
            .execute(self.request(Method::POST, &self.webhooks_url(None)).form(&form))
            .await?;
        debug!(name, "webhook created");
        Ok(())
    }

    /// URL registered for the event `name`.
    pub async fn get_webhook(&self, name: &str) -> Result<String> {
        let envelope: WebhookEnvelope = self
            .execute(self.request(Method::GET, &self.webhooks_url(Some(name))))
            .await?;
        envelope
            .webhook
            .into_url()
            .ok_or_else(|| Error::MissingWebhookUrl(name.to_string()))
    }

    /// Replace the URLs registered for `name`.
    pub async fn update_webhook<S: AsRef<str>>(&self, name: &str, urls: &[S]) -> Result<()> {
        let form: Vec<(&str, String)> = urls
            .iter()
            .map(|u| ("url", u.as_ref().to_string()))
            .collect();

        let _: serde_json::Value = self
            .execute(
                self.request(Method::PUT, &self.webhooks_url(Some(name)))
                    .form(&form),
            )
            .await?;
        debug!(name, "webhook updated");
        Ok(())
    }

    pub async fn delete_webhook(&self, name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .execute(self.request(Method::DELETE, &self.webhooks_url(Some(name))))
            .await?;
        debug!(name, "webhook deleted");
        Ok(())
    }

    /// Signature the API would attach for `timestamp` and `token`.
    pub fn sign_webhook(
        &self,
        timestamp: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Signature> {
        Signature::sign(self.api_key(), timestamp, token)
    }

    /// Check a webhook signature against this client's API key.
    ///
    /// Returns `Ok(false)` on mismatch; callers must check the boolean.
    ///
    /// # Examples
    /// ```
    /// # use mailgun_client::{Client, Config, Signature};
    /// # fn main() -> Result<(), mailgun_client::Error> {
    /// let client = Client::new(Config::new("mg.example.com", "key-123"))?;
    /// let sig = Signature {
    ///     timestamp: "1700000000".into(),
    ///     token: "abc".into(),
    ///     signature: "00".repeat(32),
    /// };
    /// assert!(!client.verify_webhook_signature(&sig)?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn verify_webhook_signature(&self, signature: &Signature) -> Result<bool> {
        signature.verify(self.api_key())
    }

    /// Extract `timestamp`, `token` and `signature` from a received webhook
    /// request and verify them.
    pub async fn verify_webhook_request<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
    ) -> Result<bool> {
        let signature = Signature::from_request(request).await?;
        self.verify_webhook_signature(&signature)
    }
}
