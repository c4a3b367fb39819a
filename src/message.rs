//! Outgoing message builder and its wire rendering.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Maximum number of recipients (To + Cc + Bcc) a single message may carry.
pub const MAX_RECIPIENTS: usize = 1000;

/// RFC 2822 layout with a zero-padded day, as the API expects for `o:deliverytime`.
const DELIVERY_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Which header a recipient is addressed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

impl RecipientKind {
    /// Form field name used on the wire.
    pub fn field(self) -> &'static str {
        match self {
            RecipientKind::To => "to",
            RecipientKind::Cc => "cc",
            RecipientKind::Bcc => "bcc",
        }
    }
}

/// A JSON-compatible value attached to a message or a recipient.
///
/// Message-level variables go on the wire as `v:<key>` with the rendering of
/// [`Variable::to_wire`]. Per-recipient variables are embedded as JSON in the
/// `recipient-variables` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variable {
    String(String),
    Bool(bool),
    Number(Number),
    Map(Map<String, Value>),
}

impl Variable {
    /// Text sent for a `v:` field.
    ///
    /// Strings are sent as-is, booleans and numbers as their literal text and
    /// mappings as compact JSON objects.
    pub fn to_wire(&self) -> String {
        match self {
            Variable::String(s) => s.clone(),
            Variable::Bool(b) => b.to_string(),
            Variable::Number(n) => n.to_string(),
            Variable::Map(m) => Value::Object(m.clone()).to_string(),
        }
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Variable::String(value.to_string())
    }
}

impl From<String> for Variable {
    fn from(value: String) -> Self {
        Variable::String(value)
    }
}

impl From<bool> for Variable {
    fn from(value: bool) -> Self {
        Variable::Bool(value)
    }
}

impl From<Number> for Variable {
    fn from(value: Number) -> Self {
        Variable::Number(value)
    }
}

macro_rules! variable_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Variable {
                fn from(value: $ty) -> Self {
                    Variable::Number(Number::from(value))
                }
            }
        )*
    };
}

variable_from_int!(i32, i64, u32, u64, usize);

impl From<Map<String, Value>> for Variable {
    fn from(value: Map<String, Value>) -> Self {
        Variable::Map(value)
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Variable {
    fn from(value: BTreeMap<String, V>) -> Self {
        Variable::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Variable {
    fn from(value: HashMap<String, V>) -> Self {
        Variable::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Per-recipient template variables, resolved server-side via `%recipient.<key>%`.
pub type RecipientVariables = BTreeMap<String, Variable>;

#[derive(Debug, Clone)]
pub(crate) enum FileSource {
    Path(PathBuf),
    Buffer(Vec<u8>),
}

#[derive(Debug, Clone)]
pub(crate) struct FilePart {
    pub(crate) field: &'static str,
    pub(crate) file_name: String,
    pub(crate) source: FileSource,
}

impl FilePart {
    fn from_path(field: &'static str, path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            field,
            file_name,
            source: FileSource::Path(path),
        }
    }

    fn from_buffer(field: &'static str, file_name: String, data: Vec<u8>) -> Self {
        Self {
            field,
            file_name,
            source: FileSource::Buffer(data),
        }
    }

    /// Load the part's bytes, reading from disk when backed by a path.
    pub(crate) async fn bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Buffer(data) => Ok(data.clone()),
            FileSource::Path(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

/// Flat, ordered request body produced from a [`Message`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Payload {
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) files: Vec<FilePart>,
}

impl Payload {
    fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    fn add_flag(&mut self, name: &str, value: Option<bool>) {
        if let Some(v) = value {
            self.add(name, yes_no(v));
        }
    }

    /// Whether the body must be sent as `multipart/form-data`.
    pub(crate) fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub(crate) fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[derive(Debug, Clone)]
enum Content {
    Plain {
        from: String,
        subject: String,
        text: String,
        html: Option<String>,
    },
    Mime {
        body: Vec<u8>,
    },
}

/// An outgoing email, assembled with setters and handed to [`crate::Client::send`].
///
/// A message is either plain (structured from/subject/text/html fields) or
/// MIME (a pre-rendered RFC 2822 document); the two never mix. Sending does
/// not consume or alter the message.
///
/// # Examples
/// ```
/// use mailgun_client::{Message, RecipientKind};
///
/// # fn main() -> Result<(), mailgun_client::Error> {
/// let mut msg = Message::new("Excited User <me@example.com>", "Hello", "Testing!");
/// msg.add_recipient(RecipientKind::To, "bob@example.com")?;
/// msg.add_recipient(RecipientKind::Bcc, "audit@example.com")?;
/// msg.add_variable("campaign", "spring");
/// msg.set_require_tls(true);
/// assert_eq!(msg.recipient_count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Message {
    content: Content,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    recipient_variables: BTreeMap<String, RecipientVariables>,
    variables: BTreeMap<String, Variable>,
    tags: Vec<String>,
    headers: Vec<(String, String)>,
    delivery_time: Option<DateTime<FixedOffset>>,
    tracking: Option<bool>,
    tracking_clicks: Option<bool>,
    tracking_opens: Option<bool>,
    dkim: Option<bool>,
    require_tls: bool,
    skip_verification: bool,
    test_mode: bool,
    domain: Option<String>,
    attachments: Vec<FilePart>,
    inlines: Vec<FilePart>,
}

impl Message {
    fn with_content(content: Content) -> Self {
        Self {
            content,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            recipient_variables: BTreeMap::new(),
            variables: BTreeMap::new(),
            tags: Vec::new(),
            headers: Vec::new(),
            delivery_time: None,
            tracking: None,
            tracking_clicks: None,
            tracking_opens: None,
            dkim: None,
            require_tls: false,
            skip_verification: false,
            test_mode: false,
            domain: None,
            attachments: Vec::new(),
            inlines: Vec::new(),
        }
    }

    /// Create a plain message with no recipients yet.
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::with_content(Content::Plain {
            from: from.into(),
            subject: subject.into(),
            text: text.into(),
            html: None,
        })
    }

    /// Create a plain message addressed to `to`.
    ///
    /// # Errors
    /// [`Error::RecipientLimitExceeded`] if more than [`MAX_RECIPIENTS`] are given.
    pub fn with_recipients<I, S>(
        from: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        to: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut msg = Self::new(from, subject, text);
        for address in to {
            msg.add_recipient(RecipientKind::To, address)?;
        }
        Ok(msg)
    }

    /// Create a MIME message from a complete RFC 2822 document.
    ///
    /// Recipients still have to be supplied separately; the API does not read
    /// them from the document headers.
    pub fn new_mime(body: impl Into<Vec<u8>>) -> Self {
        Self::with_content(Content::Mime { body: body.into() })
    }

    /// Create a MIME message addressed to `to`.
    ///
    /// # Errors
    /// [`Error::RecipientLimitExceeded`] if more than [`MAX_RECIPIENTS`] are given.
    pub fn mime_with_recipients<I, S>(body: impl Into<Vec<u8>>, to: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut msg = Self::new_mime(body);
        for address in to {
            msg.add_recipient(RecipientKind::To, address)?;
        }
        Ok(msg)
    }

    /// Whether this is a MIME message.
    pub fn is_mime(&self) -> bool {
        matches!(self.content, Content::Mime { .. })
    }

    /// Total number of To, Cc and Bcc recipients.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.recipient_count() >= MAX_RECIPIENTS {
            return Err(Error::RecipientLimitExceeded);
        }
        Ok(())
    }

    /// Append a recipient of the given kind.
    ///
    /// # Errors
    /// [`Error::RecipientLimitExceeded`] when the message already holds
    /// [`MAX_RECIPIENTS`]; the message is left untouched.
    pub fn add_recipient(&mut self, kind: RecipientKind, address: impl Into<String>) -> Result<()> {
        self.ensure_capacity()?;
        let address = address.into();
        match kind {
            RecipientKind::To => self.to.push(address),
            RecipientKind::Cc => self.cc.push(address),
            RecipientKind::Bcc => self.bcc.push(address),
        }
        Ok(())
    }

    /// Append a To recipient together with its template variables.
    ///
    /// # Errors
    /// Same as [`Message::add_recipient`].
    pub fn add_recipient_and_variables(
        &mut self,
        address: impl Into<String>,
        vars: RecipientVariables,
    ) -> Result<()> {
        self.ensure_capacity()?;
        let address = address.into();
        self.recipient_variables.insert(address.clone(), vars);
        self.to.push(address);
        Ok(())
    }

    pub fn add_to(&mut self, address: impl Into<String>) -> Result<()> {
        self.add_recipient(RecipientKind::To, address)
    }

    pub fn add_cc(&mut self, address: impl Into<String>) -> Result<()> {
        self.add_recipient(RecipientKind::Cc, address)
    }

    pub fn add_bcc(&mut self, address: impl Into<String>) -> Result<()> {
        self.add_recipient(RecipientKind::Bcc, address)
    }

    /// Attach message-level metadata, sent as `v:<key>`.
    ///
    /// Setting the same key twice keeps the last value.
    pub fn add_variable(&mut self, key: impl Into<String>, value: impl Into<Variable>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Set the HTML body. Ignored for MIME messages.
    pub fn set_html(&mut self, html: impl Into<String>) {
        if let Content::Plain { html: slot, .. } = &mut self.content {
            *slot = Some(html.into());
        }
    }

    /// Tag the message for analytics. The API caps the number of tags.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    /// Add a custom MIME header, sent as `h:<name>`.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Send through (and sign with) `domain` instead of the client's routing domain.
    pub fn add_domain(&mut self, domain: impl Into<String>) {
        self.domain = Some(domain.into());
    }

    /// Schedule delivery. The API accepts up to a few days ahead.
    pub fn set_delivery_time<Tz: TimeZone>(&mut self, at: DateTime<Tz>) {
        self.delivery_time = Some(at.fixed_offset());
    }

    pub fn set_tracking(&mut self, enabled: bool) {
        self.tracking = Some(enabled);
    }

    pub fn set_tracking_clicks(&mut self, enabled: bool) {
        self.tracking_clicks = Some(enabled);
    }

    pub fn set_tracking_opens(&mut self, enabled: bool) {
        self.tracking_opens = Some(enabled);
    }

    pub fn set_dkim(&mut self, enabled: bool) {
        self.dkim = Some(enabled);
    }

    /// Refuse delivery over a connection without TLS.
    pub fn set_require_tls(&mut self, required: bool) {
        self.require_tls = required;
    }

    /// Skip certificate and hostname checks on the TLS connection to the MX.
    pub fn set_skip_verification(&mut self, skip: bool) {
        self.skip_verification = skip;
    }

    /// Have the API accept the message without delivering it.
    pub fn enable_test_mode(&mut self) {
        self.test_mode = true;
    }

    /// Attach a file from disk. The file is read when the message is sent.
    pub fn add_attachment(&mut self, path: impl Into<PathBuf>) {
        self.attachments
            .push(FilePart::from_path("attachment", path.into()));
    }

    /// Attach in-memory data under `file_name`.
    pub fn add_buffer_attachment(&mut self, file_name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.attachments.push(FilePart::from_buffer(
            "attachment",
            file_name.into(),
            data.into(),
        ));
    }

    /// Add an inline file (referenced from HTML as `cid:<file name>`).
    pub fn add_inline(&mut self, path: impl Into<PathBuf>) {
        self.inlines.push(FilePart::from_path("inline", path.into()));
    }

    pub fn add_buffer_inline(&mut self, file_name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.inlines
            .push(FilePart::from_buffer("inline", file_name.into(), data.into()));
    }

    /// Signing domain override, if one was set.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Messages resource the message is posted to.
    pub(crate) fn endpoint(&self) -> &'static str {
        match self.content {
            Content::Plain { .. } => "messages",
            Content::Mime { .. } => "messages.mime",
        }
    }

    /// Check the fields the API would otherwise reject.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.recipient_count() == 0 {
            return Err(Error::InvalidMessage);
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Err(Error::InvalidMessage);
        }
        match &self.content {
            Content::Plain {
                from, text, html, ..
            } => {
                let has_body = !text.is_empty() || html.as_deref().is_some_and(|h| !h.is_empty());
                if from.is_empty() || !has_body {
                    return Err(Error::InvalidMessage);
                }
            }
            Content::Mime { body } => {
                if body.is_empty() {
                    return Err(Error::InvalidMessage);
                }
            }
        }
        Ok(())
    }

    /// Render every set field; unset options produce no field at all.
    pub(crate) fn payload(&self) -> Result<Payload> {
        let mut payload = Payload::default();

        if let Content::Plain { from, subject, text, .. } = &self.content {
            payload.add("from", from);
            if !subject.is_empty() {
                payload.add("subject", subject);
            }
            if !text.is_empty() {
                payload.add("text", text);
            }
        }
        for address in &self.to {
            payload.add("to", address);
        }
        for address in &self.cc {
            payload.add("cc", address);
        }
        for address in &self.bcc {
            payload.add("bcc", address);
        }
        if let Content::Plain { html: Some(html), .. } = &self.content {
            if !html.is_empty() {
                payload.add("html", html);
            }
        }

        for tag in &self.tags {
            payload.add("o:tag", tag);
        }
        payload.add_flag("o:dkim", self.dkim);
        if let Some(at) = &self.delivery_time {
            payload.add("o:deliverytime", at.format(DELIVERY_TIME_FORMAT).to_string());
        }
        if self.test_mode {
            payload.add("o:testmode", "yes");
        }
        payload.add_flag("o:tracking", self.tracking);
        payload.add_flag("o:tracking-clicks", self.tracking_clicks);
        payload.add_flag("o:tracking-opens", self.tracking_opens);
        if self.require_tls {
            payload.add("o:require-tls", "true");
        }
        if self.skip_verification {
            payload.add("o:skip-verification", "true");
        }

        for (name, value) in &self.headers {
            payload.add(format!("h:{name}"), value);
        }
        for (key, value) in &self.variables {
            payload.add(format!("v:{key}"), value.to_wire());
        }
        if !self.recipient_variables.is_empty() {
            payload.add(
                "recipient-variables",
                serde_json::to_string(&self.recipient_variables)?,
            );
        }

        if let Content::Mime { body } = &self.content {
            payload.files.push(FilePart::from_buffer(
                "message",
                "message.mime".to_string(),
                body.clone(),
            ));
        }
        payload.files.extend(self.attachments.iter().cloned());
        payload.files.extend(self.inlines.iter().cloned());

        Ok(payload)
    }
}
