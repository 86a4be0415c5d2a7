use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    Plain,
    Ssl,
    StartTls,
}

impl SecurityMode {
    pub fn default_port(&self) -> u16 {
        match self {
            SecurityMode::Plain => 143,
            SecurityMode::Ssl => 993,
            SecurityMode::StartTls => 143,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SecurityMode::Plain => "plain",
            SecurityMode::Ssl => "SSL",
            SecurityMode::StartTls => "STARTTLS",
        }
    }
}

impl Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Connection parameters for one remote mailbox. Held by the caller for the
/// lifetime of an acquisition session; never persisted anywhere.
#[derive(Debug, Clone)]
pub struct MailboxCredentials {
    pub host: String,
    pub port: u16,
    pub security: SecurityMode,
    pub account: String,
    pub secret: String,
}

impl MailboxCredentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        security: SecurityMode,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            security,
            account: account.into(),
            secret: secret.into(),
        }
    }

    /// SSL credentials on the conventional port for the given host.
    pub fn ssl(
        host: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let security = SecurityMode::Ssl;
        Self::new(host, security.default_port(), security, account, secret)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageField {
    Subject,
    Sender,
    Date,
    Content,
}

impl MessageField {
    pub fn display_name(&self) -> &'static str {
        match self {
            MessageField::Subject => "subject",
            MessageField::Sender => "sender",
            MessageField::Date => "date",
            MessageField::Content => "content",
        }
    }
}

impl Display for MessageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What the caller is waiting for. An empty query passes everything the
/// mailbox currently holds; a filtered query is one (field, key) pair whose
/// matching semantics belong to the mail client, not to the polling layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageQuery {
    filter: Option<(MessageField, String)>,
}

impl MessageQuery {
    pub fn any() -> Self {
        Self { filter: None }
    }

    pub fn matching(field: MessageField, key: impl Into<String>) -> Self {
        Self {
            filter: Some((field, key.into())),
        }
    }

    pub fn filter(&self) -> Option<(&MessageField, &str)> {
        self.filter.as_ref().map(|(field, key)| (field, key.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none()
    }
}

impl Display for MessageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some((field, key)) => write!(f, "{field} -> {key}"),
            None => f.write_str("any message"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One retrieved email, as field/value pairs plus any decoded attachments.
/// Records handed out by a successful list always carry `Content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    fields: BTreeMap<MessageField, String>,
    attachments: Vec<Attachment>,
}

impl MessageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: MessageField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn get(&self, field: MessageField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(MessageField::Subject)
    }

    pub fn sender(&self) -> Option<&str> {
        self.get(MessageField::Sender)
    }

    pub fn content(&self) -> Option<&str> {
        self.get(MessageField::Content)
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
