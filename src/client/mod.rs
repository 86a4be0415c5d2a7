use crate::models::{MessageQuery, MessageRecord};
use ::imap::Error as ImapError;
use native_tls::Error as TlsError;
use thiserror::Error;

pub mod imap;

pub use imap::ImapMailClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("mailbox connection failed: {0}")]
    Connection(String),
    #[error("imap error: {0}")]
    Imap(String),
    #[error("malformed message: {0}")]
    Parse(String),
    #[error("unexpected client error: {0}")]
    Other(String),
}

impl From<std::io::Error> for ClientError {
    fn from(value: std::io::Error) -> Self {
        Self::Connection(value.to_string())
    }
}

impl From<TlsError> for ClientError {
    fn from(value: TlsError) -> Self {
        Self::Connection(value.to_string())
    }
}

impl From<ImapError> for ClientError {
    fn from(value: ImapError) -> Self {
        Self::Imap(value.to_string())
    }
}

impl From<mailparse::MailParseError> for ClientError {
    fn from(value: mailparse::MailParseError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Capability interface over mail retrieval. Each `list` call opens a fresh
/// mailbox session and returns the messages matching the query in listing
/// order; filter semantics live entirely behind this trait.
pub trait MailClient {
    fn list(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>, ClientError>;

    /// Deletes every message in the mailbox and returns how many were
    /// removed. Unconditional and irreversible.
    fn purge(&self) -> Result<usize, ClientError>;
}
