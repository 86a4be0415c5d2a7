use crate::client::{ClientError, MailClient};
use crate::models::{
    Attachment, MailboxCredentials, MessageField, MessageQuery, MessageRecord, SecurityMode,
};
use ::imap::types::Fetch;
use ::imap::Session;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use native_tls::{TlsConnector, TlsStream};
use std::io::{Read, Write};
use std::net::TcpStream;
use tracing::{debug, info};

const FETCH_ITEMS: &str = "(RFC822 INTERNALDATE UID)";

/// Blocking IMAP-backed mail client. Every `list` and `purge` call opens a
/// fresh session against the mailbox and logs out before returning, so a
/// long poll never leans on a stale half-open connection.
#[derive(Debug, Clone)]
pub struct ImapMailClient {
    credentials: MailboxCredentials,
}

impl ImapMailClient {
    pub fn new(credentials: MailboxCredentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &MailboxCredentials {
        &self.credentials
    }

    fn login_tls(&self) -> Result<Session<TlsStream<TcpStream>>, ClientError> {
        let host = self.credentials.host.as_str();
        let addr = (host, self.credentials.port);
        let tls = TlsConnector::builder()
            .build()
            .map_err(|err| ClientError::Connection(err.to_string()))?;
        let client = match self.credentials.security {
            SecurityMode::Ssl => ::imap::connect(addr, host, &tls)
                .map_err(|err| ClientError::Connection(err.to_string()))?,
            SecurityMode::StartTls => ::imap::connect_starttls(addr, host, &tls)
                .map_err(|err| ClientError::Connection(err.to_string()))?,
            SecurityMode::Plain => {
                return Err(ClientError::Connection(
                    "plain session requested through TLS path".into(),
                ))
            }
        };
        match client.login(&self.credentials.account, &self.credentials.secret) {
            Ok(session) => Ok(session),
            Err((err, _client)) => Err(ClientError::Authentication(err.to_string())),
        }
    }

    fn login_plain(&self) -> Result<Session<TcpStream>, ClientError> {
        let stream = TcpStream::connect((self.credentials.host.as_str(), self.credentials.port))?;
        let mut client = ::imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|err| ClientError::Connection(err.to_string()))?;
        match client.login(&self.credentials.account, &self.credentials.secret) {
            Ok(session) => Ok(session),
            Err((err, _client)) => Err(ClientError::Authentication(err.to_string())),
        }
    }
}

impl MailClient for ImapMailClient {
    fn list(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>, ClientError> {
        debug!(
            account = %self.credentials.account,
            security = %self.credentials.security,
            query = %query,
            "opening mailbox session"
        );
        match self.credentials.security {
            SecurityMode::Plain => {
                let mut session = self.login_plain()?;
                let records = list_in_session(&mut session, &self.credentials.account, query);
                session.logout()?;
                records
            }
            SecurityMode::Ssl | SecurityMode::StartTls => {
                let mut session = self.login_tls()?;
                let records = list_in_session(&mut session, &self.credentials.account, query);
                session.logout()?;
                records
            }
        }
    }

    fn purge(&self) -> Result<usize, ClientError> {
        info!(account = %self.credentials.account, "flushing mailbox");
        match self.credentials.security {
            SecurityMode::Plain => {
                let mut session = self.login_plain()?;
                let removed = purge_in_session(&mut session);
                session.logout()?;
                removed
            }
            SecurityMode::Ssl | SecurityMode::StartTls => {
                let mut session = self.login_tls()?;
                let removed = purge_in_session(&mut session);
                session.logout()?;
                removed
            }
        }
    }
}

fn list_in_session<S: Read + Write>(
    session: &mut Session<S>,
    account: &str,
    query: &MessageQuery,
) -> Result<Vec<MessageRecord>, ClientError> {
    session.select("INBOX")?;

    let criterion = search_criterion(query);
    let mut uids: Vec<u32> = session.uid_search(&criterion)?.into_iter().collect();
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    uids.sort_unstable();

    let sequence = uids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let fetches = session.uid_fetch(&sequence, FETCH_ITEMS)?;

    let mut records = Vec::with_capacity(fetches.len());
    for item in fetches.iter() {
        if let Some(record) = record_from_fetch(item)? {
            records.push(record);
        }
    }

    debug!(
        account = %account,
        criterion = %criterion,
        count = records.len(),
        "mailbox listed"
    );
    Ok(records)
}

fn purge_in_session<S: Read + Write>(session: &mut Session<S>) -> Result<usize, ClientError> {
    session.select("INBOX")?;

    let uids: Vec<u32> = session.uid_search("ALL")?.into_iter().collect();
    if uids.is_empty() {
        return Ok(0);
    }

    let sequence = uids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    session.uid_store(&sequence, "+FLAGS (\\Deleted)")?;
    session.expunge()?;

    info!(removed = uids.len(), "mailbox purged");
    Ok(uids.len())
}

/// Translates a query into an IMAP SEARCH criterion. Matching happens on the
/// server; the polling layer never re-filters the result.
fn search_criterion(query: &MessageQuery) -> String {
    match query.filter() {
        None => "ALL".to_string(),
        Some((MessageField::Subject, key)) => format!("SUBJECT \"{}\"", escape_key(key)),
        Some((MessageField::Sender, key)) => format!("FROM \"{}\"", escape_key(key)),
        Some((MessageField::Content, key)) => format!("TEXT \"{}\"", escape_key(key)),
        // Expects an IMAP date such as 12-Aug-2026.
        Some((MessageField::Date, key)) => format!("ON {}", key.trim()),
    }
}

fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('"', "\\\"")
}

fn record_from_fetch(fetch: &Fetch) -> Result<Option<MessageRecord>, ClientError> {
    let raw = match fetch.body() {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let mail = mailparse::parse_mail(raw)?;

    let mut record = MessageRecord::new();
    if let Some(subject) = mail.headers.get_first_value("Subject") {
        record = record.with_field(MessageField::Subject, subject);
    }
    if let Some(sender) = mail.headers.get_first_value("From") {
        record = record.with_field(MessageField::Sender, sender);
    }
    let date = fetch
        .internal_date()
        .map(|dt| dt.to_rfc2822())
        .or_else(|| mail.headers.get_first_value("Date"));
    if let Some(date) = date {
        record = record.with_field(MessageField::Date, date);
    }

    let body = body_of_type(&mail, "text/html")
        .or_else(|| body_of_type(&mail, "text/plain"))
        .unwrap_or_default();
    record = record.with_field(MessageField::Content, body);

    let mut attachments = Vec::new();
    collect_attachments(&mail, &mut attachments)?;
    for attachment in attachments {
        record = record.with_attachment(attachment);
    }

    Ok(Some(record))
}

fn body_of_type(mail: &ParsedMail<'_>, mime: &str) -> Option<String> {
    if mail.ctype.mimetype.eq_ignore_ascii_case(mime) && !is_attachment(mail) {
        return mail.get_body().ok();
    }
    mail.subparts
        .iter()
        .find_map(|part| body_of_type(part, mime))
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
}

fn collect_attachments(
    mail: &ParsedMail<'_>,
    out: &mut Vec<Attachment>,
) -> Result<(), ClientError> {
    let disposition = mail.get_content_disposition();
    if disposition.disposition == DispositionType::Attachment {
        let filename = disposition
            .params
            .get("filename")
            .cloned()
            .unwrap_or_else(|| "attachment".to_string());
        out.push(Attachment {
            filename,
            bytes: mail.get_body_raw()?,
        });
    }
    for part in &mail.subparts {
        collect_attachments(part, out)?;
    }
    Ok(())
}
