use crate::acquire::{acquire_blocking, AcquireError, PollPolicy, SystemClock};
use crate::client::{ClientError, ImapMailClient, MailClient};
use crate::materialize::Materializer;
use crate::models::{MailboxCredentials, MessageField, MessageQuery, MessageRecord};
use tokio::task;
use tracing::info;

/// Mailbox façade binding credentials at construction. Each method drives
/// the blocking acquisition core on a worker thread via `spawn_blocking`, so
/// async callers are not pinned for the length of the poll.
#[derive(Debug, Clone)]
pub struct Inbox {
    client: ImapMailClient,
    policy: PollPolicy,
}

impl Inbox {
    pub fn new(credentials: MailboxCredentials) -> Self {
        Self {
            client: ImapMailClient::new(credentials),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn credentials(&self) -> &MailboxCredentials {
        self.client.credentials()
    }

    /// Waits for at least one message matching the query and returns the
    /// full listing in arrival order.
    pub async fn acquire(&self, query: MessageQuery) -> Result<Vec<MessageRecord>, AcquireError> {
        let client = self.client.clone();
        let policy = self.policy;
        task::spawn_blocking(move || acquire_blocking(&client, &query, policy, &SystemClock))
            .await
            .map_err(join_failure)?
    }

    /// Waits for a matching message and returns its body. First match wins.
    pub async fn acquire_content(&self, query: MessageQuery) -> Result<String, AcquireError> {
        let messages = self.acquire(query).await?;
        Ok(messages[0].content().unwrap_or_default().to_string())
    }

    /// Waits for a matching message, materializes it into the given
    /// workspace and returns the `file://` URI for the browser layer.
    pub async fn acquire_to_uri(
        &self,
        query: MessageQuery,
        materializer: Materializer,
    ) -> Result<String, AcquireError> {
        info!(query = %query, "acquiring and saving email");
        let client = self.client.clone();
        let policy = self.policy;
        task::spawn_blocking(move || {
            acquire_to_uri_blocking(&client, &query, policy, &materializer)
        })
        .await
        .map_err(join_failure)?
    }

    /// Deletes everything in the mailbox; used between test scenarios to
    /// guarantee a clean baseline. Returns how many messages were removed.
    pub async fn clear(&self) -> Result<usize, AcquireError> {
        let client = self.client.clone();
        let removed = task::spawn_blocking(move || client.purge())
            .await
            .map_err(join_failure)??;
        Ok(removed)
    }
}

/// Blocking composition of acquire and materialize, usable without a runtime
/// and with any [`MailClient`] implementation.
pub fn acquire_to_uri_blocking<M>(
    client: &M,
    query: &MessageQuery,
    policy: PollPolicy,
    materializer: &Materializer,
) -> Result<String, AcquireError>
where
    M: MailClient + ?Sized,
{
    let messages = acquire_blocking(client, query, policy, &SystemClock)?;
    let artifact = materializer.materialize(&messages[0])?;
    Ok(artifact.uri)
}

/// Convenience for the most common wait: a message whose subject contains
/// the given key, with default timing.
pub async fn wait_for_subject(
    credentials: MailboxCredentials,
    subject_key: impl Into<String>,
) -> Result<MessageRecord, AcquireError> {
    let inbox = Inbox::new(credentials);
    let query = MessageQuery::matching(MessageField::Subject, subject_key);
    let mut messages = inbox.acquire(query).await?;
    Ok(messages.remove(0))
}

fn join_failure(err: task::JoinError) -> AcquireError {
    AcquireError::Client(ClientError::Other(format!("background task failure: {err}")))
}
