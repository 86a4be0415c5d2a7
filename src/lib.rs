//! Wait for an expected email, then hand its HTML body to a browser.
//!
//! `mailwait` is the mailbox half of an end-to-end test harness: it polls a
//! remote mailbox under a bounded-time retry policy until a message matching
//! the caller's query arrives, writes the message body into a local
//! workspace, and returns a `file://` URI a browser-driving layer can
//! navigate to.
//!
//! ```no_run
//! use mailwait::{
//!     Inbox, MailboxCredentials, Materializer, MessageField, MessageQuery, Workspace,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = MailboxCredentials::ssl("imap.example.com", "qa@example.com", "secret");
//!     let inbox = Inbox::new(credentials);
//!     inbox.clear().await?;
//!
//!     // ... trigger the flow that sends the email ...
//!
//!     let materializer = Materializer::new(Workspace::create("inbox")?);
//!     let uri = inbox
//!         .acquire_to_uri(
//!             MessageQuery::matching(MessageField::Subject, "Reset Password"),
//!             materializer,
//!         )
//!         .await?;
//!     // hand `uri` to the browser driver
//!     println!("{uri}");
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod client;
pub mod inbox;
pub mod materialize;
pub mod models;

pub use acquire::{acquire_blocking, AcquireError, Clock, PollPolicy, SystemClock};
pub use client::{ClientError, ImapMailClient, MailClient};
pub use inbox::{acquire_to_uri_blocking, wait_for_subject, Inbox};
pub use materialize::{
    file_uri, MaterializeError, MaterializedArtifact, Materializer, ScanMode, Workspace,
};
pub use models::{
    Attachment, MailboxCredentials, MessageField, MessageQuery, MessageRecord, SecurityMode,
};
