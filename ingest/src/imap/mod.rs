//! # IMAP
//!
//! Module dedicated to the monitored mailbox. It defines the
//! [`MailboxConnector`] and [`MailboxSession`] seams, the connection
//! fallback policy and the scoped mailbox lock. The production
//! implementation lives in [`client`].

pub mod client;
pub mod config;
pub mod enumerate;
mod error;

use std::{
    fmt,
    ops::{Deref, DerefMut, RangeInclusive},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::mime::PartNode;

#[doc(inline)]
pub use self::{
    client::ImapClientConnector,
    config::{ImapConfig, ImapEncryptionKind},
    error::{Error, Result},
};

/// The mailbox watched for reports when none is configured.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// The port of the fallback connection attempt.
pub const FALLBACK_PORT: u16 = 143;

/// The timeout applied to every network operation.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

/// The mailbox status, as reported when selecting it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MailboxStatus {
    /// The number of messages in the mailbox.
    pub exists: u32,

    /// The UID the next delivered message will get.
    pub uid_next: Option<u32>,
}

impl MailboxStatus {
    /// The next UID, approximated from the message count when the
    /// server does not advertise it.
    pub fn uid_next(&self) -> u32 {
        self.uid_next
            .unwrap_or_else(|| self.exists.saturating_add(1))
    }
}

/// The metadata of one message, as needed by the ingestion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageSummary {
    pub uid: u32,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub internal_date: Option<DateTime<Utc>>,
    pub body_structure: Option<PartNode>,
}

/// An authenticated IMAP session.
#[async_trait]
pub trait MailboxSession: Send {
    /// Select the given mailbox and return its status.
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus>;

    /// Fetch the summaries of the messages in the given UID range.
    async fn fetch_range(&mut self, uids: RangeInclusive<u32>) -> Result<Vec<MessageSummary>>;

    /// Fetch the summary of the given UID, `None` if the server does
    /// not know it.
    async fn fetch_uid(&mut self, uid: u32) -> Result<Option<MessageSummary>>;

    /// Fetch the content of the given body part, still encoded with
    /// its content transfer encoding.
    async fn fetch_part(&mut self, uid: u32, part: &str) -> Result<Vec<u8>>;

    /// Log out from the server.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens authenticated IMAP sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self, config: &ImapConfig) -> Result<Box<dyn MailboxSession>>;
}

/// Connect to the IMAP server, falling back once on the plaintext
/// port.
///
/// When the primary attempt fails, exactly one more attempt is made
/// against the same host, on port [`FALLBACK_PORT`] using STARTTLS.
/// If both fail, the error holds the two causes.
pub async fn connect_with_fallback(
    connector: &dyn MailboxConnector,
    config: &ImapConfig,
) -> Result<Box<dyn MailboxSession>> {
    info!(host = config.host, port = config.port, "connect to imap server");

    let primary = match connector.connect(config).await {
        Ok(session) => return Ok(session),
        Err(err) => err,
    };

    let fallback = config.fallback();
    warn!(
        host = fallback.host,
        port = fallback.port,
        err = %primary,
        "primary imap connection failed, trying fallback",
    );

    connector
        .connect(&fallback)
        .await
        .map_err(|err| Error::ConnectWithFallbackError {
            host: config.host.clone(),
            fallback_port: fallback.port,
            primary: Box::new(primary),
            fallback: Box::new(err),
        })
}

/// A connected session with the monitored mailbox selected.
///
/// The session is only reachable through [`Mailbox::lock`], and must
/// be torn down using [`Mailbox::close`].
pub struct Mailbox {
    name: String,
    status: MailboxStatus,
    session: Mutex<Box<dyn MailboxSession>>,
}

impl Mailbox {
    /// Connect to the server then select the given mailbox.
    pub async fn open(
        connector: &dyn MailboxConnector,
        config: &ImapConfig,
        name: impl ToString,
    ) -> Result<Self> {
        let name = name.to_string();
        let mut session = connect_with_fallback(connector, config).await?;

        let status = match session.select(&name).await {
            Ok(status) => status,
            Err(err) => {
                logout(session.as_mut()).await;
                return Err(err);
            }
        };

        debug!(mailbox = name, ?status, "mailbox selected");

        Ok(Self {
            name,
            status,
            session: Mutex::new(session),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// Acquire the mailbox lock.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self) -> MailboxLock<'_> {
        let guard = self.session.lock().await;
        debug!(mailbox = self.name, "mailbox lock acquired");

        MailboxLock {
            mailbox: &self.name,
            guard,
        }
    }

    /// Tear the session down.
    ///
    /// Errors are logged then discarded.
    pub async fn close(self) {
        debug!(mailbox = self.name, "close mailbox session");
        let mut session = self.session.into_inner();
        logout(session.as_mut()).await;
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

async fn logout(session: &mut dyn MailboxSession) {
    if let Err(err) = session.logout().await {
        debug!("cannot logout from imap session: {err}");
        debug!("{err:?}");
    }
}

/// The scoped mailbox lock.
///
/// Gives exclusive access to the underlying session.
pub struct MailboxLock<'a> {
    mailbox: &'a str,
    guard: MutexGuard<'a, Box<dyn MailboxSession>>,
}

impl Deref for MailboxLock<'_> {
    type Target = dyn MailboxSession;

    fn deref(&self) -> &Self::Target {
        self.guard.as_ref()
    }
}

impl DerefMut for MailboxLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_mut()
    }
}

impl Drop for MailboxLock<'_> {
    fn drop(&mut self) {
        debug!(mailbox = self.mailbox, "mailbox lock released");
    }
}
