use std::result;

use imap_client::ClientError;
use thiserror::Error;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to IMAP server {1}:{2} using TCP")]
    BuildInsecureClientError(#[source] ClientError, String, u16),
    #[error("cannot connect to IMAP server {1}:{2} using STARTTLS")]
    BuildStartTlsClientError(#[source] ClientError, String, u16),
    #[error("cannot connect to IMAP server {1}:{2} using SSL/TLS")]
    BuildTlsClientError(#[source] ClientError, String, u16),
    #[error("cannot connect to IMAP server {0}:{1}: connection timed out")]
    BuildClientTimedOutError(String, u16),
    #[error("cannot connect to IMAP server {host}: fallback on port {fallback_port} failed too")]
    ConnectWithFallbackError {
        host: String,
        fallback_port: u16,
        primary: Box<Error>,
        #[source]
        fallback: Box<Error>,
    },

    #[error("cannot authenticate to IMAP server using LOGIN mechanism")]
    LoginError(#[source] ClientError),
    #[error("cannot authenticate to IMAP server: login not supported")]
    LoginNotSupportedError,
    #[error("cannot authenticate to IMAP server: request timed out")]
    AuthenticateTimedOutError,

    #[error("cannot select IMAP mailbox {1}")]
    SelectMailboxError(#[source] ClientError, String),
    #[error("cannot select IMAP mailbox {0}: request timed out")]
    SelectMailboxTimedOutError(String),

    #[error("cannot parse IMAP UID set {0}")]
    ParseUidSetError(String),
    #[error("cannot parse IMAP body part {0}")]
    ParsePartError(String),
    #[error("cannot fetch IMAP messages {1}")]
    FetchMessagesError(#[source] ClientError, String),
    #[error("cannot fetch IMAP messages {0}: request timed out")]
    FetchMessagesTimedOutError(String),
    #[error("cannot fetch body part {1} of IMAP message {0}: part is empty")]
    FetchPartEmptyError(u32, String),

    #[error("cannot logout from IMAP server")]
    LogoutError(#[source] ClientError),
    #[error("cannot logout from IMAP server: request timed out")]
    LogoutTimedOutError,
}
