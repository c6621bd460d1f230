//! # Config
//!
//! Module dedicated to the ingestion configuration. The
//! configuration is built once by the caller, usually from the
//! environment, then passed explicitly to every run.

use std::{env, result};

use thiserror::Error;

use crate::imap::{ImapConfig, ImapEncryptionKind, DEFAULT_MAILBOX};

/// The default size limit of downloaded attachments (10 MiB).
pub const DEFAULT_ATTACHMENT_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// The default IMAP port, used with implicit TLS.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find environment variable {0}")]
    MissingVarError(&'static str),
    #[error("cannot parse environment variable {0}: invalid value {1}")]
    ParseVarError(&'static str, String),
}

/// The ingestion configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct IngestConfig {
    /// The IMAP configuration of the monitored mailbox.
    pub imap: ImapConfig,

    /// The mailbox holding the reports.
    #[cfg_attr(feature = "derive", serde(default = "default_mailbox"))]
    pub mailbox: String,

    /// The maximum size in bytes of an attachment served by the
    /// download path.
    #[cfg_attr(
        feature = "derive",
        serde(default = "default_attachment_size_limit")
    )]
    pub attachment_size_limit: u64,
}

#[cfg(feature = "derive")]
fn default_mailbox() -> String {
    DEFAULT_MAILBOX.to_owned()
}

#[cfg(feature = "derive")]
fn default_attachment_size_limit() -> u64 {
    DEFAULT_ATTACHMENT_SIZE_LIMIT
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            imap: ImapConfig::default(),
            mailbox: DEFAULT_MAILBOX.to_owned(),
            attachment_size_limit: DEFAULT_ATTACHMENT_SIZE_LIMIT,
        }
    }
}

impl IngestConfig {
    /// Build the configuration from the process environment.
    ///
    /// See [`IngestConfig::from_vars`] for the variables read.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from the given variable lookup.
    ///
    /// Reads `IMAP_HOST`, `IMAP_USER` and `IMAP_PASS` (required),
    /// `IMAP_PORT` (defaults to 993), `IMAP_TLS` (defaults to
    /// `true`), `IMAP_MAILBOX` (defaults to `INBOX`) and
    /// `ATTACHMENT_MAX_BYTES` (defaults to 10 MiB).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &'static str| {
            var(key)
                .filter(|val| !val.trim().is_empty())
                .ok_or(Error::MissingVarError(key))
        };

        let port = match var("IMAP_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| Error::ParseVarError("IMAP_PORT", port))?,
            None => DEFAULT_IMAP_PORT,
        };

        let tls = match var("IMAP_TLS") {
            Some(tls) => parse_bool(&tls).ok_or(Error::ParseVarError("IMAP_TLS", tls))?,
            None => true,
        };

        let attachment_size_limit = match var("ATTACHMENT_MAX_BYTES") {
            Some(limit) => limit
                .trim()
                .parse()
                .map_err(|_| Error::ParseVarError("ATTACHMENT_MAX_BYTES", limit))?,
            None => DEFAULT_ATTACHMENT_SIZE_LIMIT,
        };

        Ok(Self {
            imap: ImapConfig {
                host: required("IMAP_HOST")?,
                port,
                encryption: Some(ImapEncryptionKind::from(tls)),
                login: required("IMAP_USER")?,
                passwd: required("IMAP_PASS")?,
            },
            mailbox: var("IMAP_MAILBOX")
                .filter(|mailbox| !mailbox.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MAILBOX.to_owned()),
            attachment_size_limit,
        })
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
