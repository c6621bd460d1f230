//! Module dedicated to the IMAP configuration.
//!
//! This module contains the connection settings of the monitored
//! mailbox, and the fallback policy applied when the primary
//! connection cannot be established.

use std::fmt;

use super::FALLBACK_PORT;

/// The IMAP configuration.
#[derive(Clone, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct ImapConfig {
    /// The IMAP server host name.
    pub host: String,

    /// The IMAP server host port.
    pub port: u16,

    /// The IMAP encryption protocol to use.
    ///
    /// Supported encryption: SSL/TLS, STARTTLS or none.
    #[cfg_attr(feature = "derive", serde(default))]
    pub encryption: Option<ImapEncryptionKind>,

    /// The IMAP server login.
    ///
    /// Usually, the login is either the email address or its left
    /// part (before @).
    pub login: String,

    /// The IMAP server password.
    #[cfg_attr(feature = "derive", serde(alias = "password"))]
    pub passwd: String,
}

impl ImapConfig {
    /// Build the configuration of the fallback connection attempt.
    ///
    /// The fallback targets the same host on the plaintext IMAP port,
    /// without implicit TLS: the session starts in clear then gets
    /// upgraded using STARTTLS. Credentials are never sent in clear,
    /// so a server that does not offer STARTTLS on this port fails
    /// the fallback too.
    pub fn fallback(&self) -> Self {
        Self {
            port: FALLBACK_PORT,
            encryption: Some(ImapEncryptionKind::StartTls),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("login", &self.login)
            .field("passwd", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum ImapEncryptionKind {
    #[default]
    #[cfg_attr(feature = "derive", serde(alias = "ssl"))]
    Tls,
    #[cfg_attr(feature = "derive", serde(alias = "starttls"))]
    StartTls,
    None,
}

impl fmt::Display for ImapEncryptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "SSL/TLS"),
            Self::StartTls => write!(f, "StartTLS"),
            Self::None => write!(f, "None"),
        }
    }
}

impl From<bool> for ImapEncryptionKind {
    fn from(value: bool) -> Self {
        if value {
            Self::Tls
        } else {
            Self::None
        }
    }
}
