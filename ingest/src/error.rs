use std::result;

use thiserror::Error;

use crate::{imap, store};

/// The global `Result` alias of the library.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the library.
///
/// Batch runs never fail with this error: their failures end up in
/// the run summary. It is returned by the on-demand operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find raw email {0}")]
    RawEmailNotFoundError(String),
    #[error("cannot download attachment of raw email {0}: no IMAP UID recorded")]
    DownloadNotImplementedError(String),
    #[error("cannot find IMAP message {0}")]
    MessageNotFoundError(u32),
    #[error("cannot find attachment {1} in IMAP message {0}")]
    AttachmentNotFoundError(u32, String),
    #[error("cannot download attachment {0}: {1} bytes exceed the limit of {2} bytes")]
    AttachmentTooLargeError(String, u64, u64),
    #[error("cannot find dmarc report {0}")]
    ReportNotFoundError(String),

    #[error(transparent)]
    ImapError(#[from] imap::Error),
    #[error(transparent)]
    StoreError(#[from] store::Error),
    #[error(transparent)]
    DmarcError(#[from] dmarc::Error),
}

impl Error {
    /// Whether the error means that something the caller asked for
    /// does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RawEmailNotFoundError(_)
                | Self::MessageNotFoundError(_)
                | Self::AttachmentNotFoundError(..)
                | Self::ReportNotFoundError(_)
        )
    }
}
