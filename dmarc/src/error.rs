//! # Error
//!
//! Module dedicated to DMARC errors. It contains an [`Error`] enum
//! based on [`thiserror::Error`] and a type alias [`Result`].

use std::{io, string::FromUtf8Error};

use thiserror::Error;
use zip::result::ZipError;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot parse DMARC aggregate report")]
    ParseReportError(#[source] serde_xml_rs::Error),

    #[error("cannot decompress gzip payload")]
    DecompressGzipError(#[source] io::Error),
    #[error("cannot open zip archive")]
    OpenZipArchiveError(#[source] ZipError),
    #[error("cannot open zip archive entry at index {1}")]
    OpenZipEntryError(#[source] ZipError, usize),
    #[error("cannot read zip archive entry {1}")]
    ReadZipEntryError(#[source] io::Error, String),
    #[error("cannot decode {1} as UTF-8")]
    DecodeUtf8Error(#[source] FromUtf8Error, String),
}

impl Error {
    /// Return `true` if the error comes from the XML report parser.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::ParseReportError(_))
    }

    /// Return `true` if the error comes from unpacking an attachment.
    pub fn is_decompress_error(&self) -> bool {
        !self.is_parse_error()
    }
}
