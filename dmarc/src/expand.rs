//! # Expand
//!
//! Module dedicated to attachment unpacking. Reporters send XML
//! documents either as is, gzip-compressed or zipped, and this
//! module turns those bytes back into XML text.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::{Error, Result};

/// The kind of container an aggregate report is shipped in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveKind {
    Xml,
    Gzip,
    Zip,
}

impl ArchiveKind {
    /// Guess the archive kind from an attachment filename and MIME
    /// type.
    ///
    /// Filename suffixes are checked first, then substrings of both
    /// the MIME type and the filename. Returns `None` when the
    /// attachment does not look like a report at all.
    pub fn detect(filename: impl AsRef<str>, mime: impl AsRef<str>) -> Option<Self> {
        let filename = filename.as_ref().to_lowercase();
        let mime = mime.as_ref().to_lowercase();

        if filename.ends_with(".zip") {
            return Some(Self::Zip);
        }

        if filename.ends_with(".gz") || filename.ends_with(".gzip") {
            return Some(Self::Gzip);
        }

        if filename.ends_with(".xml") {
            return Some(Self::Xml);
        }

        // gzip must be checked before zip, since "gzip" contains "zip"
        if mime.contains("gzip") || filename.contains(".gz") {
            return Some(Self::Gzip);
        }

        if mime.contains("zip") || filename.contains(".zip") {
            return Some(Self::Zip);
        }

        if mime.contains("xml") || filename.contains(".xml") {
            return Some(Self::Xml);
        }

        None
    }
}

/// Expand the given attachment bytes into XML documents.
///
/// Plain XML and gzip payloads always produce exactly one document.
/// Zip archives produce one document per `.xml` entry, possibly
/// none.
pub fn expand(bytes: impl AsRef<[u8]>, kind: ArchiveKind) -> Result<Vec<String>> {
    let bytes = bytes.as_ref();
    debug!(?kind, len = bytes.len(), "expand attachment");

    match kind {
        ArchiveKind::Xml => Ok(vec![decode_utf8(bytes.to_vec(), "xml payload")?]),
        ArchiveKind::Gzip => {
            let mut buf = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut buf)
                .map_err(Error::DecompressGzipError)?;
            Ok(vec![decode_utf8(buf, "gzip payload")?])
        }
        ArchiveKind::Zip => expand_zip(bytes),
    }
}

fn expand_zip(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(Error::OpenZipArchiveError)?;
    let mut payloads = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| Error::OpenZipEntryError(err, i))?;
        let name = entry.name().to_owned();

        if entry.is_dir() || !name.to_lowercase().ends_with(".xml") {
            debug!(name, "skip non-xml zip entry");
            continue;
        }

        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|err| Error::ReadZipEntryError(err, name.clone()))?;
        payloads.push(decode_utf8(buf, &name)?);
    }

    debug!(count = payloads.len(), "expanded zip archive");
    Ok(payloads)
}

fn decode_utf8(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|err| Error::DecodeUtf8Error(err, what.to_owned()))
}
