//! Rust library to ingest DMARC aggregate reports from an IMAP
//! mailbox.
//!
//! Reports arrive as mail attachments: plain XML, gzip-compressed
//! XML or zip archives. The library connects to the mailbox, walks
//! the MIME structure of recent messages, downloads the relevant
//! attachments, expands then parses them using the [`dmarc`]
//! library, and persists the results through a [`Store`].
//!
//! The main entry point is the [`Ingestor`]:
//!
//! - [`Ingestor::fetch`] ingests the most recent messages,
//! - [`Ingestor::backfill`] reprocesses unparsed raw emails,
//! - [`Ingestor::download_raw_email_attachment`] serves one
//! attachment as is,
//! - [`Ingestor::ingest_xml`] persists a report submitted as XML.
//!
//! Batch runs always complete and return a [`RunSummary`]; only a
//! connection failure cuts them short.

pub mod config;
pub mod dedup;
mod error;
pub mod imap;
pub mod mime;
pub mod run;
pub mod store;
pub mod writer;

#[doc(inline)]
pub use self::{
    config::IngestConfig,
    error::{Error, Result},
    run::{
        DownloadedAttachment, Ingestor, ReportWithRecords, RunSummary, DEFAULT_BACKFILL_LIMIT,
        DEFAULT_FETCH_LIMIT,
    },
    store::{MemoryStore, Store},
};
