//! Rust library to read DMARC aggregate reports.
//!
//! Aggregate reports are periodic XML documents sent by mail
//! receivers, describing authentication results for the outbound mail
//! of a domain. Reporters ship them as plain XML, as gzip-compressed
//! XML or as zip archives holding one or more XML files.
//!
//! This library exposes two pure building blocks:
//!
//! 1. [`expand`] turns the raw bytes of an attachment into one or
//! more XML documents, according to its [`ArchiveKind`].
//!
//! 2. [`parse`] turns one XML document into a typed
//! [`ParsedAggregateReport`].

pub mod error;
pub mod expand;
pub mod report;

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    expand::{expand, ArchiveKind},
    report::{parse, ParsedAggregateReport, ParsedRecord, PolicyPublished, ReportMetadata},
};
