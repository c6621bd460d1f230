//! # Store
//!
//! Module dedicated to persistence. The ingestion only relies on the
//! [`Store`] trait; [`MemoryStore`] is the in-memory implementation.
//!
//! Every operation is atomic on its own. Nothing spans more than one
//! operation, so a report can be observed between its creation and
//! its link to a raw email.

pub mod memory;

use std::result;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dmarc::{ParsedAggregateReport, ParsedRecord};
use thiserror::Error;

#[doc(inline)]
pub use self::memory::MemoryStore;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find raw email {0}")]
    RawEmailNotFoundError(String),
    #[error("cannot find dmarc report {0}")]
    ReportNotFoundError(String),
    #[error("store unavailable: {0}")]
    UnavailableError(String),
    #[error("cannot link dmarc report {1} to raw email {2}, report left unlinked")]
    LinkReportError(#[source] Box<Error>, String, String),
}

/// Where a raw email comes from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum RawEmailSource {
    #[default]
    Fetch,
    Seed,
}

/// The metadata of an attachment of a raw email.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime: String,
    pub size_bytes: u64,
}

/// One ingested mail message.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct RawEmail {
    pub id: String,
    pub source: RawEmailSource,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
    /// The UID of the message, only unique within its mailbox.
    pub imap_uid: Option<u32>,
    pub message_id: Option<String>,
    pub parsed: bool,
    pub attachments: Vec<AttachmentMeta>,
    /// The last parse error.
    pub error: Option<String>,
}

/// The attributes of a raw email to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewRawEmail {
    pub source: RawEmailSource,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
    pub imap_uid: Option<u32>,
    pub message_id: Option<String>,
}

/// The final state of a processed raw email.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawEmailUpdate {
    pub attachments: Vec<AttachmentMeta>,
    pub parsed: bool,
    pub error: Option<String>,
}

/// One persisted aggregate report.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct DmarcReport {
    pub id: String,
    pub raw_email_id: Option<String>,
    pub org: String,
    pub report_id: String,
    pub domain: String,
    pub date_begin: i64,
    pub date_end: i64,
    pub policy_adkim: Option<String>,
    pub policy_aspf: Option<String>,
    pub policy_p: Option<String>,
}

/// The attributes of a report to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewDmarcReport {
    pub org: String,
    pub report_id: String,
    pub domain: String,
    pub date_begin: i64,
    pub date_end: i64,
    pub policy_adkim: Option<String>,
    pub policy_aspf: Option<String>,
    pub policy_p: Option<String>,
}

impl From<&ParsedAggregateReport> for NewDmarcReport {
    fn from(report: &ParsedAggregateReport) -> Self {
        Self {
            org: report.metadata.org.clone(),
            report_id: report.metadata.report_id.clone(),
            domain: report.policy.domain.clone(),
            date_begin: report.metadata.date_begin,
            date_end: report.metadata.date_end,
            policy_adkim: report.policy.adkim.clone(),
            policy_aspf: report.policy.aspf.clone(),
            policy_p: report.policy.p.clone(),
        }
    }
}

/// One persisted report record.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct DmarcRecord {
    pub id: String,
    /// The id of the owning [`DmarcReport`].
    pub report_id: String,
    pub source_ip: String,
    pub count: u64,
    pub disposition: String,
    pub dkim: String,
    pub spf: String,
    pub header_from: String,
    pub auth_dkim: Option<String>,
    pub auth_spf: Option<String>,
}

/// The attributes of a record to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewDmarcRecord {
    pub report_id: String,
    pub source_ip: String,
    pub count: u64,
    pub disposition: String,
    pub dkim: String,
    pub spf: String,
    pub header_from: String,
    pub auth_dkim: Option<String>,
    pub auth_spf: Option<String>,
}

impl NewDmarcRecord {
    pub fn new(report_id: impl ToString, record: &ParsedRecord) -> Self {
        Self {
            report_id: report_id.to_string(),
            source_ip: record.source_ip.clone(),
            count: record.count,
            disposition: record.disposition.clone(),
            dkim: record.dkim.clone(),
            spf: record.spf.clone(),
            header_from: record.header_from.clone(),
            auth_dkim: record.auth_dkim.clone(),
            auth_spf: record.auth_spf.clone(),
        }
    }
}

/// The persistence operations the ingestion relies on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_raw_email(&self, email: NewRawEmail) -> Result<RawEmail>;

    async fn find_raw_email(&self, id: &str) -> Result<Option<RawEmail>>;

    async fn find_raw_email_by_message_id(&self, message_id: &str) -> Result<Option<RawEmail>>;

    async fn find_raw_email_by_imap_uid(&self, uid: u32) -> Result<Option<RawEmail>>;

    /// List unparsed raw emails having an IMAP UID, most recently
    /// received first.
    async fn list_unparsed_raw_emails(&self, limit: usize) -> Result<Vec<RawEmail>>;

    async fn update_raw_email(&self, id: &str, update: RawEmailUpdate) -> Result<RawEmail>;

    async fn create_report(&self, report: NewDmarcReport) -> Result<DmarcReport>;

    /// Set the raw email a report was extracted from.
    async fn link_report(&self, id: &str, raw_email_id: &str) -> Result<DmarcReport>;

    async fn find_report(&self, id: &str) -> Result<Option<DmarcReport>>;

    /// List the reports extracted from the given raw email, in
    /// creation order.
    async fn list_reports(&self, raw_email_id: &str) -> Result<Vec<DmarcReport>>;

    async fn create_record(&self, record: NewDmarcRecord) -> Result<DmarcRecord>;

    /// List the records of the given report, in creation order.
    async fn list_records(&self, report_id: &str) -> Result<Vec<DmarcRecord>>;
}
