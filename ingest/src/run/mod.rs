//! # Run
//!
//! Module dedicated to the ingestion runs. Batch runs ([`fetch`] and
//! [`backfill`]) never fail: their per-item failures are aggregated
//! into a [`RunSummary`]. On-demand operations ([`download`] and
//! [`parse`]) return typed errors instead.
//!
//! The [`Ingestor`] bundles the configuration, the connector and the
//! store so that callers do not have to thread them through every
//! call.

pub mod backfill;
pub mod download;
pub mod fetch;
pub mod parse;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::IngestConfig,
    imap::{MailboxConnector, MailboxSession, MessageSummary},
    mime::{self, AttachmentPart},
    store::{self, AttachmentMeta, RawEmailUpdate, Store},
    writer, Result,
};

#[doc(inline)]
pub use self::{download::DownloadedAttachment, parse::ReportWithRecords};

/// The number of messages looked at by a refresh.
pub const DEFAULT_FETCH_LIMIT: u32 = 10;

/// The number of unparsed raw emails reprocessed by a backfill.
pub const DEFAULT_BACKFILL_LIMIT: u32 = 50;

/// The outcome of a batch run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "derive", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    pub fetched: usize,
    pub saved: usize,
    pub errors: usize,
    pub notes: Vec<String>,
}

impl RunSummary {
    /// Record a note that does not count as an error.
    pub fn note(&mut self, note: impl ToString) {
        let note = note.to_string();
        debug!(note, "run note");
        self.notes.push(note);
    }

    /// Record a failure, counted as an error.
    pub fn fail(&mut self, note: impl ToString) {
        let note = note.to_string();
        warn!(note, "run error");
        self.errors += 1;
        self.notes.push(note);
    }
}

/// The ingestion entry point.
#[derive(Clone)]
pub struct Ingestor {
    config: IngestConfig,
    connector: Arc<dyn MailboxConnector>,
    store: Arc<dyn Store>,
}

impl Ingestor {
    pub fn new(
        config: IngestConfig,
        connector: impl MailboxConnector + 'static,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            store,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Ingest the `limit` most recent messages of the mailbox.
    pub async fn fetch(&self, limit: u32) -> RunSummary {
        fetch::fetch(&self.config, self.connector.as_ref(), self.store(), limit).await
    }

    /// Reprocess up to `limit` unparsed raw emails.
    pub async fn backfill(&self, limit: u32) -> RunSummary {
        backfill::backfill(&self.config, self.connector.as_ref(), self.store(), limit).await
    }

    /// Download the attachment of the given message.
    pub async fn download_attachment(
        &self,
        uid: u32,
        filename: &str,
    ) -> Result<DownloadedAttachment> {
        download::download_attachment(&self.config, self.connector.as_ref(), uid, filename).await
    }

    /// Download the attachment of the given raw email, bounded by the
    /// configured size limit.
    pub async fn download_raw_email_attachment(
        &self,
        raw_email_id: &str,
        filename: &str,
    ) -> Result<DownloadedAttachment> {
        download::download_raw_email_attachment(
            &self.config,
            self.connector.as_ref(),
            self.store(),
            raw_email_id,
            filename,
        )
        .await
    }

    /// Parse then persist the given DMARC XML document.
    pub async fn ingest_xml(&self, xml: &str) -> Result<ReportWithRecords> {
        parse::ingest_xml(self.store(), xml).await
    }

    /// Read the given report along with its records.
    pub async fn report_with_records(&self, id: &str) -> Result<ReportWithRecords> {
        parse::report_with_records(self.store(), id).await
    }
}

/// Process the attachments of one message linked to the given raw
/// email, and build the final state of the raw email.
///
/// Attachment failures are scoped to their attachment: they end up
/// in the returned `error` and in `notes`. Only persistence failures
/// abort the message.
pub(crate) async fn process_attachments(
    session: &mut dyn MailboxSession,
    store: &dyn Store,
    msg: &MessageSummary,
    raw_email_id: &str,
    notes: &mut Vec<String>,
) -> store::Result<RawEmailUpdate> {
    let attachments = mime::attachments(msg.body_structure.as_ref());
    let mut update = RawEmailUpdate {
        attachments: attachments.iter().map(AttachmentMeta::from).collect(),
        ..Default::default()
    };

    for attachment in attachments.iter().filter(|a| a.is_relevant()) {
        let payloads = match materialize(session, msg.uid, attachment).await {
            Ok(payloads) => payloads,
            Err(err) => {
                let err = format!("{}: {err}", attachment.filename);
                notes.push(format!("uid {}: {err}", msg.uid));
                update.error = Some(err);
                continue;
            }
        };

        if payloads.is_empty() {
            notes.push(format!(
                "uid {}: {}: no xml report found",
                msg.uid, attachment.filename
            ));
        }

        for xml in payloads {
            let parsed = match dmarc::parse(&xml) {
                Ok(parsed) => parsed,
                Err(err) => {
                    let err = format!("{}: {err}", attachment.filename);
                    notes.push(format!("uid {}: {err}", msg.uid));
                    update.error = Some(err);
                    continue;
                }
            };

            let report = writer::persist(store, &parsed, Some(raw_email_id)).await?;
            info!(
                uid = msg.uid,
                report_id = report.report_id,
                org = report.org,
                "dmarc report ingested"
            );
            update.parsed = true;
        }
    }

    Ok(update)
}

/// Fetch, decode then expand one attachment into XML payloads.
async fn materialize(
    session: &mut dyn MailboxSession,
    uid: u32,
    attachment: &AttachmentPart,
) -> Result<Vec<String>> {
    let (Some(part), Some(kind)) = (attachment.part.as_deref(), attachment.kind) else {
        return Ok(Vec::new());
    };

    let raw = session.fetch_part(uid, part).await?;
    let bytes = mime::decode_part(raw, attachment.encoding.as_deref());
    Ok(dmarc::expand(bytes, kind)?)
}

impl From<&AttachmentPart> for AttachmentMeta {
    fn from(attachment: &AttachmentPart) -> Self {
        Self {
            filename: attachment.filename.clone(),
            mime: attachment.mime.clone(),
            size_bytes: attachment.size as u64,
        }
    }
}
