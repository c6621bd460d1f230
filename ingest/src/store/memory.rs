//! Module dedicated to the in-memory store.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

use super::{
    DmarcRecord, DmarcReport, Error, NewDmarcRecord, NewDmarcReport, NewRawEmail, RawEmail,
    RawEmailUpdate, Result, Store,
};

#[derive(Debug, Default)]
struct Tables {
    raw_emails: Vec<RawEmail>,
    reports: Vec<DmarcReport>,
    records: Vec<DmarcRecord>,
}

/// The in-memory store.
///
/// Rows live in insertion order behind a single mutex, which makes
/// every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all the raw emails.
    pub async fn raw_emails(&self) -> Vec<RawEmail> {
        self.tables.lock().await.raw_emails.clone()
    }

    /// Return a snapshot of all the reports.
    pub async fn reports(&self) -> Vec<DmarcReport> {
        self.tables.lock().await.reports.clone()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_raw_email(&self, email: NewRawEmail) -> Result<RawEmail> {
        let email = RawEmail {
            id: new_id(),
            source: email.source,
            subject: email.subject,
            received_at: email.received_at,
            imap_uid: email.imap_uid,
            message_id: email.message_id,
            parsed: false,
            attachments: Vec::new(),
            error: None,
        };

        trace!(id = email.id, "insert raw email");
        self.tables.lock().await.raw_emails.push(email.clone());
        Ok(email)
    }

    async fn find_raw_email(&self, id: &str) -> Result<Option<RawEmail>> {
        let tables = self.tables.lock().await;
        Ok(tables.raw_emails.iter().find(|e| e.id == id).cloned())
    }

    async fn find_raw_email_by_message_id(&self, message_id: &str) -> Result<Option<RawEmail>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .raw_emails
            .iter()
            .find(|e| e.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn find_raw_email_by_imap_uid(&self, uid: u32) -> Result<Option<RawEmail>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .raw_emails
            .iter()
            .find(|e| e.imap_uid == Some(uid))
            .cloned())
    }

    async fn list_unparsed_raw_emails(&self, limit: usize) -> Result<Vec<RawEmail>> {
        let tables = self.tables.lock().await;

        let mut emails: Vec<_> = tables
            .raw_emails
            .iter()
            .filter(|e| !e.parsed && e.imap_uid.is_some())
            .cloned()
            .collect();

        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        emails.truncate(limit);

        Ok(emails)
    }

    async fn update_raw_email(&self, id: &str, update: RawEmailUpdate) -> Result<RawEmail> {
        let mut tables = self.tables.lock().await;

        let email = tables
            .raw_emails
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::RawEmailNotFoundError(id.to_owned()))?;

        email.attachments = update.attachments;
        email.parsed = update.parsed;
        email.error = update.error;

        trace!(id, parsed = email.parsed, "update raw email");
        Ok(email.clone())
    }

    async fn create_report(&self, report: NewDmarcReport) -> Result<DmarcReport> {
        let report = DmarcReport {
            id: new_id(),
            raw_email_id: None,
            org: report.org,
            report_id: report.report_id,
            domain: report.domain,
            date_begin: report.date_begin,
            date_end: report.date_end,
            policy_adkim: report.policy_adkim,
            policy_aspf: report.policy_aspf,
            policy_p: report.policy_p,
        };

        trace!(id = report.id, "insert dmarc report");
        self.tables.lock().await.reports.push(report.clone());
        Ok(report)
    }

    async fn link_report(&self, id: &str, raw_email_id: &str) -> Result<DmarcReport> {
        let mut tables = self.tables.lock().await;

        let report = tables
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::ReportNotFoundError(id.to_owned()))?;

        report.raw_email_id = Some(raw_email_id.to_owned());
        Ok(report.clone())
    }

    async fn find_report(&self, id: &str) -> Result<Option<DmarcReport>> {
        let tables = self.tables.lock().await;
        Ok(tables.reports.iter().find(|r| r.id == id).cloned())
    }

    async fn list_reports(&self, raw_email_id: &str) -> Result<Vec<DmarcReport>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reports
            .iter()
            .filter(|r| r.raw_email_id.as_deref() == Some(raw_email_id))
            .cloned()
            .collect())
    }

    async fn create_record(&self, record: NewDmarcRecord) -> Result<DmarcRecord> {
        let mut tables = self.tables.lock().await;

        if !tables.reports.iter().any(|r| r.id == record.report_id) {
            return Err(Error::ReportNotFoundError(record.report_id));
        }

        let record = DmarcRecord {
            id: new_id(),
            report_id: record.report_id,
            source_ip: record.source_ip,
            count: record.count,
            disposition: record.disposition,
            dkim: record.dkim,
            spf: record.spf,
            header_from: record.header_from,
            auth_dkim: record.auth_dkim,
            auth_spf: record.auth_spf,
        };

        tables.records.push(record.clone());
        Ok(record)
    }

    async fn list_records(&self, report_id: &str) -> Result<Vec<DmarcRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .iter()
            .filter(|r| r.report_id == report_id)
            .cloned()
            .collect())
    }
}
