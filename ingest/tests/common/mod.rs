#![allow(dead_code)]

use std::{
    collections::HashSet,
    io::Write,
    ops::RangeInclusive,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use flate2::{write::GzEncoder, Compression};
use ingest::{
    imap::{
        self, ImapConfig, ImapEncryptionKind, MailboxConnector, MailboxSession, MailboxStatus,
        MessageSummary,
    },
    mime::PartNode,
    store::{
        self, DmarcRecord, DmarcReport, NewDmarcRecord, NewDmarcReport, NewRawEmail, RawEmail,
        RawEmailUpdate, Store,
    },
    IngestConfig, MemoryStore,
};
use zip::{write::FileOptions, ZipWriter};

pub const SAMPLE_XML: &str = include_str!("../../../dmarc/tests/fixtures/sample.xml");
pub const MULTI_XML: &str = include_str!("../../../dmarc/tests/fixtures/multi.xml");

pub fn config() -> IngestConfig {
    IngestConfig {
        imap: ImapConfig {
            host: "imap.example.org".into(),
            port: 993,
            encryption: Some(ImapEncryptionKind::Tls),
            login: "dmarc@example.org".into(),
            passwd: "password".into(),
        },
        ..Default::default()
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[derive(Clone, Debug)]
pub struct FakeAttachment {
    pub filename: String,
    pub mime_type: String,
    pub mime_subtype: String,
    pub encoding: String,
    /// The content as stored on the server, still encoded.
    pub bytes: Vec<u8>,
}

impl FakeAttachment {
    pub fn new(filename: &str, mime: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let (mime_type, mime_subtype) = mime.split_once('/').unwrap();

        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            mime_subtype: mime_subtype.into(),
            encoding: "binary".into(),
            bytes: bytes.into(),
        }
    }

    /// Store the content base64-encoded, wrapped at 76 columns like
    /// mail clients do.
    pub fn base64(mut self) -> Self {
        let encoded = base64::encode(&self.bytes);
        let lines: Vec<_> = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();

        self.encoding = "base64".into();
        self.bytes = lines.join("\r\n").into_bytes();
        self
    }
}

#[derive(Clone, Debug)]
pub struct FakeMessage {
    pub uid: u32,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub internal_date: DateTime<Utc>,
    pub attachments: Vec<FakeAttachment>,
}

impl FakeMessage {
    pub fn new(uid: u32, message_id: Option<&str>) -> Self {
        Self {
            uid,
            message_id: message_id.map(ToOwned::to_owned),
            subject: Some(format!("Report domain: example.org, uid {uid}")),
            internal_date: Utc.timestamp_opt(1727400000 + uid as i64, 0).unwrap(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: FakeAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// multipart/mixed: a text body as part 1, then one part per
    /// attachment.
    fn body_structure(&self) -> PartNode {
        let text = PartNode {
            part: Some("1".into()),
            mime_type: "text".into(),
            mime_subtype: "plain".into(),
            size: Some(42),
            ..Default::default()
        };

        let attachments = self.attachments.iter().enumerate().map(|(i, a)| PartNode {
            part: Some((i + 2).to_string()),
            mime_type: a.mime_type.clone(),
            mime_subtype: a.mime_subtype.clone(),
            disposition: Some("attachment".into()),
            disposition_parameters: vec![("filename".into(), a.filename.clone())],
            encoding: Some(a.encoding.clone()),
            size: Some(a.bytes.len() as u32),
            ..Default::default()
        });

        PartNode {
            mime_type: "multipart".into(),
            mime_subtype: "mixed".into(),
            child_nodes: std::iter::once(text).chain(attachments).collect(),
            ..Default::default()
        }
    }

    fn summary(&self) -> MessageSummary {
        MessageSummary {
            uid: self.uid,
            message_id: self.message_id.clone(),
            subject: self.subject.clone(),
            internal_date: Some(self.internal_date),
            body_structure: Some(self.body_structure()),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    messages: Vec<FakeMessage>,
    failing_ports: HashSet<u16>,
    failing_enumeration: bool,
    connections: Vec<(u16, Option<ImapEncryptionKind>)>,
    logouts: usize,
}

/// A scripted mailbox, shared by all the sessions it opens.
#[derive(Clone, Debug, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new(messages: Vec<FakeMessage>) -> Self {
        let connector = Self::default();
        connector.state.lock().unwrap().messages = messages;
        connector
    }

    pub fn failing_ports(self, ports: &[u16]) -> Self {
        self.state.lock().unwrap().failing_ports = ports.iter().copied().collect();
        self
    }

    pub fn failing_enumeration(self) -> Self {
        self.state.lock().unwrap().failing_enumeration = true;
        self
    }

    pub fn remove(&self, uid: u32) {
        self.state.lock().unwrap().messages.retain(|m| m.uid != uid);
    }

    pub fn connections(&self) -> Vec<(u16, Option<ImapEncryptionKind>)> {
        self.state.lock().unwrap().connections.clone()
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().unwrap().logouts
    }
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self, config: &ImapConfig) -> imap::Result<Box<dyn MailboxSession>> {
        let mut state = self.state.lock().unwrap();
        state
            .connections
            .push((config.port, config.encryption.clone()));

        if state.failing_ports.contains(&config.port) {
            return Err(imap::Error::BuildClientTimedOutError(
                config.host.clone(),
                config.port,
            ));
        }

        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn select(&mut self, _mailbox: &str) -> imap::Result<MailboxStatus> {
        let state = self.state.lock().unwrap();
        let uid_next = state.messages.iter().map(|m| m.uid).max().unwrap_or(0) + 1;

        Ok(MailboxStatus {
            exists: state.messages.len() as u32,
            uid_next: Some(uid_next),
        })
    }

    async fn fetch_range(&mut self, uids: RangeInclusive<u32>) -> imap::Result<Vec<MessageSummary>> {
        let state = self.state.lock().unwrap();

        if state.failing_enumeration {
            let uids = format!("{}:{}", uids.start(), uids.end());
            return Err(imap::Error::FetchMessagesTimedOutError(uids));
        }

        Ok(state
            .messages
            .iter()
            .filter(|m| uids.contains(&m.uid))
            .map(FakeMessage::summary)
            .collect())
    }

    async fn fetch_uid(&mut self, uid: u32) -> imap::Result<Option<MessageSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .map(FakeMessage::summary))
    }

    async fn fetch_part(&mut self, uid: u32, part: &str) -> imap::Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let index = part.parse::<usize>().ok().and_then(|n| n.checked_sub(2));

        state
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .and_then(|m| index.and_then(|i| m.attachments.get(i)))
            .map(|a| a.bytes.clone())
            .ok_or_else(|| imap::Error::FetchPartEmptyError(uid, part.to_owned()))
    }

    async fn logout(&mut self) -> imap::Result<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}

/// A [`MemoryStore`] whose lookups, report writes or report links
/// can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failing_lookups: bool,
    pub failing_reports: bool,
    pub failing_links: bool,
}

impl FlakyStore {
    fn unavailable<T>() -> store::Result<T> {
        Err(store::Error::UnavailableError("connection reset".into()))
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_raw_email(&self, email: NewRawEmail) -> store::Result<RawEmail> {
        self.inner.create_raw_email(email).await
    }

    async fn find_raw_email(&self, id: &str) -> store::Result<Option<RawEmail>> {
        self.inner.find_raw_email(id).await
    }

    async fn find_raw_email_by_message_id(
        &self,
        message_id: &str,
    ) -> store::Result<Option<RawEmail>> {
        if self.failing_lookups {
            return Self::unavailable();
        }
        self.inner.find_raw_email_by_message_id(message_id).await
    }

    async fn find_raw_email_by_imap_uid(&self, uid: u32) -> store::Result<Option<RawEmail>> {
        if self.failing_lookups {
            return Self::unavailable();
        }
        self.inner.find_raw_email_by_imap_uid(uid).await
    }

    async fn list_unparsed_raw_emails(&self, limit: usize) -> store::Result<Vec<RawEmail>> {
        self.inner.list_unparsed_raw_emails(limit).await
    }

    async fn update_raw_email(&self, id: &str, update: RawEmailUpdate) -> store::Result<RawEmail> {
        self.inner.update_raw_email(id, update).await
    }

    async fn create_report(&self, report: NewDmarcReport) -> store::Result<DmarcReport> {
        if self.failing_reports {
            return Self::unavailable();
        }
        self.inner.create_report(report).await
    }

    async fn link_report(&self, id: &str, raw_email_id: &str) -> store::Result<DmarcReport> {
        if self.failing_links {
            return Self::unavailable();
        }
        self.inner.link_report(id, raw_email_id).await
    }

    async fn find_report(&self, id: &str) -> store::Result<Option<DmarcReport>> {
        self.inner.find_report(id).await
    }

    async fn list_reports(&self, raw_email_id: &str) -> store::Result<Vec<DmarcReport>> {
        self.inner.list_reports(raw_email_id).await
    }

    async fn create_record(&self, record: NewDmarcRecord) -> store::Result<DmarcRecord> {
        self.inner.create_record(record).await
    }

    async fn list_records(&self, report_id: &str) -> store::Result<Vec<DmarcRecord>> {
        self.inner.list_records(report_id).await
    }
}
