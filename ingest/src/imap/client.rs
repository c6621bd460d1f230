//! Module dedicated to the [`imap_client`] implementation of the
//! mailbox seams.
//!
//! This module also contains the mapping functions from the
//! [`imap_next::imap_types`] fetch items to the
//! summaries and body structures used by the ingestion.

use std::{
    future::Future,
    num::NonZeroU32,
    ops::RangeInclusive,
};

use async_trait::async_trait;
use chrono::Utc;
use imap_client::{tasks::tasks::logout::LogoutTask, Client};
use imap_next::imap_types::{
    auth::AuthMechanism,
    body::{BasicFields, BodyStructure, Disposition, SpecificFields},
    core::{IString, NString, Vec1},
    fetch::{MacroOrMessageDataItemNames, MessageDataItem, MessageDataItemName, Part, Section},
    sequence::{Sequence, SequenceSet},
};
use once_cell::sync::Lazy;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::mime::{self, PartNode};

use super::{
    Error, ImapConfig, ImapEncryptionKind, MailboxConnector, MailboxSession, MailboxStatus,
    MessageSummary, Result, SOCKET_TIMEOUT,
};

/// The IMAP fetch items needed to build a [`MessageSummary`]: UID,
/// envelope (Message-ID, Subject), internal date and body structure.
static FETCH_SUMMARIES: Lazy<MacroOrMessageDataItemNames<'static>> = Lazy::new(|| {
    MacroOrMessageDataItemNames::MessageDataItemNames(vec![
        MessageDataItemName::Uid,
        MessageDataItemName::Envelope,
        MessageDataItemName::InternalDate,
        MessageDataItemName::BodyStructure,
    ])
});

/// The [`imap_client`] based connector.
#[derive(Clone, Debug, Default)]
pub struct ImapClientConnector;

impl ImapClientConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailboxConnector for ImapClientConnector {
    async fn connect(&self, config: &ImapConfig) -> Result<Box<dyn MailboxSession>> {
        let client = build_client(config).await?;
        Ok(Box::new(ImapClientSession { client }))
    }
}

/// Creates an authenticated client from an IMAP configuration.
async fn build_client(config: &ImapConfig) -> Result<Client> {
    let host = config.host.as_str();
    let port = config.port;

    let mut client = match &config.encryption {
        Some(ImapEncryptionKind::None) => {
            debug!(host, port, "connect using tcp");
            with_timeout(Client::insecure(host, port), || {
                Error::BuildClientTimedOutError(host.to_owned(), port)
            })
            .await?
            .map_err(|err| Error::BuildInsecureClientError(err, host.to_owned(), port))?
        }
        Some(ImapEncryptionKind::StartTls) => {
            debug!(host, port, "connect using starttls");
            with_timeout(Client::starttls(host, port), || {
                Error::BuildClientTimedOutError(host.to_owned(), port)
            })
            .await?
            .map_err(|err| Error::BuildStartTlsClientError(err, host.to_owned(), port))?
        }
        Some(ImapEncryptionKind::Tls) | None => {
            debug!(host, port, "connect using ssl/tls");
            with_timeout(Client::tls(host, port), || {
                Error::BuildClientTimedOutError(host.to_owned(), port)
            })
            .await?
            .map_err(|err| Error::BuildTlsClientError(err, host.to_owned(), port))?
        }
    };

    let login = config.login.as_str();
    let passwd = config.passwd.as_str();
    let mut authenticated = false;

    if client.supports_auth_mechanism(AuthMechanism::Plain) {
        debug!("trying auth mechanism plain…");

        match with_timeout(client.authenticate_plain(login, passwd), || {
            Error::AuthenticateTimedOutError
        })
        .await?
        {
            Ok(_) => authenticated = true,
            Err(err) => warn!(?err, "plain authentication failed"),
        }
    }

    if !authenticated {
        if !client.login_supported() {
            return Err(Error::LoginNotSupportedError);
        }

        debug!("trying login…");

        with_timeout(client.login(login, passwd), || Error::AuthenticateTimedOutError)
            .await?
            .map_err(Error::LoginError)?;
    }

    info!(host, port, "authenticated to imap server");
    Ok(client)
}

/// Run the given IMAP action, bounded by [`SOCKET_TIMEOUT`].
async fn with_timeout<F: Future>(f: F, timed_out: impl FnOnce() -> Error) -> Result<F::Output> {
    timeout(SOCKET_TIMEOUT, f).await.map_err(|_| timed_out())
}

/// The [`imap_client`] based session.
pub struct ImapClientSession {
    client: Client,
}

impl ImapClientSession {
    async fn uid_fetch(
        &mut self,
        uids: String,
        items: MacroOrMessageDataItemNames<'static>,
    ) -> Result<Vec<Vec1<MessageDataItem<'static>>>> {
        let seq: SequenceSet = Sequence::try_from(uids.as_str())
            .map_err(|_| Error::ParseUidSetError(uids.clone()))?
            .into();

        let fetches = with_timeout(self.client.uid_fetch(seq, items), || {
            Error::FetchMessagesTimedOutError(uids.clone())
        })
        .await?
        .map_err(|err| Error::FetchMessagesError(err, uids.clone()))?;

        Ok(fetches.into_values().collect())
    }
}

#[async_trait]
impl MailboxSession for ImapClientSession {
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        info!(mailbox, "select imap mailbox");

        let data = with_timeout(self.client.select(mailbox.to_owned()), || {
            Error::SelectMailboxTimedOutError(mailbox.to_owned())
        })
        .await?
        .map_err(|err| Error::SelectMailboxError(err, mailbox.to_owned()))?;

        Ok(MailboxStatus {
            exists: data.exists.unwrap_or_default(),
            uid_next: data.uid_next.map(NonZeroU32::get),
        })
    }

    async fn fetch_range(&mut self, uids: RangeInclusive<u32>) -> Result<Vec<MessageSummary>> {
        let uids = format!("{}:{}", uids.start(), uids.end());
        let fetches = self.uid_fetch(uids, FETCH_SUMMARIES.clone()).await?;

        Ok(fetches
            .iter()
            .map(|items| summary_from_items(items.as_ref()))
            .collect())
    }

    async fn fetch_uid(&mut self, uid: u32) -> Result<Option<MessageSummary>> {
        let fetches = self
            .uid_fetch(uid.to_string(), FETCH_SUMMARIES.clone())
            .await?;

        Ok(fetches
            .iter()
            .map(|items| summary_from_items(items.as_ref()))
            .find(|msg| msg.uid == uid))
    }

    async fn fetch_part(&mut self, uid: u32, part: &str) -> Result<Vec<u8>> {
        debug!(uid, part, "fetch imap body part");

        let section = parse_section(part)?;
        let items = MacroOrMessageDataItemNames::MessageDataItemNames(vec![
            MessageDataItemName::BodyExt {
                section: Some(section),
                partial: None,
                peek: true,
            },
        ]);

        let fetches = self.uid_fetch(uid.to_string(), items).await?;

        fetches
            .iter()
            .flat_map(|items| items.as_ref().iter())
            .find_map(|item| match item {
                MessageDataItem::BodyExt { data, .. } => {
                    data.0.as_ref().map(|data| data.as_ref().to_vec())
                }
                _ => None,
            })
            .ok_or_else(|| Error::FetchPartEmptyError(uid, part.to_owned()))
    }

    async fn logout(&mut self) -> Result<()> {
        debug!("logout from imap server");

        with_timeout(self.client.resolve(LogoutTask::new()), || {
            Error::LogoutTimedOutError
        })
        .await?
        .map(|_| ())
        .map_err(Error::LogoutError)
    }
}

/// Parse a section path like `1.2` into an IMAP body section.
fn parse_section(part: &str) -> Result<Section<'static>> {
    let numbers = part
        .split('.')
        .map(|n| n.parse::<NonZeroU32>().ok())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::ParsePartError(part.to_owned()))?;

    let numbers = Vec1::try_from(numbers).map_err(|_| Error::ParsePartError(part.to_owned()))?;

    Ok(Section::Part(Part(numbers)))
}

fn summary_from_items(items: &[MessageDataItem]) -> MessageSummary {
    let mut msg = MessageSummary::default();

    for item in items {
        match item {
            MessageDataItem::Uid(uid) => {
                msg.uid = uid.get();
            }
            MessageDataItem::Envelope(envelope) => {
                msg.message_id = nstring_to_string(&envelope.message_id);
                msg.subject = nstring_to_string(&envelope.subject);
            }
            MessageDataItem::InternalDate(date) => {
                msg.internal_date = Some(date.as_ref().with_timezone(&Utc));
            }
            MessageDataItem::BodyStructure(body) => {
                msg.body_structure = Some(part_node_from_body(body));
            }
            _ => (),
        }
    }

    msg
}

fn istring_to_string(s: &IString) -> String {
    String::from_utf8_lossy(s.as_ref()).trim().to_owned()
}

fn nstring_to_string(s: &NString) -> Option<String> {
    s.0.as_ref()
        .map(istring_to_string)
        .filter(|s| !s.is_empty())
}

fn params_to_strings(params: &[(IString, IString)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| (istring_to_string(k), istring_to_string(v)))
        .collect()
}

fn apply_disposition(node: &mut PartNode, disp: Option<&Disposition>) {
    if let Some((kind, params)) = disp.and_then(|disp| disp.disposition.as_ref()) {
        node.disposition = Some(istring_to_string(kind));
        node.disposition_parameters = params_to_strings(params);
    }
}

fn section_path(path: &[u32]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Map an IMAP body structure to a [`PartNode`] tree.
///
/// Section paths follow the IMAP numbering: a non-multipart message
/// body is part `1`, children of a multipart are numbered from `1`
/// under the path of their parent. The structure is walked using an
/// explicit stack, nodes are then assembled by [`mime::assemble`].
fn part_node_from_body(body: &BodyStructure) -> PartNode {
    let mut nodes = Vec::new();
    let mut stack = vec![(body, Vec::<u32>::new(), None)];

    while let Some((body, path, parent)) = stack.pop() {
        let index = nodes.len();
        nodes.push((part_node(body, &path), parent));

        if let BodyStructure::Multi { bodies, .. } = body {
            for (i, child) in bodies.as_ref().iter().enumerate().rev() {
                let mut path = path.clone();
                path.push(i as u32 + 1);
                stack.push((child, path, Some(index)));
            }
        }
    }

    mime::assemble(nodes).unwrap_or_default()
}

/// Map one body structure node, without its children.
fn part_node(body: &BodyStructure, path: &[u32]) -> PartNode {
    match body {
        BodyStructure::Single {
            body,
            extension_data,
        } => {
            let BasicFields {
                parameter_list,
                content_transfer_encoding,
                size,
                ..
            } = &body.basic;

            let (mime_type, mime_subtype) = match &body.specific {
                SpecificFields::Basic { r#type, subtype } => {
                    (istring_to_string(r#type), istring_to_string(subtype))
                }
                SpecificFields::Message { .. } => ("message".to_owned(), "rfc822".to_owned()),
                SpecificFields::Text { subtype, .. } => {
                    ("text".to_owned(), istring_to_string(subtype))
                }
            };

            let mut node = PartNode {
                part: Some(if path.is_empty() {
                    "1".to_owned()
                } else {
                    section_path(path)
                }),
                mime_type,
                mime_subtype,
                parameters: params_to_strings(parameter_list),
                encoding: Some(istring_to_string(content_transfer_encoding)),
                size: Some(*size),
                ..Default::default()
            };

            let disp = extension_data.as_ref().and_then(|data| data.tail.as_ref());
            apply_disposition(&mut node, disp);

            node
        }
        BodyStructure::Multi {
            subtype,
            extension_data,
            ..
        } => {
            let mut node = PartNode {
                part: (!path.is_empty()).then(|| section_path(path)),
                mime_type: "multipart".to_owned(),
                mime_subtype: istring_to_string(subtype),
                ..Default::default()
            };

            if let Some(data) = extension_data.as_ref() {
                node.parameters = params_to_strings(&data.parameter_list);
                apply_disposition(&mut node, data.tail.as_ref());
            }

            node
        }
    }
}
