//! Module dedicated to on-demand attachment downloads.
//!
//! Downloads skip parsing entirely: the decoded bytes are returned
//! along with the declared MIME type.

use tracing::{debug, info};

use crate::{
    config::IngestConfig,
    imap::{enumerate, Mailbox, MailboxConnector, MailboxSession},
    mime,
    store::Store,
    Error, Result,
};

/// A downloaded attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownloadedAttachment {
    pub bytes: Vec<u8>,
    /// The declared MIME type.
    pub mime: String,
    /// The filename as declared by the message.
    pub filename: String,
}

/// Download the attachment named `filename` of the message `uid`.
///
/// Filenames are matched case-insensitively.
pub async fn download_attachment(
    config: &IngestConfig,
    connector: &dyn MailboxConnector,
    uid: u32,
    filename: &str,
) -> Result<DownloadedAttachment> {
    info!(uid, filename, "download attachment");

    let mailbox = Mailbox::open(connector, &config.imap, &config.mailbox).await?;

    let attachment = {
        let mut session = mailbox.lock().await;
        download(&mut *session, uid, filename).await
    };

    mailbox.close().await;
    attachment
}

async fn download(
    session: &mut dyn MailboxSession,
    uid: u32,
    filename: &str,
) -> Result<DownloadedAttachment> {
    let msg = enumerate::resolve_uid(session, uid)
        .await?
        .ok_or(Error::MessageNotFoundError(uid))?;

    let attachment = mime::attachments(msg.body_structure.as_ref())
        .into_iter()
        .find(|a| a.filename.eq_ignore_ascii_case(filename))
        .ok_or_else(|| Error::AttachmentNotFoundError(uid, filename.to_owned()))?;

    let part = attachment
        .part
        .as_deref()
        .ok_or_else(|| Error::AttachmentNotFoundError(uid, filename.to_owned()))?;

    let raw = session.fetch_part(uid, part).await?;
    let bytes = mime::decode_part(raw, attachment.encoding.as_deref());
    debug!(uid, part, size = bytes.len(), "attachment downloaded");

    Ok(DownloadedAttachment {
        bytes,
        mime: attachment.mime,
        filename: attachment.filename,
    })
}

/// Download the attachment named `filename` of the given raw email.
///
/// Fails when the raw email does not exist, when it has no IMAP UID
/// (rows ingested by other means), when the message or the
/// attachment cannot be found on the server, or when the attachment
/// exceeds the configured size limit.
pub async fn download_raw_email_attachment(
    config: &IngestConfig,
    connector: &dyn MailboxConnector,
    store: &dyn Store,
    raw_email_id: &str,
    filename: &str,
) -> Result<DownloadedAttachment> {
    let email = store
        .find_raw_email(raw_email_id)
        .await?
        .ok_or_else(|| Error::RawEmailNotFoundError(raw_email_id.to_owned()))?;

    let uid = email
        .imap_uid
        .ok_or_else(|| Error::DownloadNotImplementedError(raw_email_id.to_owned()))?;

    let attachment = download_attachment(config, connector, uid, filename).await?;

    let size = attachment.bytes.len() as u64;
    let limit = config.attachment_size_limit;
    if size > limit {
        return Err(Error::AttachmentTooLargeError(attachment.filename, size, limit));
    }

    Ok(attachment)
}
