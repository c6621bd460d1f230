//! Module dedicated to the backfill run, which reprocesses raw
//! emails whose reports could not be parsed yet.

use tracing::info;

use crate::{
    config::IngestConfig,
    imap::{enumerate, Mailbox, MailboxConnector, MailboxSession},
    store::{RawEmail, Store},
};

use super::{process_attachments, RunSummary};

/// Reprocess up to `limit` unparsed raw emails having an IMAP UID,
/// most recently received first.
///
/// `fetched` counts the messages resolved on the server, `saved` the
/// raw emails that ended up parsed. Raw emails are never created.
pub async fn backfill(
    config: &IngestConfig,
    connector: &dyn MailboxConnector,
    store: &dyn Store,
    limit: u32,
) -> RunSummary {
    info!(mailbox = config.mailbox, limit, "backfill dmarc reports");

    let mut summary = RunSummary::default();

    let emails = match store.list_unparsed_raw_emails(limit as usize).await {
        Ok(emails) => emails,
        Err(err) => {
            summary.fail(format!("cannot list unparsed raw emails: {err}"));
            return summary;
        }
    };

    if emails.is_empty() {
        summary.note("nothing to backfill");
        return summary;
    }

    let mailbox = match Mailbox::open(connector, &config.imap, &config.mailbox).await {
        Ok(mailbox) => mailbox,
        Err(err) => {
            summary.fail(format!("cannot connect to mailbox: {err}"));
            return summary;
        }
    };

    {
        let mut session = mailbox.lock().await;

        for email in &emails {
            backfill_email(&mut *session, store, email, &mut summary).await;
        }
    }

    mailbox.close().await;

    info!(
        fetched = summary.fetched,
        saved = summary.saved,
        errors = summary.errors,
        "backfill done"
    );

    summary
}

async fn backfill_email(
    session: &mut dyn MailboxSession,
    store: &dyn Store,
    email: &RawEmail,
    summary: &mut RunSummary,
) {
    let Some(uid) = email.imap_uid else {
        summary.note(format!("raw email {}: no imap uid, skipped", email.id));
        return;
    };

    let msg = match enumerate::resolve_uid(session, uid).await {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            summary.note(format!("uid {uid}: message not found"));
            return;
        }
        Err(err) => {
            summary.fail(format!("uid {uid}: {err}"));
            return;
        }
    };

    summary.fetched += 1;

    let update = match process_attachments(session, store, &msg, &email.id, &mut summary.notes).await
    {
        Ok(update) => update,
        Err(err) => {
            summary.fail(format!("uid {uid}: {err}"));
            return;
        }
    };

    match store.update_raw_email(&email.id, update).await {
        Ok(email) if email.parsed => summary.saved += 1,
        Ok(_) => (),
        Err(err) => summary.fail(format!("uid {uid}: {err}")),
    }
}
