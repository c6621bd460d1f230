//! Module dedicated to the fetch run, which ingests the most recent
//! messages of the mailbox.

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    config::IngestConfig,
    dedup,
    imap::{self, enumerate, Mailbox, MailboxConnector, MailboxSession, MailboxStatus},
    store::{NewRawEmail, RawEmailSource, Store},
};

use super::{process_attachments, RunSummary};

/// Ingest the `limit` most recent messages of the configured
/// mailbox.
///
/// `fetched` counts the enumerated messages, `saved` the newly
/// created raw emails. Only a connection failure aborts the run.
pub async fn fetch(
    config: &IngestConfig,
    connector: &dyn MailboxConnector,
    store: &dyn Store,
    limit: u32,
) -> RunSummary {
    info!(mailbox = config.mailbox, limit, "fetch dmarc reports");

    let mut summary = RunSummary::default();

    let mailbox = match Mailbox::open(connector, &config.imap, &config.mailbox).await {
        Ok(mailbox) => mailbox,
        Err(err) => {
            summary.fail(format!("cannot connect to mailbox: {err}"));
            return summary;
        }
    };

    {
        let mut session = mailbox.lock().await;
        let status = mailbox.status();

        if let Err(err) = fetch_messages(&mut *session, status, store, limit, &mut summary).await {
            summary.fail(format!("cannot enumerate messages: {err}"));
        }
    }

    mailbox.close().await;

    info!(
        fetched = summary.fetched,
        saved = summary.saved,
        errors = summary.errors,
        "fetch done"
    );

    summary
}

async fn fetch_messages(
    session: &mut dyn MailboxSession,
    status: &MailboxStatus,
    store: &dyn Store,
    limit: u32,
    summary: &mut RunSummary,
) -> imap::Result<()> {
    let messages = enumerate::list_recent(session, status, limit).await?;

    for msg in messages {
        summary.fetched += 1;

        if dedup::exists(store, msg.message_id.as_deref(), Some(msg.uid)).await {
            summary.note(format!("uid {}: already ingested, skipped", msg.uid));
            continue;
        }

        let email = NewRawEmail {
            source: RawEmailSource::Fetch,
            subject: msg.subject.clone(),
            received_at: msg.internal_date.unwrap_or_else(Utc::now),
            imap_uid: Some(msg.uid),
            message_id: msg.message_id.clone(),
        };

        let email = match store.create_raw_email(email).await {
            Ok(email) => email,
            Err(err) => {
                summary.fail(format!("uid {}: {err}", msg.uid));
                continue;
            }
        };

        summary.saved += 1;
        debug!(uid = msg.uid, id = email.id, "raw email created");

        let update =
            match process_attachments(session, store, &msg, &email.id, &mut summary.notes).await {
                Ok(update) => update,
                Err(err) => {
                    summary.fail(format!("uid {}: {err}", msg.uid));
                    continue;
                }
            };

        if let Err(err) = store.update_raw_email(&email.id, update).await {
            summary.fail(format!("uid {}: {err}", msg.uid));
        }
    }

    Ok(())
}
