//! Module dedicated to message enumeration.
//!
//! Messages are either listed by UID range (the most recent ones) or
//! resolved one UID at a time.

use std::ops::RangeInclusive;

use tracing::{debug, info};

use super::{MailboxSession, MailboxStatus, MessageSummary, Result};

/// Build the UID range covering the `limit` most recent UIDs.
///
/// Returns `None` when the range is empty.
pub fn uid_range(uid_next: u32, limit: u32) -> Option<RangeInclusive<u32>> {
    let end = uid_next.checked_sub(1).filter(|end| *end > 0)?;
    let start = uid_next.saturating_sub(limit).max(1);
    (start <= end).then_some(start..=end)
}

/// List the summaries of the `limit` most recent messages, ordered
/// by UID.
pub async fn list_recent(
    session: &mut dyn MailboxSession,
    status: &MailboxStatus,
    limit: u32,
) -> Result<Vec<MessageSummary>> {
    let Some(uids) = uid_range(status.uid_next(), limit) else {
        debug!(?status, limit, "no message to enumerate");
        return Ok(Vec::new());
    };

    info!(start = uids.start(), end = uids.end(), "enumerate imap messages");

    let mut messages = session.fetch_range(uids.clone()).await?;
    messages.retain(|msg| uids.contains(&msg.uid));
    messages.sort_by_key(|msg| msg.uid);

    Ok(messages)
}

/// Resolve the summary of a single UID.
pub async fn resolve_uid(
    session: &mut dyn MailboxSession,
    uid: u32,
) -> Result<Option<MessageSummary>> {
    debug!(uid, "resolve imap message");

    let msg = session.fetch_uid(uid).await?;

    if msg.is_none() {
        debug!(uid, "imap message not found");
    }

    Ok(msg)
}
