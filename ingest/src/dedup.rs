//! Module dedicated to deduplication of incoming messages.
//!
//! A message is considered already ingested when a raw email with
//! the same Message-ID exists, or, when the message has no
//! Message-ID, a raw email with the same IMAP UID.

use tracing::{debug, warn};

use crate::store::Store;

/// Check whether the given message has already been ingested.
///
/// The Message-ID is the dedup key. The IMAP UID is only looked up
/// for messages without Message-ID, since UIDs are not unique across
/// mailboxes nor across UIDVALIDITY changes.
///
/// Lookup failures are logged and treated as "not found", so that a
/// flaky store never blocks the ingestion.
pub async fn exists(store: &dyn Store, message_id: Option<&str>, imap_uid: Option<u32>) -> bool {
    if let Some(message_id) = message_id {
        return match store.find_raw_email_by_message_id(message_id).await {
            Ok(Some(email)) => {
                debug!(message_id, id = email.id, "message already ingested");
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(message_id, %err, "cannot look up message id, assuming new");
                false
            }
        };
    }

    let Some(uid) = imap_uid else {
        return false;
    };

    match store.find_raw_email_by_imap_uid(uid).await {
        Ok(Some(email)) => {
            debug!(uid, id = email.id, "imap uid already ingested");
            true
        }
        Ok(None) => false,
        Err(err) => {
            warn!(uid, %err, "cannot look up imap uid, assuming new");
            false
        }
    }
}
