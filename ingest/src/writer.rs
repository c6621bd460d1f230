//! Module dedicated to persisting parsed reports.

use dmarc::ParsedAggregateReport;
use tracing::{debug, warn};

use crate::store::{DmarcReport, Error, NewDmarcRecord, NewDmarcReport, Result, Store};

/// Persist the given parsed report, then link it to the given raw
/// email if any.
///
/// The report row is created first, then one row per record. The
/// link is set by a follow-up update: when it fails, the error holds
/// the id of the unlinked report.
pub async fn persist(
    store: &dyn Store,
    parsed: &ParsedAggregateReport,
    raw_email_id: Option<&str>,
) -> Result<DmarcReport> {
    let report = store.create_report(NewDmarcReport::from(parsed)).await?;

    for record in &parsed.records {
        store
            .create_record(NewDmarcRecord::new(&report.id, record))
            .await?;
    }

    debug!(
        id = report.id,
        report_id = report.report_id,
        records = parsed.records.len(),
        "dmarc report persisted"
    );

    match raw_email_id {
        Some(raw_email_id) => store
            .link_report(&report.id, raw_email_id)
            .await
            .map_err(|err| {
                warn!(id = report.id, raw_email_id, "cannot link dmarc report");
                Error::LinkReportError(Box::new(err), report.id.clone(), raw_email_id.to_owned())
            }),
        None => Ok(report),
    }
}
