//! Module dedicated to reports submitted directly as XML, outside of
//! any mailbox.

use tracing::info;

use crate::{
    store::{DmarcRecord, DmarcReport, Store},
    writer, Error, Result,
};

/// A persisted report along with its records.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ReportWithRecords {
    #[cfg_attr(feature = "derive", serde(flatten))]
    pub report: DmarcReport,
    pub records: Vec<DmarcRecord>,
}

/// Parse then persist the given XML document.
///
/// The report is not linked to any raw email.
pub async fn ingest_xml(store: &dyn Store, xml: &str) -> Result<ReportWithRecords> {
    let parsed = dmarc::parse(xml)?;
    let report = writer::persist(store, &parsed, None).await?;

    info!(
        id = report.id,
        report_id = report.report_id,
        "dmarc report submitted"
    );

    let records = store.list_records(&report.id).await?;
    Ok(ReportWithRecords { report, records })
}

/// Read the given report along with its records.
pub async fn report_with_records(store: &dyn Store, id: &str) -> Result<ReportWithRecords> {
    let report = store
        .find_report(id)
        .await?
        .ok_or_else(|| Error::ReportNotFoundError(id.to_owned()))?;

    let records = store.list_records(&report.id).await?;
    Ok(ReportWithRecords { report, records })
}
