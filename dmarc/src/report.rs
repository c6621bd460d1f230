//! # Aggregate report
//!
//! Module dedicated to the DMARC aggregate report model and its XML
//! parser. The XML shape is described by private [`serde`] structs,
//! then mapped to the public, flattened [`ParsedAggregateReport`].
//!
//! Consumed element paths:
//!
//! ```text
//! feedback
//!   report_metadata: org_name, report_id, date_range.begin, date_range.end
//!   policy_published: domain, adkim, aspf, p
//!   record*:
//!     row.source_ip, row.count, row.policy_evaluated.{disposition,dkim,spf}
//!     identifiers.header_from
//!     auth_results.dkim.result, auth_results.spf.result
//! ```

use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// The parsed DMARC aggregate report.
///
/// One report is built per XML document. It is independent from any
/// storage concern.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ParsedAggregateReport {
    pub metadata: ReportMetadata,
    pub policy: PolicyPublished,
    pub records: Vec<ParsedRecord>,
}

/// The report metadata, as declared by the reporting organization.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ReportMetadata {
    /// The reporting organization name.
    pub org: String,

    /// The report identifier, unique per reporting organization.
    pub report_id: String,

    /// Beginning of the covered period, in epoch seconds.
    pub date_begin: i64,

    /// End of the covered period, in epoch seconds.
    pub date_end: i64,
}

/// The DMARC policy published by the domain owner, as seen by the
/// reporter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct PolicyPublished {
    pub domain: String,
    /// DKIM alignment mode.
    pub adkim: Option<String>,
    /// SPF alignment mode.
    pub aspf: Option<String>,
    /// Requested policy.
    pub p: Option<String>,
}

/// One `<record>` of the report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ParsedRecord {
    pub source_ip: String,
    pub count: u64,
    pub disposition: String,
    pub dkim: String,
    pub spf: String,
    pub header_from: String,

    /// The first DKIM result of the auth results block, if any.
    pub auth_dkim: Option<String>,

    /// The first SPF result of the auth results block, if any.
    pub auth_spf: Option<String>,
}

/// Parse the given XML document as a DMARC aggregate report.
pub fn parse(xml: &str) -> Result<ParsedAggregateReport> {
    let xml = xml.trim_start_matches('\u{feff}');
    let feedback: Feedback = serde_xml_rs::from_str(xml).map_err(Error::ParseReportError)?;
    let report = ParsedAggregateReport::from(feedback);

    debug!(
        org = report.metadata.org,
        report_id = report.metadata.report_id,
        records = report.records.len(),
        "parsed dmarc aggregate report"
    );

    Ok(report)
}

impl FromStr for ParsedAggregateReport {
    type Err = Error;

    fn from_str(xml: &str) -> Result<Self> {
        parse(xml)
    }
}

#[derive(Debug, Deserialize)]
struct Feedback {
    report_metadata: XmlReportMetadata,
    policy_published: XmlPolicyPublished,
    #[serde(rename = "record", default)]
    records: Vec<XmlRecord>,
}

#[derive(Debug, Deserialize)]
struct XmlReportMetadata {
    org_name: String,
    report_id: String,
    date_range: XmlDateRange,
}

#[derive(Debug, Deserialize)]
struct XmlDateRange {
    begin: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
struct XmlPolicyPublished {
    domain: String,
    adkim: Option<String>,
    aspf: Option<String>,
    p: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRecord {
    row: XmlRow,
    identifiers: XmlIdentifiers,
    auth_results: Option<XmlAuthResults>,
}

#[derive(Debug, Deserialize)]
struct XmlRow {
    source_ip: String,
    count: u64,
    policy_evaluated: XmlPolicyEvaluated,
}

#[derive(Debug, Deserialize)]
struct XmlPolicyEvaluated {
    disposition: String,
    dkim: String,
    spf: String,
}

#[derive(Debug, Deserialize)]
struct XmlIdentifiers {
    header_from: String,
}

// Reporters list one entry per evaluated signature or domain, so both
// blocks can repeat.
#[derive(Debug, Default, Deserialize)]
struct XmlAuthResults {
    #[serde(default)]
    dkim: Vec<XmlAuthResult>,
    #[serde(default)]
    spf: Vec<XmlAuthResult>,
}

#[derive(Debug, Deserialize)]
struct XmlAuthResult {
    result: Option<String>,
}

impl From<Feedback> for ParsedAggregateReport {
    fn from(feedback: Feedback) -> Self {
        let Feedback {
            report_metadata,
            policy_published,
            records,
        } = feedback;

        Self {
            metadata: ReportMetadata {
                org: report_metadata.org_name,
                report_id: report_metadata.report_id,
                date_begin: report_metadata.date_range.begin,
                date_end: report_metadata.date_range.end,
            },
            policy: PolicyPublished {
                domain: policy_published.domain,
                adkim: policy_published.adkim,
                aspf: policy_published.aspf,
                p: policy_published.p,
            },
            records: records.into_iter().map(ParsedRecord::from).collect(),
        }
    }
}

impl From<XmlRecord> for ParsedRecord {
    fn from(record: XmlRecord) -> Self {
        let auth = record.auth_results.unwrap_or_default();
        let first_result =
            |results: Vec<XmlAuthResult>| results.into_iter().next().and_then(|r| r.result);

        Self {
            source_ip: record.row.source_ip,
            count: record.row.count,
            disposition: record.row.policy_evaluated.disposition,
            dkim: record.row.policy_evaluated.dkim,
            spf: record.row.policy_evaluated.spf,
            header_from: record.identifiers.header_from,
            auth_dkim: first_result(auth.dkim),
            auth_spf: first_result(auth.spf),
        }
    }
}
