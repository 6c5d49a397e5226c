//! Published notice extraction
//!
//! One row per award of a notice detail response, with the notice's own
//! fields repeated on each row.

use crate::extract::normalize::{non_zero_identifier, normalize_address, normalize_text};
use crate::extract::{elements, Extractor};
use crate::model::{FieldValue, OutputRecord, ResponseEnvelope};
use serde::Deserialize;
use serde_json::Value;

/// Column order of notice rows
pub const NOTICE_COLUMNS: &[&str] = &[
    "noticeURL",
    "noticeFrom",
    "noticeTitle",
    "noticeDescription",
    "noticeType",
    "noticeStatus",
    "noticeValueLow",
    "noticeValueHigh",
    "noticeProcedureType",
    "noticeIsFrameworkAgreement",
    "noticeDeadlineDate",
    "noticePublishedDate",
    "noticeCPVs",
    "awardID",
    "awardValue",
    "awardSupplierValue",
    "awardSupplierName",
    "awardSupplierCompanyDunsNumber",
    "awardSupplierAddress",
    "awardProcedureType",
];

#[derive(Debug, Deserialize)]
struct NoticeDetail {
    notice: Option<Notice>,
    awards: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notice {
    id: Option<Value>,
    organisation_name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    notice_type: Option<Value>,
    status: Option<Value>,
    value_low: Option<Value>,
    value_high: Option<Value>,
    procedure_type: Option<Value>,
    is_framework_agreement: Option<Value>,
    deadline_date: Option<Value>,
    published_date: Option<Value>,
    cpv_codes: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoticeAward {
    id: Option<Value>,
    value: Option<Value>,
    supplier_awarded_value: Option<Value>,
    supplier_name: Option<String>,
    duns_number: Option<Value>,
    supplier_address: Option<String>,
    awarded_procedure_type: Option<Value>,
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts award rows from notice detail responses
#[derive(Debug, Clone)]
pub struct NoticeExtractor {
    notice_url: String,
}

impl NoticeExtractor {
    /// Creates an extractor; `notice_url` prefixes the notice id in `noticeURL`
    pub fn new(notice_url: impl Into<String>) -> Self {
        Self {
            notice_url: notice_url.into(),
        }
    }

    fn rows(&self, detail: NoticeDetail, label: &str) -> Vec<OutputRecord> {
        let Some(notice) = detail.notice else {
            return Vec::new();
        };
        let awards = elements::<NoticeAward>(detail.awards, "award", label);

        let url = scalar_text(notice.id.as_ref()).map(|id| format!("{}{}", self.notice_url, id));
        let cpvs = notice.cpv_codes.as_ref().map(|codes| {
            codes
                .iter()
                .filter_map(|code| scalar_text(Some(code)))
                .collect::<Vec<_>>()
                .join("; ")
        });
        let from = notice.organisation_name.as_deref().map(normalize_text);
        let title = notice.title.as_deref().map(normalize_text);
        let description = notice.description.as_deref().map(normalize_text);

        awards
            .into_iter()
            .map(|award| {
                let mut record = OutputRecord::new();
                record.push("noticeURL", url.clone());
                record.push("noticeFrom", from.clone());
                record.push("noticeTitle", title.clone());
                record.push("noticeDescription", description.clone());
                record.push("noticeType", FieldValue::from_json(notice.notice_type.as_ref()));
                record.push("noticeStatus", FieldValue::from_json(notice.status.as_ref()));
                record.push("noticeValueLow", FieldValue::from_json(notice.value_low.as_ref()));
                record.push("noticeValueHigh", FieldValue::from_json(notice.value_high.as_ref()));
                record.push(
                    "noticeProcedureType",
                    FieldValue::from_json(notice.procedure_type.as_ref()),
                );
                record.push(
                    "noticeIsFrameworkAgreement",
                    FieldValue::from_json(notice.is_framework_agreement.as_ref()),
                );
                record.push(
                    "noticeDeadlineDate",
                    FieldValue::from_json(notice.deadline_date.as_ref()),
                );
                record.push(
                    "noticePublishedDate",
                    FieldValue::from_json(notice.published_date.as_ref()),
                );
                record.push("noticeCPVs", cpvs.clone());
                record.push("awardID", FieldValue::from_json(award.id.as_ref()));
                record.push("awardValue", FieldValue::from_json(award.value.as_ref()));
                record.push(
                    "awardSupplierValue",
                    FieldValue::from_json(award.supplier_awarded_value.as_ref()),
                );
                record.push(
                    "awardSupplierName",
                    award.supplier_name.as_deref().map(normalize_text),
                );
                record.push(
                    "awardSupplierCompanyDunsNumber",
                    non_zero_identifier(scalar_text(award.duns_number.as_ref()).as_deref()),
                );
                record.push(
                    "awardSupplierAddress",
                    award
                        .supplier_address
                        .as_deref()
                        .map(normalize_address)
                        .filter(|address| !address.is_empty()),
                );
                record.push(
                    "awardProcedureType",
                    FieldValue::from_json(award.awarded_procedure_type.as_ref()),
                );
                record
            })
            .collect()
    }
}

impl Extractor for NoticeExtractor {
    fn extract(&self, response: &ResponseEnvelope) -> Vec<OutputRecord> {
        let label = response.request.label();
        match NoticeDetail::deserialize(&response.payload) {
            Ok(detail) => self.rows(detail, &label),
            Err(e) => {
                tracing::warn!(url = %label, "Skipping malformed notice: {}", e);
                Vec::new()
            }
        }
    }
}
