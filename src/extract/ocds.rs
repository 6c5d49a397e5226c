//! OCDS search page extraction
//!
//! One row per `result × release × award × supplier`; result, release, and
//! award fields are repeated on every supplier row.

use crate::extract::normalize::{join_address, non_zero_identifier, normalize_text};
use crate::extract::{elements, Extractor};
use crate::model::{FieldValue, OutputRecord, ResponseEnvelope};
use serde::Deserialize;
use serde_json::Value;

/// Column order of OCDS rows
pub const OCDS_COLUMNS: &[&str] = &[
    "releaseOcid",
    "supplierName",
    "supplierIdentifier",
    "supplierAddress",
    "supplierContactName",
    "awardValue",
    "awardGiven",
    "awardStart",
    "awardEnd",
    "buyerName",
    "buyerAddress",
    "buyerContactName",
    "buyerContactEmail",
    "buyerContactPhone",
    "buyerContactUrl",
    "contractTitle",
    "contractDescription",
    "contractValue",
    "contractValueMin",
    "contractPublished",
];

#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    results: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    published_date: Option<String>,
    releases: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct Release {
    ocid: Option<String>,
    buyer: Option<Party>,
    tender: Option<Tender>,
    awards: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Party {
    name: Option<String>,
    identifier: Option<Identifier>,
    address: Option<Address>,
    contact_point: Option<ContactPoint>,
}

#[derive(Debug, Default, Deserialize)]
struct Identifier {
    id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Address {
    street_address: Option<String>,
    locality: Option<String>,
    region: Option<String>,
    postal_code: Option<String>,
    country_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactPoint {
    name: Option<String>,
    email: Option<String>,
    telephone: Option<String>,
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tender {
    title: Option<String>,
    description: Option<String>,
    value: Option<Amount>,
    min_value: Option<Amount>,
}

#[derive(Debug, Default, Deserialize)]
struct Amount {
    amount: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Award {
    value: Option<Amount>,
    date: Option<String>,
    contract_period: Option<Period>,
    suppliers: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl Address {
    fn joined(&self) -> Option<String> {
        join_address(&[
            self.street_address.as_deref(),
            self.locality.as_deref(),
            self.region.as_deref(),
            self.postal_code.as_deref(),
            self.country_name.as_deref(),
        ])
    }
}

fn amount(value: Option<&Amount>) -> FieldValue {
    FieldValue::from_json(value.and_then(|v| v.amount.as_ref()))
}

fn text(value: Option<&String>) -> Option<String> {
    value.map(|s| normalize_text(s))
}

fn identifier_text(id: Option<&Value>) -> Option<String> {
    match id? {
        Value::String(s) => non_zero_identifier(Some(s)),
        Value::Number(n) => non_zero_identifier(Some(&n.to_string())),
        _ => None,
    }
}

/// Extracts award rows from OCDS search pages
#[derive(Debug, Clone, Copy, Default)]
pub struct OcdsExtractor;

impl OcdsExtractor {
    fn rows(&self, page: SearchPage, label: &str) -> Vec<OutputRecord> {
        let mut rows = Vec::new();

        for result in elements::<SearchResult>(page.results, "result", label) {
            for release in elements::<Release>(result.releases, "release", label) {
                let buyer = release.buyer.unwrap_or_default();
                let buyer_contact = buyer.contact_point.unwrap_or_default();
                let buyer_address = buyer.address.as_ref().and_then(Address::joined);
                let tender = release.tender.unwrap_or_default();

                for award in elements::<Award>(release.awards, "award", label) {
                    let period = award.contract_period.as_ref();

                    for supplier in elements::<Party>(award.suppliers, "supplier", label) {
                        let contact = supplier.contact_point.unwrap_or_default();

                        let mut record = OutputRecord::new();
                        record.push("releaseOcid", release.ocid.clone());
                        record.push("supplierName", text(supplier.name.as_ref()));
                        record.push(
                            "supplierIdentifier",
                            identifier_text(supplier.identifier.as_ref().and_then(|i| i.id.as_ref())),
                        );
                        record.push(
                            "supplierAddress",
                            supplier.address.as_ref().and_then(Address::joined),
                        );
                        record.push("supplierContactName", text(contact.name.as_ref()));
                        record.push("awardValue", amount(award.value.as_ref()));
                        record.push("awardGiven", award.date.clone());
                        record.push("awardStart", period.and_then(|p| p.start_date.clone()));
                        record.push("awardEnd", period.and_then(|p| p.end_date.clone()));
                        record.push("buyerName", text(buyer.name.as_ref()));
                        record.push("buyerAddress", buyer_address.clone());
                        record.push("buyerContactName", text(buyer_contact.name.as_ref()));
                        record.push("buyerContactEmail", buyer_contact.email.clone());
                        record.push("buyerContactPhone", buyer_contact.telephone.clone());
                        record.push("buyerContactUrl", buyer_contact.uri.clone());
                        record.push("contractTitle", text(tender.title.as_ref()));
                        record.push("contractDescription", text(tender.description.as_ref()));
                        record.push("contractValue", amount(tender.value.as_ref()));
                        record.push("contractValueMin", amount(tender.min_value.as_ref()));
                        record.push("contractPublished", result.published_date.clone());
                        rows.push(record);
                    }
                }
            }
        }

        rows
    }
}

impl Extractor for OcdsExtractor {
    fn extract(&self, response: &ResponseEnvelope) -> Vec<OutputRecord> {
        let label = response.request.label();
        match SearchPage::deserialize(&response.payload) {
            Ok(page) => self.rows(page, &label),
            Err(e) => {
                tracing::warn!(url = %label, "Skipping malformed OCDS page: {}", e);
                Vec::new()
            }
        }
    }
}
