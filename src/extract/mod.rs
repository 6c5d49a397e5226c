//! Extraction stage
//!
//! Maps one decoded response to zero or more flat [`OutputRecord`]s.
//! Extractors never fail: missing optional data yields fewer rows. List
//! elements are decoded one at a time, so an element of an unexpected shape
//! is logged and dropped while its siblings still yield rows.

mod normalize;
mod notices;
mod ocds;

pub use normalize::{decode_entities, join_address, non_zero_identifier, normalize_address, normalize_text};
pub use notices::{NoticeExtractor, NOTICE_COLUMNS};
pub use ocds::{OcdsExtractor, OCDS_COLUMNS};

use crate::config::SourceConfig;
use crate::model::{OutputRecord, ResponseEnvelope};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Flattens a response into output records
pub trait Extractor: Send + Sync {
    /// Extracts records from one response
    fn extract(&self, response: &ResponseEnvelope) -> Vec<OutputRecord>;
}

/// Returns the extractor bound to a source deployment
pub fn extractor_for(source: &SourceConfig) -> Box<dyn Extractor> {
    match source {
        SourceConfig::OcdsSearch(_) => Box::new(OcdsExtractor),
        SourceConfig::NoticeSearch(notices) => Box::new(NoticeExtractor::new(notices.notice_url.clone())),
    }
}

/// Decodes each element of a JSON list, dropping the ones that do not fit `T`
pub(crate) fn elements<T: DeserializeOwned>(
    items: Option<Vec<Value>>,
    kind: &str,
    label: &str,
) -> Vec<T> {
    items
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(element) => Some(element),
            Err(e) => {
                tracing::warn!(url = %label, "Skipping malformed {} #{}: {}", kind, index, e);
                None
            }
        })
        .collect()
}
