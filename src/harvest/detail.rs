//! Detail fan-out for listings that only carry summaries

use crate::model::{Passthrough, Request, ResponseEnvelope};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "noticeList")]
    notice_list: Option<Vec<ListingEntry>>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    item: Option<ListingItem>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    id: Option<serde_json::Value>,
}

/// Turns a search response into one detail request per listed notice
#[derive(Debug, Clone)]
pub struct DetailExpander {
    prefix: String,
}

impl DetailExpander {
    /// Creates an expander appending notice ids to `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Expands a listing
    ///
    /// Never fails: a listing without `noticeList`, entries without an id,
    /// and ids that do not form a valid URL are skipped.
    pub fn expand(&self, listing: &ResponseEnvelope) -> Vec<Request> {
        let parsed = match Listing::deserialize(&listing.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url = %listing.request.label(), "Unexpected listing shape: {}", e);
                return Vec::new();
            }
        };

        parsed
            .notice_list
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.item?.id)
            .filter_map(|id| {
                let id = match id {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let id = id.trim().to_string();
                if id.is_empty() {
                    return None;
                }

                match Url::parse(&format!("{}{}", self.prefix, id)) {
                    Ok(url) => Some(Request::get(url).with_passthrough(Passthrough::Notice(id))),
                    Err(e) => {
                        tracing::warn!("Skipping notice {}: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }
}
