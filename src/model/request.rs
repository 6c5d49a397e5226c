use chrono::NaiveDate;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque metadata carried from a request through to its response
///
/// It never takes part in the request digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Passthrough {
    /// 1-indexed page number of a page-count plan
    Page(u32),

    /// Publication day of a date-range plan
    Date(NaiveDate),

    /// Identifier of the notice a detail request was expanded from
    Notice(String),
}

impl fmt::Display for Passthrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(page) => write!(f, "page {}", page),
            Self::Date(date) => write!(f, "date {}", date.format("%Y-%m-%d")),
            Self::Notice(id) => write!(f, "notice {}", id),
        }
    }
}

/// One logical request
///
/// Requests are immutable: the builder methods consume `self` and
/// [`Request::with_query_param`] returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: Url,
    body: Option<Value>,
    passthrough: Option<Passthrough>,
}

impl Request {
    /// Creates a GET request with no body
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
            passthrough: None,
        }
    }

    /// Creates a POST request carrying a JSON body
    pub fn post_json(url: Url, body: Value) -> Self {
        Self {
            method: Method::Post,
            url,
            body: Some(body),
            passthrough: None,
        }
    }

    /// Attaches passthrough metadata
    pub fn with_passthrough(mut self, passthrough: Passthrough) -> Self {
        self.passthrough = Some(passthrough);
        self
    }

    /// Returns a copy of this request with `key` set to `value` in the query
    ///
    /// Any existing values for `key` are replaced; other parameters keep
    /// their order.
    pub fn with_query_param(&self, key: &str, value: &str) -> Self {
        let retained: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(key, value);
        }

        Self {
            method: self.method,
            url,
            body: self.body.clone(),
            passthrough: self.passthrough.clone(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn passthrough(&self) -> Option<&Passthrough> {
        self.passthrough.as_ref()
    }

    /// Computes the content address of this request
    ///
    /// The digest covers method, URL, and body. Each part is length-prefixed
    /// so that moving bytes between parts changes the digest. JSON bodies are
    /// rendered with sorted object keys, so equal bodies always hash equally.
    ///
    /// # Returns
    ///
    /// Hex-encoded SHA-256 (64 characters)
    pub fn digest(&self) -> String {
        let body = self.body.as_ref().map(Value::to_string);

        let mut hasher = Sha256::new();
        for part in [
            Some(self.method.as_str()),
            Some(self.url.as_str()),
            body.as_deref(),
        ] {
            match part {
                Some(bytes) => {
                    hasher.update([1u8]);
                    hasher.update((bytes.len() as u64).to_be_bytes());
                    hasher.update(bytes.as_bytes());
                }
                None => hasher.update([0u8]),
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Human-readable target used in log lines: URL plus body without quotes
    pub fn label(&self) -> String {
        match &self.body {
            Some(body) => format!("{} {}", self.url, body.to_string().replace('"', "")),
            None => self.url.to_string(),
        }
    }
}
