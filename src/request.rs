//! The request snapshot: an immutable, self-contained copy of an inbound
//! HTTP request, built once per request and never mutated afterwards.
//!
//! This is plain data, with no I/O and no lifetimes tied to the
//! connection. The transport layer (`crate::transport`) is the only
//! place that knows how to build one from a live hyper request.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// An ordered, possibly-repeating mapping from name to value, matching
/// Go's `map[string][]string` on the wire (`internal/request/request.go`
/// in the system this crate's contract was distilled from): headers and
/// form fields may legally repeat, and callers rely on iteration/lookup
/// returning every value, not just the last one.
pub type MultiMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: MultiMap,
    pub body: String,
    #[serde(rename = "raw_body")]
    pub raw_body: String,
    pub form: MultiMap,
    pub files: BTreeMap<String, String>,
    #[serde(rename = "raw_files")]
    pub raw_files: BTreeMap<String, String>,
}

impl Request {
    /// Builds a snapshot from already-decoded parts. `body_bytes` is the
    /// exact, undecoded body (used for `raw_body`); `body_text` is the
    /// text form used for body-regex matching and template variables,
    /// left empty when the body was consumed as multipart files instead.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: MultiMap,
        body_bytes: &[u8],
        body_text: impl Into<String>,
        form: MultiMap,
        files: BTreeMap<String, String>,
    ) -> Self {
        let raw_files = files
            .iter()
            .map(|(name, content)| (name.clone(), STANDARD.encode(content.as_bytes())))
            .collect();

        Request {
            method: method.into(),
            path: path.into(),
            headers,
            body: body_text.into(),
            raw_body: STANDARD.encode(body_bytes),
            form,
            files,
            raw_files,
        }
    }

    /// First value of a header, or empty string if absent. This is the
    /// only access pattern the expectation/template engines use:
    /// multi-valued headers match only on their first value.
    pub fn header_first(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}
