//! The expectation/match engine: a pattern over an inbound request,
//! evaluated as four independent regex sub-matchers that must all accept.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::request::Request;

/// Capture groups from a regex match, mirroring Go's
/// `regexp.FindStringSubmatch`: element 0 is the whole match, elements
/// 1..N are sub-groups, and a sub-group that didn't participate in the
/// match is the empty string rather than absent.
pub type Groups = Vec<String>;

/// The record produced by a successful [`Expectation::matches`] call.
/// Fields for absent regexes are empty, never missing. An all-absent
/// expectation accepts with all group sets empty, which falls straight
/// out of this representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub method_groups: Groups,
    pub path_groups: Groups,
    pub header_groups: BTreeMap<String, Groups>,
    pub body_groups: Groups,
}

/// A pattern over a request. Immutable once built; four independent
/// optional regex fields, each `None` meaning "unconstrained".
#[derive(Debug)]
pub struct Expectation {
    method: Option<Regex>,
    path: Option<Regex>,
    headers: BTreeMap<String, Regex>,
    body: Option<Regex>,
}

impl Expectation {
    /// Compiles a regex for one of the four top-level fields. An empty
    /// string is the documented sentinel for "field omitted"; it compiles
    /// to `None` rather than to a regex that matches the empty string.
    /// (`"^$"` is a distinct, valid, non-empty pattern with different
    /// behavior.)
    fn compile_field(field: &str, pattern: &str) -> Result<Option<Regex>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(pattern)
            .map(Some)
            .map_err(|source| Error::IllegalRegex {
                field: field.to_string(),
                source,
            })
    }

    pub fn new(
        method: &str,
        path: &str,
        headers: &BTreeMap<String, String>,
        body: &str,
    ) -> Result<Self> {
        let method = Self::compile_field("method", method)?;
        let path = Self::compile_field("path", path)?;
        let body = Self::compile_field("body", body)?;

        let mut compiled_headers = BTreeMap::new();
        for (name, pattern) in headers {
            // An empty pattern for a header means "unconstrained for this
            // header", the same as not listing it at all, so we drop it
            // rather than keep a vacuous entry.
            if let Some(regex) = Self::compile_field(&format!("headers.{name}"), pattern)? {
                compiled_headers.insert(name.clone(), regex);
            }
        }

        Ok(Expectation {
            method,
            path,
            headers: compiled_headers,
            body,
        })
    }

    /// Evaluates the four sub-matchers against `req`. `None` signals
    /// "reject"; matching itself never fails once the expectation is
    /// built.
    pub fn matches(&self, req: &Request) -> Option<Match> {
        let method_groups = match_field(&self.method, &req.method)?;
        let path_groups = match_field(&self.path, &req.path)?;
        let body_groups = match_field(&self.body, &req.body)?;

        let mut header_groups = BTreeMap::new();
        for (name, regex) in &self.headers {
            let value = req.header_first(name);
            let groups = capture(regex, value)?;
            header_groups.insert(name.clone(), groups);
        }

        Some(Match {
            method_groups,
            path_groups,
            header_groups,
            body_groups,
        })
    }
}

/// Runs an optional regex against a subject, returning empty groups when
/// the regex is absent (unconstrained) and `None` only when a present
/// regex fails to match.
fn match_field(regex: &Option<Regex>, subject: &str) -> Option<Groups> {
    match regex {
        None => Some(Groups::new()),
        Some(regex) => capture(regex, subject),
    }
}

fn capture(regex: &Regex, subject: &str) -> Option<Groups> {
    let captures = regex.captures(subject)?;
    Some(
        captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn req(method: &str, path: &str, headers: &[(&str, &str)], body: &str) -> Request {
        let mut hm = crate::request::MultiMap::new();
        for (k, v) in headers {
            hm.entry(k.to_string())
                .or_insert_with(Vec::new)
                .push(v.to_string());
        }
        Request::new(
            method,
            path,
            hm,
            body.as_bytes(),
            body,
            crate::request::MultiMap::new(),
            Map::new(),
        )
    }

    #[test]
    fn all_absent_fields_accept_with_empty_groups() {
        let e = Expectation::new("", "", &Map::new(), "").unwrap();
        let m = e.matches(&req("GET", "/anything", &[], "body")).unwrap();
        assert!(m.method_groups.is_empty());
        assert!(m.path_groups.is_empty());
        assert!(m.body_groups.is_empty());
        assert!(m.header_groups.is_empty());
    }

    #[test]
    fn capture_and_echo_scenario() {
        let e = Expectation::new("", r"^/xyz/(\d+)$", &Map::new(), "").unwrap();
        let m = e.matches(&req("GET", "/xyz/202", &[], "")).unwrap();
        assert_eq!(m.path_groups, vec!["/xyz/202".to_string(), "202".to_string()]);
    }

    #[test]
    fn header_capture_scenario() {
        let mut headers = Map::new();
        headers.insert(
            "Content-Type".to_string(),
            "^application/(json|xml)$".to_string(),
        );
        let e = Expectation::new("", "", &headers, "").unwrap();
        let m = e
            .matches(&req(
                "GET",
                "/",
                &[("Content-Type", "application/json")],
                "",
            ))
            .unwrap();
        assert_eq!(
            m.header_groups.get("Content-Type").unwrap(),
            &vec!["application/json".to_string(), "json".to_string()]
        );
    }

    #[test]
    fn header_not_listed_is_ignored_even_if_present() {
        let e = Expectation::new("", "", &Map::new(), "").unwrap();
        let m = e
            .matches(&req("GET", "/", &[("X-Unrelated", "whatever")], ""))
            .unwrap();
        assert!(m.header_groups.is_empty());
    }

    #[test]
    fn missing_header_matches_against_empty_string() {
        let mut headers = Map::new();
        headers.insert("X-Absent".to_string(), "^$".to_string());
        let e = Expectation::new("", "", &headers, "").unwrap();
        let m = e.matches(&req("GET", "/", &[], "")).unwrap();
        assert_eq!(
            m.header_groups.get("X-Absent").unwrap(),
            &vec!["".to_string()]
        );
    }

    #[test]
    fn any_failing_header_rejects_the_whole_expectation() {
        let mut headers = Map::new();
        headers.insert("A".to_string(), "^1$".to_string());
        headers.insert("B".to_string(), "^2$".to_string());
        let e = Expectation::new("", "", &headers, "").unwrap();
        assert!(e
            .matches(&req("GET", "/", &[("A", "1"), ("B", "wrong")], ""))
            .is_none());
    }

    #[test]
    fn empty_string_sentinel_is_not_same_as_anchored_empty_regex() {
        let unconstrained = Expectation::new("", "", &Map::new(), "").unwrap();
        let matches_only_empty = Expectation::new("", "", &Map::new(), "^$").unwrap();
        assert!(unconstrained.matches(&req("GET", "/", &[], "nonempty")).is_some());
        assert!(matches_only_empty
            .matches(&req("GET", "/", &[], "nonempty"))
            .is_none());
    }

    #[test]
    fn illegal_regex_is_rejected_at_construction() {
        let err = Expectation::new("", "(unclosed", &Map::new(), "").unwrap_err();
        assert!(matches!(err, Error::IllegalRegex { field, .. } if field == "path"));
    }
}
