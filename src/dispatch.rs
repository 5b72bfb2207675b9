//! The control-vs-catch-all dispatch rule, the registration payload
//! schema, and the `Dispatcher` that ties `HandlerSet` + `RequestLog`
//! together into the handful of operations the transport layer calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{Error, Result};
use crate::expectation::Expectation;
use crate::handler::HandlerSet;
use crate::log::RequestLog;
use crate::request::Request;
use crate::response::Response;
use crate::template::Template;

/// The header that marks a request as control-plane traffic. Any
/// non-empty value counts; the exact value is not inspected.
pub const CONTROL_HEADER: &str = "X-Derision-Control";

/// Classifies an inbound request by its headers alone, pure and
/// independent of which path it arrived on. The header takes precedence
/// over any path-based routing the collaborator layer might also apply.
pub fn is_control_plane(req: &Request) -> bool {
    !req.header_first(CONTROL_HEADER).is_empty()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RawExpectation {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Default for RawExpectation {
    fn default() -> Self {
        RawExpectation {
            method: String::new(),
            path: String::new(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RawTemplate {
    #[serde(rename = "status_code")]
    pub status_code: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl Default for RawTemplate {
    fn default() -> Self {
        RawTemplate {
            status_code: String::new(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

/// One record of the registration payload schema: an expectation paired
/// with a template, everything optional except the two outer keys,
/// unknown keys rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationRecord {
    pub request: RawExpectation,
    pub response: RawTemplate,
}

/// Parses one JSON registration record and builds the compiled
/// `(Expectation, Template)` pair, or a `SchemaViolation`/`IllegalRegex`/
/// `IllegalTemplate` error.
pub fn parse_record(bytes: &[u8]) -> Result<RegistrationRecord> {
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedPayload(e.to_string()))
}

pub fn build_pair(record: RegistrationRecord) -> Result<(Expectation, Template)> {
    let expectation = Expectation::new(
        &record.request.method,
        &record.request.path,
        &record.request.headers,
        &record.request.body,
    )?;
    let template = Template::new(
        &record.response.status_code,
        &record.response.headers,
        &record.response.body,
    )?;
    Ok((expectation, template))
}

/// Ties the handler set and request log together into the operations the
/// control surface and data plane call. Holds no transport-specific
/// state; cheaply cloneable (everything inside is an `Arc`).
#[derive(Clone)]
pub struct Dispatcher {
    handler_set: Arc<HandlerSet>,
    request_log: Arc<RequestLog>,
}

impl Dispatcher {
    pub fn new(handler_set: Arc<HandlerSet>, request_log: Arc<RequestLog>) -> Self {
        Dispatcher {
            handler_set,
            request_log,
        }
    }

    /// Installs one expectation+template pair from a registration payload.
    /// Validation errors leave the handler set untouched.
    pub fn register(&self, payload: &[u8]) -> Result<()> {
        let record = parse_record(payload)?;
        let (expectation, template) = build_pair(record)?;
        self.handler_set.add(expectation, template);
        Ok(())
    }

    pub fn clear_handlers(&self) {
        self.handler_set.clear();
    }

    pub fn requests(&self, clear: bool) -> Vec<Request> {
        self.request_log.snapshot(clear)
    }

    pub fn clear_requests(&self) {
        self.request_log.clear();
    }

    pub fn subscribe(&self) -> BroadcastStream<Request> {
        self.request_log.subscribe()
    }

    /// Appends the snapshot to the log, looks it up against the handler
    /// set, and always produces a response: the handler's rendered
    /// response on a hit, a 404 on no match, or a 500 describing the
    /// failure. This function never returns `Err`, since by the time
    /// data plane traffic reaches here every failure mode has a defined
    /// wire response.
    pub fn handle_data_plane(&self, req: Request) -> Response {
        self.request_log.add(req.clone());

        match self.handler_set.lookup(&req) {
            Ok(Some(resp)) => resp,
            Ok(None) => error_response(&Error::NoMatch),
            Err(err) => error_response(&err),
        }
    }
}

fn error_response(err: &Error) -> Response {
    let body = json!({
        "message": err.to_string(),
        "details": err.field(),
    });
    Response::json(err.status_code().as_u16(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn req_with_header(name: &str, value: &str) -> Request {
        let mut headers = crate::request::MultiMap::new();
        if !value.is_empty() || name.is_empty() {
            headers.insert(name.to_string(), vec![value.to_string()]);
        }
        Request::new(
            "POST",
            "/_control/register",
            headers,
            b"",
            "",
            crate::request::MultiMap::new(),
            Map::new(),
        )
    }

    #[test]
    fn non_empty_control_header_is_control_plane() {
        assert!(is_control_plane(&req_with_header(CONTROL_HEADER, "1")));
    }

    #[test]
    fn empty_control_header_is_data_plane() {
        assert!(!is_control_plane(&req_with_header(CONTROL_HEADER, "")));
    }

    #[test]
    fn absent_control_header_is_data_plane() {
        let req = Request::new(
            "GET",
            "/",
            crate::request::MultiMap::new(),
            b"",
            "",
            crate::request::MultiMap::new(),
            Map::new(),
        );
        assert!(!is_control_plane(&req));
    }

    #[test]
    fn unknown_keys_in_registration_record_are_rejected() {
        let payload = br#"{"request": {}, "response": {}, "bogus": 1}"#;
        assert!(matches!(
            parse_record(payload),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn control_plane_register_does_not_touch_request_log() {
        let dispatcher = Dispatcher::new(Arc::new(HandlerSet::new()), Arc::new(RequestLog::new(0)));
        dispatcher
            .register(br#"{"request": {}, "response": {"body": "ok"}}"#)
            .unwrap();
        assert_eq!(dispatcher.requests(false).len(), 0);
    }

    #[test]
    fn data_plane_miss_is_404_and_logged() {
        let dispatcher = Dispatcher::new(Arc::new(HandlerSet::new()), Arc::new(RequestLog::new(0)));
        let req = Request::new(
            "GET",
            "/nope",
            crate::request::MultiMap::new(),
            b"",
            "",
            crate::request::MultiMap::new(),
            Map::new(),
        );
        let resp = dispatcher.handle_data_plane(req);
        assert_eq!(resp.status, 404);
        assert_eq!(dispatcher.requests(false).len(), 1);
    }

    #[test]
    fn render_failure_is_500_and_still_logged() {
        let dispatcher = Dispatcher::new(Arc::new(HandlerSet::new()), Arc::new(RequestLog::new(0)));
        dispatcher
            .register(br#"{"request": {}, "response": {"body": "{{strict_index BodyGroups 7}}"}}"#)
            .unwrap();
        let req = Request::new(
            "GET",
            "/",
            crate::request::MultiMap::new(),
            b"",
            "",
            crate::request::MultiMap::new(),
            Map::new(),
        );
        let resp = dispatcher.handle_data_plane(req);
        assert_eq!(resp.status, 500);
        assert_eq!(dispatcher.requests(false).len(), 1);
    }
}
