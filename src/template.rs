//! The response template engine: parameterized response synthesis from a
//! request and the [`Match`] it produced.
//!
//! Template language is handlebars (see DESIGN.md for why) rather than
//! Go's `text/template` syntax. Template syntax itself is not part of the
//! wire contract, only the variable bindings and the
//! missing-index-is-an-error behavior are. We add a `strict_index` helper
//! to get that behavior, since handlebars' own `lookup` silently renders
//! missing keys as empty.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError as HbRenderError,
};
use serde_json::{json, Value};

use crate::error::{Error, RenderError, Result};
use crate::expectation::Match;
use crate::request::Request;
use crate::response::Response;

static TEMPLATE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_name(prefix: &str) -> String {
    let id = TEMPLATE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id}")
}

/// `{{strict_index container key}}` indexes a sequence by integer or a
/// map by string key, and raises a render error (rather than silently
/// rendering empty) when the index/key doesn't resolve.
struct StrictIndex;

impl HelperDef for StrictIndex {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let container = h
            .param(0)
            .ok_or_else(|| HbRenderError::new("strict_index: missing container argument"))?
            .value();
        let key = h
            .param(1)
            .ok_or_else(|| HbRenderError::new("strict_index: missing key argument"))?
            .value();

        let resolved = resolve_index(container, key)
            .ok_or_else(|| HbRenderError::new(format!("strict_index: no such index/key {key}")))?;

        out.write(&value_to_text(resolved))?;
        Ok(())
    }
}

fn resolve_index<'a>(container: &'a Value, key: &Value) -> Option<&'a Value> {
    match container {
        Value::Array(items) => {
            let idx = key.as_u64().or_else(|| key.as_str()?.parse::<u64>().ok())?;
            items.get(idx as usize)
        }
        Value::Object(map) => {
            let k = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
            map.get(&k)
        }
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn new_engine() -> Handlebars<'static> {
    let mut engine = Handlebars::new();
    engine.set_strict_mode(true);
    engine.register_helper("strict_index", Box::new(StrictIndex));
    engine
}

fn compile(engine: &mut Handlebars<'static>, field: &str, source: &str) -> Result<Option<String>> {
    if source.is_empty() {
        return Ok(None);
    }
    let name = next_name(field);
    engine
        .register_template_string(&name, source)
        .map_err(|source| Error::IllegalTemplate {
            field: field.to_string(),
            source: Box::new(source),
        })?;
    Ok(Some(name))
}

/// A parameterized response description. Immutable once built.
pub struct Template {
    engine: Handlebars<'static>,
    status_code: Option<String>,
    headers: Vec<(String, Vec<String>)>,
    body: Option<String>,
}

impl Template {
    pub fn new(
        status_code: &str,
        headers: &BTreeMap<String, Vec<String>>,
        body: &str,
    ) -> Result<Self> {
        let mut engine = new_engine();

        let body = compile(&mut engine, "body", body)?;
        let status_code = compile(&mut engine, "status_code", status_code)?;

        let mut compiled_headers = Vec::new();
        for (name, values) in headers {
            let mut names = Vec::new();
            for (i, value) in values.iter().enumerate() {
                let field = format!("headers.{name}[{i}]");
                if let Some(tname) = compile(&mut engine, &field, value)? {
                    names.push(tname);
                } else {
                    // An empty header template value renders to "", so we
                    // keep the slot and preserve header ordering/count.
                    let tname = next_name(&field);
                    engine
                        .register_template_string(&tname, "")
                        .expect("empty template always compiles");
                    names.push(tname);
                }
            }
            compiled_headers.push((name.clone(), names));
        }

        Ok(Template {
            engine,
            status_code,
            headers: compiled_headers,
            body,
        })
    }

    fn variables(req: &Request, m: &Match) -> Value {
        json!({
            "Method": req.method,
            "Path": req.path,
            "Body": req.body,
            "Headers": req.headers,
            "MethodGroups": m.method_groups,
            "PathGroups": m.path_groups,
            "HeaderGroups": m.header_groups,
            "BodyGroups": m.body_groups,
        })
    }

    fn render_named(&self, name: &str, data: &Value) -> std::result::Result<String, RenderError> {
        self.engine
            .render(name, data)
            .map_err(|e| RenderError(e.to_string()))
    }

    /// Renders a response: body, then status, then headers, matching the
    /// original's render order (significant only for which error surfaces
    /// first when more than one field is malformed).
    pub fn respond(&self, req: &Request, m: &Match) -> Result<Response> {
        let data = Self::variables(req, m);

        let body = match &self.body {
            Some(name) => self.render_named(name, &data)?.into_bytes(),
            None => Vec::new(),
        };

        let status = match &self.status_code {
            Some(name) => {
                let rendered = self.render_named(name, &data)?;
                if rendered.is_empty() {
                    200
                } else {
                    // No range checking beyond "parses as an integer",
                    // and no trimming: matches `strconv.Atoi`, which
                    // rejects the surrounding whitespace it doesn't
                    // itself strip.
                    rendered
                        .parse::<i64>()
                        .map_err(|_| Error::IllegalStatusCode { value: rendered })?
                }
            }
            None => 200,
        };

        let mut out_headers = Vec::new();
        for (name, value_names) in &self.headers {
            for value_name in value_names {
                let rendered = self.render_named(value_name, &data)?;
                out_headers.push((name.clone(), rendered));
            }
        }

        Ok(Response {
            status,
            headers: out_headers,
            body,
        })
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn empty_match() -> Match {
        Match::default()
    }

    fn basic_request() -> Request {
        Request::new(
            "GET",
            "/",
            crate::request::MultiMap::new(),
            b"",
            "",
            crate::request::MultiMap::new(),
            Map::new(),
        )
    }

    #[test]
    fn literal_template_renders_literally_with_200_and_no_extra_headers() {
        let t = Template::new("", &Map::new(), "hello world").unwrap();
        let resp = t.respond(&basic_request(), &empty_match()).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"hello world");
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn capture_and_echo_scenario() {
        let m = Match {
            path_groups: vec!["/xyz/202".to_string(), "202".to_string()],
            ..Match::default()
        };
        let t = Template::new(
            "{{strict_index PathGroups 1}}",
            &Map::new(),
            "id={{strict_index PathGroups 1}}",
        )
        .unwrap();
        let resp = t.respond(&basic_request(), &m).unwrap();
        assert_eq!(resp.status, 202);
        assert_eq!(resp.body, b"id=202");
    }

    #[test]
    fn header_capture_scenario() {
        let mut header_groups = Map::new();
        header_groups.insert(
            "Content-Type".to_string(),
            vec!["application/json".to_string(), "json".to_string()],
        );
        let m = Match {
            header_groups,
            ..Match::default()
        };
        let t = Template::new(
            "",
            &Map::new(),
            r#"{{strict_index (strict_index HeaderGroups "Content-Type") 1}}"#,
        )
        .unwrap();
        let resp = t.respond(&basic_request(), &m).unwrap();
        assert_eq!(resp.body, b"json");
    }

    #[test]
    fn render_failure_on_missing_index_surfaces_as_error() {
        let t = Template::new("", &Map::new(), "{{strict_index BodyGroups 7}}").unwrap();
        let err = t.respond(&basic_request(), &empty_match()).unwrap_err();
        assert!(matches!(err, Error::RenderFailure(_)));
    }

    #[test]
    fn illegal_status_code_is_a_render_error() {
        let t = Template::new("not-a-number", &Map::new(), "").unwrap();
        let err = t.respond(&basic_request(), &empty_match()).unwrap_err();
        assert!(matches!(err, Error::IllegalStatusCode { .. }));
    }

    #[test]
    fn headers_preserve_declared_order_and_repeat_count() {
        let mut headers = Map::new();
        headers.insert(
            "X-Trace".to_string(),
            vec!["one".to_string(), "two".to_string()],
        );
        let t = Template::new("", &headers, "").unwrap();
        let resp = t.respond(&basic_request(), &empty_match()).unwrap();
        assert_eq!(
            resp.headers,
            vec![
                ("X-Trace".to_string(), "one".to_string()),
                ("X-Trace".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn illegal_template_is_rejected_at_construction() {
        let err = Template::new("", &Map::new(), "{{#if}}").unwrap_err();
        assert!(matches!(err, Error::IllegalTemplate { field, .. } if field == "body"));
    }
}
