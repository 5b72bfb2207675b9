//! The HTTP collaborator: the only module that knows about sockets,
//! hyper, or wire bytes. Everything it does boils down to "build a
//! `Request` snapshot, hand it to the `Dispatcher`, turn the resulting
//! `Response` back into bytes". It stays thin and mechanical here, by
//! design, since it sits outside the core.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Request as HyperRequest, Response as HyperResponse, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::dispatch::is_control_plane;
use crate::error::Error;
use crate::request::{MultiMap, Request};
use crate::response::Response;
use crate::Dispatcher;

type BoxedBody = BoxBody<Bytes, Infallible>;

/// Binds `addr` and serves forever, dispatching every connection to
/// [`handle`]. Runs until the process is killed; there is no graceful
/// shutdown hook beyond "the collaborator may abandon a response", which
/// we leave to the OS/connection layer.
pub async fn serve(addr: SocketAddr, dispatcher: Dispatcher) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, dispatcher.clone()));
            if let Err(err) = ConnBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                warn!(%peer, error = %err, "connection error");
            }
        });
    }
}

async fn handle(
    req: HyperRequest<Incoming>,
    dispatcher: Dispatcher,
) -> Result<HyperResponse<BoxedBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let header_multimap = headers_to_multimap(req.headers());
    let control = !header_multimap
        .get(crate::dispatch::CONTROL_HEADER)
        .and_then(|v| v.first())
        .map(String::as_str)
        .unwrap_or("")
        .is_empty();

    if control {
        return Ok(route_control(method, &path, &query, req, dispatcher).await);
    }

    match convert_request(&method, &path, header_multimap, req).await {
        Ok(snapshot) => Ok(to_hyper_response(dispatcher.handle_data_plane(snapshot))),
        Err(err) => {
            error!(error = %err, "failed to convert request");
            Ok(to_hyper_response(Response::json(
                StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                &serde_json::json!({ "message": err.to_string() }),
            )))
        }
    }
}

async fn route_control(
    method: Method,
    path: &str,
    query: &str,
    req: HyperRequest<Incoming>,
    dispatcher: Dispatcher,
) -> HyperResponse<BoxedBody> {
    match (method.clone(), path) {
        (Method::POST, "/_control/register") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => Bytes::new(),
            };
            match dispatcher.register(&body) {
                Ok(()) => to_hyper_response(Response::empty(204)),
                Err(err) => to_hyper_response(error_to_response(&err)),
            }
        }
        (Method::POST, "/_control/clear") => {
            dispatcher.clear_handlers();
            to_hyper_response(Response::empty(204))
        }
        (Method::GET, "/_control/requests") => {
            let clear = query_flag(query, "clear");
            let snapshot = dispatcher.requests(clear);
            to_hyper_response(Response::json(200, &snapshot))
        }
        (Method::GET, "/_control/sse") => sse_response(dispatcher),
        _ => to_hyper_response(Response::empty(404)),
    }
}

fn query_flag(query: &str, name: &str) -> bool {
    url::form_urlencoded::parse(query.as_bytes())
        .any(|(k, v)| k == name && !v.is_empty())
}

fn sse_response(dispatcher: Dispatcher) -> HyperResponse<BoxedBody> {
    let stream = dispatcher.subscribe().filter_map(|item| match item {
        Ok(request) => {
            let payload = serde_json::to_string(&request).unwrap_or_default();
            Some(Ok::<_, Infallible>(Frame::data(Bytes::from(format!(
                "data: {payload}\n\n"
            )))))
        }
        Err(err) => {
            warn!(error = %err, "sse subscriber lagged, dropping missed events");
            None
        }
    });

    let body = StreamBody::new(stream).boxed();

    HyperResponse::builder()
        .status(200)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .body(body)
        .expect("static headers are always valid")
}

fn headers_to_multimap(headers: &HeaderMap) -> MultiMap {
    let mut map = MultiMap::new();
    for (name, value) in headers.iter() {
        map.entry(canonicalize_header_name(name.as_str()))
            .or_default()
            .push(value.to_str().unwrap_or("").to_string());
    }
    map
}

/// hyper/`http` lowercase header names; Go's `net/http` (what this
/// contract was distilled from) canonicalizes to `Train-Case`
/// (`textproto.CanonicalMIMEHeaderKey`) before handler code ever sees
/// them. We reproduce that form so `X-Derision-Control` and hand-written
/// `Content-Type` expectation keys match the names callers actually write.
fn canonicalize_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

async fn convert_request(
    method: &Method,
    path: &str,
    headers: MultiMap,
    req: HyperRequest<Incoming>,
) -> Result<Request, Error> {
    let content_type = headers
        .get("Content-Type")
        .and_then(|v| v.first())
        .cloned()
        .unwrap_or_default();

    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::ConversionFailure(e.to_string()))?
        .to_bytes();

    if content_type.starts_with("multipart/form-data") {
        let (form, files) = parse_multipart(&content_type, body_bytes.clone()).await?;
        // Multipart bodies are consumed into `files`, leaving the text
        // body empty.
        return Ok(Request::new(
            method.as_str(),
            path,
            headers,
            &body_bytes,
            "",
            form,
            files,
        ));
    }

    let body_text = String::from_utf8_lossy(&body_bytes).into_owned();

    let form = if content_type.starts_with("application/x-www-form-urlencoded") {
        parse_urlencoded(&body_bytes)
    } else {
        MultiMap::new()
    };

    Ok(Request::new(
        method.as_str(),
        path,
        headers,
        &body_bytes,
        body_text,
        form,
        BTreeMap::new(),
    ))
}

fn parse_urlencoded(body: &[u8]) -> MultiMap {
    let mut form = MultiMap::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        form.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    form
}

async fn parse_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<(MultiMap, BTreeMap<String, String>), Error> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::ConversionFailure(format!("bad multipart boundary: {e}")))?;

    let stream = futures_util_once(body);
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = MultiMap::new();
    let mut files = BTreeMap::new();

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| Error::ConversionFailure(format!("multipart parse error: {e}")))?;
        let Some(field) = field else { break };

        let filename = field.file_name().map(str::to_string);
        let name = field.name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::ConversionFailure(format!("multipart read error: {e}")))?;

        match filename {
            Some(filename) => {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                files.insert(filename, content);
            }
            None => {
                let value = String::from_utf8_lossy(&bytes).into_owned();
                form.entry(name).or_default().push(value);
            }
        }
    }

    Ok((form, files))
}

/// `multer::Multipart` wants a `Stream` of body chunks; we already have
/// the whole body in memory (matching the original's
/// `ParseMultipartForm`-into-memory behavior), so this just yields it once.
fn futures_util_once(
    body: Bytes,
) -> impl tokio_stream::Stream<Item = Result<Bytes, std::io::Error>> {
    tokio_stream::once(Ok(body))
}

fn to_hyper_response(resp: Response) -> HyperResponse<BoxedBody> {
    // A rendered status code outside the valid HTTP range (or not
    // representable in a u16 at all) is caught here, at the wire
    // boundary, rather than at template-render time: `u16::try_from`
    // fails to a status this builder will in turn reject, landing in
    // the malformed-response fallback below.
    let status = u16::try_from(resp.status).unwrap_or(0);
    let mut builder = HyperResponse::builder().status(status);
    for (name, value) in &resp.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Full::new(Bytes::from(resp.body)).boxed())
        .unwrap_or_else(|_| {
            HyperResponse::builder()
                .status(500)
                .body(Full::new(Bytes::from_static(b"malformed response headers")).boxed())
                .expect("fallback response is always valid")
        })
}

fn error_to_response(err: &Error) -> Response {
    Response::json(
        err.status_code().as_u16(),
        &serde_json::json!({ "message": err.to_string(), "details": err.field() }),
    )
}
