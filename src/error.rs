//! Error kinds shared by every core module.
//!
//! Mirrors the error-kind table in the spec: each variant names the
//! operation that raised it and carries enough context to render a useful
//! control-plane response. The mapping to an HTTP status code lives in
//! [`Error::status_code`], the only place in the crate that couples these
//! variants to HTTP semantics.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("illegal regex in field `{field}`: {source}")]
    IllegalRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("illegal template in field `{field}`: {source}")]
    IllegalTemplate {
        field: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("illegal status code: `{value}` does not parse as an integer")]
    IllegalStatusCode { value: String },

    #[error("template render failed: {0}")]
    RenderFailure(#[from] RenderError),

    #[error("schema violation: {details}")]
    SchemaViolation { details: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("failed to convert request: {0}")]
    ConversionFailure(String),

    #[error("no expectation matched the request")]
    NoMatch,

    #[error("startup I/O failure: {0}")]
    StartupIoFailure(String),
}

/// A render-time failure from the handlebars engine, kept distinct from
/// [`Error::IllegalTemplate`] (a build-time failure) because the spec
/// treats "won't compile" and "fails at render with this data" as
/// different error kinds with different surfacing policy.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps an error kind to the status code it should surface as when it
    /// escapes the control or data plane, per the spec's error table.
    /// Registration-time errors (`IllegalRegex`, `IllegalTemplate`,
    /// `SchemaViolation`, `MalformedPayload`) are 400s; render/runtime
    /// errors on the data plane (`IllegalStatusCode`, `RenderFailure`,
    /// `ConversionFailure`) are 500s; `NoMatch` is the data plane's 404.
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::IllegalRegex { .. }
            | Error::IllegalTemplate { .. }
            | Error::SchemaViolation { .. }
            | Error::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Error::NoMatch => StatusCode::NOT_FOUND,
            Error::IllegalStatusCode { .. }
            | Error::RenderFailure(_)
            | Error::ConversionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::StartupIoFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Field name, when this error kind names one, for `{message, details}`
    /// bodies on the control plane.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::IllegalRegex { field, .. } | Error::IllegalTemplate { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}
