//! sham: a programmable HTTP mock server for integration testing.
//!
//! Callers register request expectations paired with response templates
//! at runtime; any request the server receives is matched against the
//! registered expectations in registration order, and the first match
//! synthesizes a response from its template. A control surface,
//! distinguished from mocked traffic by the `X-Derision-Control` header,
//! lets callers register/clear expectations and inspect the request log.
//!
//! The core is transport-agnostic: [`expectation`], [`template`],
//! [`handler`], and [`log`] operate purely on [`request::Request`] values
//! and produce [`response::Response`] values, with no knowledge of hyper
//! or sockets. [`transport`] is the thin collaborator that wires the core
//! to a real HTTP listener; [`config`] and [`loader`] are the startup path.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod expectation;
pub mod handler;
pub mod loader;
pub mod log;
pub mod request;
pub mod response;
pub mod template;
pub mod transport;

pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use expectation::{Expectation, Match};
pub use handler::HandlerSet;
pub use log::RequestLog;
pub use request::Request;
pub use response::Response;
pub use template::Template;
