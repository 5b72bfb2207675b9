//! The plain-data response description a [`crate::template::Template`]
//! renders to. Transport-agnostic: `crate::transport` is the only module
//! that turns one of these into bytes on a socket.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Not restricted to the valid HTTP status range at this layer,
    /// matching a rendered status code's "parses as an integer" contract.
    /// Out-of-range values surface as a wire error only once the
    /// transport layer tries to build an actual HTTP response from them.
    pub status: i64,
    /// Preserves declaration order. A header name may appear more than
    /// once, one entry per declared template value.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn empty(status: u16) -> Self {
        Response {
            status: status as i64,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, value: &impl serde::Serialize) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Response {
            status: status as i64,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }
}
