use crate::registry::HeaderVec;
use may_minihttp::Request;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Raw request data extracted from `may_minihttp` before routing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// HTTP method as sent by the client
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// Query string without the leading `?`
    pub query: Option<String>,
    /// HTTP headers (lowercase names)
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Build a request by hand; used when driving the dispatcher without a socket.
    #[must_use]
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = split_query(target);
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Split a request target into path and query string.
#[must_use]
pub fn split_query(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (if path.is_empty() { "/" } else { path }, Some(query)),
        None => (if target.is_empty() { "/" } else { target }, None),
    }
}

/// Extract method, path, headers and body from a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let (path, query) = {
        let (path, query) = split_query(req.path());
        (path.to_string(), query.map(str::to_string))
    };

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                Arc::from(h.name.to_ascii_lowercase()),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        debug!(error = %e, path = %path, "Request body read failed");
        body.clear();
    }

    debug!(
        method = %method,
        path = %path,
        headers_count = headers.len(),
        body_size_bytes = body.len(),
        "HTTP request parsed"
    );

    ParsedRequest {
        method,
        path,
        query,
        headers,
        body,
    }
}
