use crate::ids::SessionId;
use http::Method;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for forwarded requests and session responses.
///
/// Header names use `Arc<str>` since the same few names repeat on every request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Configuration record handed to the session factory.
///
/// `share_tables` is the selector data that links interactive tables across views;
/// `None` means the session has no selector data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(default)]
    pub share_tables: Option<serde_json::Value>,
}

impl SessionOptions {
    #[must_use]
    pub fn with_share_tables(share_tables: serde_json::Value) -> Self {
        Self {
            share_tables: Some(share_tables),
        }
    }
}

/// A request forwarded by the dispatcher to one session application.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Session the request was routed to
    pub session_id: SessionId,
    pub method: Method,
    /// Request path, always carrying the configured base URL prefix
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// HTTP headers (lowercase names)
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl SessionRequest {
    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query parameters; later duplicates win.
    #[must_use]
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Path below the session prefix, e.g. `_dash-layout` for `/base/<id>/_dash-layout`.
    #[must_use]
    pub fn path_within(&self, prefix: &str) -> Option<&str> {
        self.path.strip_prefix(prefix)
    }
}

/// Response produced by a session application, written back unmodified.
#[derive(Debug, Clone)]
pub struct SessionResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl SessionResponse {
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), content_type.to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/html; charset=utf-8", body.into().into_bytes())
    }

    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.into().into_bytes())
    }

    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, "application/json", body.to_string().into_bytes())
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }
}

/// A request-handling application serving one session.
///
/// The dispatcher never looks inside; it forwards requests and writes back whatever
/// comes out. Errors and panics become a generic 500.
pub trait SessionApp: Send + Sync {
    fn call(&self, request: &SessionRequest) -> anyhow::Result<SessionResponse>;
}

impl<F> SessionApp for F
where
    F: Fn(&SessionRequest) -> anyhow::Result<SessionResponse> + Send + Sync,
{
    fn call(&self, request: &SessionRequest) -> anyhow::Result<SessionResponse> {
        self(request)
    }
}

/// Wrap a closure as a shareable [`SessionApp`].
pub fn session_app<F>(handler: F) -> Arc<dyn SessionApp>
where
    F: Fn(&SessionRequest) -> anyhow::Result<SessionResponse> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Builds session applications from registered contexts.
///
/// Implementations must not bind network resources; the application they return is
/// served through the dispatcher's listener under `path_prefix`.
pub trait SessionFactory: Send + Sync + 'static {
    /// The opaque context object a session is generated from.
    type Context: Send + Sync + 'static;

    fn create_session(
        &self,
        context: &Self::Context,
        options: &SessionOptions,
        path_prefix: &str,
    ) -> anyhow::Result<Arc<dyn SessionApp>>;
}
