use crate::ids::SessionId;
use crate::registry::SessionTable;
use std::sync::Arc;
use tracing::debug;

/// Root path serving the status page.
pub const ROOT_PATH: &str = "/";
/// Path that stops the embedded server.
pub const SHUTDOWN_PATH: &str = "/shutdown";
/// Path serving the bundled icon.
pub const FAVICON_PATH: &str = "/favicon.ico";

/// Outcome of routing one request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    Shutdown,
    Favicon,
    Session(SessionId),
    NotFound,
}

/// Normalise a configured base URL: no leading or trailing slashes, `None` when empty.
#[must_use]
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Path prefix a session is served under: `/{id}/` or `/{base}/{id}/`.
#[must_use]
pub fn session_prefix(base_url: Option<&str>, id: &SessionId) -> String {
    match base_url {
        Some(base) => format!("/{base}/{id}/"),
        None => format!("/{id}/"),
    }
}

/// Maps request paths onto control routes and registered sessions.
#[derive(Clone)]
pub struct PathRouter {
    base_url: Option<Arc<str>>,
    table: Arc<SessionTable>,
}

impl PathRouter {
    pub fn new(base_url: Option<&str>, table: Arc<SessionTable>) -> Self {
        Self {
            base_url: base_url.and_then(normalize_base_url).map(Arc::from),
            table,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Classify a request path.
    ///
    /// Control paths win over session lookup. Anything whose first segment (after the
    /// optional base URL) is not a registered session is `NotFound`.
    #[must_use]
    pub fn resolve(&self, request_path: &str) -> Route {
        let path = request_path.split('?').next().unwrap_or(ROOT_PATH);
        let local = self.strip_base(path);

        match local {
            "" | ROOT_PATH => return Route::Root,
            SHUTDOWN_PATH => return Route::Shutdown,
            FAVICON_PATH => return Route::Favicon,
            _ => {}
        }

        let candidate = local
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        match SessionId::from_segment(candidate) {
            Some(id) if self.table.contains(&id) => Route::Session(id),
            _ => {
                debug!(path = %path, candidate = %candidate, "No session for path");
                Route::NotFound
            }
        }
    }

    /// Make sure a forwarded session path carries the base URL prefix.
    ///
    /// Session applications build their internal links from one global prefix, so a
    /// request that reached us without it is rewritten to include it.
    #[must_use]
    pub fn forwarded_path(&self, path: &str) -> String {
        match self.base_url.as_deref() {
            Some(base) if !self.has_base(path) => {
                if path.starts_with('/') {
                    format!("/{base}{path}")
                } else {
                    format!("/{base}/{path}")
                }
            }
            _ => path.to_string(),
        }
    }

    #[must_use]
    pub fn session_prefix(&self, id: &SessionId) -> String {
        session_prefix(self.base_url(), id)
    }

    fn has_base(&self, path: &str) -> bool {
        let Some(base) = self.base_url.as_deref() else {
            return false;
        };
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        match trimmed.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn strip_base<'a>(&self, path: &'a str) -> &'a str {
        let Some(base) = self.base_url.as_deref() else {
            return path;
        };
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        match trimmed.strip_prefix(base) {
            Some("") => ROOT_PATH,
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }
}
