//! # Router Module
//!
//! Turns an inbound request path into a [`Route`]: one of the fixed control routes or
//! a registered session.
//!
//! ## Parsing rules
//!
//! 1. The query string is ignored.
//! 2. A configured base URL is stripped if present. It is optional on inbound paths,
//!    so `/{base}/{id}/x` and `/{id}/x` reach the same session.
//! 3. `/`, `/shutdown` and `/favicon.ico` are control routes and are checked before
//!    any session lookup.
//! 4. Otherwise the first remaining path segment is the candidate session identifier.
//!    It must parse as a [`SessionId`](crate::ids::SessionId) and be present in the
//!    [`SessionTable`](crate::registry::SessionTable).
//!
//! ## Example
//!
//! ```rust
//! use dashrouter::registry::SessionTable;
//! use dashrouter::router::{PathRouter, Route};
//! use std::sync::Arc;
//!
//! let router = PathRouter::new(Some("dash"), Arc::new(SessionTable::new()));
//! assert_eq!(router.resolve("/dash/shutdown"), Route::Shutdown);
//! assert_eq!(router.resolve("/nothing-here/"), Route::NotFound);
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use core::{
    normalize_base_url, session_prefix, PathRouter, Route, FAVICON_PATH, ROOT_PATH,
    SHUTDOWN_PATH,
};
